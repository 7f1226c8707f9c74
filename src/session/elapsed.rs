//! Wall-clock accounting across start/pause/resume/stop cycles

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Accumulates running time, frozen while paused.
///
/// All operations are no-ops when called in a state where they make no sense,
/// so callers never have to check before issuing them.
pub struct ElapsedTracker {
    clock: Arc<dyn Clock>,
    /// Set while running
    running_since: Option<Instant>,
    /// Time folded in from previous running intervals
    accumulated: Duration,
    /// Set by `stop()`, cleared by the next start
    finalized: bool,
}

impl ElapsedTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            running_since: None,
            accumulated: Duration::ZERO,
            finalized: false,
        }
    }

    /// Start (or resume) running. Keeps the accumulated total.
    pub fn start(&mut self) {
        if self.running_since.is_some() {
            return;
        }
        self.running_since = Some(self.clock.now());
        self.finalized = false;
    }

    /// Clear the accumulated total and start running from now
    pub fn restart(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(self.clock.now());
        self.finalized = false;
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += self.clock.now().saturating_duration_since(since);
        }
    }

    /// Pause and mark the tracker finalized. The total stays readable.
    pub fn stop(&mut self) {
        self.pause();
        self.finalized = true;
    }

    pub fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + self.clock.now().saturating_duration_since(since),
            None => self.accumulated,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    #[cfg(test)]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}
