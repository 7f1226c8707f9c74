//! Recording timer state machine
//!
//! ```text
//! Stopped → Armed (pre-roll countdown) → Running ⇄ Paused → Stopped
//! ```
//!
//! A ticking task fires every [`TICK_INTERVAL`] while the timer is armed or
//! running. Each tick advances the countdown or refreshes the displayed
//! elapsed time, and the resulting [`TimerEvent`]s are sent over a channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::elapsed::{Clock, ElapsedTracker};
use crate::lock;

/// Period of the ticking task
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

const ONE_SECOND: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Stopped,
    /// Counting down before the displayed timer starts
    Armed,
    Running,
    Paused,
}

/// Per-session timer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerSettings {
    /// Pre-roll countdown in whole seconds (0 = none)
    pub countdown_secs: u32,
    /// Fixed recording length in seconds (0 = unbounded)
    pub duration_secs: u64,
}

/// Events produced by the ticking task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Countdown moved to the given number of remaining seconds
    Countdown(u32),
    /// Countdown finished; the displayed timer starts counting
    CountdownElapsed,
    /// Displayed elapsed time changed (whole seconds)
    Elapsed(Duration),
    /// Configured duration reached
    DurationElapsed,
}

/// A [`TimerEvent`] tagged with the `start()` call whose run produced it.
/// Events still queued from an earlier run carry an older generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerNotice {
    pub generation: u64,
    pub event: TimerEvent,
}

/// Timer state, shared between the controller and the ticking task
pub(crate) struct TimerCore {
    settings: TimerSettings,
    state: TimerState,
    /// State to return to on resume
    resume_to: TimerState,
    tracker: ElapsedTracker,
    countdown: u32,
    waiting: bool,
    displayed: Duration,
    duration_raised: bool,
    /// Bumped by every `start()`
    generation: u64,
}

impl TimerCore {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: TimerSettings::default(),
            state: TimerState::Stopped,
            resume_to: TimerState::Running,
            tracker: ElapsedTracker::new(clock),
            countdown: 0,
            waiting: false,
            displayed: Duration::ZERO,
            duration_raised: false,
            generation: 0,
        }
    }

    /// Begin a new run and return its generation
    pub(crate) fn start(&mut self, settings: TimerSettings) -> u64 {
        self.generation += 1;
        self.settings = settings;
        self.displayed = Duration::ZERO;
        self.duration_raised = false;
        self.waiting = false;
        self.countdown = 0;

        if settings.countdown_secs > 0 {
            self.countdown = settings.countdown_secs;
            self.waiting = true;
            self.state = TimerState::Armed;
        } else {
            self.state = TimerState::Running;
        }

        self.tracker.restart();
        self.generation
    }

    /// Pause the countdown or the running timer. Pausing while armed is
    /// allowed; `resume()` then goes back to the countdown where it stopped.
    /// Returns false if the timer was not armed or running.
    pub(crate) fn pause(&mut self) -> bool {
        if !matches!(self.state, TimerState::Armed | TimerState::Running) {
            return false;
        }
        self.resume_to = self.state;
        self.state = TimerState::Paused;
        self.tracker.pause();
        true
    }

    /// Returns false if the timer was not paused
    pub(crate) fn resume(&mut self) -> bool {
        if self.state != TimerState::Paused {
            return false;
        }
        self.state = self.resume_to;
        self.tracker.start();
        true
    }

    /// Returns false if the timer was already stopped
    pub(crate) fn stop(&mut self) -> bool {
        self.tracker.stop();
        self.countdown = 0;
        self.waiting = false;
        std::mem::replace(&mut self.state, TimerState::Stopped) != TimerState::Stopped
    }

    pub(crate) fn is_ticking(&self) -> bool {
        matches!(self.state, TimerState::Armed | TimerState::Running)
    }

    pub(crate) fn on_tick(&mut self) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        if !self.is_ticking() {
            return events;
        }

        if self.countdown > 0 {
            // The tracker measures the current countdown second only
            if self.tracker.elapsed() >= ONE_SECOND {
                self.countdown -= 1;
                self.tracker.restart();
                events.push(TimerEvent::Countdown(self.countdown));
            }
            return events;
        }

        if self.waiting {
            self.waiting = false;
            self.state = TimerState::Running;
            events.push(TimerEvent::CountdownElapsed);
        }

        let displayed = Duration::from_secs(self.tracker.elapsed().as_secs());
        if displayed != self.displayed {
            self.displayed = displayed;
            events.push(TimerEvent::Elapsed(displayed));
        }

        let limit = self.settings.duration_secs;
        if limit > 0 && !self.duration_raised && displayed.as_secs() >= limit {
            self.duration_raised = true;
            events.push(TimerEvent::DurationElapsed);
        }

        events
    }
}

/// Periodically ticking recording timer
pub struct RecordingTimer {
    core: Arc<Mutex<TimerCore>>,
    ticking: watch::Sender<bool>,
    events_tx: mpsc::UnboundedSender<TimerNotice>,
    task: Option<JoinHandle<()>>,
}

impl RecordingTimer {
    pub fn new(clock: Arc<dyn Clock>, events_tx: mpsc::UnboundedSender<TimerNotice>) -> Self {
        let (ticking, _) = watch::channel(false);
        Self {
            core: Arc::new(Mutex::new(TimerCore::new(clock))),
            ticking,
            events_tx,
            task: None,
        }
    }

    /// Spawn the ticking task. Ticking stays off until `start()`.
    pub fn init(&mut self, runtime: &Handle) {
        if self.task.is_some() {
            return;
        }

        let core = self.core.clone();
        let ticking = self.ticking.subscribe();
        let events_tx = self.events_tx.clone();
        self.task = Some(runtime.spawn(tick_loop(core, ticking, events_tx)));
        debug!("Recording timer initialized ({:?} period)", TICK_INTERVAL);
    }

    /// Start a new run. The returned generation tags every event of this run.
    pub fn start(&self, settings: TimerSettings) -> u64 {
        let generation = lock(&self.core).start(settings);
        info!(
            "Timer started (countdown: {}s, duration: {}s, run {})",
            settings.countdown_secs, settings.duration_secs, generation
        );
        self.ticking.send_replace(true);
        generation
    }

    pub fn pause(&self) -> bool {
        let paused = lock(&self.core).pause();
        if paused {
            self.ticking.send_replace(false);
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let resumed = lock(&self.core).resume();
        if resumed {
            self.ticking.send_replace(true);
        }
        resumed
    }

    pub fn stop(&self) -> bool {
        self.ticking.send_replace(false);
        lock(&self.core).stop()
    }

    #[cfg(test)]
    pub fn state(&self) -> TimerState {
        lock(&self.core).state
    }

    /// True while the pre-roll countdown has not finished
    pub fn is_waiting(&self) -> bool {
        lock(&self.core).waiting
    }

    pub fn displayed_elapsed(&self) -> Duration {
        lock(&self.core).displayed
    }
}

impl Drop for RecordingTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn tick_loop(
    core: Arc<Mutex<TimerCore>>,
    mut ticking: watch::Receiver<bool>,
    events_tx: mpsc::UnboundedSender<TimerNotice>,
) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if !*ticking.borrow_and_update() {
            if ticking.changed().await.is_err() {
                break;
            }
            // First tick one full period after (re)starting
            interval.reset();
            continue;
        }

        tokio::select! {
            _ = interval.tick() => {
                let (generation, events) = {
                    let mut core = lock(&core);
                    (core.generation, core.on_tick())
                };
                for event in events {
                    if events_tx.send(TimerNotice { generation, event }).is_err() {
                        debug!("Timer event receiver dropped, stopping ticks");
                        return;
                    }
                }
            }
            changed = ticking.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::elapsed::tests::ManualClock;

    /// Advance by one tick period and run the tick handler
    fn tick(clock: &ManualClock, core: &mut TimerCore) -> Vec<TimerEvent> {
        clock.advance(TICK_INTERVAL);
        core.on_tick()
    }

    #[test]
    fn test_countdown_gates_displayed_time() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());
        core.start(TimerSettings {
            countdown_secs: 3,
            duration_secs: 0,
        });
        assert_eq!(core.state, TimerState::Armed);

        let mut fired_at = Vec::new();
        let mut countdowns = Vec::new();
        for i in 1..=20u32 {
            for event in tick(&clock, &mut core) {
                match event {
                    TimerEvent::CountdownElapsed => fired_at.push(i * 250),
                    TimerEvent::Countdown(n) => countdowns.push(n),
                    TimerEvent::Elapsed(_) | TimerEvent::DurationElapsed => {
                        assert!(!fired_at.is_empty(), "elapsed moved during countdown");
                    }
                }
            }
            if i * 250 <= 3000 {
                assert_eq!(core.displayed, Duration::ZERO);
            }
        }

        assert_eq!(countdowns, vec![2, 1, 0]);
        assert_eq!(fired_at.len(), 1);
        assert!(fired_at[0] > 3000 && fired_at[0] <= 3250);
        assert_eq!(core.state, TimerState::Running);
        assert!(!core.waiting);
    }

    #[test]
    fn test_duration_fires_once() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());
        core.start(TimerSettings {
            countdown_secs: 0,
            duration_secs: 2,
        });

        let mut fired_at = Vec::new();
        for i in 1..=24u32 {
            if tick(&clock, &mut core).contains(&TimerEvent::DurationElapsed) {
                fired_at.push(i * 250);
            }
        }

        assert_eq!(fired_at, vec![2000]);
    }

    #[test]
    fn test_duration_never_fires_after_early_stop() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());
        core.start(TimerSettings {
            countdown_secs: 0,
            duration_secs: 5,
        });

        for _ in 0..12 {
            assert!(!tick(&clock, &mut core).contains(&TimerEvent::DurationElapsed));
        }
        assert!(core.stop());
        for _ in 0..40 {
            assert!(tick(&clock, &mut core).is_empty());
        }
    }

    #[test]
    fn test_elapsed_frozen_while_paused() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());
        core.start(TimerSettings::default());

        for _ in 0..8 {
            tick(&clock, &mut core);
        }
        assert_eq!(core.displayed, Duration::from_secs(2));

        assert!(core.pause());
        clock.advance(Duration::from_secs(30));
        assert!(core.on_tick().is_empty());

        assert!(core.resume());
        for _ in 0..4 {
            tick(&clock, &mut core);
        }
        assert_eq!(core.displayed, Duration::from_secs(3));
    }

    #[test]
    fn test_invalid_transitions_are_noops() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());

        assert!(!core.pause());
        assert_eq!(core.state, TimerState::Stopped);

        core.start(TimerSettings::default());
        assert!(!core.resume());
        assert_eq!(core.state, TimerState::Running);

        assert!(core.stop());
        assert!(!core.stop());
    }

    #[test]
    fn test_pause_during_countdown_resumes_armed() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());
        core.start(TimerSettings {
            countdown_secs: 2,
            duration_secs: 0,
        });

        tick(&clock, &mut core);
        assert!(core.pause());
        clock.advance(Duration::from_secs(10));
        assert!(core.resume());

        assert_eq!(core.state, TimerState::Armed);
        assert_eq!(core.countdown, 2);
    }

    #[test]
    fn test_restart_after_stop_is_fresh() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());
        core.start(TimerSettings {
            countdown_secs: 0,
            duration_secs: 1,
        });
        for _ in 0..4 {
            tick(&clock, &mut core);
        }
        assert!(core.duration_raised);
        core.stop();

        core.start(TimerSettings {
            countdown_secs: 0,
            duration_secs: 1,
        });
        assert_eq!(core.displayed, Duration::ZERO);
        assert!(!core.duration_raised);
    }

    #[test]
    fn test_each_start_gets_a_new_generation() {
        let clock = ManualClock::new();
        let mut core = TimerCore::new(clock.clone());

        let first = core.start(TimerSettings::default());
        core.stop();
        let second = core.start(TimerSettings::default());

        assert!(second > first);
        assert_eq!(core.generation, second);
    }

    #[test]
    fn test_ticking_task_emits_events() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = RecordingTimer::new(Arc::new(crate::session::elapsed::SystemClock), tx);
        timer.init(runtime.handle());

        let generation = timer.start(TimerSettings {
            countdown_secs: 0,
            duration_secs: 1,
        });

        let notice = runtime.block_on(async {
            loop {
                match tokio::time::timeout(Duration::from_secs(3), rx.recv()).await {
                    Ok(Some(notice)) if notice.event == TimerEvent::DurationElapsed => {
                        break Some(notice)
                    }
                    Ok(Some(_)) => continue,
                    _ => break None,
                }
            }
        });

        assert_eq!(
            notice,
            Some(TimerNotice {
                generation,
                event: TimerEvent::DurationElapsed
            })
        );
        assert!(timer.stop());
        assert_eq!(timer.state(), TimerState::Stopped);
    }
}
