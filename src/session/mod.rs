//! Recording session control
//!
//! [`SessionController`] is the single entry point for front ends. It owns the
//! recording timer (countdown, elapsed time, duration limit) and drives the
//! capture pipeline. Notifications reach observers through a [`Dispatcher`].

mod controller;
mod dispatcher;
mod elapsed;
mod timer;

use std::time::Duration;

pub use controller::{SessionController, SessionError, StartOutcome};
pub use dispatcher::{DispatchLoop, Dispatcher};

/// Lifecycle of one recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Capturing, pre-roll countdown still running
    Waiting,
    Recording,
    Paused,
    Stopped,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Waiting | SessionState::Recording | SessionState::Paused
        )
    }
}

/// Notifications delivered to session observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Seconds left in the pre-roll countdown
    Countdown(u32),
    CountdownElapsed,
    /// Displayed recording time
    Elapsed(Duration),
    DurationElapsed,
}
