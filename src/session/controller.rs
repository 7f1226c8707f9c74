//! Session controller
//!
//! Resolves source/encoder/device selectors, guards the output file, starts
//! and stops the capture pipeline and keeps the recording timer in step with
//! it. Timer events come back over a channel and are supervised on the
//! runtime: a finished countdown flips the session from `Waiting` to
//! `Recording`, a reached duration stops the session. Events left over from an
//! earlier timer run are dropped.
//!
//! Observers are notified after the transition lock is released, so they may
//! call back into the controller.
//!
//! Capture starts immediately, even while the pre-roll countdown runs; the
//! countdown only gates the displayed timer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatcher::Dispatcher;
use super::elapsed::{Clock, SystemClock};
use super::timer::{RecordingTimer, TimerEvent, TimerNotice, TimerSettings};
use super::{SessionEvent, SessionState};
use crate::capture::{
    parse_encoder_selector, parse_window_selector, CapturePlan, CaptureServices, VideoSource,
    VideoWriter, WriterKind,
};
use crate::config::RecordingConfig;
use crate::lock;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("capture could not be started")]
    CaptureStartFailed,

    #[error("a recording session is already active")]
    AlreadyActive,

    #[error("failed to prepare output {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Capture(#[from] anyhow::Error),
}

/// Result of a successful `start()` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { output_path: PathBuf },
    /// The user chose not to overwrite the existing output file
    Declined,
}

type Observer = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Current choice of source, writer and devices. Invalid selectors leave it
/// unchanged.
#[derive(Debug, Clone, Default)]
struct Selection {
    source: VideoSource,
    writer_kind: WriterKind,
    /// `None` = first writer of the family
    writer: Option<usize>,
    microphone: Option<usize>,
    speaker: Option<usize>,
    /// Index into the webcam list; 0 is "no webcam"
    webcam: Option<usize>,
}

struct Inner {
    services: CaptureServices,
    dispatcher: Dispatcher,
    timer: RecordingTimer,
    state: Mutex<SessionState>,
    selection: Mutex<Selection>,
    observers: Arc<Mutex<Vec<Observer>>>,
    /// Serializes start/pause/resume/stop
    transition: Mutex<()>,
    session_id: Mutex<Option<Uuid>>,
    /// Timer run of the active session, 0 when none is active
    timer_generation: Mutex<u64>,
}

/// Entry point used by every front end
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(services: CaptureServices, dispatcher: Dispatcher, runtime: &Handle) -> Self {
        Self::with_clock(services, dispatcher, runtime, Arc::new(SystemClock))
    }

    pub fn with_clock(
        services: CaptureServices,
        dispatcher: Dispatcher,
        runtime: &Handle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut timer = RecordingTimer::new(clock, events_tx);
        timer.init(runtime);

        let inner = Arc::new(Inner {
            services,
            dispatcher,
            timer,
            state: Mutex::new(SessionState::Idle),
            selection: Mutex::new(Selection::default()),
            observers: Arc::new(Mutex::new(Vec::new())),
            transition: Mutex::new(()),
            session_id: Mutex::new(None),
            timer_generation: Mutex::new(0),
        });

        runtime.spawn(supervise(Arc::downgrade(&inner), events_rx));

        Self { inner }
    }

    /// Register an observer. It is always invoked through the dispatcher.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        lock(&self.inner.observers).push(Arc::new(observer));
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.inner.state)
    }

    /// Displayed recording time (whole seconds, zero during the countdown)
    pub fn elapsed(&self) -> std::time::Duration {
        self.inner.timer.displayed_elapsed()
    }

    /// Selected writer family and explicit writer index
    #[cfg(test)]
    pub fn selected_writer(&self) -> (WriterKind, Option<usize>) {
        let selection = lock(&self.inner.selection);
        (selection.writer_kind, selection.writer)
    }

    #[cfg(test)]
    pub fn selected_source(&self) -> VideoSource {
        lock(&self.inner.selection).source.clone()
    }

    fn publish(&self, event: SessionEvent) {
        let observers = self.inner.observers.clone();
        self.inner.dispatcher.run(
            move || {
                let observers: Vec<Observer> = lock(&observers).clone();
                for observer in observers {
                    observer(&event);
                }
            },
            true,
        );
    }

    fn publish_change(&self, change: Option<SessionEvent>) {
        if let Some(event) = change {
            self.publish(event);
        }
    }

    /// Replace the state. Returns the event to publish once the transition
    /// lock is released, if the state changed.
    #[must_use]
    fn set_state(&self, state: SessionState) -> Option<SessionEvent> {
        let previous = std::mem::replace(&mut *lock(&self.inner.state), state);
        if previous == state {
            return None;
        }
        debug!("Session state {:?} -> {:?}", previous, state);
        Some(SessionEvent::StateChanged(state))
    }

    /// Apply the selectors and device indices in `config` to the current
    /// selection. Anything unrecognized or out of range is ignored.
    pub fn prepare_sources(&self, config: &RecordingConfig) {
        let mut selection = lock(&self.inner.selection);

        if let Some(selector) = config.source.as_deref() {
            self.select_source(&mut selection, selector);
        }

        if let Some(selector) = config.encoder.as_deref() {
            self.select_encoder(&mut selection, selector);
        }

        let devices = &self.inner.services.devices;
        select_device(
            &mut selection.microphone,
            config.microphone,
            devices.microphones().len(),
            "microphone",
        );
        select_device(
            &mut selection.speaker,
            config.speaker,
            devices.speakers().len(),
            "speaker",
        );

        // Entry 0 of the webcam list is "no webcam"
        let webcams = devices.webcams().len();
        if config.webcam < 0 {
            selection.webcam = None;
        } else if (config.webcam as usize) < webcams.saturating_sub(1) {
            selection.webcam = Some(config.webcam as usize + 1);
        } else {
            debug!("Webcam index {} out of range, ignoring", config.webcam);
        }
    }

    fn select_source(&self, selection: &mut Selection, selector: &str) {
        let parsed = self
            .inner
            .services
            .source_providers
            .iter()
            .find_map(|p| p.parse_selector(selector).map(|source| (p.name(), source)));

        match parsed {
            Some((provider, source)) => {
                debug!("Source {:?} claimed by {} provider", selector, provider);
                selection.source = source;
            }
            None => debug!("No source provider recognized {:?}, ignoring", selector),
        }
    }

    fn select_encoder(&self, selection: &mut Selection, selector: &str) {
        let Some((kind, index)) = parse_encoder_selector(selector) else {
            debug!("Unrecognized encoder selector {:?}, ignoring", selector);
            return;
        };

        let Some(provider) = self
            .inner
            .services
            .writer_provider(kind)
            .filter(|p| p.is_available())
        else {
            debug!("Writer family {} is not available, ignoring {:?}", kind, selector);
            return;
        };

        if selection.writer_kind != kind {
            selection.writer_kind = kind;
            selection.writer = None;
        }

        if let Some(index) = index {
            if index < provider.writers().len() {
                selection.writer = Some(index);
            } else {
                debug!("Writer index {} out of range for {}, ignoring", index, kind);
            }
        }
    }

    fn resolve_writer(&self, selection: &Selection) -> VideoWriter {
        self.inner
            .services
            .writer_provider(selection.writer_kind)
            .and_then(|p| p.writers().get(selection.writer.unwrap_or(0)).copied())
            .unwrap_or_default()
    }

    fn capture_plan(&self, config: &RecordingConfig) -> CapturePlan {
        let selection = lock(&self.inner.selection).clone();
        let writer = self.resolve_writer(&selection);
        let devices = &self.inner.services.devices;

        let output_path = config.output_path.clone().unwrap_or_else(|| {
            let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
            config
                .output_directory
                .join(format!("{}.{}", stamp, writer.extension))
        });

        CapturePlan {
            source: selection.source,
            writer,
            output_path,
            frame_rate: config.frame_rate,
            video_quality: config.video_quality,
            audio_quality: config.audio_quality,
            microphone: selection
                .microphone
                .and_then(|i| devices.microphones().get(i).cloned()),
            speaker: selection
                .speaker
                .and_then(|i| devices.speakers().get(i).cloned()),
            webcam: selection.webcam.and_then(|i| devices.webcams().get(i).cloned()),
            include_cursor: config.include_cursor,
            show_keystrokes: config.show_keystrokes,
            show_clicks: config.show_clicks,
        }
    }

    /// Make sure `path` can be written. Returns false if the user declined to
    /// overwrite an existing file.
    pub fn validate_output_path(&self, path: &Path, overwrite: bool) -> Result<bool, SessionError> {
        if !path.exists() {
            return Ok(true);
        }

        if !overwrite
            && !self
                .inner
                .services
                .prompt
                .confirm("Output file already exists. Do you want to overwrite it?")
        {
            return Ok(false);
        }

        std::fs::remove_file(path).map_err(|source| SessionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Removed existing output file {:?}", path);
        Ok(true)
    }

    /// Start a recording session.
    ///
    /// Blocks for the configured start delay. If the pipeline cannot start,
    /// the session state and the timer are left untouched.
    pub fn start(&self, config: &RecordingConfig) -> Result<StartOutcome, SessionError> {
        let (outcome, change) = {
            let _transition = lock(&self.inner.transition);
            self.start_locked(config)?
        };
        self.publish_change(change);
        Ok(outcome)
    }

    fn start_locked(
        &self,
        config: &RecordingConfig,
    ) -> Result<(StartOutcome, Option<SessionEvent>), SessionError> {
        if self.state().is_active() {
            warn!("Recording already in progress");
            return Err(SessionError::AlreadyActive);
        }

        if let Some(path) = &config.output_path {
            if !self.validate_output_path(path, config.overwrite)? {
                info!("Not overwriting {:?}, recording aborted", path);
                return Ok((StartOutcome::Declined, None));
            }
        }

        self.prepare_sources(config);
        let plan = self.capture_plan(config);

        if let Some(parent) = plan.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| SessionError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        if !config.start_delay.is_zero() {
            info!("Waiting {:?} before starting capture", config.start_delay);
            std::thread::sleep(config.start_delay);
        }

        if !self.inner.services.pipeline.start_capture(&plan) {
            error!("Capture pipeline failed to start");
            return Err(SessionError::CaptureStartFailed);
        }

        let session_id = Uuid::new_v4();
        *lock(&self.inner.session_id) = Some(session_id);

        *lock(&self.inner.timer_generation) = self.inner.timer.start(TimerSettings {
            countdown_secs: config.countdown_secs,
            duration_secs: config.duration_secs,
        });

        let change = self.set_state(if config.countdown_secs > 0 {
            SessionState::Waiting
        } else {
            SessionState::Recording
        });

        info!(
            "Recording started: session={}, output={:?}",
            session_id, plan.output_path
        );

        let outcome = StartOutcome::Started {
            output_path: plan.output_path,
        };
        Ok((outcome, change))
    }

    /// Returns false if there was nothing to pause
    pub fn pause(&self) -> bool {
        let change = {
            let _transition = lock(&self.inner.transition);

            if !matches!(
                self.state(),
                SessionState::Waiting | SessionState::Recording
            ) {
                debug!("Cannot pause - not recording");
                return false;
            }

            self.inner.services.pipeline.pause_capture();
            self.inner.timer.pause();
            info!("Recording paused at {:?}", self.elapsed());
            self.set_state(SessionState::Paused)
        };
        self.publish_change(change);
        true
    }

    /// Returns false if the session was not paused
    pub fn resume(&self) -> bool {
        let change = {
            let _transition = lock(&self.inner.transition);

            if self.state() != SessionState::Paused {
                debug!("Cannot resume - not paused");
                return false;
            }

            self.inner.services.pipeline.resume_capture();
            self.inner.timer.resume();
            info!("Recording resumed");
            self.set_state(if self.inner.timer.is_waiting() {
                SessionState::Waiting
            } else {
                SessionState::Recording
            })
        };
        self.publish_change(change);
        true
    }

    /// Pause if recording, resume if paused. Returns the resulting state.
    pub fn toggle_pause(&self) -> SessionState {
        match self.state() {
            SessionState::Paused => {
                self.resume();
            }
            SessionState::Waiting | SessionState::Recording => {
                self.pause();
            }
            _ => {}
        }
        self.state()
    }

    /// Stop the session and wait for the output to be finalized. Calling it
    /// again, or without an active session, does nothing.
    pub fn stop(&self) -> Result<(), SessionError> {
        self.stop_generation(None)
    }

    /// Stop the session, but only if `generation` (when given) is still the
    /// active timer run.
    fn stop_generation(&self, generation: Option<u64>) -> Result<(), SessionError> {
        let (result, change) = {
            let _transition = lock(&self.inner.transition);

            let current = *lock(&self.inner.timer_generation);
            if generation.is_some_and(|g| g != current) {
                debug!("Timer run {:?} is over, not stopping", generation);
                return Ok(());
            }

            if !self.state().is_active() {
                debug!("No recording in progress");
                return Ok(());
            }

            info!("Stopping recording...");
            self.inner.timer.stop();
            *lock(&self.inner.timer_generation) = 0;
            let result = self.inner.services.pipeline.stop_capture();

            let session_id = lock(&self.inner.session_id).take();
            match &result {
                Ok(()) => info!(
                    "Recording stopped: session={:?}, length={:?}",
                    session_id.map(|id| id.to_string()),
                    self.elapsed()
                ),
                Err(e) => error!("Failed to finalize recording: {:#}", e),
            }

            (result, self.set_state(SessionState::Stopped))
        };
        self.publish_change(change);

        result.map_err(SessionError::from)
    }

    /// Take a screenshot. `win:<handle>` selectors go to the window capture
    /// service and their failures are only logged. Returns whether a file was
    /// written.
    pub fn take_screenshot(
        &self,
        selector: Option<&str>,
        include_cursor: bool,
        path: &Path,
    ) -> Result<bool, SessionError> {
        if let Some(handle) = selector.and_then(parse_window_selector) {
            return match self
                .inner
                .services
                .window_capture
                .screenshot_window(handle, include_cursor, path)
            {
                Ok(()) => {
                    info!("Window {} captured to {:?}", handle, path);
                    Ok(true)
                }
                Err(e) => {
                    warn!("Window screenshot failed: {:#}", e);
                    Ok(false)
                }
            };
        }

        let source = {
            let mut selection = lock(&self.inner.selection);
            if let Some(selector) = selector {
                self.select_source(&mut selection, selector);
            }
            selection.source.clone()
        };

        self.inner
            .services
            .pipeline
            .take_screenshot(&source, include_cursor, path)?;
        Ok(true)
    }

    fn on_countdown_elapsed(&self) {
        {
            let mut state = lock(&self.inner.state);
            if *state != SessionState::Waiting {
                return;
            }
            *state = SessionState::Recording;
        }
        info!("Countdown finished");
        self.publish(SessionEvent::StateChanged(SessionState::Recording));
        self.publish(SessionEvent::CountdownElapsed);
    }

    fn on_timer_notice(&self, notice: TimerNotice) {
        let TimerNotice { generation, event } = notice;
        if generation != *lock(&self.inner.timer_generation) {
            debug!("Dropping {:?} from timer run {}", event, generation);
            return;
        }

        match event {
            TimerEvent::Countdown(remaining) => self.publish(SessionEvent::Countdown(remaining)),
            TimerEvent::CountdownElapsed => self.on_countdown_elapsed(),
            TimerEvent::Elapsed(elapsed) => self.publish(SessionEvent::Elapsed(elapsed)),
            TimerEvent::DurationElapsed => {
                info!("Duration reached, stopping recording");
                self.publish(SessionEvent::DurationElapsed);
                let controller = self.clone();
                // Finalization blocks; keep it off the runtime's workers
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = controller.stop_generation(Some(generation)) {
                        error!("Automatic stop failed: {:#}", e);
                    }
                });
            }
        }
    }
}

/// Apply a device index: negative clears, out of range is ignored
fn select_device(slot: &mut Option<usize>, index: i32, available: usize, what: &str) {
    if index < 0 {
        *slot = None;
    } else if (index as usize) < available {
        *slot = Some(index as usize);
    } else {
        debug!("{} index {} out of range, ignoring", what, index);
    }
}

async fn supervise(inner: Weak<Inner>, mut notices: mpsc::UnboundedReceiver<TimerNotice>) {
    while let Some(notice) = notices.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        SessionController { inner }.on_timer_notice(notice);
    }
    debug!("Session supervisor stopped");
}
