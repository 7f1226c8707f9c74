use anyhow::Result;
use std::io::{BufRead, Write};
use std::sync::mpsc::Receiver;
use std::time::Duration;
use tracing::debug;

use crate::session::{SessionController, SessionEvent, SessionState};

/// A source of single-key commands. `None` means end of input.
pub trait KeySource {
    fn read_char(&mut self) -> Option<char>;
}

/// Line-oriented input for redirected stdin. A line holding exactly one
/// character yields it; any other line is a no-op (`'\0'`).
pub struct PipedInput<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> PipedInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl<R: BufRead> KeySource for PipedInput<R> {
    fn read_char(&mut self) -> Option<char> {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let mut chars = self.line.trim_end_matches(['\r', '\n']).chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => Some('\0'),
                }
            }
        }
    }
}

/// Run the pause/resume/quit loop until `q` or end of input. Stopping the
/// session is left to the caller.
pub fn run_interactive<K, W>(
    controller: &SessionController,
    keys: &mut K,
    out: &mut W,
) -> Result<()>
where
    K: KeySource + ?Sized,
    W: Write,
{
    writeln!(out, "Press p to pause or resume, q to quit")?;
    out.flush()?;

    while let Some(key) = keys.read_char() {
        match key {
            'p' => {
                if controller.toggle_pause() != SessionState::Paused {
                    writeln!(out, "Resumed")?;
                    out.flush()?;
                }
            }
            'q' => return Ok(()),
            other => debug!("Ignoring key {:?}", other),
        }
    }

    debug!("Input closed, quitting");
    Ok(())
}

/// Elapsed time as `H:MM:SS`
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Show a timer line for a recording of fixed length, overwriting it in place
/// on every elapsed-time event until `length` is shown or the session ends.
///
/// With `waiting` the line only appears once the countdown has finished.
pub fn run_fixed_length<W: Write>(
    length: Duration,
    events: &Receiver<SessionEvent>,
    waiting: bool,
    out: &mut W,
) -> Result<()> {
    if waiting {
        loop {
            match events.recv() {
                Ok(SessionEvent::CountdownElapsed) => break,
                Ok(SessionEvent::StateChanged(SessionState::Stopped)) | Err(_) => {
                    debug!("Session ended during the countdown");
                    return Ok(());
                }
                Ok(_) => {}
            }
        }
    }

    write!(out, "{}", format_elapsed(Duration::ZERO))?;
    out.flush()?;

    while let Ok(event) = events.recv() {
        match event {
            SessionEvent::Elapsed(elapsed) => {
                write!(out, "\r{}", format_elapsed(elapsed))?;
                out.flush()?;
                if elapsed >= length {
                    break;
                }
            }
            SessionEvent::DurationElapsed | SessionEvent::StateChanged(SessionState::Stopped) => {
                break
            }
            _ => {}
        }
    }

    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{
        CapturePipeline, CapturePlan, CaptureServices, DeviceList, GifWriterProvider,
        OverwritePrompt, ScreenSourceProvider, VideoSource, WindowCapture,
    };
    use crate::config::RecordingConfig;
    use crate::session::Dispatcher;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::{mpsc, Arc};

    struct NullPipeline;

    impl CapturePipeline for NullPipeline {
        fn start_capture(&self, _plan: &CapturePlan) -> bool {
            true
        }

        fn pause_capture(&self) {}

        fn resume_capture(&self) {}

        fn stop_capture(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn take_screenshot(&self, _: &VideoSource, _: bool, _: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct NoDevices;

    impl DeviceList for NoDevices {
        fn microphones(&self) -> Vec<String> {
            Vec::new()
        }

        fn speakers(&self) -> Vec<String> {
            Vec::new()
        }

        fn webcams(&self) -> Vec<String> {
            vec!["No Webcam".into()]
        }
    }

    struct NoWindows;

    impl WindowCapture for NoWindows {
        fn screenshot_window(&self, _: u64, _: bool, _: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Yes;

    impl OverwritePrompt for Yes {
        fn confirm(&self, _: &str) -> bool {
            true
        }
    }

    fn recording_controller(
        runtime: &tokio::runtime::Runtime,
        dir: &tempfile::TempDir,
    ) -> SessionController {
        let services = CaptureServices {
            pipeline: Arc::new(NullPipeline),
            source_providers: vec![Arc::new(ScreenSourceProvider)],
            writer_providers: vec![Arc::new(GifWriterProvider)],
            devices: Arc::new(NoDevices),
            window_capture: Arc::new(NoWindows),
            prompt: Arc::new(Yes),
        };
        let controller = SessionController::new(services, Dispatcher::detached(), runtime.handle());
        controller
            .start(&RecordingConfig {
                output_path: Some(dir.path().join("out.gif")),
                ..RecordingConfig::default()
            })
            .unwrap();
        controller
    }

    #[test]
    fn test_piped_input_single_char_lines() {
        let mut input = PipedInput::new(Cursor::new("p\npause\n\nq\r\n"));

        assert_eq!(input.read_char(), Some('p'));
        assert_eq!(input.read_char(), Some('\0'));
        assert_eq!(input.read_char(), Some('\0'));
        assert_eq!(input.read_char(), Some('q'));
        assert_eq!(input.read_char(), None);
    }

    #[test]
    fn test_pause_twice_prints_resumed_once() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let controller = recording_controller(&runtime, &dir);
        let mut out = Vec::new();

        run_interactive(
            &controller,
            &mut PipedInput::new(Cursor::new("p\np\nq\n")),
            &mut out,
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Resumed").count(), 1);
        assert_eq!(controller.state(), SessionState::Recording);
        controller.stop().unwrap();
    }

    #[test]
    fn test_end_of_input_quits() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let controller = recording_controller(&runtime, &dir);
        let mut out = Vec::new();

        run_interactive(&controller, &mut PipedInput::new(Cursor::new("p\n")), &mut out).unwrap();

        assert_eq!(controller.state(), SessionState::Paused);
        assert!(!String::from_utf8(out).unwrap().contains("Resumed"));
        controller.stop().unwrap();
    }

    fn scripted(events: &[SessionEvent]) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        for event in events {
            tx.send(*event).unwrap();
        }
        rx
    }

    #[test]
    fn test_fixed_length_display_follows_elapsed_events() {
        let events = scripted(&[
            SessionEvent::Countdown(1),
            SessionEvent::Countdown(0),
            SessionEvent::StateChanged(SessionState::Recording),
            SessionEvent::CountdownElapsed,
            SessionEvent::Elapsed(Duration::from_secs(1)),
            SessionEvent::Elapsed(Duration::from_secs(2)),
            SessionEvent::Elapsed(Duration::from_secs(3)),
            SessionEvent::DurationElapsed,
        ]);
        let mut out = Vec::new();

        run_fixed_length(Duration::from_secs(3), &events, true, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "0:00:00\r0:00:01\r0:00:02\r0:00:03\n"
        );
    }

    #[test]
    fn test_fixed_length_display_ends_on_stop() {
        let mut out = Vec::new();
        let stopped_in_countdown = scripted(&[
            SessionEvent::Countdown(2),
            SessionEvent::StateChanged(SessionState::Stopped),
        ]);

        run_fixed_length(Duration::from_secs(5), &stopped_in_countdown, true, &mut out).unwrap();
        assert!(out.is_empty());

        let stopped_early = scripted(&[
            SessionEvent::Elapsed(Duration::from_secs(1)),
            SessionEvent::StateChanged(SessionState::Stopped),
            SessionEvent::Elapsed(Duration::from_secs(2)),
        ]);

        run_fixed_length(Duration::from_secs(5), &stopped_early, false, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0:00:00\r0:00:01\n");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(59_900)), "0:00:59");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1:02:05");
    }
}
