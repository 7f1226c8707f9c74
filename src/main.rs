//! screenreel
//!
//! Console screen recorder. Captures the desktop, a region or a window through
//! ffmpeg with a pre-roll countdown, fixed-length recordings and keyboard
//! pause/resume.

mod capture;
mod cli;
mod config;
mod console;
mod logging;
mod session;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use capture::{
    locate_ffmpeg, AviWriterProvider, CaptureServices, ConfiguredDevices, FfmpegPipeline,
    FfmpegWindowCapture, FfmpegWriterProvider, GifWriterProvider, RegionSourceProvider,
    ScreenSourceProvider, WindowSourceProvider,
};
use cli::{Cli, Command, ShotArgs, StartArgs};
use config::{Config, RecordingConfig};
use console::ConsolePrompt;
use session::{
    DispatchLoop, Dispatcher, SessionController, SessionError, SessionEvent, SessionState,
    StartOutcome,
};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging is best effort; the recorder works without it
    let log_guard = match logging::init_logging() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Logging disabled: {:#}", e);
            None
        }
    };

    info!("screenreel {} starting", env!("CARGO_PKG_VERSION"));

    let code = run(cli)?;

    info!("Exiting with code {}", code);
    drop(log_guard);
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = Config::load()?;
    info!("Configuration loaded from {:?}", config.config_path());

    let ffmpeg = locate_ffmpeg(config.ffmpeg.path.as_deref());
    match &ffmpeg {
        Some(path) => info!("Using ffmpeg at {:?}", path),
        None => warn!("ffmpeg not found, capture will fail"),
    }

    let services = capture_services(&config, ffmpeg);
    let runtime = Runtime::new().context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Start(args) => run_start(&config, services, &runtime, args),
        Command::Shot(args) => run_shot(&config, services, &runtime, args),
        Command::List => {
            print_listing(&services);
            Ok(0)
        }
    }
}

fn capture_services(config: &Config, ffmpeg: Option<PathBuf>) -> CaptureServices {
    CaptureServices {
        pipeline: Arc::new(FfmpegPipeline::new(ffmpeg.clone())),
        source_providers: vec![
            Arc::new(WindowSourceProvider),
            Arc::new(ScreenSourceProvider),
            Arc::new(RegionSourceProvider),
        ],
        writer_providers: vec![
            Arc::new(FfmpegWriterProvider::new(ffmpeg.clone())),
            Arc::new(AviWriterProvider::new(ffmpeg.is_some())),
            Arc::new(GifWriterProvider),
        ],
        devices: Arc::new(ConfiguredDevices::from_config(config)),
        window_capture: Arc::new(FfmpegWindowCapture::new(ffmpeg)),
        prompt: Arc::new(ConsolePrompt),
    }
}

/// How a `start` run ended
enum StartExit {
    Finished,
    Declined,
    StartFailed,
}

fn run_start(
    config: &Config,
    services: CaptureServices,
    runtime: &Runtime,
    args: StartArgs,
) -> Result<i32> {
    let recording = RecordingConfig::from_settings(config, args.into_overrides());

    // The main thread owns the dispatcher and prints every notification
    let dispatch = DispatchLoop::new();
    let controller = SessionController::new(services, dispatch.dispatcher(), runtime.handle());
    controller.subscribe(print_event);

    // Fixed-length recordings redraw their timer line from session events
    let display = (recording.duration_secs > 0).then(|| {
        let (events_tx, events_rx) = mpsc::channel();
        controller.subscribe(move |event| {
            let _ = events_tx.send(*event);
        });
        events_rx
    });

    let ctrlc_controller = controller.clone();
    ctrlc::set_handler(move || {
        console::restore_terminal();
        info!("Ctrl+C received, stopping recording...");
        if let Err(e) = ctrlc_controller.stop() {
            error!("Failed to stop recording: {:#}", e);
            std::process::exit(1);
        }
        std::process::exit(0);
    })
    .context("Failed to install Ctrl+C handler")?;

    let quit = dispatch.quit_handle();
    let worker = std::thread::Builder::new()
        .name("session".to_string())
        .spawn(move || {
            let result = drive_session(&controller, &recording, display);
            quit.quit();
            result
        })
        .context("Failed to spawn session thread")?;

    dispatch.run();

    let exit = worker
        .join()
        .map_err(|_| anyhow!("Session thread panicked"))??;

    Ok(match exit {
        StartExit::Finished | StartExit::Declined => 0,
        StartExit::StartFailed => 1,
    })
}

/// Start, control and finalize one recording. Runs off the main thread.
/// `display` carries session events for the fixed-length timer line.
fn drive_session(
    controller: &SessionController,
    recording: &RecordingConfig,
    display: Option<Receiver<SessionEvent>>,
) -> Result<StartExit> {
    let output_path = match controller.start(recording) {
        Ok(StartOutcome::Started { output_path }) => output_path,
        Ok(StartOutcome::Declined) => {
            println!("Recording cancelled");
            return Ok(StartExit::Declined);
        }
        Err(SessionError::CaptureStartFailed) => {
            eprintln!("Failed to start capture, see the log for details");
            return Ok(StartExit::StartFailed);
        }
        Err(e) => return Err(e.into()),
    };

    println!("Recording to {}", output_path.display());

    let control = match &display {
        Some(events) => console::run_fixed_length(
            Duration::from_secs(recording.duration_secs),
            events,
            recording.countdown_secs > 0,
            &mut std::io::stdout(),
        ),
        None => {
            let mut keys = console::stdin_key_source();
            console::run_interactive(controller, keys.as_mut(), &mut std::io::stdout())
        }
    };

    println!("Finishing recording...");
    controller.stop()?;
    control?;
    println!("Saved {}", output_path.display());

    Ok(StartExit::Finished)
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::Countdown(remaining) => println!("Starting in {}...", remaining),
        SessionEvent::CountdownElapsed => println!("Recording"),
        SessionEvent::StateChanged(SessionState::Paused) => println!("Paused"),
        _ => {}
    }
}

fn run_shot(
    config: &Config,
    services: CaptureServices,
    runtime: &Runtime,
    args: ShotArgs,
) -> Result<i32> {
    let path = args.file.unwrap_or_else(|| {
        let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
        config.output_directory().join(format!("{}.png", stamp))
    });

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    let controller = SessionController::new(services, Dispatcher::detached(), runtime.handle());

    if controller.take_screenshot(args.source.as_deref(), args.cursor, &path)? {
        println!("Saved {}", path.display());
        Ok(0)
    } else {
        eprintln!("Screenshot failed, see the log for details");
        Ok(1)
    }
}

fn print_listing(services: &CaptureServices) {
    println!("Sources:");
    for provider in &services.source_providers {
        println!("  {:<8} {}", provider.name(), provider.selector_hint());
    }

    println!();
    println!("Encoders:");
    for provider in &services.writer_providers {
        let kind = provider.kind();
        let suffix = if provider.is_available() {
            ""
        } else {
            " (unavailable)"
        };
        println!("  {}{}", kind, suffix);
        for (index, writer) in provider.writers().iter().enumerate() {
            let selector = match kind {
                capture::WriterKind::Gif => kind.selector().to_string(),
                _ => format!("{}:{}", kind.selector(), index),
            };
            println!("    {:<10} {} (.{})", selector, writer.name, writer.extension);
        }
    }

    let devices = &services.devices;
    print_devices("Microphones (--mic)", &devices.microphones());
    print_devices("Speakers (--speaker)", &devices.speakers());
    // Entry 0 is "no webcam", selected with -1
    print_devices(
        "Webcams (--webcam)",
        devices.webcams().get(1..).unwrap_or_default(),
    );
}

fn print_devices(title: &str, names: &[String]) {
    println!();
    println!("{}:", title);
    if names.is_empty() {
        println!("  none configured");
    }
    for (index, name) in names.iter().enumerate() {
        println!("  {:>2}  {}", index, name);
    }
}
