//! Recording through an `ffmpeg` child process
//!
//! A recording is one long-running ffmpeg process. Stopping sends `q` on its
//! stdin so ffmpeg flushes and finalizes the container; this can take a while
//! for large files and is awaited without a timeout. Pausing suspends the
//! process (SIGSTOP/SIGCONT), which is only available on unix.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::writers::WriterKind;
use super::{CapturePipeline, CapturePlan, VideoSource, VideoWriter, WindowCapture};
use crate::lock;

/// How long ffmpeg must survive after spawning to count as started
const STARTUP_GRACE: Duration = Duration::from_millis(500);

#[cfg(windows)]
const FFMPEG_EXE: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_EXE: &str = "ffmpeg";

/// Recording state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingState {
    #[default]
    Stopped,
    Recording,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Platform {
    Linux,
    Windows,
    MacOs,
}

impl Platform {
    fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }
}

/// Find the ffmpeg binary: the configured path if it exists, else `PATH`
pub fn locate_ffmpeg(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        warn!("Configured ffmpeg path {:?} does not exist, searching PATH", path);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(FFMPEG_EXE))
        .find(|candidate| candidate.is_file())
}

fn x11_display() -> String {
    std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string())
}

/// X11 input naming screen `screen` of `display`, e.g. `:0.1`. Screen 0 keeps
/// `display` as given.
fn x11_screen(display: &str, screen: u32) -> String {
    if screen == 0 {
        return display.to_string();
    }

    // Drop a screen suffix already present in `$DISPLAY`
    let base = display
        .rfind(':')
        .and_then(|colon| display[colon..].find('.').map(|dot| &display[..colon + dot]))
        .unwrap_or(display);
    format!("{}.{}", base, screen)
}

struct InputArgs {
    args: Vec<String>,
    video_filter: Option<String>,
}

fn video_input_args(
    source: &VideoSource,
    frame_rate: u32,
    include_cursor: bool,
    platform: Platform,
    display: &str,
) -> Result<InputArgs> {
    let cursor = if include_cursor { "1" } else { "0" };
    let mut video_filter = None;

    let mut args: Vec<String> = match platform {
        Platform::Linux => vec!["-f".into(), "x11grab".into(), "-draw_mouse".into(), cursor.into()],
        Platform::Windows => {
            vec!["-f".into(), "gdigrab".into(), "-draw_mouse".into(), cursor.into()]
        }
        Platform::MacOs => vec![
            "-f".into(),
            "avfoundation".into(),
            "-capture_cursor".into(),
            cursor.into(),
        ],
    };
    args.extend(["-framerate".to_string(), frame_rate.to_string()]);

    match (platform, source) {
        (Platform::Linux, VideoSource::Screen { display: screen }) => {
            args.extend(["-i".into(), x11_screen(display, *screen)]);
        }
        (Platform::Linux, VideoSource::Region { x, y, width, height }) => {
            args.extend([
                "-video_size".into(),
                format!("{}x{}", width, height),
                "-i".into(),
                format!("{}+{},{}", display, x, y),
            ]);
        }
        (Platform::Linux, VideoSource::Window { handle }) => {
            args.extend([
                "-window_id".into(),
                format!("0x{:x}", handle),
                "-i".into(),
                display.to_string(),
            ]);
        }
        (Platform::Windows, VideoSource::Screen { .. }) => {
            args.extend(["-i".into(), "desktop".into()]);
        }
        (Platform::Windows, VideoSource::Region { x, y, width, height }) => {
            args.extend([
                "-offset_x".into(),
                x.to_string(),
                "-offset_y".into(),
                y.to_string(),
                "-video_size".into(),
                format!("{}x{}", width, height),
                "-i".into(),
                "desktop".into(),
            ]);
        }
        (Platform::Windows, VideoSource::Window { handle }) => {
            args.extend(["-i".into(), format!("hwnd={}", handle)]);
        }
        (Platform::MacOs, VideoSource::Screen { display }) => {
            args.extend(["-i".into(), format!("Capture screen {}:none", display)]);
        }
        (Platform::MacOs, VideoSource::Region { x, y, width, height }) => {
            args.extend(["-i".into(), "Capture screen 0:none".into()]);
            video_filter = Some(format!("crop={}:{}:{}:{}", width, height, x, y));
        }
        (Platform::MacOs, VideoSource::Window { .. }) => {
            bail!("Window capture is not supported by the avfoundation input");
        }
    }

    Ok(InputArgs { args, video_filter })
}

fn audio_input_args(device: &str, platform: Platform) -> Vec<String> {
    match platform {
        Platform::Linux => vec!["-f".into(), "pulse".into(), "-i".into(), device.into()],
        Platform::Windows => vec![
            "-f".into(),
            "dshow".into(),
            "-i".into(),
            format!("audio={}", device),
        ],
        Platform::MacOs => vec![
            "-f".into(),
            "avfoundation".into(),
            "-i".into(),
            format!(":{}", device),
        ],
    }
}

/// Map 1..=100 quality onto an encoder scale where `best` is highest quality
fn quality_scale(quality: u32, best: u32, worst: u32) -> u32 {
    let quality = quality.clamp(1, 100);
    best + (100 - quality) * (worst - best) / 100
}

fn video_codec_args(writer: &VideoWriter, quality: u32) -> Vec<String> {
    match writer.codec {
        "libx264" | "libx265" => vec![
            "-c:v".into(),
            writer.codec.into(),
            "-preset".into(),
            "ultrafast".into(),
            "-crf".into(),
            quality_scale(quality, 0, 51).to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ],
        "libvpx-vp9" => vec![
            "-c:v".into(),
            "libvpx-vp9".into(),
            "-deadline".into(),
            "realtime".into(),
            "-b:v".into(),
            "0".into(),
            "-crf".into(),
            quality_scale(quality, 0, 63).to_string(),
        ],
        "h264_nvenc" => vec![
            "-c:v".into(),
            "h264_nvenc".into(),
            "-cq".into(),
            quality_scale(quality, 0, 51).to_string(),
            "-pix_fmt".into(),
            "yuv420p".into(),
        ],
        "mjpeg" => vec![
            "-c:v".into(),
            "mjpeg".into(),
            "-q:v".into(),
            quality_scale(quality, 2, 31).to_string(),
        ],
        codec => vec!["-c:v".into(), codec.into()],
    }
}

fn audio_codec_args(writer: &VideoWriter, quality: u32) -> Vec<String> {
    let bitrate = format!("{}k", 32 + quality.clamp(1, 100) * 288 / 100);
    match writer.extension {
        "webm" => vec!["-c:a".into(), "libopus".into(), "-b:a".into(), bitrate],
        "avi" => vec!["-c:a".into(), "pcm_s16le".into()],
        _ => vec!["-c:a".into(), "aac".into(), "-b:a".into(), bitrate],
    }
}

/// Full ffmpeg command line for a recording
fn recording_args(plan: &CapturePlan, platform: Platform, display: &str) -> Result<Vec<String>> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning", "-y"]
        .into_iter()
        .map(String::from)
        .collect();

    let input = video_input_args(
        &plan.source,
        plan.frame_rate,
        plan.include_cursor,
        platform,
        display,
    )?;
    args.extend(input.args);

    let audio_devices: Vec<&str> = if plan.writer.kind == WriterKind::Gif {
        Vec::new()
    } else {
        [plan.microphone.as_deref(), plan.speaker.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    };
    for device in &audio_devices {
        args.extend(audio_input_args(device, platform));
    }

    let mut filters: Vec<String> = input.video_filter.into_iter().collect();
    if plan.writer.kind != WriterKind::Gif {
        // yuv420p needs even dimensions
        filters.push("pad=ceil(iw/2)*2:ceil(ih/2)*2".to_string());
    }
    if !filters.is_empty() {
        args.extend(["-vf".to_string(), filters.join(",")]);
    }

    match audio_devices.len() {
        0 => args.push("-an".into()),
        1 => args.extend(["-map".into(), "0:v".into(), "-map".into(), "1:a".into()]),
        _ => args.extend([
            "-filter_complex".into(),
            "[1:a][2:a]amix=inputs=2[aout]".into(),
            "-map".into(),
            "0:v".into(),
            "-map".into(),
            "[aout]".into(),
        ]),
    }

    args.extend(video_codec_args(&plan.writer, plan.video_quality));
    if !audio_devices.is_empty() {
        args.extend(audio_codec_args(&plan.writer, plan.audio_quality));
    }

    args.push(plan.output_path.to_string_lossy().into_owned());
    Ok(args)
}

/// ffmpeg command line for a single-frame grab
fn screenshot_args(
    source: &VideoSource,
    include_cursor: bool,
    path: &Path,
    platform: Platform,
    display: &str,
) -> Result<Vec<String>> {
    let input = video_input_args(source, 1, include_cursor, platform, display)?;

    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
        .into_iter()
        .map(String::from)
        .collect();
    args.extend(input.args);
    if let Some(filter) = input.video_filter {
        args.extend(["-vf".to_string(), filter]);
    }
    args.extend(["-frames:v".to_string(), "1".to_string()]);
    args.push(path.to_string_lossy().into_owned());
    Ok(args)
}

fn grab_frame(ffmpeg: &Path, args: &[String]) -> Result<()> {
    debug!("Grabbing frame: {:?} {:?}", ffmpeg, args);
    let output = Command::new(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run {:?}", ffmpeg))?;

    if !output.status.success() {
        bail!(
            "ffmpeg screenshot failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(unix)]
fn send_signal(child: &Child, signal: libc::c_int) -> Result<()> {
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, signal) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error()).context("Failed to signal ffmpeg");
    }
    Ok(())
}

#[cfg(unix)]
fn suspend(child: &Child) -> Result<()> {
    send_signal(child, libc::SIGSTOP)
}

#[cfg(unix)]
fn continue_process(child: &Child) -> Result<()> {
    send_signal(child, libc::SIGCONT)
}

#[cfg(not(unix))]
fn suspend(_child: &Child) -> Result<()> {
    bail!("Pausing a recording is not supported on this platform")
}

#[cfg(not(unix))]
fn continue_process(_child: &Child) -> Result<()> {
    bail!("Pausing a recording is not supported on this platform")
}

/// A running ffmpeg recording
struct FfmpegProcess {
    child: Child,
    state: RecordingState,
    output_path: PathBuf,
}

/// Capture pipeline driving one ffmpeg process per recording
pub struct FfmpegPipeline {
    ffmpeg: Option<PathBuf>,
    process: Mutex<Option<FfmpegProcess>>,
}

impl FfmpegPipeline {
    pub fn new(ffmpeg: Option<PathBuf>) -> Self {
        Self {
            ffmpeg,
            process: Mutex::new(None),
        }
    }

    fn binary(&self) -> Result<&Path> {
        self.ffmpeg
            .as_deref()
            .context("ffmpeg was not found; set `path` in the [ffmpeg] settings section")
    }

    /// Get current recording state
    #[cfg(test)]
    pub fn state(&self) -> RecordingState {
        lock(&self.process)
            .as_ref()
            .map(|p| p.state)
            .unwrap_or_default()
    }

    fn spawn_recording(&self, plan: &CapturePlan) -> Result<FfmpegProcess> {
        let ffmpeg = self.binary()?;
        let args = recording_args(plan, Platform::current(), &x11_display())?;

        if plan.show_keystrokes || plan.show_clicks {
            warn!("Keystroke and click overlays are not rendered by the ffmpeg backend");
        }
        if let Some(webcam) = &plan.webcam {
            warn!("Webcam overlay ({}) is not rendered by the ffmpeg backend", webcam);
        }

        info!(
            "Starting recording to {:?} (writer: {}, {} fps)",
            plan.output_path, plan.writer.name, plan.frame_rate
        );
        debug!("ffmpeg arguments: {:?}", args);

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {:?}", ffmpeg))?;

        // Drain stderr so ffmpeg never blocks on a full pipe
        if let Some(stderr) = child.stderr.take() {
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!("ffmpeg: {}", line);
                }
            });
        }

        std::thread::sleep(STARTUP_GRACE);
        if let Some(status) = child.try_wait().context("Failed to poll ffmpeg")? {
            bail!("ffmpeg exited during startup ({})", status);
        }

        Ok(FfmpegProcess {
            child,
            state: RecordingState::Recording,
            output_path: plan.output_path.clone(),
        })
    }
}

impl CapturePipeline for FfmpegPipeline {
    fn start_capture(&self, plan: &CapturePlan) -> bool {
        let mut process = lock(&self.process);
        if process.is_some() {
            debug!("Recording already started");
            return true;
        }

        match self.spawn_recording(plan) {
            Ok(started) => {
                *process = Some(started);
                true
            }
            Err(e) => {
                error!("Failed to start recording: {:#}", e);
                false
            }
        }
    }

    fn pause_capture(&self) {
        let mut process = lock(&self.process);
        let Some(process) = process.as_mut() else {
            debug!("Cannot pause - not recording");
            return;
        };
        if process.state != RecordingState::Recording {
            debug!("Cannot pause - not recording");
            return;
        }

        info!("Pausing recording");
        match suspend(&process.child) {
            Ok(()) => process.state = RecordingState::Paused,
            Err(e) => warn!("{:#}", e),
        }
    }

    fn resume_capture(&self) {
        let mut process = lock(&self.process);
        let Some(process) = process.as_mut() else {
            debug!("Cannot resume - not paused");
            return;
        };
        if process.state != RecordingState::Paused {
            debug!("Cannot resume - not paused");
            return;
        }

        info!("Resuming recording");
        match continue_process(&process.child) {
            Ok(()) => process.state = RecordingState::Recording,
            Err(e) => warn!("{:#}", e),
        }
    }

    fn stop_capture(&self) -> Result<()> {
        let Some(mut process) = lock(&self.process).take() else {
            debug!("Recording already stopped");
            return Ok(());
        };

        info!("Stopping recording");
        if process.state == RecordingState::Paused {
            continue_process(&process.child)?;
        }

        if let Some(mut stdin) = process.child.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").and_then(|_| stdin.flush()) {
                warn!("Failed to ask ffmpeg to quit: {}", e);
            }
        }

        let status = process
            .child
            .wait()
            .context("Failed to wait for ffmpeg to finalize")?;
        if status.success() {
            info!("Recording saved to {:?}", process.output_path);
        } else {
            warn!(
                "ffmpeg exited with {} while finalizing {:?}",
                status, process.output_path
            );
        }
        Ok(())
    }

    fn take_screenshot(
        &self,
        source: &VideoSource,
        include_cursor: bool,
        path: &Path,
    ) -> Result<()> {
        let args = screenshot_args(
            source,
            include_cursor,
            path,
            Platform::current(),
            &x11_display(),
        )?;
        grab_frame(self.binary()?, &args)?;
        info!("Screenshot saved to {:?}", path);
        Ok(())
    }
}

/// Window screenshots through ffmpeg's window-aware grabbers
pub struct FfmpegWindowCapture {
    ffmpeg: Option<PathBuf>,
}

impl FfmpegWindowCapture {
    pub fn new(ffmpeg: Option<PathBuf>) -> Self {
        Self { ffmpeg }
    }
}

impl WindowCapture for FfmpegWindowCapture {
    fn screenshot_window(&self, handle: u64, include_cursor: bool, path: &Path) -> Result<()> {
        let ffmpeg = self.ffmpeg.as_deref().context("ffmpeg was not found")?;
        let args = screenshot_args(
            &VideoSource::Window { handle },
            include_cursor,
            path,
            Platform::current(),
            &x11_display(),
        )?;
        grab_frame(ffmpeg, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{GifWriterProvider, VideoWriterProvider};

    fn plan(writer: VideoWriter) -> CapturePlan {
        CapturePlan {
            source: VideoSource::Region {
                x: 10,
                y: 20,
                width: 640,
                height: 480,
            },
            writer,
            output_path: PathBuf::from("/tmp/out.mp4"),
            frame_rate: 30,
            video_quality: 70,
            audio_quality: 50,
            microphone: None,
            speaker: None,
            webcam: None,
            include_cursor: true,
            show_keystrokes: false,
            show_clicks: false,
        }
    }

    fn window(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn test_quality_scale() {
        assert_eq!(quality_scale(100, 0, 51), 0);
        assert_eq!(quality_scale(1, 0, 51), 50);
        assert_eq!(quality_scale(0, 2, 31), quality_scale(1, 2, 31));
        assert_eq!(quality_scale(50, 2, 31), 16);
    }

    #[test]
    fn test_linux_region_recording_args() {
        let args = recording_args(&plan(VideoWriter::default()), Platform::Linux, ":1").unwrap();

        assert_eq!(window(&args, "-f").as_deref(), Some("x11grab"));
        assert_eq!(window(&args, "-video_size").as_deref(), Some("640x480"));
        assert_eq!(window(&args, "-i").as_deref(), Some(":1+10,20"));
        assert_eq!(window(&args, "-c:v").as_deref(), Some("libx264"));
        assert_eq!(window(&args, "-crf").as_deref(), Some("15"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_linux_screen_index_selects_x11_screen() {
        let screen = |index: u32, display: &str| {
            let source = VideoSource::Screen { display: index };
            let input = video_input_args(&source, 30, false, Platform::Linux, display).unwrap();
            window(&input.args, "-i")
        };

        assert_eq!(screen(0, ":0").as_deref(), Some(":0"));
        assert_eq!(screen(1, ":0").as_deref(), Some(":0.1"));
        assert_eq!(screen(2, ":1.0").as_deref(), Some(":1.2"));
        assert_eq!(screen(1, "host.example:0").as_deref(), Some("host.example:0.1"));
    }

    #[test]
    fn test_two_audio_devices_are_mixed() {
        let mut plan = plan(VideoWriter::default());
        plan.microphone = Some("mic".into());
        plan.speaker = Some("monitor".into());

        let args = recording_args(&plan, Platform::Linux, ":0").unwrap();

        assert_eq!(args.iter().filter(|a| *a == "pulse").count(), 2);
        assert_eq!(
            window(&args, "-filter_complex").as_deref(),
            Some("[1:a][2:a]amix=inputs=2[aout]")
        );
        assert_eq!(window(&args, "-c:a").as_deref(), Some("aac"));
        assert_eq!(window(&args, "-b:a").as_deref(), Some("176k"));
    }

    #[test]
    fn test_gif_ignores_audio() {
        let writer = GifWriterProvider.writers()[0];
        let mut plan = plan(writer);
        plan.microphone = Some("mic".into());

        let args = recording_args(&plan, Platform::Windows, ":0").unwrap();

        assert_eq!(window(&args, "-f").as_deref(), Some("gdigrab"));
        assert_eq!(window(&args, "-offset_x").as_deref(), Some("10"));
        assert!(!args.contains(&"dshow".to_string()));
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_macos_window_capture_unsupported() {
        let result = screenshot_args(
            &VideoSource::Window { handle: 5 },
            false,
            Path::new("/tmp/shot.png"),
            Platform::MacOs,
            ":0",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_window_screenshot_args() {
        let args = screenshot_args(
            &VideoSource::Window { handle: 255 },
            false,
            Path::new("/tmp/shot.png"),
            Platform::Linux,
            ":0",
        )
        .unwrap();

        assert_eq!(window(&args, "-window_id").as_deref(), Some("0xff"));
        assert_eq!(window(&args, "-draw_mouse").as_deref(), Some("0"));
        assert_eq!(window(&args, "-frames:v").as_deref(), Some("1"));
    }

    #[test]
    fn test_missing_ffmpeg_fails_start() {
        let pipeline = FfmpegPipeline::new(None);
        assert!(!pipeline.start_capture(&plan(VideoWriter::default())));
        assert_eq!(pipeline.state(), RecordingState::Stopped);
        assert!(pipeline.stop_capture().is_ok());
    }
}
