//! Capture collaborators
//!
//! The session controller never touches capture internals. It talks to the
//! traits in this module, which are implemented here on top of an `ffmpeg`
//! child process:
//! - [`CapturePipeline`]: start/pause/resume/stop a recording, take screenshots
//! - [`VideoSourceProvider`]: turn a selector string into a [`VideoSource`]
//! - [`VideoWriterProvider`]: list the writers of one encoder family
//! - [`DeviceList`]: audio devices and webcams
//! - [`WindowCapture`]: window screenshots by native handle
//! - [`OverwritePrompt`]: ask before replacing an existing output file

mod devices;
mod recording;
mod sources;
mod writers;

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use devices::ConfiguredDevices;
pub use recording::{locate_ffmpeg, FfmpegPipeline, FfmpegWindowCapture};
pub use sources::{
    parse_window_selector, RegionSourceProvider, ScreenSourceProvider, WindowSourceProvider,
};
pub use writers::{
    parse_encoder_selector, AviWriterProvider, FfmpegWriterProvider, GifWriterProvider,
    VideoWriter, WriterKind,
};

/// What to capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// A whole display, by index
    Screen { display: u32 },
    /// A fixed rectangle in desktop coordinates
    Region {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    /// A single window, by native handle
    Window { handle: u64 },
}

impl Default for VideoSource {
    fn default() -> Self {
        VideoSource::Screen { display: 0 }
    }
}

/// Fully resolved description of one recording, handed to the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePlan {
    pub source: VideoSource,
    pub writer: VideoWriter,
    pub output_path: PathBuf,
    pub frame_rate: u32,
    /// 1..=100
    pub video_quality: u32,
    /// 1..=100
    pub audio_quality: u32,
    pub microphone: Option<String>,
    pub speaker: Option<String>,
    pub webcam: Option<String>,
    pub include_cursor: bool,
    pub show_keystrokes: bool,
    pub show_clicks: bool,
}

/// Video/audio capture and encoding
pub trait CapturePipeline: Send + Sync {
    /// Begin capturing. Returns false if capture could not be started.
    fn start_capture(&self, plan: &CapturePlan) -> bool;

    fn pause_capture(&self);

    fn resume_capture(&self);

    /// Stop capturing and finalize the output. Blocks until the file is
    /// complete, however long that takes.
    fn stop_capture(&self) -> Result<()>;

    fn take_screenshot(&self, source: &VideoSource, include_cursor: bool, path: &Path)
        -> Result<()>;
}

/// Recognizes selector strings for one kind of video source
pub trait VideoSourceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Selector syntax, for listings
    fn selector_hint(&self) -> &'static str;

    /// Claim the selector if this provider understands it
    fn parse_selector(&self, text: &str) -> Option<VideoSource>;
}

/// Writers of one encoder family
pub trait VideoWriterProvider: Send + Sync {
    fn kind(&self) -> WriterKind;

    fn is_available(&self) -> bool;

    fn writers(&self) -> Vec<VideoWriter>;
}

/// Audio devices and webcams that can be selected by index
pub trait DeviceList: Send + Sync {
    fn microphones(&self) -> Vec<String>;

    fn speakers(&self) -> Vec<String>;

    /// Index 0 is always the "no webcam" entry
    fn webcams(&self) -> Vec<String>;
}

pub trait WindowCapture: Send + Sync {
    fn screenshot_window(&self, handle: u64, include_cursor: bool, path: &Path) -> Result<()>;
}

pub trait OverwritePrompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

/// Everything the session controller needs from the outside world
#[derive(Clone)]
pub struct CaptureServices {
    pub pipeline: Arc<dyn CapturePipeline>,
    /// Queried in order, first match wins
    pub source_providers: Vec<Arc<dyn VideoSourceProvider>>,
    pub writer_providers: Vec<Arc<dyn VideoWriterProvider>>,
    pub devices: Arc<dyn DeviceList>,
    pub window_capture: Arc<dyn WindowCapture>,
    pub prompt: Arc<dyn OverwritePrompt>,
}

impl CaptureServices {
    pub fn writer_provider(&self, kind: WriterKind) -> Option<&Arc<dyn VideoWriterProvider>> {
        self.writer_providers.iter().find(|p| p.kind() == kind)
    }
}
