//! Video writer families
//!
//! Selector forms:
//! - `ffmpeg:<index>`: one of the ffmpeg codecs
//! - `avi:<index>`: one of the AVI intermediate codecs
//! - `gif`: animated GIF

use std::fmt;
use std::path::PathBuf;

use super::VideoWriterProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WriterKind {
    #[default]
    Ffmpeg,
    Avi,
    Gif,
}

impl WriterKind {
    /// Selector prefix (or the whole selector for `gif`)
    pub fn selector(&self) -> &'static str {
        match self {
            WriterKind::Ffmpeg => "ffmpeg",
            WriterKind::Avi => "avi",
            WriterKind::Gif => "gif",
        }
    }
}

impl fmt::Display for WriterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

/// One concrete encoder configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoWriter {
    pub kind: WriterKind,
    pub name: &'static str,
    /// ffmpeg video codec
    pub codec: &'static str,
    /// Output file extension
    pub extension: &'static str,
}

const FFMPEG_WRITERS: &[VideoWriter] = &[
    VideoWriter {
        kind: WriterKind::Ffmpeg,
        name: "x264 (mp4)",
        codec: "libx264",
        extension: "mp4",
    },
    VideoWriter {
        kind: WriterKind::Ffmpeg,
        name: "x265 (mp4)",
        codec: "libx265",
        extension: "mp4",
    },
    VideoWriter {
        kind: WriterKind::Ffmpeg,
        name: "VP9 (webm)",
        codec: "libvpx-vp9",
        extension: "webm",
    },
    VideoWriter {
        kind: WriterKind::Ffmpeg,
        name: "NVENC H.264 (mp4)",
        codec: "h264_nvenc",
        extension: "mp4",
    },
];

const AVI_WRITERS: &[VideoWriter] = &[
    VideoWriter {
        kind: WriterKind::Avi,
        name: "Motion JPEG",
        codec: "mjpeg",
        extension: "avi",
    },
    VideoWriter {
        kind: WriterKind::Avi,
        name: "FFV1 (lossless)",
        codec: "ffv1",
        extension: "avi",
    },
];

const GIF_WRITER: VideoWriter = VideoWriter {
    kind: WriterKind::Gif,
    name: "Animated GIF",
    codec: "gif",
    extension: "gif",
};

impl Default for VideoWriter {
    fn default() -> Self {
        FFMPEG_WRITERS[0]
    }
}

/// Parse an encoder selector into a family and an optional writer index.
/// Availability of the family is not checked here.
pub fn parse_encoder_selector(text: &str) -> Option<(WriterKind, Option<usize>)> {
    if text == WriterKind::Gif.selector() {
        return Some((WriterKind::Gif, None));
    }

    let (prefix, index) = text.split_once(':')?;
    let kind = match prefix {
        "ffmpeg" => WriterKind::Ffmpeg,
        "avi" => WriterKind::Avi,
        _ => return None,
    };

    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Digits too large for usize are simply out of range
    Some((kind, Some(index.parse().unwrap_or(usize::MAX))))
}

/// Codecs driven through ffmpeg
pub struct FfmpegWriterProvider {
    ffmpeg: Option<PathBuf>,
}

impl FfmpegWriterProvider {
    pub fn new(ffmpeg: Option<PathBuf>) -> Self {
        Self { ffmpeg }
    }
}

impl VideoWriterProvider for FfmpegWriterProvider {
    fn kind(&self) -> WriterKind {
        WriterKind::Ffmpeg
    }

    fn is_available(&self) -> bool {
        self.ffmpeg.is_some()
    }

    fn writers(&self) -> Vec<VideoWriter> {
        FFMPEG_WRITERS.to_vec()
    }
}

/// Intra-frame AVI codecs, cheap to encode while recording
pub struct AviWriterProvider {
    enabled: bool,
}

impl AviWriterProvider {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl VideoWriterProvider for AviWriterProvider {
    fn kind(&self) -> WriterKind {
        WriterKind::Avi
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    fn writers(&self) -> Vec<VideoWriter> {
        AVI_WRITERS.to_vec()
    }
}

pub struct GifWriterProvider;

impl VideoWriterProvider for GifWriterProvider {
    fn kind(&self) -> WriterKind {
        WriterKind::Gif
    }

    fn is_available(&self) -> bool {
        true
    }

    fn writers(&self) -> Vec<VideoWriter> {
        vec![GIF_WRITER]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoder_selector() {
        assert_eq!(
            parse_encoder_selector("ffmpeg:2"),
            Some((WriterKind::Ffmpeg, Some(2)))
        );
        assert_eq!(
            parse_encoder_selector("avi:0"),
            Some((WriterKind::Avi, Some(0)))
        );
        assert_eq!(parse_encoder_selector("gif"), Some((WriterKind::Gif, None)));
        assert_eq!(parse_encoder_selector("ffmpeg:"), None);
        assert_eq!(parse_encoder_selector("ffmpeg:x"), None);
        assert_eq!(parse_encoder_selector("gif:1"), None);
        assert_eq!(parse_encoder_selector("x264"), None);
    }

    #[test]
    fn test_huge_index_is_out_of_range() {
        assert_eq!(
            parse_encoder_selector("ffmpeg:99999999999999999999999"),
            Some((WriterKind::Ffmpeg, Some(usize::MAX)))
        );
    }

    #[test]
    fn test_availability() {
        assert!(!FfmpegWriterProvider::new(None).is_available());
        assert!(FfmpegWriterProvider::new(Some(PathBuf::from("/usr/bin/ffmpeg"))).is_available());
        assert!(!AviWriterProvider::new(false).is_available());
        assert!(GifWriterProvider.is_available());
    }
}
