//! Command line

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::RecordingOverrides;

#[derive(Debug, Parser)]
#[command(name = "screenreel")]
#[command(about = "Record the screen, a region or a window with ffmpeg", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a recording
    Start(StartArgs),
    /// Take a screenshot
    Shot(ShotArgs),
    /// List sources, writers and devices
    List,
}

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Wait this many milliseconds before capture starts
    #[arg(long, value_name = "MS")]
    pub delay: Option<u64>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub length: Option<u64>,

    /// Pre-roll countdown in seconds
    #[arg(long, value_name = "SECONDS")]
    pub countdown: Option<u32>,

    /// Show keystrokes
    #[arg(long)]
    pub keys: bool,

    /// Show mouse clicks
    #[arg(long)]
    pub clicks: bool,

    /// Include the mouse cursor
    #[arg(long)]
    pub cursor: bool,

    /// Leave the mouse cursor out, even if the settings file includes it
    #[arg(long, conflicts_with = "cursor")]
    pub no_cursor: bool,

    /// Microphone index (-1 = none)
    #[arg(long, value_name = "INDEX", allow_hyphen_values = true)]
    pub mic: Option<i32>,

    /// Speaker index (-1 = none)
    #[arg(long, value_name = "INDEX", allow_hyphen_values = true)]
    pub speaker: Option<i32>,

    /// Webcam index (-1 = none)
    #[arg(long, value_name = "INDEX", allow_hyphen_values = true)]
    pub webcam: Option<i32>,

    #[arg(short = 'r', long, value_name = "FPS")]
    pub framerate: Option<u32>,

    /// Encoder: ffmpeg:<n>, avi:<n> or gif
    #[arg(long)]
    pub encoder: Option<String>,

    /// Video quality, 1-100
    #[arg(long, value_name = "QUALITY")]
    pub vq: Option<u32>,

    /// Audio quality, 1-100
    #[arg(long, value_name = "QUALITY")]
    pub aq: Option<u32>,

    /// Source: desktop, screen:<n>, x,y,w,h or win:<handle>
    #[arg(long)]
    pub source: Option<String>,

    /// Output file
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Overwrite the output file without asking
    #[arg(short = 'y', long)]
    pub overwrite: bool,
}

impl StartArgs {
    /// Flags only override the settings file when given
    pub fn into_overrides(self) -> RecordingOverrides {
        RecordingOverrides {
            frame_rate: self.framerate,
            video_quality: self.vq,
            audio_quality: self.aq,
            source: self.source,
            encoder: self.encoder,
            microphone: self.mic,
            speaker: self.speaker,
            webcam: self.webcam,
            include_cursor: match (self.cursor, self.no_cursor) {
                (true, _) => Some(true),
                (false, true) => Some(false),
                (false, false) => None,
            },
            show_keystrokes: self.keys.then_some(true),
            show_clicks: self.clicks.then_some(true),
            output_path: self.file,
            overwrite: self.overwrite,
            duration_secs: self.length,
            start_delay_ms: self.delay,
            countdown_secs: self.countdown,
        }
    }
}

#[derive(Debug, Args)]
pub struct ShotArgs {
    /// Source: desktop, screen:<n>, x,y,w,h or win:<handle>
    #[arg(long)]
    pub source: Option<String>,

    /// Output file (default: timestamped PNG in the output directory)
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Include the mouse cursor
    #[arg(long)]
    pub cursor: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("screenreel").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_start_flags() {
        let cli = parse(&[
            "start", "--length", "10", "--mic", "-1", "--webcam", "0", "-r", "60", "--encoder",
            "ffmpeg:2", "-f", "out.mp4", "-y", "--keys",
        ]);

        let Command::Start(args) = cli.command else {
            panic!("expected start");
        };
        let overrides = args.into_overrides();

        assert_eq!(overrides.duration_secs, Some(10));
        assert_eq!(overrides.microphone, Some(-1));
        assert_eq!(overrides.webcam, Some(0));
        assert_eq!(overrides.frame_rate, Some(60));
        assert_eq!(overrides.encoder.as_deref(), Some("ffmpeg:2"));
        assert_eq!(overrides.output_path, Some(PathBuf::from("out.mp4")));
        assert!(overrides.overwrite);
        assert_eq!(overrides.show_keystrokes, Some(true));
        assert_eq!(overrides.show_clicks, None);
        assert_eq!(overrides.include_cursor, None);
    }

    #[test]
    fn test_cursor_flags() {
        let cursor = |args: &[&str]| {
            let Command::Start(args) = parse(args).command else {
                panic!("expected start");
            };
            args.into_overrides().include_cursor
        };

        assert_eq!(cursor(&["start", "--cursor"]), Some(true));
        assert_eq!(cursor(&["start", "--no-cursor"]), Some(false));
        assert_eq!(cursor(&["start"]), None);
        assert!(Cli::try_parse_from(["screenreel", "start", "--cursor", "--no-cursor"]).is_err());
    }

    #[test]
    fn test_shot_window_source() {
        let cli = parse(&["shot", "--source", "win:1234", "--cursor"]);

        let Command::Shot(args) = cli.command else {
            panic!("expected shot");
        };
        assert_eq!(args.source.as_deref(), Some("win:1234"));
        assert!(args.cursor);
        assert!(args.file.is_none());
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Cli::try_parse_from(["screenreel", "start", "--bogus"]).is_err());
    }
}
