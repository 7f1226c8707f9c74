//! Video source providers
//!
//! Each provider claims the selector strings for one kind of source:
//! - `desktop`, `screen`, `screen:<index>`: a whole display
//! - `<x>,<y>,<w>,<h>` or `region:<x>,<y>,<w>,<h>`: a rectangle
//! - `win:<handle>`: a single window

use tracing::debug;

use super::{VideoSource, VideoSourceProvider};

/// Parse a string of ASCII digits. Rejects signs and empty input.
fn parse_digits<T: std::str::FromStr>(text: &str) -> Option<T> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Parse a desktop coordinate: digits with an optional leading `-`. Displays
/// left of or above the primary one have negative coordinates.
fn parse_offset(text: &str) -> Option<i32> {
    match text.strip_prefix('-') {
        Some(digits) => parse_digits::<i32>(digits).map(|value| -value),
        None => parse_digits(text),
    }
}

pub struct ScreenSourceProvider;

impl VideoSourceProvider for ScreenSourceProvider {
    fn name(&self) -> &'static str {
        "screen"
    }

    fn selector_hint(&self) -> &'static str {
        "desktop | screen | screen:<index>"
    }

    fn parse_selector(&self, text: &str) -> Option<VideoSource> {
        match text {
            "desktop" | "screen" => Some(VideoSource::Screen { display: 0 }),
            _ => {
                let display = parse_digits(text.strip_prefix("screen:")?)?;
                Some(VideoSource::Screen { display })
            }
        }
    }
}

pub struct RegionSourceProvider;

impl VideoSourceProvider for RegionSourceProvider {
    fn name(&self) -> &'static str {
        "region"
    }

    fn selector_hint(&self) -> &'static str {
        "<x>,<y>,<width>,<height>"
    }

    fn parse_selector(&self, text: &str) -> Option<VideoSource> {
        let rect = text.strip_prefix("region:").unwrap_or(text);
        let parts: Vec<&str> = rect.split(',').collect();
        let [x, y, width, height] = parts.as_slice() else {
            return None;
        };

        let width: u32 = parse_digits(width)?;
        let height: u32 = parse_digits(height)?;
        if width == 0 || height == 0 {
            debug!("Ignoring empty region selector: {}", text);
            return None;
        }

        Some(VideoSource::Region {
            x: parse_offset(x)?,
            y: parse_offset(y)?,
            width,
            height,
        })
    }
}

pub struct WindowSourceProvider;

impl VideoSourceProvider for WindowSourceProvider {
    fn name(&self) -> &'static str {
        "window"
    }

    fn selector_hint(&self) -> &'static str {
        "win:<handle>"
    }

    fn parse_selector(&self, text: &str) -> Option<VideoSource> {
        let handle = parse_window_selector(text)?;
        Some(VideoSource::Window { handle })
    }
}

/// Extract the handle from a `win:<integer-handle>` selector
pub fn parse_window_selector(text: &str) -> Option<u64> {
    parse_digits(text.strip_prefix("win:")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_selectors() {
        let provider = ScreenSourceProvider;
        assert_eq!(
            provider.parse_selector("screen:2"),
            Some(VideoSource::Screen { display: 2 })
        );
        assert_eq!(
            provider.parse_selector("desktop"),
            Some(VideoSource::Screen { display: 0 })
        );
        assert_eq!(provider.parse_selector("screen:"), None);
        assert_eq!(provider.parse_selector("screen:-1"), None);
        assert_eq!(provider.parse_selector("win:12"), None);
    }

    #[test]
    fn test_region_selectors() {
        let provider = RegionSourceProvider;
        let expected = Some(VideoSource::Region {
            x: 10,
            y: 20,
            width: 640,
            height: 480,
        });
        assert_eq!(provider.parse_selector("10,20,640,480"), expected);
        assert_eq!(provider.parse_selector("region:10,20,640,480"), expected);
        assert_eq!(provider.parse_selector("10,20,640"), None);
        assert_eq!(provider.parse_selector("10,20,0,480"), None);
        assert_eq!(provider.parse_selector("a,b,c,d"), None);
    }

    #[test]
    fn test_region_left_of_primary_display() {
        let provider = RegionSourceProvider;
        assert_eq!(
            provider.parse_selector("-1920,0,1920,1080"),
            Some(VideoSource::Region {
                x: -1920,
                y: 0,
                width: 1920,
                height: 1080
            })
        );
        assert_eq!(
            provider.parse_selector("region:0,-1080,800,600"),
            Some(VideoSource::Region {
                x: 0,
                y: -1080,
                width: 800,
                height: 600
            })
        );
        assert_eq!(provider.parse_selector("--5,0,10,10"), None);
        assert_eq!(provider.parse_selector("-,0,10,10"), None);
        assert_eq!(provider.parse_selector("0,0,-10,10"), None);
    }

    #[test]
    fn test_window_selectors() {
        assert_eq!(parse_window_selector("win:1234"), Some(1234));
        assert_eq!(parse_window_selector("win:0x12"), None);
        assert_eq!(parse_window_selector("window:1"), None);
        assert_eq!(
            WindowSourceProvider.parse_selector("win:77"),
            Some(VideoSource::Window { handle: 77 })
        );
    }
}
