//! Raw media format descriptors.
//!
//! These are the formats negotiated with ffmpeg on the command line before a
//! structured pipe source starts streaming. Both implement `Display` in the
//! same shape that appears in format-mismatch errors.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// VideoFormat
// ---------------------------------------------------------------------------

/// Geometry and pixel layout of a raw video frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// ffmpeg pixel format name, e.g. `rgb24`, `bgra`, `yuv420p`.
    pub pixel_format: String,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, pixel_format: impl Into<String>) -> Self {
        Self {
            width,
            height,
            pixel_format: pixel_format.into(),
        }
    }

    /// The `WxH` size string ffmpeg expects after `-s`.
    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.pixel_format)
    }
}

// ---------------------------------------------------------------------------
// AudioFormat
// ---------------------------------------------------------------------------

/// Sample layout of a block of raw PCM audio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// ffmpeg raw sample format (and demuxer) name, e.g. `s16le`, `f32le`.
    pub sample_format: String,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn new(sample_format: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_format: sample_format.into(),
            sample_rate,
            channels,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new("s16le", 8000, 1)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}Hz {}ch",
            self.sample_format, self.sample_rate, self.channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_format_display() {
        let fmt = VideoFormat::new(256, 256, "rgb24");
        assert_eq!(fmt.to_string(), "256x256 rgb24");
        assert_eq!(fmt.size(), "256x256");
    }

    #[test]
    fn video_format_equality_is_exact() {
        let a = VideoFormat::new(256, 256, "rgb24");
        assert_eq!(a, VideoFormat::new(256, 256, "rgb24"));
        assert_ne!(a, VideoFormat::new(320, 256, "rgb24"));
        assert_ne!(a, VideoFormat::new(256, 256, "bgr24"));
    }

    #[test]
    fn audio_format_default() {
        let fmt = AudioFormat::default();
        assert_eq!(fmt.to_string(), "s16le 8000Hz 1ch");
    }
}
