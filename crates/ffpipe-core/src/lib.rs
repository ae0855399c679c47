//! ffpipe-core: shared error, configuration, and media format types.
//!
//! This crate is the foundational dependency for the other ffpipe crates,
//! providing the unified error type, the explicit execution configuration,
//! and the raw media format descriptors negotiated with ffmpeg.

pub mod config;
pub mod error;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use config::FfmpegConfig;
pub use error::{Error, Failure, Result};
pub use media::{AudioFormat, VideoFormat};
