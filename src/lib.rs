//! ffpipe - drive ffmpeg through named pipes.
//!
//! This library crate exposes the CLI's configuration loading and command
//! templating for integration testing. The pipe machinery itself lives in
//! `ffpipe-av`.

pub mod config;
pub mod template;
