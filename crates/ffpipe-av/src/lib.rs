//! ffpipe-av: drive ffmpeg through OS pipes.
//!
//! Inputs and outputs are streamed through named pipes (Unix-domain sockets
//! on POSIX, `\\.\pipe\` on Windows) instead of temporary files:
//!
//! - [`pipe`] - pipe addressing, server endpoints, the block copy loop
//! - [`source`] / [`sink`] - producers and consumers of pipe data
//! - [`argument`] - command-line assembly and the pipe argument lifecycle
//! - [`command`] - the execution driver
//! - [`progress`] - diagnostic line handling and progress extraction
//! - [`tools`] - discovery of the ffmpeg executables

#[cfg(not(any(unix, windows)))]
compile_error!("ffpipe-av supports Unix and Windows targets only");

pub mod argument;
pub mod command;
pub mod outcome;
pub mod pipe;
pub mod progress;
pub mod sink;
pub mod source;
pub mod tools;

pub use argument::{Arguments, InputPipe, OutputPipe, PipeArgument};
pub use command::FfmpegCommand;
pub use outcome::Outcome;
pub use pipe::{PipeAddress, PipeEndpoint, StreamDirection};
pub use progress::ProgressSample;
pub use sink::{FnPipeSink, PipeReader, PipeSink, StreamPipeSink};
pub use source::{
    AudioSample, PipeSource, RawAudioPipeSource, RawAudioSamples, RawVideoFrame,
    RawVideoPipeSource, StreamPipeSource, VideoFrame,
};
pub use tools::{ToolInfo, ToolRegistry};
