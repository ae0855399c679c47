//! Data consumers that drain an output pipe.

mod func;
mod stream;

pub use func::FnPipeSink;
pub use stream::StreamPipeSink;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use ffpipe_core::Result;

/// Readable half handed to a sink once ffmpeg connects.
pub type PipeReader = Box<dyn AsyncRead + Unpin + Send>;

/// Something that can consume the bytes ffmpeg writes to an output pipe.
#[async_trait]
pub trait PipeSink: Send {
    /// Tokens describing the output, emitted before the pipe address.
    fn format_args(&self) -> Vec<String>;

    /// Consume the stream until end of file.
    async fn read_from(&mut self, reader: PipeReader, cancel: &CancellationToken) -> Result<()>;
}

pub(crate) fn format_tokens(format: Option<&str>) -> Vec<String> {
    match format {
        Some(format) => vec!["-f".into(), format.into()],
        None => Vec::new(),
    }
}
