use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use ffpipe_core::Result;

use super::{format_tokens, PipeReader, PipeSink};
use crate::pipe::{copy_blocks, DEFAULT_BLOCK_SIZE};

/// Copies everything ffmpeg writes into `W`.
///
/// Any async writer works: a file, stdout, or `&mut Vec<u8>` to collect the
/// output in memory.
pub struct StreamPipeSink<W> {
    writer: W,
    format: Option<String>,
    block_size: usize,
}

impl<W> StreamPipeSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            format: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Output container format (`-f <format>`). ffmpeg cannot infer one from
    /// a pipe address, so most outputs need this.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> PipeSink for StreamPipeSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn format_args(&self) -> Vec<String> {
        format_tokens(self.format.as_deref())
    }

    async fn read_from(&mut self, mut reader: PipeReader, cancel: &CancellationToken) -> Result<()> {
        let copied = copy_blocks(&mut reader, &mut self.writer, self.block_size, cancel).await?;
        tracing::debug!(bytes = copied, "Stream sink filled");
        Ok(())
    }
}
