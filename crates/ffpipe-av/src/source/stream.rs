use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use ffpipe_core::Result;

use super::{PipeSource, PipeWriter};
use crate::pipe::{copy_blocks, DEFAULT_BLOCK_SIZE};

/// Feeds an arbitrary byte stream (file, stdin, in-memory buffer) into a pipe.
///
/// ffmpeg probes the container itself unless a format is forced with
/// [`with_format`](Self::with_format).
pub struct StreamPipeSource<R> {
    reader: R,
    format: Option<String>,
    block_size: usize,
}

impl<R> StreamPipeSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            format: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Force the input format (`-f <format>`).
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }
}

#[async_trait]
impl<R> PipeSource for StreamPipeSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    fn format_args(&mut self) -> Result<Vec<String>> {
        Ok(match &self.format {
            Some(format) => vec!["-f".into(), format.clone()],
            None => Vec::new(),
        })
    }

    async fn write_to(&mut self, writer: &mut PipeWriter, cancel: &CancellationToken) -> Result<()> {
        let copied = copy_blocks(&mut self.reader, writer, self.block_size, cancel).await?;
        tracing::debug!(bytes = copied, "Stream source drained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_format_means_no_tokens() {
        let mut source = StreamPipeSource::new(&b""[..]);
        assert!(source.format_args().unwrap().is_empty());
    }

    #[test]
    fn forced_format_tokens() {
        let mut source = StreamPipeSource::new(&b""[..]).with_format("matroska");
        assert_eq!(source.format_args().unwrap(), vec!["-f", "matroska"]);
    }

    #[tokio::test]
    async fn writes_reader_contents() {
        let mut source = StreamPipeSource::new(&b"0123456789"[..]).with_block_size(3);
        let mut out = Vec::new();
        source
            .write_to(&mut out, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, b"0123456789");
    }
}
