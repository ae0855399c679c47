use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ffpipe_core::Result;

use super::{format_tokens, PipeReader, PipeSink};

/// A sink backed by a caller-supplied reader closure.
///
/// The closure receives the connected pipe and the run's cancellation token
/// and must read until end of file.
pub struct FnPipeSink<F> {
    read: F,
    format: Option<String>,
}

impl<F, Fut> FnPipeSink<F>
where
    F: FnMut(PipeReader, CancellationToken) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    pub fn new(read: F) -> Self {
        Self { read, format: None }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

#[async_trait]
impl<F, Fut> PipeSink for FnPipeSink<F>
where
    F: FnMut(PipeReader, CancellationToken) -> Fut + Send,
    Fut: Future<Output = Result<()>> + Send,
{
    fn format_args(&self) -> Vec<String> {
        format_tokens(self.format.as_deref())
    }

    async fn read_from(&mut self, reader: PipeReader, cancel: &CancellationToken) -> Result<()> {
        (self.read)(reader, cancel.clone()).await
    }
}
