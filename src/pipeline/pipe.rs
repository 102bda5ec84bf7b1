use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;

/// One stage of a pipeline.
///
/// A stage drains `input` until it closes (or the token is cancelled) and
/// writes to `output`. Returning ends the stage and drops both channel ends.
#[async_trait]
pub trait Pipe<I: Send + 'static, O: Send + 'static>: Send + Sync {
    /// Name used for spans, log events and per-stage buffer overrides.
    fn stage_name(&self) -> &'static str {
        "stage"
    }

    async fn process(
        &self,
        input: Receiver<I>,
        output: Sender<O>,
        buffer: usize,
        cancel: CancelToken,
    ) -> Result<()>;
}
