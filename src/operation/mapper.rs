use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::Result;
use crate::operation::{IndexOperation, Record};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::progress::Progress;

/// Turns each record into an [`IndexOperation`], one at a time, as the
/// downstream stage asks for more.
#[derive(Default)]
pub struct OperationMapper {
    progress: Option<Arc<Progress>>,
}

impl OperationMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every record read against `progress`.
    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[async_trait]
impl Pipe<Record, IndexOperation> for OperationMapper {
    fn stage_name(&self) -> &'static str {
        "operation_mapper"
    }

    async fn process(
        &self,
        mut input: Receiver<Record>,
        output: Sender<IndexOperation>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        #[cfg(feature = "tracing")]
        let stage = self.stage_name();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(tracing::Level::DEBUG, event = "bulkpipe.cancelled", stage = stage, where_ = "recv", "bulkpipe.cancelled");
                    break
                },
                msg = input.recv() => {
                    let Some(record) = msg else { break; };
                    if let Some(progress) = &self.progress {
                        progress.record_read();
                    }
                    let op = IndexOperation::new(record)?;
                    if output.send(op).await.is_err() {
                        #[cfg(feature = "tracing")]
                        tracing::event!(tracing::Level::INFO, event = "bulkpipe.downstream.closed", stage = stage, "bulkpipe.downstream.closed");
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}
