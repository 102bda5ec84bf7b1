use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::{StageConfig, STAGE_CONFIG};
use crate::pipeline::pipe::Pipe;

pub struct Runtime {
    buffer: usize,
    buffers: HashMap<&'static str, usize>,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            buffer: 128,
            buffers: HashMap::new(),
        }
    }

    /// Default capacity of every channel between stages.
    pub fn buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Capacity of the channel feeding the stage called `stage`.
    pub fn buffer_stage(mut self, stage: &'static str, buffer: usize) -> Self {
        self.buffers.insert(stage, buffer.max(1));
        self
    }

    pub fn spawn<I, O, P>(
        &self,
        pipe: P,
    ) -> (
        mpsc::Sender<I>,
        mpsc::Receiver<O>,
        CancelToken,
        JoinHandle<Result<()>>,
    )
    where
        I: Send + 'static,
        O: Send + 'static,
        P: Pipe<I, O> + Send + Sync + 'static,
    {
        let (tx_in, rx_in) = mpsc::channel::<I>(self.buffer);
        let (tx_out, rx_out) = mpsc::channel::<O>(self.buffer);

        let buffer = self.buffer;
        let cancel = CancelToken::default();
        let cancel_task = cancel.clone();
        let stage_config = StageConfig {
            buffers: Arc::new(self.buffers.clone()),
        };

        #[cfg(feature = "tracing")]
        let handle = {
            use tracing::Instrument;
            let stage = pipe.stage_name();
            let span = tracing::info_span!("bulkpipe.stage", stage = stage, buffer = buffer);
            tokio::spawn(
                STAGE_CONFIG
                    .scope(stage_config, async move {
                        pipe.process(rx_in, tx_out, buffer, cancel_task).await
                    })
                    .instrument(span),
            )
        };

        #[cfg(not(feature = "tracing"))]
        let handle = tokio::spawn(STAGE_CONFIG.scope(stage_config, async move {
            pipe.process(rx_in, tx_out, buffer, cancel_task).await
        }));

        (tx_in, rx_out, cancel, handle)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
