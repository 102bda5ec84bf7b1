//! The whole load: source, operations, chunks, dispatch.

use std::sync::Arc;

use crate::chunk::BulkChunker;
use crate::config::LoadConfig;
use crate::dispatch::{DispatchResult, Dispatcher};
use crate::error::Result;
use crate::operation::mapper::OperationMapper;
use crate::operation::Record;
use crate::pipeline::chain::PipeExt;
use crate::pipeline::pipe::Pipe;
use crate::pipeline::runtime::Runtime;
use crate::progress::{Progress, ProgressReporter};
use crate::store::BulkSink;

/// Totals of a successful load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub documents: u64,
    pub chunks: u64,
    pub bytes: u64,
    /// Chunks that needed more than one attempt.
    pub retried_chunks: u64,
}

impl LoadSummary {
    fn observe(&mut self, result: &DispatchResult) {
        if !result.is_delivered() {
            return;
        }
        self.documents += result.docs as u64;
        self.chunks += 1;
        self.bytes += result.bytes as u64;
        if result.attempts > 1 {
            self.retried_chunks += 1;
        }
    }
}

pub struct BulkLoader<S> {
    sink: Arc<S>,
    config: LoadConfig,
    progress: Arc<Progress>,
}

impl<S: BulkSink> BulkLoader<S> {
    pub fn new(sink: S, config: LoadConfig) -> Self {
        Self {
            sink: Arc::new(sink),
            config,
            progress: Arc::new(Progress::quiet()),
        }
    }

    pub fn progress(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Arc::new(Progress::new(reporter));
        self
    }

    pub fn counters(&self) -> &Arc<Progress> {
        &self.progress
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Read `source` to the end and deliver every record.
    ///
    /// Fails with the configuration error before reading anything, with the
    /// read error if the input is malformed, or with the first chunk that
    /// could not be delivered.
    pub async fn run<P>(&self, source: P) -> Result<LoadSummary>
    where
        P: Pipe<(), Record> + Send + Sync + 'static,
    {
        self.config.validate()?;
        let limits = self.config.chunk_limits()?;
        let workers = self.config.workers();

        let dispatcher = Dispatcher::new(self.sink.clone())
            .parallelism(workers)
            .with_retry(self.config.retry_policy().clone())
            .with_progress(self.progress.clone());

        let pipeline = source
            .pipe(OperationMapper::new().with_progress(self.progress.clone()))
            .pipe(BulkChunker::new(limits))
            .pipe(dispatcher);

        let runtime = Runtime::new()
            .buffer(self.config.records_buffered())
            .buffer_stage("dispatcher", workers);
        let (tx, mut rx, _cancel, handle) = runtime.spawn(pipeline);

        // A pipeline that already stopped reports why through `handle`.
        let _ = tx.send(()).await;
        drop(tx);

        let mut summary = LoadSummary::default();
        while let Some(result) = rx.recv().await {
            summary.observe(&result);
        }
        handle.await??;

        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::INFO,
            event = "bulkpipe.load.finished",
            documents = summary.documents,
            chunks = summary.chunks,
            bytes = summary.bytes,
            retried_chunks = summary.retried_chunks,
            "bulkpipe.load.finished"
        );
        Ok(summary)
    }
}
