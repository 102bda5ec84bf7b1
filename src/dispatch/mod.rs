//! Parallel delivery of chunks to a [`BulkSink`].
//!
//! `process` is the only reader of the chunk channel. It hands each chunk to
//! a free worker slot, and at most `parallelism` deliveries run at a time.
//! Each slot owns the connection it created on first use; the connection
//! travels with the slot into the delivery task and back out again, so no
//! two deliveries ever share one. Connecting is part of each attempt, so a
//! failed connect is retried like a failed submit.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::OnceCell;
use tokio::task::JoinSet;

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::pipeline::retry::RetryPolicy;
use crate::progress::Progress;
use crate::store::BulkSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Delivered,
    /// The retry budget ran out; the run is aborted.
    Failed,
}

/// What happened to one chunk.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub ordinal: u64,
    pub docs: usize,
    pub bytes: usize,
    pub attempts: u32,
    pub status: DispatchStatus,
    /// Last error seen while delivering, also set when a retry succeeded.
    pub last_error: Option<String>,
}

impl DispatchResult {
    pub fn is_delivered(&self) -> bool {
        self.status == DispatchStatus::Delivered
    }
}

struct WorkerSlot<C> {
    id: usize,
    connection: OnceCell<C>,
}

impl<C> WorkerSlot<C> {
    fn new(id: usize) -> Self {
        Self {
            id,
            connection: OnceCell::new(),
        }
    }

    /// The slot's connection, created on first use. A failed connect leaves
    /// the slot empty so the next attempt tries again.
    async fn connection<S>(&self, sink: &S) -> Result<&C>
    where
        S: BulkSink<Connection = C>,
    {
        self.connection
            .get_or_try_init(|| async {
                #[cfg(feature = "tracing")]
                tracing::event!(tracing::Level::DEBUG, event = "bulkpipe.dispatch.connect", worker = self.id, "bulkpipe.dispatch.connect");
                sink.connect().await
            })
            .await
    }
}

struct Delivery<C> {
    slot: WorkerSlot<C>,
    result: DispatchResult,
    error: Option<Error>,
}

pub struct Dispatcher<S> {
    sink: Arc<S>,
    parallelism: usize,
    retry: RetryPolicy,
    progress: Option<Arc<Progress>>,
}

impl<S: BulkSink> Dispatcher<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self {
            sink,
            parallelism: 1,
            retry: RetryPolicy::default(),
            progress: None,
        }
    }

    /// Number of workers; `1` delivers chunks strictly one after another.
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: Arc<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Record a finished delivery. Returns the error if it was fatal.
    async fn settle(
        &self,
        delivery: Delivery<S::Connection>,
        idle: &mut Vec<WorkerSlot<S::Connection>>,
        output: &Sender<DispatchResult>,
    ) -> Option<Error> {
        let Delivery {
            slot,
            result,
            error,
        } = delivery;
        idle.push(slot);

        if result.is_delivered() {
            if let Some(progress) = &self.progress {
                progress.chunk_delivered(result.docs);
            }
        }

        if output.send(result).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::event!(tracing::Level::DEBUG, event = "bulkpipe.downstream.closed", stage = "dispatcher", "bulkpipe.downstream.closed");
        }
        error
    }
}

#[async_trait]
impl<S: BulkSink> Pipe<Chunk, DispatchResult> for Dispatcher<S> {
    fn stage_name(&self) -> &'static str {
        "dispatcher"
    }

    async fn process(
        &self,
        mut input: Receiver<Chunk>,
        output: Sender<DispatchResult>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let mut idle: Vec<WorkerSlot<S::Connection>> =
            (0..self.parallelism).rev().map(WorkerSlot::new).collect();
        let mut in_flight: JoinSet<Delivery<S::Connection>> = JoinSet::new();
        let mut fatal: Option<Error> = None;

        loop {
            tokio::select! {
                biased;

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    let failure = match joined {
                        Ok(delivery) => self.settle(delivery, &mut idle, &output).await,
                        Err(join) => Some(Error::from(join)),
                    };
                    if let Some(error) = failure {
                        record_fatal(&mut fatal, error, &cancel);
                    }
                }
                _ = cancel.cancelled() => break,
                msg = input.recv(), if !idle.is_empty() => {
                    let Some(chunk) = msg else { break; };
                    let Some(slot) = idle.pop() else { break; };

                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::DEBUG,
                        event = "bulkpipe.dispatch.admitted",
                        ordinal = chunk.ordinal(),
                        docs = chunk.len(),
                        worker = slot.id,
                        "bulkpipe.dispatch.admitted"
                    );

                    let sink = self.sink.clone();
                    let retry = self.retry.clone();

                    #[cfg(feature = "tracing")]
                    {
                        use tracing::Instrument;
                        let span = tracing::info_span!("bulkpipe.dispatch.chunk", ordinal = chunk.ordinal(), worker = slot.id);
                        in_flight.spawn(deliver(sink, retry, slot, chunk).instrument(span));
                    }
                    #[cfg(not(feature = "tracing"))]
                    in_flight.spawn(deliver(sink, retry, slot, chunk));
                }
            }
        }

        // Drain: in-flight chunks always run to completion.
        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "bulkpipe.dispatch.drain",
            in_flight = in_flight.len(),
            "bulkpipe.dispatch.drain"
        );
        while let Some(joined) = in_flight.join_next().await {
            let failure = match joined {
                Ok(delivery) => self.settle(delivery, &mut idle, &output).await,
                Err(join) => Some(Error::from(join)),
            };
            if let Some(error) = failure {
                record_fatal(&mut fatal, error, &cancel);
            }
        }

        match fatal {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Keep the first fatal error, stop admitting new chunks.
fn record_fatal(fatal: &mut Option<Error>, error: Error, cancel: &CancelToken) {
    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::ERROR,
        event = "bulkpipe.dispatch.failed",
        first = fatal.is_none(),
        error = %error,
        "bulkpipe.dispatch.failed"
    );
    if fatal.is_none() {
        *fatal = Some(error);
    }
    cancel.cancel();
}

async fn deliver<S: BulkSink>(
    sink: Arc<S>,
    retry: RetryPolicy,
    slot: WorkerSlot<S::Connection>,
    chunk: Chunk,
) -> Delivery<S::Connection> {
    let mut result = DispatchResult {
        ordinal: chunk.ordinal(),
        docs: chunk.len(),
        bytes: chunk.byte_len(),
        attempts: 0,
        status: DispatchStatus::Failed,
        last_error: None,
    };

    let outcome = {
        let sink: &S = &sink;
        let slot = &slot;
        let chunk = &chunk;
        retry
            .run(move |_attempt| async move {
                let connection = slot.connection(sink).await?;
                sink.submit(connection, chunk).await
            })
            .await
    };

    let error = match outcome {
        Ok(attempted) => {
            result.attempts = attempted.attempts;
            result.status = DispatchStatus::Delivered;
            result.last_error = attempted.last_error.map(|e| e.to_string());
            None
        }
        Err(error) => {
            if let Error::RetryExhausted { attempts, source } = &error {
                result.attempts = *attempts;
                result.last_error = Some(source.to_string());
            } else {
                result.last_error = Some(error.to_string());
            }
            Some(Error::Dispatch {
                chunk: result.ordinal,
                source: Box::new(error),
            })
        }
    };

    Delivery {
        slot,
        result,
        error,
    }
}
