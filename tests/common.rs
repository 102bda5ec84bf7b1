#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bulkpipe::chunk::Chunk;
use bulkpipe::error::{Error, Result};
use bulkpipe::operation::{IndexOperation, Record};
use bulkpipe::pipeline::cancel::CancelToken;
use bulkpipe::pipeline::pipe::Pipe;
use bulkpipe::store::BulkSink;
use serde_json::json;
use tokio::sync::mpsc::{Receiver, Sender};

#[derive(Clone)]
pub struct VecSource<T> {
    items: Vec<T>,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl<T> Pipe<(), T> for VecSource<T>
where
    T: Send + Sync + Clone + 'static,
{
    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<T>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = input.recv() => {}
        }

        for item in self.items.clone() {
            if cancel.is_cancelled() {
                break;
            }
            if output.send(item).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// `n` small documents `{"n": i}`.
pub fn records(n: usize) -> Vec<Record> {
    (0..n).map(|i| json!({ "n": i })).collect()
}

pub fn ops(n: usize) -> Vec<IndexOperation> {
    records(n)
        .into_iter()
        .map(|r| IndexOperation::new(r).expect("encode"))
        .collect()
}

/// What a [`RecordingSink`] does with one submission.
#[derive(Clone, Copy, Debug)]
pub enum Outcome {
    Accept,
    Reject,
}

#[derive(Default)]
struct Recorded {
    /// Ordinals of accepted chunks, in acceptance order.
    accepted: Vec<u64>,
    /// Document numbers of accepted chunks, in acceptance order.
    documents: Vec<u64>,
    attempts: Vec<u64>,
    script: VecDeque<Outcome>,
    failing_ordinals: Vec<u64>,
}

/// In-memory sink that remembers every submission.
///
/// Outcomes come from a script first, then from `fail_chunk`, then accept.
#[derive(Clone, Default)]
pub struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
    connects: Arc<AtomicUsize>,
    refused_connects: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    latency: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every submission takes `latency` of (tokio) time.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.recorded
            .lock()
            .expect("mutex poisoned")
            .script
            .extend(outcomes);
        self
    }

    /// The next `n` connects fail.
    pub fn refuse_connects(self, n: usize) -> Self {
        self.refused_connects.store(n, Ordering::SeqCst);
        self
    }

    /// The chunk with this ordinal is always rejected.
    pub fn fail_chunk(self, ordinal: u64) -> Self {
        self.recorded
            .lock()
            .expect("mutex poisoned")
            .failing_ordinals
            .push(ordinal);
        self
    }

    pub fn accepted(&self) -> Vec<u64> {
        self.recorded.lock().expect("mutex poisoned").accepted.clone()
    }

    pub fn documents(&self) -> Vec<u64> {
        self.recorded.lock().expect("mutex poisoned").documents.clone()
    }

    /// Ordinal of every submission, accepted or not.
    pub fn attempts(&self) -> Vec<u64> {
        self.recorded.lock().expect("mutex poisoned").attempts.clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Connection handed out by [`RecordingSink`]: just its creation number.
#[derive(Debug)]
pub struct Handle(pub usize);

#[async_trait]
impl BulkSink for RecordingSink {
    type Connection = Handle;

    async fn connect(&self) -> Result<Handle> {
        let refused = self
            .refused_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if refused.is_ok() {
            return Err(Error::remote("connection refused"));
        }
        Ok(Handle(self.connects.fetch_add(1, Ordering::SeqCst)))
    }

    async fn submit(&self, _connection: &Handle, chunk: &Chunk) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let outcome = {
            let mut recorded = self.recorded.lock().expect("mutex poisoned");
            recorded.attempts.push(chunk.ordinal());
            match recorded.script.pop_front() {
                Some(outcome) => outcome,
                None if recorded.failing_ordinals.contains(&chunk.ordinal()) => Outcome::Reject,
                None => Outcome::Accept,
            }
        };

        let result = match outcome {
            Outcome::Accept => {
                let mut recorded = self.recorded.lock().expect("mutex poisoned");
                recorded.accepted.push(chunk.ordinal());
                recorded
                    .documents
                    .extend(chunk.iter().filter_map(|op| op.record()["n"].as_u64()));
                Ok(())
            }
            Outcome::Reject => Err(Error::remote(format!(
                "chunk {} rejected",
                chunk.ordinal()
            ))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
