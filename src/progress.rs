//! Run counters and their optional display.
//!
//! Reporting never influences control flow: a reporter only observes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Records between two `documents_read` notifications.
pub const REPORT_EVERY: u64 = 10_000;

pub trait ProgressReporter: Send + Sync {
    /// Called with the running total every [`REPORT_EVERY`] records read.
    fn documents_read(&self, _total: u64) {}

    /// Called after each chunk is delivered.
    fn chunk_sent(&self, _chunks: u64, _documents: u64) {}
}

/// Prints the same lines the command-line tools always have.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleProgress;

impl ProgressReporter for ConsoleProgress {
    fn documents_read(&self, total: u64) {
        println!("Sent documents: {total}");
    }
}

/// Quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuietProgress;

impl ProgressReporter for QuietProgress {}

/// Counters shared by the producer side and the dispatch workers.
///
/// `documents_read` is only advanced by the single-threaded reader stage;
/// the sent counters are advanced by whichever worker finishes a chunk.
pub struct Progress {
    reporter: Arc<dyn ProgressReporter>,
    documents_read: AtomicU64,
    chunks_sent: AtomicU64,
    documents_sent: AtomicU64,
}

impl Progress {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            documents_read: AtomicU64::new(0),
            chunks_sent: AtomicU64::new(0),
            documents_sent: AtomicU64::new(0),
        }
    }

    pub fn quiet() -> Self {
        Self::new(Arc::new(QuietProgress))
    }

    pub(crate) fn record_read(&self) {
        let total = self.documents_read.fetch_add(1, Ordering::Relaxed) + 1;
        if total % REPORT_EVERY == 0 {
            self.reporter.documents_read(total);
        }
    }

    pub(crate) fn chunk_delivered(&self, documents: usize) {
        let chunks = self.chunks_sent.fetch_add(1, Ordering::Relaxed) + 1;
        let documents = self
            .documents_sent
            .fetch_add(documents as u64, Ordering::Relaxed)
            + documents as u64;
        self.reporter.chunk_sent(chunks, documents);
    }

    pub fn documents_read(&self) -> u64 {
        self.documents_read.load(Ordering::Relaxed)
    }

    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    pub fn documents_sent(&self) -> u64 {
        self.documents_sent.load(Ordering::Relaxed)
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::quiet()
    }
}
