//! Run configuration.

use crate::chunk::bulk::{DEFAULT_BYTES_PER_CHUNK, DEFAULT_DOCS_PER_CHUNK};
use crate::chunk::ChunkLimits;
use crate::error::{Error, Result};
use crate::pipeline::retry::RetryPolicy;

pub const DEFAULT_PARALLELISM: usize = 1;
pub const DEFAULT_RECORD_BUFFER: usize = 1024;

/// Knobs for one load. `Default` gives 5000 documents / 100000 bytes per
/// chunk, one worker, and the standard ten-attempt backoff.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    docs_per_chunk: usize,
    bytes_per_chunk: usize,
    parallelism: usize,
    record_buffer: usize,
    retry: RetryPolicy,
}

impl LoadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn docs_per_chunk(mut self, docs: usize) -> Self {
        self.docs_per_chunk = docs;
        self
    }

    pub fn bytes_per_chunk(mut self, bytes: usize) -> Self {
        self.bytes_per_chunk = bytes;
        self
    }

    pub fn parallelism(mut self, workers: usize) -> Self {
        self.parallelism = workers;
        self
    }

    /// Capacity of the record and operation channels ahead of the chunker.
    pub fn record_buffer(mut self, records: usize) -> Self {
        self.record_buffer = records;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.chunk_limits()?;
        if self.parallelism == 0 {
            return Err(Error::validation("parallelism must be at least 1"));
        }
        if self.record_buffer == 0 {
            return Err(Error::validation("record buffer must be at least 1"));
        }
        Ok(())
    }

    pub fn chunk_limits(&self) -> Result<ChunkLimits> {
        ChunkLimits::new(self.docs_per_chunk, self.bytes_per_chunk)
    }

    pub fn workers(&self) -> usize {
        self.parallelism
    }

    pub fn records_buffered(&self) -> usize {
        self.record_buffer
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            docs_per_chunk: DEFAULT_DOCS_PER_CHUNK,
            bytes_per_chunk: DEFAULT_BYTES_PER_CHUNK,
            parallelism: DEFAULT_PARALLELISM,
            record_buffer: DEFAULT_RECORD_BUFFER,
            retry: RetryPolicy::default(),
        }
    }
}
