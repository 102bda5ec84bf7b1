use async_trait::async_trait;
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::operation::IndexOperation;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;

pub const DEFAULT_DOCS_PER_CHUNK: usize = 5000;
pub const DEFAULT_BYTES_PER_CHUNK: usize = 100_000;

/// Upper bounds for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    max_docs: usize,
    max_bytes: usize,
}

impl ChunkLimits {
    pub fn new(max_docs: usize, max_bytes: usize) -> Result<Self> {
        if max_docs == 0 {
            return Err(Error::validation("docs per chunk must be positive"));
        }
        if max_bytes == 0 {
            return Err(Error::validation("bytes per chunk must be positive"));
        }
        Ok(Self {
            max_docs,
            max_bytes,
        })
    }

    /// Limit by document count only.
    pub fn unbounded_bytes(max_docs: usize) -> Result<Self> {
        Self::new(max_docs, usize::MAX)
    }

    pub fn max_docs(&self) -> usize {
        self.max_docs
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_docs: DEFAULT_DOCS_PER_CHUNK,
            max_bytes: DEFAULT_BYTES_PER_CHUNK,
        }
    }
}

/// A non-empty batch of operations sent to the store in one call.
///
/// Holds at most `max_docs` operations totalling at most `max_bytes`, unless
/// it is a single operation that is larger than `max_bytes` on its own.
#[derive(Debug, Clone)]
pub struct Chunk {
    ordinal: u64,
    ops: Vec<IndexOperation>,
    bytes: usize,
}

impl Chunk {
    /// Position of this chunk in source order, starting at 0.
    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Size of this chunk's bulk request body.
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn operations(&self) -> &[IndexOperation] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IndexOperation> {
        self.ops.iter()
    }

    pub fn into_operations(self) -> Vec<IndexOperation> {
        self.ops
    }
}

impl<'a> IntoIterator for &'a Chunk {
    type Item = &'a IndexOperation;
    type IntoIter = std::slice::Iter<'a, IndexOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// The single-pass chunking state: the operations gathered so far and their
/// running byte total.
#[derive(Debug)]
pub struct ChunkAccumulator {
    limits: ChunkLimits,
    ops: Vec<IndexOperation>,
    bytes: usize,
    next_ordinal: u64,
}

impl ChunkAccumulator {
    pub fn new(limits: ChunkLimits) -> Self {
        Self {
            limits,
            ops: Vec::new(),
            bytes: 0,
            next_ordinal: 0,
        }
    }

    /// Add one operation, returning the chunks it completes (zero, one or two).
    ///
    /// A pending chunk is closed first when `op` would push it over either
    /// limit. The chunk holding `op` is closed right away once it reaches a
    /// limit, which is also how an oversized operation ends up alone.
    pub fn push(&mut self, op: IndexOperation) -> impl Iterator<Item = Chunk> {
        let len = op.byte_len();
        let mut closed = [None, None];

        if !self.ops.is_empty()
            && (self.ops.len() + 1 > self.limits.max_docs
                || self.bytes.saturating_add(len) > self.limits.max_bytes)
        {
            closed[0] = self.take();
        }

        self.ops.push(op);
        self.bytes = self.bytes.saturating_add(len);

        if self.ops.len() >= self.limits.max_docs || self.bytes >= self.limits.max_bytes {
            closed[1] = self.take();
        }

        closed.into_iter().flatten()
    }

    /// Close whatever is pending. `None` when nothing is.
    pub fn finish(&mut self) -> Option<Chunk> {
        self.take()
    }

    fn take(&mut self) -> Option<Chunk> {
        if self.ops.is_empty() {
            return None;
        }
        let chunk = Chunk {
            ordinal: self.next_ordinal,
            ops: std::mem::take(&mut self.ops),
            bytes: std::mem::replace(&mut self.bytes, 0),
        };
        self.next_ordinal += 1;
        Some(chunk)
    }
}

/// Lazy chunking of an operation iterator. See [`chunk_operations`].
pub struct Chunks<I> {
    ops: I,
    acc: ChunkAccumulator,
    ready: std::collections::VecDeque<Chunk>,
    done: bool,
}

/// Group `ops` into chunks without reading ahead more than one operation.
pub fn chunk_operations<I>(ops: I, limits: ChunkLimits) -> Chunks<I::IntoIter>
where
    I: IntoIterator<Item = IndexOperation>,
{
    Chunks {
        ops: ops.into_iter(),
        acc: ChunkAccumulator::new(limits),
        ready: std::collections::VecDeque::with_capacity(2),
        done: false,
    }
}

impl<I> Iterator for Chunks<I>
where
    I: Iterator<Item = IndexOperation>,
{
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if let Some(chunk) = self.ready.pop_front() {
                return Some(chunk);
            }
            if self.done {
                return None;
            }
            match self.ops.next() {
                Some(op) => self.ready.extend(self.acc.push(op)),
                None => {
                    self.done = true;
                    return self.acc.finish();
                }
            }
        }
    }
}

/// Pipeline stage running [`ChunkAccumulator`] over a stream of operations.
pub struct BulkChunker {
    limits: ChunkLimits,
}

impl BulkChunker {
    pub fn new(limits: ChunkLimits) -> Self {
        Self { limits }
    }
}

impl Default for BulkChunker {
    fn default() -> Self {
        Self::new(ChunkLimits::default())
    }
}

#[async_trait]
impl Pipe<IndexOperation, Chunk> for BulkChunker {
    fn stage_name(&self) -> &'static str {
        "bulk_chunker"
    }

    async fn process(
        &self,
        mut input: Receiver<IndexOperation>,
        output: Sender<Chunk>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        #[cfg(feature = "tracing")]
        let stage = self.stage_name();
        let mut acc = ChunkAccumulator::new(self.limits);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(tracing::Level::DEBUG, event = "bulkpipe.cancelled", stage = stage, where_ = "recv", "bulkpipe.cancelled");
                    return Ok(());
                },
                msg = input.recv() => {
                    let Some(op) = msg else { break; };
                    for chunk in acc.push(op) {
                        if output.send(chunk).await.is_err() {
                            #[cfg(feature = "tracing")]
                            tracing::event!(tracing::Level::INFO, event = "bulkpipe.downstream.closed", stage = stage, "bulkpipe.downstream.closed");
                            return Ok(());
                        }
                    }
                }
            }
        }

        if let Some(last) = acc.finish() {
            if output.send(last).await.is_err() {
                #[cfg(feature = "tracing")]
                tracing::event!(tracing::Level::INFO, event = "bulkpipe.downstream.closed", stage = stage, "bulkpipe.downstream.closed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn op_of_len(len: usize) -> IndexOperation {
        // An n-character string costs n + 2 bytes plus the action line and newline.
        let op = IndexOperation::new(json!("x".repeat(len - 16))).expect("encode");
        assert_eq!(op.byte_len(), len);
        op
    }

    fn sizes(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(Chunk::len).collect()
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(ChunkLimits::new(0, 10).unwrap_err().is_validation());
        assert!(ChunkLimits::new(10, 0).unwrap_err().is_validation());
    }

    #[test]
    fn exact_doc_boundary_closes_without_lookahead() {
        let limits = ChunkLimits::unbounded_bytes(3).expect("limits");
        let mut acc = ChunkAccumulator::new(limits);
        assert_eq!(acc.push(op_of_len(20)).count(), 0);
        assert_eq!(acc.push(op_of_len(20)).count(), 0);
        let closed: Vec<Chunk> = acc.push(op_of_len(20)).collect();
        assert_eq!(sizes(&closed), vec![3]);
        assert!(acc.finish().is_none());
    }

    #[test]
    fn oversized_operation_flushes_pending_then_goes_alone() {
        let limits = ChunkLimits::new(10, 40).expect("limits");
        let mut acc = ChunkAccumulator::new(limits);
        assert_eq!(acc.push(op_of_len(25)).count(), 0);

        let closed: Vec<Chunk> = acc.push(op_of_len(100)).collect();
        assert_eq!(sizes(&closed), vec![1, 1]);
        assert_eq!(closed[0].byte_len(), 25);
        assert_eq!(closed[1].byte_len(), 100);
        assert_eq!(closed[0].ordinal(), 0);
        assert_eq!(closed[1].ordinal(), 1);
    }

    #[test]
    fn byte_budget_splits_before_overflow() {
        let limits = ChunkLimits::new(100, 40).expect("limits");
        let chunks: Vec<Chunk> =
            chunk_operations((0..5).map(|_| op_of_len(20)), limits).collect();
        assert_eq!(sizes(&chunks), vec![2, 2, 1]);
        assert!(chunks.iter().all(|c| c.byte_len() <= 40));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let limits = ChunkLimits::default();
        assert_eq!(chunk_operations(Vec::new(), limits).count(), 0);
    }
}
