pub mod bulk;

pub use bulk::{chunk_operations, BulkChunker, Chunk, ChunkAccumulator, ChunkLimits, Chunks};
