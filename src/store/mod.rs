//! Destinations for chunks.
//!
//! A sink only knows how to deliver one chunk in one attempt. Retrying,
//! parallelism and connection reuse belong to the dispatcher.

use async_trait::async_trait;

use crate::chunk::Chunk;
use crate::error::Result;

pub mod debug;
#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub use debug::DebugSink;
#[cfg(feature = "elasticsearch")]
pub use elasticsearch::ElasticsearchSink;

#[async_trait]
pub trait BulkSink: Send + Sync + 'static {
    /// Per-worker handle to the store, created on the worker's first chunk
    /// and kept for the worker's lifetime.
    type Connection: Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Connection>;

    /// Deliver `chunk` once, with its operations in order. Any error is
    /// treated as transient by the caller.
    async fn submit(&self, connection: &Self::Connection, chunk: &Chunk) -> Result<()>;
}
