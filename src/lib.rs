//! # bulkpipe
//!
//! **Streaming bulk loads into a document index.**
//!
//! `bulkpipe` reads a delimited file or a JSON array, turns every record into
//! an index operation, groups operations into size-bounded chunks and sends
//! those chunks to the store from a bounded pool of workers, retrying each
//! chunk with exponential backoff.
//!
//! It is built for inputs that do not fit in memory:
//!
//! - one forward pass over the input
//! - bounded channels between stages, so reading only advances as fast as
//!   chunks are delivered
//! - at most `parallelism` chunks in flight
//! - a failed chunk stops the run instead of being skipped
//!
//! ---
//!
//! ## Core Model
//!
//! ```text
//! Source → OperationMapper → BulkChunker → Dispatcher → store
//! ```
//!
//! Each stage implements the [`Pipe`] trait and communicates through bounded
//! Tokio channels. Only the dispatcher reads chunks; it hands each one to a
//! free worker, and each worker keeps its own connection to the store.
//!
//! ---
//!
//! ## Example
//!
//! ```no_run
//! use bulkpipe::config::LoadConfig;
//! use bulkpipe::loader::BulkLoader;
//! use bulkpipe::source::{DelimitedSource, Delimiter, Input};
//! use bulkpipe::store::ElasticsearchSink;
//!
//! #[tokio::main]
//! async fn main() -> bulkpipe::error::Result<()> {
//!     let sink = ElasticsearchSink::new("http://127.0.0.1:9200", "potatoes")?;
//!     let source = DelimitedSource::new(Input::path("potatoes.tsv")).delimiter(Delimiter::TAB);
//!
//!     let config = LoadConfig::new().docs_per_chunk(2000).parallelism(4);
//!     let summary = BulkLoader::new(sink, config).run(source).await?;
//!
//!     println!("{} documents in {} chunks", summary.documents, summary.chunks);
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Chunking
//!
//! A chunk holds at most `docs_per_chunk` operations and at most
//! `bytes_per_chunk` encoded bytes. An operation larger than the byte budget
//! is never split or dropped; it is sent alone. The same engine is available
//! as a plain iterator adapter, [`chunk::chunk_operations`].
//!
//! ---
//!
//! ## Retry and failure
//!
//! Every submission error is retried. The wait before attempt `k` is
//! `min(1s * 2^(k-2), 10s)`, up to 10 attempts. When a chunk runs out of
//! attempts the dispatcher stops taking new chunks, lets the ones in flight
//! finish, and the run fails with that chunk's error.
//!
//! ---
//!
//! ## Observability
//!
//! With the default `tracing` feature `bulkpipe` emits structured events such
//! as `bulkpipe.retry.attempt_failed`, `bulkpipe.retry.sleep`,
//! `bulkpipe.retry.exhausted`, `bulkpipe.dispatch.admitted`,
//! `bulkpipe.dispatch.failed`, `bulkpipe.cancelled` and
//! `bulkpipe.downstream.closed`, inside `bulkpipe.stage` and
//! `bulkpipe.dispatch.chunk` spans.
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `tracing` *(default)*: tracing spans and events.
//! - `elasticsearch` *(default)*: [`store::ElasticsearchSink`] over `reqwest`.
//! - `cli` *(default)*: the `csv2es` and `json2es` binaries.
//!
//! [`Pipe`]: pipeline::pipe::Pipe

pub mod chunk;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod loader;
pub mod operation;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod store;

pub mod prelude {
    //! Convenient imports for most `bulkpipe` users.

    pub use crate::chunk::{Chunk, ChunkLimits};
    pub use crate::config::LoadConfig;
    pub use crate::loader::{BulkLoader, LoadSummary};
    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::chain::PipeExt;
    pub use crate::pipeline::retry::RetryPolicy;
    pub use crate::pipeline::runtime::Runtime;
    pub use crate::source::{DelimitedSource, Input, JsonArraySource};
    pub use crate::store::BulkSink;
}
