use async_trait::async_trait;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::store::BulkSink;

/// Prints each chunk's size instead of sending it anywhere (dry runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugSink;

#[async_trait]
impl BulkSink for DebugSink {
    type Connection = ();

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn submit(&self, _connection: &(), chunk: &Chunk) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "bulkpipe.debug_sink.chunk",
            ordinal = chunk.ordinal(),
            docs = chunk.len(),
            bytes = chunk.byte_len(),
            "bulkpipe.debug_sink.chunk"
        );
        println!(
            "chunk {}: {} docs, {} bytes",
            chunk.ordinal(),
            chunk.len(),
            chunk.byte_len()
        );
        Ok(())
    }
}
