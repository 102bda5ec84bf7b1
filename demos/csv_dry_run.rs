//! Chunks a small generated CSV and prints each chunk through `DebugSink`,
//! the same path `csv2es --dry-run` takes.
//!
//! Run with:
//!   cargo run --example csv_dry_run

use std::io::Cursor;

use bulkpipe::config::LoadConfig;
use bulkpipe::error::Result;
use bulkpipe::loader::BulkLoader;
use bulkpipe::source::{DelimitedSource, Input};
use bulkpipe::store::DebugSink;

#[tokio::main]
async fn main() -> Result<()> {
    let mut csv = String::from("variety,kg,farm\n");
    for i in 0..1_234 {
        csv.push_str(&format!("potato-{i},{},farm-{}\n", i % 17, i % 5));
    }
    let source = DelimitedSource::new(Input::reader(Cursor::new(csv.into_bytes())));

    // Small chunks so the byte bound and the count bound both show up.
    let config = LoadConfig::new()
        .docs_per_chunk(250)
        .bytes_per_chunk(16 * 1024)
        .parallelism(2);

    let summary = BulkLoader::new(DebugSink, config).run(source).await?;

    println!(
        "\n{} documents in {} chunks, {} bytes of bulk body",
        summary.documents, summary.chunks, summary.bytes
    );
    Ok(())
}
