//! Bulk import a JSON array of documents into Elasticsearch.
//!
//! ```text
//! json2es --index-name potatoes --doc-type potato --import-file potatoes.json
//! cat potatoes.json | json2es --index-name potatoes --import-file -
//! ```

use std::process::ExitCode;

use bulkpipe::cli::{self, Json2EsCli};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Json2EsCli::parse();
    cli::init_tracing(args.load.quiet);
    cli::exit(cli::run_json(args).await)
}
