//! Bulk import a delimited file into Elasticsearch.
//!
//! ```text
//! csv2es --index-name potatoes --doc-type potato --import-file potatoes.csv
//! csv2es --index-name tomatoes --doc-type tomato --import-file tomatoes.tsv --tab
//! csv2es --index-name pipes --doc-type pipe --import-file pipes.psv --delimiter '|'
//! ```

use std::process::ExitCode;

use bulkpipe::cli::{self, Csv2EsCli};
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Csv2EsCli::parse();
    cli::init_tracing(args.load.quiet);
    cli::exit(cli::run_csv(args).await)
}
