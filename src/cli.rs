//! Shared command line of the `csv2es` and `json2es` tools.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser};
use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoadConfig;
use crate::error::{Error, Result};
use crate::loader::{BulkLoader, LoadSummary};
use crate::operation::Record;
use crate::pipeline::pipe::Pipe;
use crate::progress::{ConsoleProgress, ProgressReporter, QuietProgress};
use crate::source::{sanitize_delimiter, DelimitedSource, Input, JsonArraySource};
use crate::store::elasticsearch::{CreateIndex, DeleteIndex, DEFAULT_HOST};
use crate::store::{BulkSink, DebugSink, ElasticsearchSink};

/// Options common to both tools.
#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// Index name to load data into
    #[arg(long, env = "BULKPIPE_INDEX")]
    pub index_name: String,

    /// The document type (like user_records), for clusters that still use types
    #[arg(long, env = "BULKPIPE_DOC_TYPE")]
    pub doc_type: Option<String>,

    /// File to import (or '-' for stdin)
    #[arg(long)]
    pub import_file: String,

    /// JSON mapping file for index
    #[arg(long)]
    pub mapping_file: Option<PathBuf>,

    /// The Elasticsearch host
    #[arg(long, env = "BULKPIPE_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// The documents per chunk to upload
    #[arg(long, env = "BULKPIPE_DOCS_PER_CHUNK", default_value_t = 5000)]
    pub docs_per_chunk: usize,

    /// The max bytes per chunk to upload
    #[arg(long, env = "BULKPIPE_BYTES_PER_CHUNK", default_value_t = 100_000)]
    pub bytes_per_chunk: usize,

    /// Parallel uploads to send at once
    #[arg(long, env = "BULKPIPE_PARALLEL", default_value_t = 1)]
    pub parallel: usize,

    /// Delete existing index if it exists
    #[arg(long)]
    pub delete_index: bool,

    /// Don't create index
    #[arg(long)]
    pub existing_index: bool,

    /// Minimize console output
    #[arg(long)]
    pub quiet: bool,

    /// Print chunk sizes instead of sending anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Bulk import a delimited file (CSV, TSV, ...) into a target Elasticsearch
/// instance.
#[derive(Parser, Debug)]
#[command(name = "csv2es", version)]
pub struct Csv2EsCli {
    #[command(flatten)]
    pub load: LoadArgs,

    /// The field delimiter to use, defaults to CSV
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Assume tab-separated, overrides delimiter
    #[arg(long)]
    pub tab: bool,
}

/// Bulk import a JSON array of documents into a target Elasticsearch
/// instance.
#[derive(Parser, Debug)]
#[command(name = "json2es", version)]
pub struct Json2EsCli {
    #[command(flatten)]
    pub load: LoadArgs,
}

pub async fn run_csv(cli: Csv2EsCli) -> Result<LoadSummary> {
    // Checked before anything is read or sent.
    let delimiter = sanitize_delimiter(cli.delimiter.as_deref(), cli.tab)?;
    let source =
        DelimitedSource::new(Input::from_arg(&cli.load.import_file)).delimiter(delimiter);
    cli.load.run(source).await
}

pub async fn run_json(cli: Json2EsCli) -> Result<LoadSummary> {
    let source = JsonArraySource::new(Input::from_arg(&cli.load.import_file));
    cli.load.run(source).await
}

impl LoadArgs {
    pub fn config(&self) -> LoadConfig {
        LoadConfig::new()
            .docs_per_chunk(self.docs_per_chunk)
            .bytes_per_chunk(self.bytes_per_chunk)
            .parallelism(self.parallel)
    }

    fn echo(&self, message: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", message.as_ref());
        }
    }

    fn reporter(&self) -> Arc<dyn ProgressReporter> {
        if self.quiet {
            Arc::new(QuietProgress)
        } else {
            Arc::new(ConsoleProgress)
        }
    }

    pub async fn run<P>(&self, source: P) -> Result<LoadSummary>
    where
        P: Pipe<(), Record> + Send + Sync + 'static,
    {
        let config = self.config();
        config.validate()?;
        let mapping = self.mapping()?;

        if self.dry_run {
            return self.load(DebugSink, config, source).await;
        }

        self.echo(format!("Using host: {}", self.host));
        let mut sink = ElasticsearchSink::new(&self.host, &self.index_name)?;
        if let Some(doc_type) = &self.doc_type {
            sink = sink.doc_type(doc_type);
        }
        self.prepare_index(&sink, mapping.as_ref()).await?;
        self.load(sink, config, source).await
    }

    fn mapping(&self) -> Result<Option<Value>> {
        let Some(path) = &self.mapping_file else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map(Some).map_err(|e| {
            Error::validation(format!("mapping file {} is not valid JSON: {e}", path.display()))
        })
    }

    async fn prepare_index(&self, sink: &ElasticsearchSink, mapping: Option<&Value>) -> Result<()> {
        let index = &self.index_name;
        if self.delete_index {
            match sink.delete_index().await? {
                DeleteIndex::Deleted => self.echo(format!("Deleted: {index}")),
                DeleteIndex::NotFound => {
                    self.echo(format!("Index {index} not found, nothing to delete"))
                }
            }
        }

        if !self.existing_index {
            match sink.create_index().await? {
                CreateIndex::Created => self.echo(format!("Created new index: {index}")),
                CreateIndex::AlreadyExists => {
                    self.echo(format!("Index {index} already exists"))
                }
            }
        }

        if let Some(doc_type) = &self.doc_type {
            self.echo(format!("Using document type: {doc_type}"));
        }
        if let (Some(mapping), Some(path)) = (mapping, &self.mapping_file) {
            self.echo(format!("Applying mapping from: {}", path.display()));
            sink.put_mapping(mapping).await?;
        }
        Ok(())
    }

    async fn load<S, P>(&self, sink: S, config: LoadConfig, source: P) -> Result<LoadSummary>
    where
        S: BulkSink,
        P: Pipe<(), Record> + Send + Sync + 'static,
    {
        let summary = BulkLoader::new(sink, config)
            .progress(self.reporter())
            .run(source)
            .await?;
        self.echo(format!(
            "Indexed {} documents in {} chunks ({} bytes, {} chunks retried)",
            summary.documents, summary.chunks, summary.bytes, summary.retried_chunks
        ));
        Ok(summary)
    }
}

/// Install the log subscriber. `RUST_LOG` wins; otherwise info, or warnings
/// only when `quiet`.
pub fn init_tracing(quiet: bool) {
    let default = if quiet { "bulkpipe=warn" } else { "bulkpipe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Turn a run's outcome into the process exit status, reporting failures.
pub fn exit(outcome: Result<LoadSummary>) -> ExitCode {
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "load failed");
            eprintln!("{}: {err}", err.class());
            ExitCode::from(err.exit_code())
        }
    }
}
