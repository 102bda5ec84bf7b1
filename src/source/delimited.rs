use std::io::{BufRead, BufReader};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::operation::Record;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::source::{start_blocking, Input, InputKind};

/// Field separator of delimited input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// Nothing configured: comma.
    #[default]
    Default,
    Char(u8),
}

impl Delimiter {
    pub const TAB: Delimiter = Delimiter::Char(b'\t');

    pub fn byte(self) -> u8 {
        match self {
            Delimiter::Default => b',',
            Delimiter::Char(b) => b,
        }
    }
}

/// Resolve the configured delimiter to exactly one character.
///
/// `tab` wins over anything configured. Nothing configured means
/// [`Delimiter::Default`]. Anything but a single ASCII character is rejected.
pub fn sanitize_delimiter(delimiter: Option<&str>, tab: bool) -> Result<Delimiter> {
    if tab {
        return Ok(Delimiter::TAB);
    }
    let Some(delimiter) = delimiter else {
        return Ok(Delimiter::Default);
    };

    let mut chars = delimiter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(Delimiter::Char(c as u8)),
        (Some(_), None) => Err(Error::validation(format!(
            "delimiter {delimiter:?} must be a single ASCII character"
        ))),
        _ => Err(Error::validation(format!(
            "delimiter {delimiter:?} must be exactly one character"
        ))),
    }
}

/// Delimited text with a header line of field names.
///
/// Every following row becomes an object mapping each field name to the
/// row's value, in header order. A row with the wrong number of fields fails
/// the run.
pub struct DelimitedSource {
    input: Input,
    delimiter: Delimiter,
}

impl DelimitedSource {
    pub fn new(input: Input) -> Self {
        Self {
            input,
            delimiter: Delimiter::Default,
        }
    }

    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[async_trait]
impl Pipe<(), Record> for DelimitedSource {
    fn stage_name(&self) -> &'static str {
        "delimited_source"
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<Record>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let source = self.input.take()?;
        let delimiter = self.delimiter.byte();
        let reader_cancel = cancel.clone();

        start_blocking(&mut input, &cancel, move || {
            read_rows(source, delimiter, &output, &reader_cancel)
        })
        .await
    }
}

fn read_rows(
    source: InputKind,
    delimiter: u8,
    output: &Sender<Record>,
    cancel: &CancelToken,
) -> Result<()> {
    let mut reader = BufReader::new(source.open()?);

    let mut header = String::new();
    if reader.read_line(&mut header)? == 0 {
        return Ok(());
    }
    let header = header.trim_start_matches('\u{feff}').trim();
    let fields: Vec<String> = header
        .split(delimiter as char)
        .map(str::to_owned)
        .collect();

    #[cfg(feature = "tracing")]
    tracing::event!(
        tracing::Level::INFO,
        event = "bulkpipe.source.fields",
        count = fields.len(),
        fields = ?fields,
        "bulkpipe.source.fields"
    );

    let mut rows = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut row = csv::StringRecord::new();
    let mut read = 0u64;
    loop {
        let more = rows
            .read_record(&mut row)
            .map_err(|e| Error::source_read(read + 1, e))?;
        if !more {
            break;
        }
        read += 1;

        if row.len() != fields.len() {
            return Err(Error::source_read(
                read,
                format!("expected {} fields, found {}", fields.len(), row.len()),
            ));
        }

        let record: Map<String, Value> = fields
            .iter()
            .cloned()
            .zip(row.iter().map(|value| Value::String(value.to_owned())))
            .collect();

        if cancel.is_cancelled() {
            #[cfg(feature = "tracing")]
            tracing::event!(tracing::Level::DEBUG, event = "bulkpipe.cancelled", stage = "delimited_source", where_ = "read", "bulkpipe.cancelled");
            return Ok(());
        }
        if output.blocking_send(Value::Object(record)).is_err() {
            #[cfg(feature = "tracing")]
            tracing::event!(tracing::Level::INFO, event = "bulkpipe.downstream.closed", stage = "delimited_source", "bulkpipe.downstream.closed");
            return Ok(());
        }
    }
    Ok(())
}
