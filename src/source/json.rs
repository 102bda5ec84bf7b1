use std::fmt;
use std::io::BufReader;

use async_trait::async_trait;
use serde::de::{Deserializer as _, SeqAccess, Visitor};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::error::{Error, Result};
use crate::operation::Record;
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::pipe::Pipe;
use crate::source::{start_blocking, Input, InputKind};

/// A single JSON array; each element, whatever its type, is one record.
///
/// Elements are forwarded as they are parsed, the array itself is never held
/// in memory.
pub struct JsonArraySource {
    input: Input,
}

impl JsonArraySource {
    pub fn new(input: Input) -> Self {
        Self { input }
    }
}

#[async_trait]
impl Pipe<(), Record> for JsonArraySource {
    fn stage_name(&self) -> &'static str {
        "json_array_source"
    }

    async fn process(
        &self,
        mut input: Receiver<()>,
        output: Sender<Record>,
        _buffer: usize,
        cancel: CancelToken,
    ) -> Result<()> {
        let source = self.input.take()?;
        let reader_cancel = cancel.clone();

        start_blocking(&mut input, &cancel, move || {
            read_elements(source, &output, &reader_cancel)
        })
        .await
    }
}

fn read_elements(source: InputKind, output: &Sender<Record>, cancel: &CancelToken) -> Result<()> {
    let reader = BufReader::new(source.open()?);
    let mut de = serde_json::Deserializer::from_reader(reader);
    let mut forward = Forward {
        output,
        cancel,
        read: 0,
        stopped: false,
    };

    let parsed = (&mut de).deserialize_seq(&mut forward);
    if forward.stopped {
        return Ok(());
    }
    parsed.map_err(|e| Error::source_read(forward.read + 1, e))?;
    de.end()
        .map_err(|e| Error::source_read(forward.read, format!("after the array: {e}")))
}

struct Forward<'a> {
    output: &'a Sender<Record>,
    cancel: &'a CancelToken,
    read: u64,
    stopped: bool,
}

impl<'de, 'a, 'b> Visitor<'de> for &'b mut Forward<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON array of documents")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(record) = seq.next_element::<Record>()? {
            self.read += 1;
            if self.cancel.is_cancelled() {
                #[cfg(feature = "tracing")]
                tracing::event!(tracing::Level::DEBUG, event = "bulkpipe.cancelled", stage = "json_array_source", where_ = "read", "bulkpipe.cancelled");
                self.stopped = true;
                return Ok(());
            }
            if self.output.blocking_send(record).is_err() {
                #[cfg(feature = "tracing")]
                tracing::event!(tracing::Level::INFO, event = "bulkpipe.downstream.closed", stage = "json_array_source", "bulkpipe.downstream.closed");
                self.stopped = true;
                return Ok(());
            }
        }
        Ok(())
    }
}
