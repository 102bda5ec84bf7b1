//! Record sources: single-pass readers feeding the pipeline.
//!
//! Parsing is blocking work, so each source reads on a blocking thread and
//! hands records over with `blocking_send`; a full channel parks the reader
//! until the pipeline asks for more.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Mutex;

use tokio::sync::mpsc::Receiver;

use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;

pub mod delimited;
pub mod json;

pub use delimited::{sanitize_delimiter, DelimitedSource, Delimiter};
pub use json::JsonArraySource;

/// Where a source reads its bytes from. Can be opened once.
pub struct Input {
    kind: Mutex<Option<InputKind>>,
    label: String,
}

pub(crate) enum InputKind {
    Path(PathBuf),
    Stdin,
    Reader(Box<dyn Read + Send>),
}

impl Input {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            kind: Mutex::new(Some(InputKind::Path(path))),
        }
    }

    pub fn stdin() -> Self {
        Self {
            label: "-".to_owned(),
            kind: Mutex::new(Some(InputKind::Stdin)),
        }
    }

    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self {
            label: "<reader>".to_owned(),
            kind: Mutex::new(Some(InputKind::Reader(Box::new(reader)))),
        }
    }

    /// `-` means standard input, anything else is a file path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::stdin()
        } else {
            Self::path(arg)
        }
    }

    pub(crate) fn take(&self) -> Result<InputKind> {
        self.kind
            .lock()
            .map_err(|_| Error::pipeline("input lock poisoned"))?
            .take()
            .ok_or(Error::pipeline("input already consumed"))
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Input").field(&self.label).finish()
    }
}

impl InputKind {
    pub(crate) fn open(self) -> Result<Box<dyn Read + Send>> {
        Ok(match self {
            InputKind::Path(path) => Box::new(File::open(path)?),
            InputKind::Stdin => Box::new(std::io::stdin()),
            InputKind::Reader(reader) => reader,
        })
    }
}

/// Wait for the start signal, then run `read` on a blocking thread.
pub(crate) async fn start_blocking<F>(
    start: &mut Receiver<()>,
    cancel: &CancelToken,
    read: F,
) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        _ = start.recv() => {}
    }
    tokio::task::spawn_blocking(read).await?
}
