use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad configuration, detected before any record is read. Never retried.
    #[error("invalid configuration: {0}")]
    Validation(String),

    /// A malformed input record. Aborts the run instead of skipping the record.
    #[error("failed to read record {record}: {reason}")]
    SourceRead { record: u64, reason: String },

    /// One failed submission attempt against the remote store.
    #[error("remote store error: {0}")]
    Remote(String),

    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// A chunk could not be delivered; the whole run is aborted.
    #[error("chunk {chunk} could not be delivered: {source}")]
    Dispatch {
        chunk: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("pipeline error: {context}")]
    Pipeline { context: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[cfg(feature = "elasticsearch")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn pipeline(context: &'static str) -> Self {
        Self::Pipeline { context }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn source_read(record: u64, reason: impl std::fmt::Display) -> Self {
        Self::SourceRead {
            record,
            reason: reason.to_string(),
        }
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_source_read(&self) -> bool {
        matches!(self, Self::SourceRead { .. })
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch { .. } | Self::RetryExhausted { .. })
    }

    /// Process exit status for a run that ended with this error.
    ///
    /// `2` configuration, `3` input, `4` delivery, `1` everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::SourceRead { .. } | Self::Json(_) => 3,
            Self::Dispatch { .. } | Self::RetryExhausted { .. } => 4,
            _ => 1,
        }
    }

    /// Short label naming the class of failure, for user-facing messages.
    pub fn class(&self) -> &'static str {
        match self.exit_code() {
            2 => "configuration error",
            3 => "read error",
            4 => "delivery failed after retries",
            _ => "error",
        }
    }
}
