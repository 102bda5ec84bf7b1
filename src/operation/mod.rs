//! Records and the index operations built from them.

use bytes::Bytes;

use crate::error::Result;

pub mod mapper;

/// One input record.
///
/// Delimited input produces an object whose keys follow the header order;
/// JSON input may produce any value.
pub type Record = serde_json::Value;

/// Action line preceding every document in a bulk request body.
pub const ACTION_LINE: &[u8] = b"{\"index\":{}}\n";

/// A record paired with its encoded form.
///
/// The record is serialized exactly once, when the operation is built; the
/// byte length used for chunk sizing and the payload sent to the store are
/// both taken from that encoding.
#[derive(Debug, Clone)]
pub struct IndexOperation {
    record: Record,
    encoded: Bytes,
}

impl IndexOperation {
    pub fn new(record: Record) -> Result<Self> {
        let encoded = Bytes::from(serde_json::to_vec(&record)?);
        Ok(Self { record, encoded })
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Compact JSON encoding of the record.
    pub fn encoded(&self) -> &Bytes {
        &self.encoded
    }

    /// Bytes this operation adds to a bulk request body: the action line,
    /// the document and its newline.
    pub fn byte_len(&self) -> usize {
        ACTION_LINE.len() + self.encoded.len() + 1
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}
