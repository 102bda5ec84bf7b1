//! Elasticsearch `_bulk` sink and the index administration calls the
//! command-line tools make before loading.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::chunk::Chunk;
use crate::error::{Error, Result};
use crate::operation::ACTION_LINE;
use crate::store::BulkSink;

pub const DEFAULT_HOST: &str = "http://127.0.0.1:9200/";

const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIndex {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteIndex {
    Deleted,
    NotFound,
}

/// Bulk-indexes chunks into one index (and, for older clusters, one
/// document type).
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    host: String,
    index: String,
    doc_type: Option<String>,
    timeout: Duration,
    admin: Client,
}

impl ElasticsearchSink {
    pub fn new(host: impl Into<String>, index: impl Into<String>) -> Result<Self> {
        let host = host.into();
        let index = index.into();
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(Error::validation(format!(
                "host {host:?} must be an http(s) URL"
            )));
        }
        if index.trim().is_empty() {
            return Err(Error::validation("index name must not be empty"));
        }
        let timeout = Duration::from_secs(60);
        Ok(Self {
            host: host.trim_end_matches('/').to_owned(),
            index,
            doc_type: None,
            timeout,
            admin: build_client(timeout)?,
        })
    }

    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into()).filter(|t: &String| !t.is_empty());
        self
    }

    /// Per-request timeout for every connection made from now on.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        self.timeout = timeout;
        self.admin = build_client(timeout)?;
        Ok(self)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn bulk_url(&self) -> String {
        match &self.doc_type {
            Some(doc_type) => format!("{}/{}/{}/_bulk", self.host, self.index, doc_type),
            None => format!("{}/{}/_bulk", self.host, self.index),
        }
    }

    pub fn mapping_url(&self) -> String {
        match &self.doc_type {
            Some(doc_type) => format!("{}/{}/_mapping/{}", self.host, self.index, doc_type),
            None => format!("{}/{}/_mapping", self.host, self.index),
        }
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.host, self.index)
    }

    pub async fn create_index(&self) -> Result<CreateIndex> {
        let resp = self.admin.put(self.index_url()).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(CreateIndex::Created);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("already_exists_exception") {
            return Ok(CreateIndex::AlreadyExists);
        }
        Err(Error::remote(format!(
            "create index {} failed ({status}): {body}",
            self.index
        )))
    }

    pub async fn delete_index(&self) -> Result<DeleteIndex> {
        let resp = self.admin.delete(self.index_url()).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(DeleteIndex::Deleted);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(DeleteIndex::NotFound);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::remote(format!(
            "delete index {} failed ({status}): {body}",
            self.index
        )))
    }

    pub async fn put_mapping(&self, mapping: &Value) -> Result<()> {
        let resp = self.admin.put(self.mapping_url()).json(mapping).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::remote(format!(
            "put mapping on {} failed ({status}): {body}",
            self.index
        )))
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// The `_bulk` request body for `chunk`: an action line followed by the
/// document, per operation, in chunk order. Its length is
/// `chunk.byte_len()`.
pub fn render_bulk_body(chunk: &Chunk) -> Vec<u8> {
    let mut body = Vec::with_capacity(chunk.byte_len());
    for op in chunk {
        body.extend_from_slice(ACTION_LINE);
        body.extend_from_slice(op.encoded());
        body.push(b'\n');
    }
    body
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl BulkResponse {
    fn first_error(&self) -> Option<String> {
        self.items
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|item| item.values())
            .find_map(|result| result.get("error"))
            .map(|error| match error.get("reason").and_then(Value::as_str) {
                Some(reason) => reason.to_owned(),
                None => error.to_string(),
            })
    }
}

#[async_trait]
impl BulkSink for ElasticsearchSink {
    type Connection = Client;

    async fn connect(&self) -> Result<Client> {
        build_client(self.timeout)
    }

    /// Send `chunk` as one `_bulk` request.
    ///
    /// A non-2xx status or a reply with `"errors": true` fails the attempt,
    /// and the retry sends the whole chunk again. Action lines carry no
    /// `_id`, so items the store had already accepted are indexed a second
    /// time.
    async fn submit(&self, connection: &Client, chunk: &Chunk) -> Result<()> {
        let resp = connection
            .post(self.bulk_url())
            .header(CONTENT_TYPE, HeaderValue::from_static(NDJSON))
            .body(render_bulk_body(chunk))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::remote(format!("bulk request failed ({status}): {body}")));
        }

        let reply: BulkResponse = resp.json().await?;
        if reply.errors {
            let reason = reply
                .first_error()
                .unwrap_or_else(|| "unknown item error".to_owned());
            return Err(Error::remote(format!(
                "bulk request rejected items of chunk {}: {reason}",
                chunk.ordinal()
            )));
        }
        Ok(())
    }
}
