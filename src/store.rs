//! Client-side contract for the external document store: named collections
//! of JSON documents with list/get/create/update. The store owns all
//! durable state; the gateway never caches documents across requests.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// A stored document. `revision` is the store's optimistic-concurrency
/// token, incremented on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub attributes: Value,
}

/// Equality filter pushed to the store on list operations.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    fields: Vec<(String, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: &str) -> Self {
        self.fields.push((field.to_string(), value.to_string()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.fields
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Revision conflict updating {collection}/{id}")]
    #[diagnostic(code(coursegate::store::conflict))]
    Conflict { collection: String, id: String },

    #[error("Document store unreachable: {0}")]
    #[diagnostic(code(coursegate::store::transport))]
    Transport(String),

    #[error("Malformed store response: {0}")]
    #[diagnostic(code(coursegate::store::decode))]
    Decode(String),
}

/// The document store seam. `update` with `expected_revision` set fails
/// with `StoreError::Conflict` when the stored revision no longer matches;
/// callers that need read-modify-write safety re-read and retry.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list(
        &self,
        collection: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    async fn create(&self, collection: &str, attributes: Value) -> Result<Document, StoreError>;

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        expected_revision: Option<u64>,
    ) -> Result<Document, StoreError>;
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    documents: Vec<Document>,
}

pub struct HttpDocumentStore {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpDocumentStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn documents_url(&self, collection: &str) -> String {
        format!("{}/v1/collections/{}/documents", self.endpoint, collection)
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn list(
        &self,
        collection: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut request = self.http.get(self.documents_url(collection));
        if let Some(filter) = filter {
            request = request.query(filter.pairs());
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Transport(format!(
                "list {collection} returned {}",
                response.status()
            )));
        }
        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(body.documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let response = self
            .http
            .get(format!("{}/{}", self.documents_url(collection), id))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Transport(format!(
                "get {collection}/{id} returned {}",
                response.status()
            )));
        }
        let doc: Document = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(Some(doc))
    }

    async fn create(&self, collection: &str, attributes: Value) -> Result<Document, StoreError> {
        let response = self
            .http
            .post(self.documents_url(collection))
            .json(&attributes)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(StoreError::Transport(format!(
                "create in {collection} returned {}",
                response.status()
            )));
        }
        let doc: Document = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
        expected_revision: Option<u64>,
    ) -> Result<Document, StoreError> {
        let mut request = self
            .http
            .patch(format!("{}/{}", self.documents_url(collection), id))
            .json(&patch);
        if let Some(revision) = expected_revision {
            request = request.header("if-match", revision.to_string());
        }
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT
            || status == reqwest::StatusCode::PRECONDITION_FAILED
        {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Transport(format!(
                "update {collection}/{id} returned {status}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}
