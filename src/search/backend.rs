//! Search index backends

use crate::auth::Authorizer;
use crate::error::{DlhubError, DlhubResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One sort key of a search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field_name: String,
    /// `asc` or `desc`
    pub order: String,
}

/// Body of an advanced-query search request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    pub advanced: bool,
    pub limit: usize,
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
}

/// Records returned by a search, plus the total number of matches
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<Value>,
    pub total: u64,
}

/// Executes search requests against an index
#[async_trait]
pub trait SearchBackend: Send + Sync + std::fmt::Debug {
    async fn search(&self, request: &SearchRequest) -> DlhubResult<SearchResponse>;
}

#[derive(Debug, Deserialize)]
struct GmetaResponse {
    #[serde(default)]
    gmeta: Vec<GmetaEntry>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct GmetaEntry {
    #[serde(default)]
    entries: Vec<GmetaContent>,
}

#[derive(Debug, Deserialize)]
struct GmetaContent {
    content: Value,
}

/// Globus Search index, queried over HTTP
#[derive(Debug, Clone)]
pub struct GlobusSearchBackend {
    http: reqwest::Client,
    base_url: String,
    index: String,
    authorizer: Arc<dyn Authorizer>,
}

impl GlobusSearchBackend {
    pub fn new(
        base_url: &str,
        index: &str,
        authorizer: Arc<dyn Authorizer>,
        timeout: Option<Duration>,
    ) -> DlhubResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
            authorizer,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/v1/index/{}/search", self.base_url, self.index)
    }
}

#[async_trait]
impl SearchBackend for GlobusSearchBackend {
    async fn search(&self, request: &SearchRequest) -> DlhubResult<SearchResponse> {
        let url = self.search_url();
        tracing::debug!(url = %url, query = %request.q, limit = request.limit, "Querying search index");

        let mut call = self.http.post(&url).json(request);
        if let Some(header) = self.authorizer.authorization_header() {
            call = call.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = call.send().await?;
        let status = response.status();
        crate::metrics::record_request("search", status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Search request failed");
            return Err(DlhubError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GmetaResponse = response.json().await?;
        let results = parsed
            .gmeta
            .into_iter()
            .flat_map(|entry| entry.entries.into_iter().map(|e| e.content))
            .collect();

        Ok(SearchResponse {
            results,
            total: parsed.total,
        })
    }
}
