//! Azure Cognitive Search backend
//!
//! Issues simple full-text queries against one index:
//! `POST {endpoint}/indexes/{index}/docs/search?api-version=...`
//! and reads the `content` field of each hit.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{ContextRetriever, RetrievalError, SearchHit};

/// Default REST API version for document search
pub const DEFAULT_API_VERSION: &str = "2023-11-01";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    value: Vec<SearchDocument>,
}

#[derive(Debug, Deserialize)]
struct SearchDocument {
    #[serde(rename = "@search.score", default)]
    score: f64,
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for one search index
#[derive(Clone)]
pub struct AzureSearchRetriever {
    http: reqwest::Client,
    endpoint: String,
    index_name: String,
    api_key: String,
    api_version: String,
}

impl AzureSearchRetriever {
    /// Build a retriever. `timeout` bounds each HTTP request.
    pub fn new(
        endpoint: &str,
        index_name: &str,
        api_key: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint, self.index_name, self.api_version
        )
    }

    /// Index name for logging
    pub fn index_name(&self) -> &str {
        &self.index_name
    }
}

#[async_trait]
impl ContextRetriever for AzureSearchRetriever {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, RetrievalError> {
        let body = serde_json::json!({
            "search": query,
            "top": top,
        });

        let resp = self
            .http
            .post(self.search_url())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: SearchResponse =
            serde_json::from_slice(&bytes).map_err(|e| RetrievalError::Decode(e.to_string()))?;

        let hits: Vec<SearchHit> = parsed
            .value
            .into_iter()
            .filter_map(|doc| {
                doc.content.map(|content| SearchHit {
                    content,
                    score: doc.score,
                })
            })
            .collect();

        debug!(index = %self.index_name, hits = hits.len(), "Search completed");
        Ok(hits)
    }

    fn retriever_name(&self) -> &'static str {
        "AzureSearch"
    }
}
