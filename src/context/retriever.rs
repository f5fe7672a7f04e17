//! Retriever trait and shared types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One ranked fragment returned by a search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub score: f64,
}

/// Search backend failures
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed search response: {0}")]
    Decode(String),

    #[error("Search timed out after {0:?}")]
    Timeout(Duration),

    #[error("Search backend unavailable: {0}")]
    Unavailable(String),
}

/// Trait for context retrieval backends
///
/// Implementations must be thread-safe (Send + Sync); the orchestrator
/// shares one retriever across concurrent violations.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Return up to `top` fragments for `query`, best first.
    async fn search(&self, query: &str, top: usize) -> Result<Vec<SearchHit>, RetrievalError>;

    /// Backend name for logging
    fn retriever_name(&self) -> &'static str;
}
