//! LLM Backend Module
//!
//! Provides a unified interface for chat-completion backends.
//!
//! ## Architecture
//!
//! - **CompletionBackend**: `complete(system_prompt, user_prompt, max_tokens)`
//! - **ChatCompletionsBackend**: OpenAI or Azure OpenAI chat-completions API
//! - **prompts**: user-prompt templates for answers and chunk summaries

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod openai;
pub mod prompts;

pub use openai::{ChatCompletionsBackend, Provider};

/// Completion backend failures
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Completion service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed completion response: {0}")]
    Decode(String),

    #[error("Completion response contained no text")]
    EmptyResponse,

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),
}

/// Unified trait for completion backends
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate a response for `user_prompt` under `system_prompt`.
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;

    /// Get the backend name for logging
    fn backend_name(&self) -> &'static str;
}
