//! Chat-completions backend (OpenAI and Azure OpenAI)
//!
//! Both services accept the same message payload; they differ in URL,
//! authentication header and whether the model is named in the body.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{CompletionBackend, GenerationError};

/// Default OpenAI API base URL
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
/// Azure OpenAI API version used for chat completions
pub const AZURE_API_VERSION: &str = "2023-05-15";

/// Which flavour of the chat-completions API to call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// `POST {base_url}/chat/completions` with a bearer token
    OpenAi { base_url: String, model: String },
    /// `POST {endpoint}/openai/deployments/{deployment}/chat/completions` with `api-key`
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// HTTP client for a chat-completions endpoint
#[derive(Clone)]
pub struct ChatCompletionsBackend {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
}

impl ChatCompletionsBackend {
    /// Build a backend. `timeout` bounds each HTTP request.
    pub fn new(
        provider: Provider,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            provider,
            api_key: api_key.to_string(),
        })
    }

    /// Chat-completions URL for the configured provider
    pub fn url(&self) -> String {
        match &self.provider {
            Provider::OpenAi { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Provider::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    fn model(&self) -> Option<&str> {
        match &self.provider {
            Provider::OpenAi { model, .. } => Some(model),
            Provider::Azure { .. } => None,
        }
    }
}

/// Pull the first choice's text out of a response body
fn extract_text(body: &[u8]) -> Result<String, GenerationError> {
    let parsed: ChatResponse =
        serde_json::from_slice(body).map_err(|e| GenerationError::Decode(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl CompletionBackend for ChatCompletionsBackend {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: self.model(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            max_tokens,
        };

        let builder = self.http.post(self.url()).json(&request);
        let builder = match self.provider {
            Provider::OpenAi { .. } => builder.bearer_auth(&self.api_key),
            Provider::Azure { .. } => builder.header("api-key", &self.api_key),
        };

        let resp = builder.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        let text = extract_text(&body)?;
        debug!(backend = self.backend_name(), chars = text.len(), "Completion received");
        Ok(text)
    }

    fn backend_name(&self) -> &'static str {
        match self.provider {
            Provider::OpenAi { .. } => "OpenAI",
            Provider::Azure { .. } => "AzureOpenAI",
        }
    }
}
