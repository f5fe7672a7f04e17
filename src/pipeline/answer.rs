//! Retrieval-augmented answering
//!
//! Retrieve supporting fragments, short-circuit to a fixed answer when
//! there are none, otherwise ask the completion backend. Every remote call
//! runs under its own timeout and the bounded retry policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::defaults::CHARS_PER_TOKEN;
use crate::config::{AppConfig, ChunkingConfig, RetryPolicy};
use crate::context::{ContextRetriever, RetrievalError, SearchHit};
use crate::llm::prompts::{build_answer_prompt, build_summary_prompt, NO_CONTEXT_ANSWER};
use crate::llm::{CompletionBackend, GenerationError};

/// Failure of one question, tagged with the stage that failed.
///
/// The `Display` form is what gets recorded as the answer when the run
/// continues past failures.
#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] RetrievalError),

    #[error("Generation failed: {0}")]
    Generation(#[source] GenerationError),
}

/// Per-call limits for one answerer
#[derive(Debug, Clone)]
pub struct AnswerSettings {
    pub top_n: usize,
    pub max_tokens: u32,
    pub retrieval_timeout: Duration,
    pub generation_timeout: Duration,
    pub retry: RetryPolicy,
    pub chunking: ChunkingConfig,
}

impl AnswerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_n: config.search.top_n,
            max_tokens: config.llm.max_tokens,
            retrieval_timeout: config.enrichment.retrieval_timeout(),
            generation_timeout: config.enrichment.generation_timeout(),
            retry: config.enrichment.retry,
            chunking: config.chunking.clone(),
        }
    }
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

// ============================================================================
// Answerer
// ============================================================================

/// Answers free-text questions from retrieved context.
pub struct RagAnswerer {
    retriever: Arc<dyn ContextRetriever>,
    generator: Arc<dyn CompletionBackend>,
    system_prompt: String,
    settings: AnswerSettings,
}

impl RagAnswerer {
    pub fn new(
        retriever: Arc<dyn ContextRetriever>,
        generator: Arc<dyn CompletionBackend>,
        system_prompt: impl Into<String>,
        settings: AnswerSettings,
    ) -> Self {
        Self {
            retriever,
            generator,
            system_prompt: system_prompt.into(),
            settings,
        }
    }

    /// Answer `question`, returning the trimmed model text.
    ///
    /// An empty retrieval result yields [`NO_CONTEXT_ANSWER`] and the
    /// completion backend is not called.
    pub async fn answer(&self, question: &str) -> Result<String, AnswerError> {
        let hits = self.retrieve(question).await.map_err(AnswerError::Retrieval)?;
        if hits.is_empty() {
            debug!(
                retriever = self.retriever.retriever_name(),
                "No context retrieved, using fallback answer"
            );
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let fragments: Vec<String> = hits.into_iter().map(|hit| hit.content).collect();
        debug!(fragments = fragments.len(), "Retrieved context");

        let answer = if self.settings.chunking.enabled {
            self.answer_chunked(question, &fragments).await?
        } else {
            let prompt = build_answer_prompt(&fragments.join("\n"), question);
            self.generate(&prompt).await?
        };
        Ok(answer.trim().to_string())
    }

    /// One completion per context chunk, merged by a summary completion
    /// when the context did not fit in a single chunk.
    async fn answer_chunked(
        &self,
        question: &str,
        fragments: &[String],
    ) -> Result<String, AnswerError> {
        let context = fragments.join("\n\n");
        let chunking = &self.settings.chunking;
        let budget = chunking
            .max_context_tokens
            .saturating_sub(estimate_tokens(&self.system_prompt))
            .saturating_sub(estimate_tokens(question))
            .saturating_sub(chunking.reserve_tokens);
        if budget <= chunking.overlap_tokens {
            warn!(
                budget,
                overlap = chunking.overlap_tokens,
                "Prompt leaves almost no room for context, using minimal chunks"
            );
        }

        let chunks = chunk_context(&context, budget, chunking.overlap_tokens);
        if chunks.len() > 1 {
            info!(chunks = chunks.len(), budget_tokens = budget, "Context split into chunks");
        }

        let mut responses = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let text = self.generate(&build_answer_prompt(chunk, question)).await?;
            responses.push(text.trim().to_string());
        }

        if responses.len() == 1 {
            return Ok(responses.remove(0));
        }
        self.generate(&build_summary_prompt(question, &responses)).await
    }

    async fn retrieve(&self, question: &str) -> Result<Vec<SearchHit>, RetrievalError> {
        let limit = self.settings.retrieval_timeout;
        let top = self.settings.top_n;
        with_retry(&self.settings.retry, "retrieval", || async move {
            match tokio::time::timeout(limit, self.retriever.search(question, top)).await {
                Ok(result) => result,
                Err(_) => Err(RetrievalError::Timeout(limit)),
            }
        })
        .await
    }

    async fn generate(&self, user_prompt: &str) -> Result<String, AnswerError> {
        let limit = self.settings.generation_timeout;
        let max_tokens = self.settings.max_tokens;
        with_retry(&self.settings.retry, "generation", || async move {
            let call = self
                .generator
                .complete(&self.system_prompt, user_prompt, max_tokens);
            match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout(limit)),
            }
        })
        .await
        .map_err(AnswerError::Generation)
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Run `op` until it succeeds or the policy's attempts are used up,
/// sleeping with exponential backoff between attempts.
async fn with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    stage: &'static str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    stage,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Chunking
// ============================================================================

/// Rough token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Split `text` into windows of `budget_tokens` that overlap by
/// `overlap_tokens`. Text within budget comes back as one chunk.
pub fn chunk_context(text: &str, budget_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let size = budget_tokens.max(overlap_tokens + 1) * CHARS_PER_TOKEN;
    let step = size - overlap_tokens * CHARS_PER_TOKEN;

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedRetriever {
        hits: Vec<&'static str>,
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    impl FixedRetriever {
        fn new(hits: Vec<&'static str>) -> Self {
            Self {
                hits,
                failures_before_success: 0,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContextRetriever for FixedRetriever {
        async fn search(
            &self,
            _query: &str,
            _top: usize,
        ) -> Result<Vec<SearchHit>, RetrievalError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(RetrievalError::Unavailable("index warming up".to_string()));
            }
            Ok(self
                .hits
                .iter()
                .map(|c| SearchHit {
                    content: (*c).to_string(),
                    score: 1.0,
                })
                .collect())
        }

        fn retriever_name(&self) -> &'static str {
            "Fixed"
        }
    }

    struct SlowRetriever;

    #[async_trait]
    impl ContextRetriever for SlowRetriever {
        async fn search(
            &self,
            _query: &str,
            _top: usize,
        ) -> Result<Vec<SearchHit>, RetrievalError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }

        fn retriever_name(&self) -> &'static str {
            "Slow"
        }
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionBackend for RecordingBackend {
        async fn complete(
            &self,
            _system_prompt: &str,
            user_prompt: &str,
            _max_tokens: u32,
        ) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(user_prompt.to_string());
            Ok(format!("  answer {n}\n"))
        }

        fn backend_name(&self) -> &'static str {
            "Recording"
        }
    }

    struct SlowBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for SlowBackend {
        async fn complete(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _max_tokens: u32,
        ) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }

        fn backend_name(&self) -> &'static str {
            "Slow"
        }
    }

    fn fast_settings() -> AnswerSettings {
        AnswerSettings {
            retrieval_timeout: Duration::from_millis(50),
            generation_timeout: Duration::from_millis(50),
            retry: RetryPolicy {
                max_attempts: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            },
            ..AnswerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_empty_context_skips_generation() {
        let backend = Arc::new(RecordingBackend::default());
        let answerer = RagAnswerer::new(
            Arc::new(FixedRetriever::new(vec![])),
            backend.clone(),
            "system",
            fast_settings(),
        );

        let answer = answerer.answer("Why?").await.unwrap();
        assert_eq!(answer, NO_CONTEXT_ANSWER);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fragments_joined_in_order_and_answer_trimmed() {
        let backend = Arc::new(RecordingBackend::default());
        let answerer = RagAnswerer::new(
            Arc::new(FixedRetriever::new(vec!["doc A", "doc B"])),
            backend.clone(),
            "system",
            fast_settings(),
        );

        let answer = answerer.answer("Why?").await.unwrap();
        assert_eq!(answer, "answer 0");
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("Context: doc A\ndoc B\n\nQuestion: Why?"));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let retriever = Arc::new(FixedRetriever {
            failures_before_success: 2,
            ..FixedRetriever::new(vec!["doc"])
        });
        let mut settings = fast_settings();
        settings.retry.max_attempts = 3;
        let answerer = RagAnswerer::new(
            retriever.clone(),
            Arc::new(RecordingBackend::default()),
            "system",
            settings,
        );

        assert_eq!(answerer.answer("Why?").await.unwrap(), "answer 0");
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let retriever = Arc::new(FixedRetriever {
            failures_before_success: 10,
            ..FixedRetriever::new(vec!["doc"])
        });
        let mut settings = fast_settings();
        settings.retry.max_attempts = 2;
        let answerer = RagAnswerer::new(
            retriever.clone(),
            Arc::new(RecordingBackend::default()),
            "system",
            settings,
        );

        let err = answerer.answer("Why?").await.unwrap_err();
        assert!(matches!(err, AnswerError::Retrieval(_)));
        assert!(err.to_string().starts_with("Retrieval failed: "));
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retrieval_timeout_is_a_failure() {
        let answerer = RagAnswerer::new(
            Arc::new(SlowRetriever),
            Arc::new(RecordingBackend::default()),
            "system",
            fast_settings(),
        );

        let err = answerer.answer("Why?").await.unwrap_err();
        assert!(matches!(err, AnswerError::Retrieval(RetrievalError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_generation_timeout_is_a_failure() {
        let backend = Arc::new(SlowBackend {
            calls: AtomicUsize::new(0),
        });
        let mut settings = fast_settings();
        settings.retry.max_attempts = 2;
        let answerer = RagAnswerer::new(
            Arc::new(FixedRetriever::new(vec!["doc"])),
            backend.clone(),
            "system",
            settings,
        );

        let err = answerer.answer("Why?").await.unwrap_err();
        assert!(matches!(err, AnswerError::Generation(GenerationError::Timeout(_))));
        assert!(err.to_string().starts_with("Generation failed: "));
        // Each timed-out attempt counts against the retry budget
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_chunk_context_overlaps() {
        let text: String = ('a'..='z').collect();
        // 3 tokens = 12 chars per chunk, 1 token = 4 chars of overlap
        let chunks = chunk_context(&text, 3, 1);
        assert_eq!(chunks, vec!["abcdefghijkl", "ijklmnopqrst", "qrstuvwxyz"]);
    }

    #[test]
    fn test_chunk_context_small_text_is_single_chunk() {
        assert_eq!(chunk_context("short", 100, 10), vec!["short"]);
    }

    #[tokio::test]
    async fn test_chunked_answer_summarizes_partials() {
        let backend = Arc::new(RecordingBackend::default());
        let mut settings = fast_settings();
        settings.chunking = ChunkingConfig {
            enabled: true,
            max_context_tokens: 10,
            overlap_tokens: 0,
            reserve_tokens: 0,
        };
        // Budget = 10 - 1 (system) - 1 (question) = 8 tokens = 32 chars.
        let answerer = RagAnswerer::new(
            Arc::new(FixedRetriever::new(vec![
                "first fragment with some text in it",
                "second fragment",
            ])),
            backend.clone(),
            "sys",
            settings,
        );

        let answer = answerer.answer("Why?").await.unwrap();
        // Two chunks plus one summary call.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(answer, "answer 2");
        let prompts = backend.prompts.lock().unwrap();
        assert!(prompts[2].contains("Responses:\nanswer 0\nanswer 1"));
    }
}
