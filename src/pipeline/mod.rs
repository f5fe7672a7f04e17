//! Enrichment Pipeline Module
//!
//! ```text
//! violations ──► question ──► retrieve ──► generate ──► report writer
//!               (+ gain map)    │ empty                  (single task)
//!                               └──► fallback answer
//! ```
//!
//! - **answer**: retrieval-augmented answering with timeouts, retry and
//!   optional context chunking
//! - **report**: incremental JSON report and its single-writer actor
//! - **orchestrator**: per-violation state machine, concurrency,
//!   cancellation and failure policy

use thiserror::Error;

pub mod answer;
pub mod orchestrator;
pub mod report;

pub use answer::{AnswerError, AnswerSettings, RagAnswerer};
pub use orchestrator::{build_question, enrich, select_gains, Enricher, RunSummary};
pub use report::{ReportActor, ReportError, ReportHandle, ReportWriter};

use crate::context::RetrievalError;
use crate::llm::GenerationError;

/// Failure of an enrichment run, naming the violation and stage.
///
/// `position` is 1-based, matching the `violation` field in the logs.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Retrieval failed for violation #{position} ({tag}): {source}")]
    Retrieval {
        position: usize,
        tag: String,
        #[source]
        source: RetrievalError,
    },

    #[error("Generation failed for violation #{position} ({tag}): {source}")]
    Generation {
        position: usize,
        tag: String,
        #[source]
        source: GenerationError,
    },

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Enrichment cancelled after {written} alerts were written")]
    Cancelled { written: usize },
}

impl EnrichmentError {
    /// Attach the violation's 0-based `index` and tag to an answer failure
    pub(crate) fn from_answer(index: usize, tag: String, err: AnswerError) -> Self {
        let position = index + 1;
        match err {
            AnswerError::Retrieval(source) => Self::Retrieval { position, tag, source },
            AnswerError::Generation(source) => Self::Generation { position, tag, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_position_is_one_based() {
        let err = EnrichmentError::from_answer(
            0,
            "T1".to_string(),
            AnswerError::Retrieval(RetrievalError::Unavailable("down".to_string())),
        );
        assert!(matches!(err, EnrichmentError::Retrieval { position: 1, .. }));
        assert!(err.to_string().starts_with("Retrieval failed for violation #1 (T1): "));
    }
}
