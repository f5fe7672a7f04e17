//! Enriched alerts - the records persisted to the report file

use serde::{Deserialize, Serialize};

/// A violation with its generated follow-up question and model answer.
///
/// Field names are the report's on-disk JSON keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedAlert {
    pub original_message: String,
    pub gains_context: String,
    pub follow_up_question: String,
    pub follow_up_answer: String,
}
