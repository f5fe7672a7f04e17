//! Enrichment orchestrator
//!
//! For every violation: build the follow-up question, attach gain map
//! context, answer it from retrieved documents and hand the finished alert
//! to the report writer. Violations run through a `futures` stream bounded
//! by the configured concurrency; with `preserve_order` the alerts reach
//! the report in violation order.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::answer::{AnswerError, AnswerSettings, RagAnswerer};
use super::report::{ReportActor, ReportWriter};
use super::EnrichmentError;
use crate::config::defaults::{NO_GAINS_CONTEXT, REPORT_QUEUE_CAPACITY};
use crate::config::{EnrichmentConfig, FailurePolicy, GainSelection};
use crate::context::ContextRetriever;
use crate::llm::CompletionBackend;
use crate::types::{EnrichedAlert, GainMapEntry, ViolationRecord};

const REASONING_REQUEST: &str =
    "Please give reasoning what could be done or describe the situation in further detail";

// ============================================================================
// Question Building
// ============================================================================

/// Follow-up question for a violation message, with optional gain context.
pub fn build_question(message: &str, gains_context: Option<&str>) -> String {
    match gains_context {
        Some(gains) => format!(
            "{message}\n\nAdditional context:\n{gains}\n\n\
             {REASONING_REQUEST}, considering the additional context provided."
        ),
        None => format!("{message}\n\n{REASONING_REQUEST}."),
    }
}

/// Gain map summary to attach to `violation`, if any entry applies.
pub fn select_gains(
    selection: GainSelection,
    violation: &ViolationRecord,
    entries: &[GainMapEntry],
) -> Option<String> {
    match selection {
        GainSelection::First => entries.first().map(GainMapEntry::summary),
        GainSelection::MatchingTag => {
            let matching: Vec<String> = entries
                .iter()
                .filter(|e| e.variable_name.as_deref() == Some(violation.tag_name.as_str()))
                .map(GainMapEntry::summary)
                .collect();
            (!matching.is_empty()).then(|| matching.join("\n"))
        }
        GainSelection::None => None,
    }
}

// ============================================================================
// Run Summary
// ============================================================================

/// Outcome of a completed enrichment run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub total: usize,
    /// Alerts appended to the report, in append order
    pub alerts: Vec<EnrichedAlert>,
    /// Violations recorded with a failure answer (continue policy)
    pub failed: usize,
}

impl RunSummary {
    pub fn written(&self) -> usize {
        self.alerts.len()
    }
}

struct Outcome {
    index: usize,
    tag_name: String,
    original_message: String,
    gains_context: String,
    question: String,
    answer: Result<String, AnswerError>,
}

// ============================================================================
// Enricher
// ============================================================================

/// Drives the per-violation state machine over a whole run.
pub struct Enricher {
    answerer: RagAnswerer,
    settings: EnrichmentConfig,
    cancel: CancellationToken,
}

impl Enricher {
    pub fn new(answerer: RagAnswerer, settings: EnrichmentConfig) -> Self {
        Self {
            answerer,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Enrich every violation and append the alerts to `report`.
    ///
    /// Cancellation stops scheduling new violations; those already in
    /// flight finish and are written whole before `Cancelled` is returned.
    /// Under [`FailurePolicy::Abort`] the first failure ends the run and
    /// every alert written before it stays in the report.
    pub async fn run(
        &self,
        violations: &[ViolationRecord],
        gain_entries: &[GainMapEntry],
        report: ReportWriter,
    ) -> Result<RunSummary, EnrichmentError> {
        let total = violations.len();
        let concurrency = self.settings.concurrency.max(1);
        info!(
            violations = total,
            gain_entries = gain_entries.len(),
            concurrency,
            preserve_order = self.settings.preserve_order,
            failure_policy = ?self.settings.failure_policy,
            "Starting enrichment"
        );

        let (actor, handle) = ReportActor::new(report, REPORT_QUEUE_CAPACITY);
        let writer_task = tokio::spawn(actor.run());

        let cancel = self.cancel.clone();
        let scheduled = stream::iter(violations.iter().enumerate())
            .take_while(move |_| futures::future::ready(!cancel.is_cancelled()))
            .map(|(index, violation)| self.process(index, total, violation, gain_entries));
        let mut outcomes = if self.settings.preserve_order {
            scheduled.buffered(concurrency).boxed()
        } else {
            scheduled.buffer_unordered(concurrency).boxed()
        };

        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };
        let mut halted: Option<EnrichmentError> = None;

        while let Some(outcome) = outcomes.next().await {
            let Outcome {
                index,
                tag_name,
                original_message,
                gains_context,
                question,
                answer,
            } = outcome;

            let follow_up_answer = match answer {
                Ok(text) => text,
                Err(e) => match self.settings.failure_policy {
                    FailurePolicy::Abort => {
                        error!(
                            violation = index + 1,
                            tag = %tag_name,
                            error = %e,
                            "Violation failed, aborting run"
                        );
                        halted = Some(EnrichmentError::from_answer(index, tag_name, e));
                        break;
                    }
                    FailurePolicy::Continue => {
                        warn!(
                            violation = index + 1,
                            tag = %tag_name,
                            error = %e,
                            "Violation failed, recording failure and continuing"
                        );
                        summary.failed += 1;
                        e.to_string()
                    }
                },
            };
            let alert = EnrichedAlert {
                original_message,
                gains_context,
                follow_up_question: question,
                follow_up_answer,
            };

            if let Err(e) = handle.append(alert.clone()).await {
                halted = Some(EnrichmentError::Report(e));
                break;
            }
            summary.alerts.push(alert);
        }

        // Abandon anything still in flight, then let the writer drain.
        drop(outcomes);
        drop(handle);
        if let Err(e) = writer_task.await {
            warn!(error = %e, "Report writer task ended abnormally");
        }

        if let Some(e) = halted {
            return Err(e);
        }
        if self.cancel.is_cancelled() && summary.written() < total {
            warn!(written = summary.written(), total, "Enrichment cancelled");
            return Err(EnrichmentError::Cancelled {
                written: summary.written(),
            });
        }

        info!(
            written = summary.written(),
            failed = summary.failed,
            "Enrichment complete"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        index: usize,
        total: usize,
        violation: &ViolationRecord,
        gain_entries: &[GainMapEntry],
    ) -> Outcome {
        info!(violation = index + 1, total, tag = %violation.tag_name, "Enriching violation");

        let gains = select_gains(self.settings.gain_selection, violation, gain_entries);
        let question = build_question(&violation.message, gains.as_deref());
        let answer = self.answerer.answer(&question).await;

        Outcome {
            index,
            tag_name: violation.tag_name.clone(),
            original_message: violation.message.clone(),
            gains_context: gains.unwrap_or_else(|| NO_GAINS_CONTEXT.to_string()),
            question,
            answer,
        }
    }
}

/// Enrich `violations` sequentially with default settings, persisting each
/// alert to `report` as soon as it is complete.
pub async fn enrich(
    violations: &[ViolationRecord],
    gain_entries: &[GainMapEntry],
    retriever: Arc<dyn ContextRetriever>,
    generator: Arc<dyn CompletionBackend>,
    system_prompt: &str,
    report: ReportWriter,
) -> Result<Vec<EnrichedAlert>, EnrichmentError> {
    let answerer = RagAnswerer::new(retriever, generator, system_prompt, AnswerSettings::default());
    let summary = Enricher::new(answerer, EnrichmentConfig::default())
        .run(violations, gain_entries, report)
        .await?;
    Ok(summary.alerts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundKind, VariableType};

    fn violation(tag: &str) -> ViolationRecord {
        ViolationRecord {
            tag_name: tag.to_string(),
            observed_value: 3.0,
            bound: 5.0,
            bound_kind: BoundKind::BelowMinimum,
            message: format!("{tag}: Current value 3 is less than Minimum value 5"),
        }
    }

    fn entry(variable: &str) -> GainMapEntry {
        GainMapEntry {
            controller_name: Some("J140-BIN-005C".to_string()),
            variable_name: Some(variable.to_string()),
            variable_type: Some(VariableType::Manipulated),
            related_variable_name: Some("Tertiary Crusher Speed".to_string()),
            related_variable_tag: Some("J140-SIC-001".to_string()),
            related_variable_number: Some("1".to_string()),
            gain_tag: Some("J140-BIN-PROFIT_AVERAGE_BIN_LEVEL".to_string()),
            gain_value: Some(0.5),
        }
    }

    #[test]
    fn test_question_without_gains() {
        assert_eq!(
            build_question("T1: msg", None),
            "T1: msg\n\nPlease give reasoning what could be done \
             or describe the situation in further detail."
        );
    }

    #[test]
    fn test_question_with_gains() {
        let q = build_question("T1: msg", Some("Gain Value: 0.5"));
        assert!(q.starts_with(
            "T1: msg\n\nAdditional context:\nGain Value: 0.5\n\nPlease give reasoning"
        ));
        assert!(q.ends_with("considering the additional context provided."));
    }

    #[test]
    fn test_select_first_ignores_tag() {
        let entries = vec![entry("OTHER"), entry("T1")];
        let gains = select_gains(GainSelection::First, &violation("T1"), &entries).unwrap();
        assert!(gains.contains("Variable Name: OTHER"));
        assert!(!gains.contains("Variable Name: T1"));
    }

    #[test]
    fn test_select_matching_tag() {
        let entries = vec![entry("OTHER"), entry("T1"), entry("T1")];
        let gains = select_gains(GainSelection::MatchingTag, &violation("T1"), &entries).unwrap();
        assert_eq!(gains.matches("Variable Name: T1").count(), 2);
        assert!(select_gains(GainSelection::MatchingTag, &violation("T9"), &entries).is_none());
    }

    #[test]
    fn test_select_none_and_empty_map() {
        let entries = vec![entry("T1")];
        assert!(select_gains(GainSelection::None, &violation("T1"), &entries).is_none());
        assert!(select_gains(GainSelection::First, &violation("T1"), &[]).is_none());
    }
}
