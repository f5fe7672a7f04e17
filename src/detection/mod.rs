//! Threshold violation detection
//!
//! Pure scan over filtered telemetry: a row violates when its value is
//! below the minimum or above the maximum. Output order follows input order;
//! nothing is sorted or deduplicated.

use crate::types::{TelemetryRow, ViolationRecord};

/// Scan rows for out-of-band readings.
pub fn detect_violations(rows: &[TelemetryRow]) -> Vec<ViolationRecord> {
    let violations: Vec<ViolationRecord> =
        rows.iter().filter_map(ViolationRecord::from_row).collect();
    tracing::info!(
        rows = rows.len(),
        violations = violations.len(),
        "Calculated threshold violations"
    );
    violations
}
