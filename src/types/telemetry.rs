//! Telemetry readings and detected violations

use serde::{Deserialize, Serialize};
use std::fmt;

/// One sampled reading of a controlled variable.
///
/// `minimum <= maximum` is assumed but never validated; see
/// [`ViolationRecord::from_row`] for how malformed bounds resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    /// Tag identifier, e.g. `APC-J140_BIN_005C.CV01`
    pub tag_name: String,
    /// Observed value (NaN when the cell was empty)
    pub value: f64,
    /// Lower bound of the operating band
    pub minimum: f64,
    /// Upper bound of the operating band
    pub maximum: f64,
    /// Sample timestamp as exported, when the snapshot carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Which side of the operating band a reading fell out of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundKind {
    BelowMinimum,
    AboveMaximum,
}

impl BoundKind {
    /// Phrase used inside the alert message
    pub const fn phrase(self) -> &'static str {
        match self {
            Self::BelowMinimum => "less than Minimum",
            Self::AboveMaximum => "greater than Maximum",
        }
    }
}

impl fmt::Display for BoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BelowMinimum => write!(f, "below minimum"),
            Self::AboveMaximum => write!(f, "above maximum"),
        }
    }
}

/// A reading outside its configured [minimum, maximum] band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub tag_name: String,
    pub observed_value: f64,
    /// The bound that was crossed (minimum or maximum)
    pub bound: f64,
    pub bound_kind: BoundKind,
    /// Fixed-format sentence, e.g. `X: Current value 5 is less than Minimum value 10`
    pub message: String,
}

impl ViolationRecord {
    /// Classify a row, returning `None` when the value is inside its band.
    ///
    /// The minimum is checked first, so a row with inverted bounds whose
    /// value sits below the minimum and above the maximum is reported as
    /// `BelowMinimum`. NaN values never violate.
    pub fn from_row(row: &TelemetryRow) -> Option<Self> {
        let (bound_kind, bound) = if row.value < row.minimum {
            (BoundKind::BelowMinimum, row.minimum)
        } else if row.value > row.maximum {
            (BoundKind::AboveMaximum, row.maximum)
        } else {
            return None;
        };

        let message = format!(
            "{}: Current value {} is {} value {}",
            row.tag_name,
            row.value,
            bound_kind.phrase(),
            bound
        );

        Some(Self {
            tag_name: row.tag_name.clone(),
            observed_value: row.value,
            bound,
            bound_kind,
            message,
        })
    }
}
