//! Data acquisition module
//!
//! Loads the two batch snapshots the pipeline consumes:
//! - Telemetry exports (tag, value, minimum, maximum), filtered to one APC
//! - The controller gain map, normalized into [`GainMapEntry`](crate::types::GainMapEntry)
//!
//! Every loading failure is fatal to the run and names the offending file
//! or columns.

pub mod table;
pub mod telemetry;
pub mod gain_map;

pub use gain_map::{
    format_related_name, gain_map_records, load_gain_map, normalize_gain_map, ColumnTransform,
    GAIN_MAP_COLUMNS,
};
pub use table::RawTable;
pub use telemetry::{load_and_filter, load_and_filter_with, TelemetryColumns};

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Data-loading failures
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Source file has no data rows: {}", .0.display())]
    EmptySource(PathBuf),

    #[error("Malformed source {}: {reason}", path.display())]
    MalformedSource { path: PathBuf, reason: String },

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

impl SourceError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
