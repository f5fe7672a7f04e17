//! Telemetry snapshot loading and subsystem filtering

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{RawTable, SourceError};
use crate::types::TelemetryRow;

/// Column names of the telemetry export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryColumns {
    pub tag_name: String,
    pub value: String,
    pub minimum: String,
    pub maximum: String,
    /// Optional; rows carry `None` when the export has no such column
    pub timestamp: String,
}

impl Default for TelemetryColumns {
    fn default() -> Self {
        Self {
            tag_name: "IDX_TagName".to_string(),
            value: "ValueReal".to_string(),
            minimum: "IDX_Minimum".to_string(),
            maximum: "IDX_Maximum".to_string(),
            timestamp: "Timestamp".to_string(),
        }
    }
}

/// Load a telemetry export using the default column names and keep the
/// rows whose tag contains `subsystem_name` (case-sensitive).
pub fn load_and_filter(
    source_path: impl AsRef<Path>,
    subsystem_name: &str,
) -> Result<Vec<TelemetryRow>, SourceError> {
    load_and_filter_with(source_path, subsystem_name, &TelemetryColumns::default())
}

/// Same as [`load_and_filter`] with explicit column names.
pub fn load_and_filter_with(
    source_path: impl AsRef<Path>,
    subsystem_name: &str,
    columns: &TelemetryColumns,
) -> Result<Vec<TelemetryRow>, SourceError> {
    let path = source_path.as_ref();
    info!(path = %path.display(), "Loading telemetry snapshot");
    let table = RawTable::read_csv(path)?;

    info!(apc = %subsystem_name, "Filtering telemetry for APC");
    let rows = filter_table(&table, subsystem_name, columns)?;

    info!(
        total = table.len(),
        retained = rows.len(),
        "Filtered telemetry snapshot"
    );
    Ok(rows)
}

/// Filter an already-parsed table. Rows with an empty tag are dropped.
pub fn filter_table(
    table: &RawTable,
    subsystem_name: &str,
    columns: &TelemetryColumns,
) -> Result<Vec<TelemetryRow>, SourceError> {
    let missing = table.missing_columns(&[
        columns.tag_name.as_str(),
        columns.value.as_str(),
        columns.minimum.as_str(),
        columns.maximum.as_str(),
    ]);
    if !missing.is_empty() {
        return Err(SourceError::malformed(
            table.source(),
            format!("missing telemetry columns: {}", missing.join(", ")),
        ));
    }

    let index = |name: &str| table.column_index(name).unwrap_or_default();
    let tag_idx = index(&columns.tag_name);
    let value_idx = index(&columns.value);
    let min_idx = index(&columns.minimum);
    let max_idx = index(&columns.maximum);
    let ts_idx = table.column_index(&columns.timestamp);

    let mut rows = Vec::new();
    for row in 0..table.len() {
        let Some(tag) = table.cell(row, tag_idx) else {
            continue;
        };
        if !tag.contains(subsystem_name) {
            continue;
        }

        let number = |col: usize, label: &str| -> Result<f64, SourceError> {
            parse_number(table.cell(row, col)).ok_or_else(|| {
                SourceError::malformed(
                    table.source(),
                    format!(
                        "non-numeric {label} {:?} for tag {tag} (data row {})",
                        table.cell(row, col).unwrap_or_default(),
                        row + 1
                    ),
                )
            })
        };

        rows.push(TelemetryRow {
            tag_name: tag.to_string(),
            value: number(value_idx, "value")?,
            minimum: number(min_idx, "minimum")?,
            maximum: number(max_idx, "maximum")?,
            timestamp: ts_idx.and_then(|i| table.cell(row, i)).map(str::to_string),
        });
    }
    Ok(rows)
}

/// Parse a numeric cell. Empty cells are NaN; text that is not a number is `None`.
fn parse_number(cell: Option<&str>) -> Option<f64> {
    match cell.map(str::trim) {
        None | Some("") => Some(f64::NAN),
        Some(text) => text.parse::<f64>().ok(),
    }
}
