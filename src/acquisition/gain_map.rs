//! Gain map normalization
//!
//! The gain map export uses terse controller-database column names. Each
//! required column is paired with one [`ColumnTransform`]; normalization
//! checks the columns, applies the subsystem and gain-type filters, then
//! runs every transform over the retained rows.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

use super::{RawTable, SourceError};
use crate::types::{GainMapEntry, VariableType};

/// Canonical names the transforms produce
mod field {
    pub const CONTROLLER: &str = "Controller";
    pub const VARIABLE_NAME: &str = "Variable Name";
    pub const VARIABLE_TYPE: &str = "Variable Type";
    pub const RELATED_NAME: &str = "Related Variable Name";
    pub const RELATED_TAG: &str = "Related Variable Tag";
    pub const RELATED_NUMBER: &str = "Related Variable Number";
    pub const GAIN_TAG: &str = "Gain Tag";
    pub const GAIN_VALUE: &str = "Gain Value";
}

/// Source column holding the controlled-variable tag (subsystem filter)
const CV_TAG_COLUMN: &str = "CVAPETTAG";
/// Source column holding the gain tag (gain-type filter)
const GAIN_TAG_COLUMN: &str = "GAIN-TAG";

/// How one source column becomes one canonical field
#[derive(Debug, Clone, Copy)]
pub enum ColumnTransform {
    /// Value unchanged, column renamed
    Rename { target: &'static str },
    /// Value mapped through a code lookup; unknown codes pass through unchanged
    Lookup {
        target: &'static str,
        lookup: fn(&str) -> Option<&'static str>,
    },
    /// Value rewritten by a pure function
    Format {
        target: &'static str,
        format: fn(&str) -> String,
    },
}

/// Result of applying a transform to one cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub value: String,
    /// `false` when a lookup found no entry for the input
    pub mapped: bool,
}

impl ColumnTransform {
    pub const fn target(&self) -> &'static str {
        match self {
            Self::Rename { target }
            | Self::Lookup { target, .. }
            | Self::Format { target, .. } => *target,
        }
    }

    pub fn apply(&self, value: &str) -> Transformed {
        match self {
            Self::Rename { .. } => Transformed {
                value: value.to_string(),
                mapped: true,
            },
            Self::Lookup { lookup, .. } => match lookup(value) {
                Some(label) => Transformed {
                    value: label.to_string(),
                    mapped: true,
                },
                None => Transformed {
                    value: value.to_string(),
                    mapped: false,
                },
            },
            Self::Format { format, .. } => Transformed {
                value: format(value),
                mapped: true,
            },
        }
    }
}

/// Replace underscores with spaces, then expand the crusher abbreviation.
pub fn format_related_name(raw: &str) -> String {
    raw.replace('_', " ").replace("Tert Crusher", "Tertiary Crusher")
}

/// Source column → transform, in canonical field order
pub const GAIN_MAP_COLUMNS: &[(&str, ColumnTransform)] = &[
    ("CVNAME", ColumnTransform::Rename { target: field::CONTROLLER }),
    (CV_TAG_COLUMN, ColumnTransform::Rename { target: field::VARIABLE_NAME }),
    (
        "TYPE",
        ColumnTransform::Lookup {
            target: field::VARIABLE_TYPE,
            lookup: VariableType::label_for_code,
        },
    ),
    (
        "MVDVNAME",
        ColumnTransform::Format {
            target: field::RELATED_NAME,
            format: format_related_name,
        },
    ),
    ("MVDVAPETTAG", ColumnTransform::Rename { target: field::RELATED_TAG }),
    ("MVDVNUMBER", ColumnTransform::Rename { target: field::RELATED_NUMBER }),
    (GAIN_TAG_COLUMN, ColumnTransform::Rename { target: field::GAIN_TAG }),
    ("GAIN-VALUE", ColumnTransform::Rename { target: field::GAIN_VALUE }),
];

/// Read a gain map CSV and normalize it.
pub fn load_gain_map(
    path: impl AsRef<Path>,
    subsystem_filter: &str,
    gain_type_filter: &str,
) -> Result<Vec<GainMapEntry>, SourceError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading gain map");
    let table = RawTable::read_csv(path)?;
    normalize_gain_map(&table, subsystem_filter, gain_type_filter)
}

/// Validate, filter and transform a raw gain map table.
///
/// Rows are kept only when the controlled-variable tag contains
/// `subsystem_filter` and the gain tag contains `gain_type_filter`
/// (both case-sensitive; empty cells never match a non-empty filter).
/// Unmapped type codes and missing values are logged, never fatal.
pub fn normalize_gain_map(
    raw_table: &RawTable,
    subsystem_filter: &str,
    gain_type_filter: &str,
) -> Result<Vec<GainMapEntry>, SourceError> {
    // The filter columns are themselves transform sources
    let required: Vec<&str> = GAIN_MAP_COLUMNS.iter().map(|(col, _)| *col).collect();
    let missing = raw_table.missing_columns(&required);
    if !missing.is_empty() {
        warn!(columns = ?missing, "Gain map is missing required columns");
        return Err(SourceError::MissingColumns(missing));
    }

    let index = |name: &str| raw_table.column_index(name).unwrap_or_default();
    let cv_tag_idx = index(CV_TAG_COLUMN);
    let gain_tag_idx = index(GAIN_TAG_COLUMN);
    let rules: Vec<(usize, &ColumnTransform)> = GAIN_MAP_COLUMNS
        .iter()
        .map(|(col, transform)| (index(col), transform))
        .collect();

    info!(
        subsystem = %subsystem_filter,
        gain_type = %gain_type_filter,
        "Applying gain map filters"
    );

    let contains = |cell: Option<&str>, needle: &str| cell.is_some_and(|v| v.contains(needle));

    let mut entries = Vec::new();
    let mut unmapped: BTreeMap<&'static str, BTreeSet<String>> = BTreeMap::new();
    let mut missing_counts: BTreeMap<&'static str, usize> = BTreeMap::new();

    for row in 0..raw_table.len() {
        if !contains(raw_table.cell(row, cv_tag_idx), subsystem_filter)
            || !contains(raw_table.cell(row, gain_tag_idx), gain_type_filter)
        {
            continue;
        }

        let mut fields: BTreeMap<&'static str, String> = BTreeMap::new();
        for (col_idx, transform) in &rules {
            let target = transform.target();
            match raw_table.cell(row, *col_idx) {
                Some(value) => {
                    let out = transform.apply(value);
                    if !out.mapped {
                        unmapped.entry(target).or_default().insert(out.value.clone());
                    }
                    fields.insert(target, out.value);
                }
                None => *missing_counts.entry(target).or_default() += 1,
            }
        }

        let gain_value = match fields.remove(field::GAIN_VALUE) {
            Some(text) => match text.trim().parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(
                        row = row + 1,
                        value = %text,
                        "Non-numeric gain value treated as missing"
                    );
                    *missing_counts.entry(field::GAIN_VALUE).or_default() += 1;
                    None
                }
            },
            None => None,
        };

        entries.push(GainMapEntry {
            controller_name: fields.remove(field::CONTROLLER),
            variable_name: fields.remove(field::VARIABLE_NAME),
            variable_type: fields.remove(field::VARIABLE_TYPE).map(VariableType::from),
            related_variable_name: fields.remove(field::RELATED_NAME),
            related_variable_tag: fields.remove(field::RELATED_TAG),
            related_variable_number: fields.remove(field::RELATED_NUMBER),
            gain_tag: fields.remove(field::GAIN_TAG),
            gain_value,
        });
    }

    debug!(retained = entries.len(), total = raw_table.len(), "Gain map filtered");

    for (column, codes) in &unmapped {
        warn!(column = %column, values = ?codes, "Found unmapped values");
    }
    if !missing_counts.is_empty() {
        warn!(counts = ?missing_counts, "Found missing values after transformation");
    }

    info!(entries = entries.len(), "Gain map normalized");
    Ok(entries)
}

/// Flatten entries into labelled JSON records for export.
///
/// Missing values are written as `0`, matching the reference export.
pub fn gain_map_records(entries: &[GainMapEntry]) -> serde_json::Value {
    fn text(value: Option<&str>) -> serde_json::Value {
        value.map_or_else(|| serde_json::json!(0), |v| serde_json::json!(v))
    }

    let records: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            let mut record = serde_json::Map::new();
            record.insert(field::CONTROLLER.into(), text(e.controller_name.as_deref()));
            record.insert(field::VARIABLE_NAME.into(), text(e.variable_name.as_deref()));
            record.insert(
                field::VARIABLE_TYPE.into(),
                text(e.variable_type.as_ref().map(VariableType::label)),
            );
            record.insert(field::RELATED_NAME.into(), text(e.related_variable_name.as_deref()));
            record.insert(field::RELATED_TAG.into(), text(e.related_variable_tag.as_deref()));
            record.insert(
                field::RELATED_NUMBER.into(),
                text(e.related_variable_number.as_deref()),
            );
            record.insert(field::GAIN_TAG.into(), text(e.gain_tag.as_deref()));
            record.insert(
                field::GAIN_VALUE.into(),
                serde_json::json!(e.gain_value.unwrap_or(0.0)),
            );
            serde_json::Value::Object(record)
        })
        .collect();
    serde_json::Value::Array(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "CVNAME,CVAPETTAG,TYPE,MVDVNAME,MVDVAPETTAG,MVDVNUMBER,GAIN-TAG,GAIN-VALUE";

    fn table(rows: &[&str]) -> RawTable {
        let mut text = String::from(HEADER);
        for row in rows {
            text.push('\n');
            text.push_str(row);
        }
        RawTable::parse(&text, "gains.csv").unwrap()
    }

    #[test]
    fn test_format_related_name() {
        assert_eq!(format_related_name("Tert_Crusher_Speed"), "Tertiary Crusher Speed");
        assert_eq!(format_related_name("Feed_Rate"), "Feed Rate");
        // Only the exact phrase is expanded
        assert_eq!(format_related_name("tert_crusher"), "tert crusher");
    }

    #[test]
    fn test_lookup_passthrough_marks_unmapped() {
        let transform = GAIN_MAP_COLUMNS[2].1;
        assert_eq!(
            transform.apply("MV"),
            Transformed { value: "Manipulated Variable".to_string(), mapped: true }
        );
        assert_eq!(
            transform.apply("XX"),
            Transformed { value: "XX".to_string(), mapped: false }
        );
    }

    #[test]
    fn test_lookup_labels_match_variable_types() {
        let transform = GAIN_MAP_COLUMNS[2].1;
        for known in VariableType::KNOWN {
            let out = transform.apply(known.code().unwrap());
            assert!(out.mapped);
            assert_eq!(VariableType::from(out.value), known);
        }
    }

    #[test]
    fn test_required_columns_include_filter_columns() {
        let required: Vec<&str> = GAIN_MAP_COLUMNS.iter().map(|(col, _)| *col).collect();
        assert!(required.contains(&CV_TAG_COLUMN));
        assert!(required.contains(&GAIN_TAG_COLUMN));
        assert_eq!(required.len(), 8);
    }

    #[test]
    fn test_missing_filter_column_is_reported_once() {
        let raw = RawTable::parse(
            "CVNAME,CVAPETTAG,TYPE,MVDVNAME,MVDVAPETTAG,MVDVNUMBER,GAIN-VALUE\n\
             Bin,J140-BIN,MV,Feed,J140-X,1,0.5\n",
            "gains.csv",
        )
        .unwrap();
        let err = normalize_gain_map(&raw, "J140-BIN", "PROFIT").unwrap_err();
        match err {
            SourceError::MissingColumns(cols) => assert_eq!(cols, vec!["GAIN-TAG"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_columns_reported_before_rows() {
        let raw = RawTable::parse("CVNAME,CVAPETTAG\nBin,J140-BIN\n", "gains.csv").unwrap();
        let err = normalize_gain_map(&raw, "J140-BIN", "PROFIT").unwrap_err();
        match err {
            SourceError::MissingColumns(cols) => {
                assert_eq!(
                    cols,
                    vec!["TYPE", "MVDVNAME", "MVDVAPETTAG", "MVDVNUMBER", "GAIN-TAG", "GAIN-VALUE"]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_filters_require_both_substrings() {
        let raw = table(&[
            "Bin Level,J140-BIN-005C,MV,Tert_Crusher_Speed,J140-CR-1,1,\
             PROFIT_AVERAGE_BIN_LEVEL,0.5",
            "Bin Level,J141-LIC-005C,MV,Feed,J141-FD-1,2,PROFIT_AVERAGE_BIN_LEVEL,0.1",
            "Bin Level,J140-BIN-005C,DV,Feed,J140-FD-1,3,PROFIT_STEADY_STATE,0.2",
            "Bin Level,,CV,Feed,J140-FD-1,4,PROFIT_AVERAGE_BIN_LEVEL,0.3",
        ]);
        let entries = normalize_gain_map(&raw, "J140-BIN", "PROFIT_AVERAGE_BIN_LEVEL").unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.controller_name.as_deref(), Some("Bin Level"));
        assert_eq!(entry.variable_name.as_deref(), Some("J140-BIN-005C"));
        assert_eq!(entry.variable_type, Some(VariableType::Manipulated));
        assert_eq!(entry.related_variable_name.as_deref(), Some("Tertiary Crusher Speed"));
        assert_eq!(entry.related_variable_number.as_deref(), Some("1"));
        assert_eq!(entry.gain_value, Some(0.5));
    }

    #[test]
    fn test_unmapped_and_missing_values_are_kept() {
        let raw = table(&[
            "Bin,J140-BIN-1,ZZ,,J140-X,,PROFIT_AVERAGE_BIN_LEVEL,",
            "Bin,J140-BIN-2,CV,Speed,J140-Y,5,PROFIT_AVERAGE_BIN_LEVEL,n/a",
        ]);
        let entries = normalize_gain_map(&raw, "J140-BIN", "PROFIT_AVERAGE_BIN_LEVEL").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].variable_type,
            Some(VariableType::Unmapped("ZZ".to_string()))
        );
        assert_eq!(entries[0].related_variable_name, None);
        assert_eq!(entries[0].gain_value, None);
        assert_eq!(entries[1].gain_value, None);
    }

    #[test]
    fn test_input_order_preserved() {
        let raw = table(&[
            "A,J140-BIN-3,MV,C,t,1,PROFIT_AVERAGE_BIN_LEVEL,1",
            "A,J140-BIN-1,MV,A,t,2,PROFIT_AVERAGE_BIN_LEVEL,2",
            "A,J140-BIN-2,MV,B,t,3,PROFIT_AVERAGE_BIN_LEVEL,3",
        ]);
        let entries = normalize_gain_map(&raw, "J140-BIN", "PROFIT").unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.variable_name.clone().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["J140-BIN-3", "J140-BIN-1", "J140-BIN-2"]);
    }

    #[test]
    fn test_records_fill_missing_with_zero() {
        let raw = table(&["Bin,J140-BIN-1,MV,,J140-X,,PROFIT_AVERAGE_BIN_LEVEL,"]);
        let entries = normalize_gain_map(&raw, "J140-BIN", "PROFIT").unwrap();
        let records = gain_map_records(&entries);
        let record = &records[0];
        assert_eq!(record["Related Variable Name"], serde_json::json!(0));
        assert_eq!(record["Gain Value"], serde_json::json!(0.0));
        assert_eq!(record["Variable Type"], serde_json::json!("Manipulated Variable"));
    }
}
