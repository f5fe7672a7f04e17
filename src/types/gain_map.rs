//! Controller relationship (gain map) reference data

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a variable inside an APC controller.
///
/// Codes outside the `MV`/`CV`/`DV` vocabulary are kept verbatim as
/// [`VariableType::Unmapped`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum VariableType {
    Manipulated,
    Controlled,
    Disturbance,
    Unmapped(String),
}

impl VariableType {
    /// Every variable type with a short code, in code-table order
    pub const KNOWN: [Self; 3] = [Self::Manipulated, Self::Controlled, Self::Disturbance];

    /// Short code used by the controller database
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::Manipulated => Some("MV"),
            Self::Controlled => Some("CV"),
            Self::Disturbance => Some("DV"),
            Self::Unmapped(_) => None,
        }
    }

    const fn known_label(&self) -> Option<&'static str> {
        match self {
            Self::Manipulated => Some("Manipulated Variable"),
            Self::Controlled => Some("Controlled Variable"),
            Self::Disturbance => Some("Disturbance Variable"),
            Self::Unmapped(_) => None,
        }
    }

    /// Map a short code onto the controlled vocabulary.
    pub fn from_code(code: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|t| t.code() == Some(code))
            .unwrap_or_else(|| Self::Unmapped(code.to_string()))
    }

    /// Display label for a short code; `None` outside the vocabulary
    pub fn label_for_code(code: &str) -> Option<&'static str> {
        Self::from_code(code).known_label()
    }

    /// Parse a display label back into a variable type
    fn from_label(label: &str) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|t| t.known_label() == Some(label))
            .unwrap_or_else(|| Self::from_code(label))
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Unmapped(code) => code,
            known => known.known_label().unwrap_or_default(),
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<VariableType> for String {
    fn from(value: VariableType) -> Self {
        value.label().to_string()
    }
}

impl From<String> for VariableType {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

/// One normalized row of the gain map.
///
/// Optional fields are cells that were empty in the source table; they are
/// reported as warnings during normalization but never fail a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainMapEntry {
    /// Controller (CV) description
    pub controller_name: Option<String>,
    /// Controlled-variable tag identifier
    pub variable_name: Option<String>,
    pub variable_type: Option<VariableType>,
    /// Manipulated/disturbance variable name, formatted for readability
    pub related_variable_name: Option<String>,
    pub related_variable_tag: Option<String>,
    pub related_variable_number: Option<String>,
    pub gain_tag: Option<String>,
    pub gain_value: Option<f64>,
}

impl GainMapEntry {
    /// Human-readable `Label: value` lines, one per field.
    pub fn summary(&self) -> String {
        fn text(value: Option<&str>) -> &str {
            value.unwrap_or("")
        }

        let variable_type = self
            .variable_type
            .as_ref()
            .map(VariableType::label)
            .unwrap_or("");
        let gain_value = self.gain_value.map(|v| v.to_string()).unwrap_or_default();

        [
            format!("Controller: {}", text(self.controller_name.as_deref())),
            format!("Variable Name: {}", text(self.variable_name.as_deref())),
            format!("Variable Type: {variable_type}"),
            format!(
                "Related Variable Name: {}",
                text(self.related_variable_name.as_deref())
            ),
            format!(
                "Related Variable Tag: {}",
                text(self.related_variable_tag.as_deref())
            ),
            format!(
                "Related Variable Number: {}",
                text(self.related_variable_number.as_deref())
            ),
            format!("Gain Tag: {}", text(self.gain_tag.as_deref())),
            format!("Gain Value: {gain_value}"),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_type_vocabulary() {
        assert_eq!(VariableType::from_code("MV"), VariableType::Manipulated);
        assert_eq!(VariableType::from_code("CV"), VariableType::Controlled);
        assert_eq!(VariableType::from_code("DV"), VariableType::Disturbance);
        assert_eq!(
            VariableType::from_code("FF"),
            VariableType::Unmapped("FF".to_string())
        );
        assert_eq!(VariableType::Controlled.label(), "Controlled Variable");
        assert_eq!(VariableType::Unmapped("FF".to_string()).label(), "FF");
    }

    #[test]
    fn test_codes_and_labels_resolve_to_the_same_type() {
        for known in VariableType::KNOWN {
            let code = known.code().unwrap();
            assert_eq!(VariableType::from_code(code), known);
            assert_eq!(VariableType::label_for_code(code), Some(known.label()));
            assert_eq!(VariableType::from(known.label().to_string()), known);
        }
        assert_eq!(VariableType::label_for_code("FF"), None);
        assert_eq!(VariableType::Unmapped("FF".to_string()).code(), None);
    }

    #[test]
    fn test_variable_type_serde_uses_labels() {
        let json = serde_json::to_string(&VariableType::Disturbance).unwrap();
        assert_eq!(json, "\"Disturbance Variable\"");
        let back: VariableType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, VariableType::Disturbance);
    }

    #[test]
    fn test_summary_lines() {
        let entry = GainMapEntry {
            controller_name: Some("Bin Level".to_string()),
            variable_name: Some("J140-BIN-005C".to_string()),
            variable_type: Some(VariableType::Manipulated),
            related_variable_name: Some("Tertiary Crusher Speed".to_string()),
            related_variable_tag: Some("J140-CR-001".to_string()),
            related_variable_number: Some("3".to_string()),
            gain_tag: Some("PROFIT_AVERAGE_BIN_LEVEL".to_string()),
            gain_value: Some(0.25),
        };

        let summary = entry.summary();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0], "Controller: Bin Level");
        assert_eq!(lines[2], "Variable Type: Manipulated Variable");
        assert_eq!(lines[3], "Related Variable Name: Tertiary Crusher Speed");
        assert_eq!(lines[7], "Gain Value: 0.25");
    }

    #[test]
    fn test_summary_renders_missing_as_empty() {
        let entry = GainMapEntry {
            controller_name: None,
            variable_name: Some("J140".to_string()),
            variable_type: None,
            related_variable_name: None,
            related_variable_tag: None,
            related_variable_number: None,
            gain_tag: None,
            gain_value: None,
        };
        let summary = entry.summary();
        assert!(summary.contains("Controller: \n"));
        assert!(summary.ends_with("Gain Value: "));
    }
}
