//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! The raw TOML is first parsed into `toml::Value`, its key tree is walked
//! and compared against the keys of a serialized default config. Unknown
//! keys produce warnings with "did you mean?" suggestions; they never stop
//! a run.

use std::collections::HashSet;

use super::AppConfig;

/// A non-fatal config warning (typo or unrecognized section).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns every valid dotted key path of [`AppConfig`].
///
/// Every field is non-optional, so serializing the defaults yields the full
/// key tree and new fields are picked up without a hand-kept list.
pub fn known_config_keys() -> HashSet<String> {
    toml::Value::try_from(AppConfig::default())
        .map(|value| walk_toml_keys(&value, "").into_iter().collect())
        .unwrap_or_default()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties go to the lexicographically smaller key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.clone())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new(); // parse errors are reported by serde afterwards
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("concurrency", "concurrency"), 0);
        assert_eq!(levenshtein("concurency", "concurrency"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [enrichment]
            concurrency = 2
            [enrichment.retry]
            max_attempts = 3
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"enrichment".to_string()));
        assert!(keys.contains(&"enrichment.concurrency".to_string()));
        assert!(keys.contains(&"enrichment.retry.max_attempts".to_string()));
    }

    #[test]
    fn test_known_keys_cover_all_sections() {
        let known = known_config_keys();
        for key in [
            "run.apc",
            "run.report_path",
            "telemetry.tag_name",
            "gain_map.subsystem_filter",
            "search.top_n",
            "llm.max_tokens",
            "enrichment.failure_policy",
            "enrichment.retry.max_attempts",
            "chunking.overlap_tokens",
        ] {
            assert!(known.contains(key), "missing known key {key}");
        }
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
[enrichment]
concurency = 4
"#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "enrichment.concurency");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("enrichment.concurrency")
        );
        assert!(warnings[0].to_string().contains("did you mean"));
    }

    #[test]
    fn test_valid_keys_produce_no_warnings() {
        let warnings = validate_unknown_keys(
            r#"
[run]
apc = "APC-J140_BIN_005C"

[search]
provider = "local"
documents_dir = "docs"
"#,
        );
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_garbage_key_has_no_suggestion() {
        let warnings = validate_unknown_keys("completely_unrelated_garbage_key_xyz = 1\n");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].suggestion.is_none());
    }
}
