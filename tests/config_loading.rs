//! Config Loading Tests
//!
//! Exercises TOML loading from disk, unknown-key tolerance, validation
//! failures and environment fallbacks through the public config API.

use apc_insight::config::validation::{known_config_keys, suggest_correction};
use apc_insight::config::{AppConfig, FailurePolicy, SearchProvider};
use apc_insight::ConfigError;
use std::io::Write;
use std::path::PathBuf;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn load_from_file_overrides_selected_values() {
    let file = write_config(
        r#"
[run]
apc = "APC-J141_LIC_005C"
report_path = "out/alerts.json"

[search]
provider = "local"
documents_dir = "manuals"

[enrichment]
failure_policy = "continue"
"#,
    );

    let config = AppConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.run.apc, "APC-J141_LIC_005C");
    assert_eq!(config.run.report_path, PathBuf::from("out/alerts.json"));
    assert_eq!(config.search.provider, SearchProvider::Local);
    assert_eq!(config.search.documents_dir, PathBuf::from("manuals"));
    assert_eq!(config.enrichment.failure_policy, FailurePolicy::Continue);
    // Untouched sections keep their defaults
    assert_eq!(config.llm.model, "gpt-4o");
    assert_eq!(config.telemetry.tag_name, "IDX_TagName");
}

#[test]
fn unknown_keys_do_not_prevent_loading() {
    let file = write_config(
        r#"
[search]
top_m = 5
"#,
    );
    let config = AppConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.search.top_n, 10);

    let suggestion = suggest_correction("search.top_m", &known_config_keys());
    assert_eq!(suggestion.as_deref(), Some("search.top_n"));
}

#[test]
fn malformed_toml_names_the_file() {
    let file = write_config("[run\napc = ");
    let err = AppConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn wrong_enum_value_is_a_parse_error() {
    let file = write_config(
        r#"
[enrichment]
failure_policy = "retry_forever"
"#,
    );
    assert!(matches!(
        AppConfig::load_from_file(file.path()),
        Err(ConfigError::Parse(..))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = AppConfig::load_from_file(std::path::Path::new("/nonexistent/apc_insight.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn invalid_values_are_reported_together() {
    let file = write_config(
        r#"
[gain_map]
subsystem_filter = ""

[chunking]
max_context_tokens = 100
overlap_tokens = 100
"#,
    );
    let err = AppConfig::load_from_file(file.path()).unwrap_err();
    let ConfigError::Validation(errors) = &err else {
        panic!("expected validation error, got {err}");
    };
    assert_eq!(errors.len(), 2);
    let shown = err.to_string();
    assert!(shown.contains("gain_map.subsystem_filter"));
    assert!(shown.contains("chunking.overlap_tokens"));
}

#[test]
fn env_fills_only_empty_endpoints() {
    std::env::set_var("AZURE_OPENAI_DEPLOYMENT", "gpt-4o-prod");

    let mut config = AppConfig::default();
    config.apply_env_overrides();
    assert_eq!(config.llm.azure_deployment, "gpt-4o-prod");

    let mut config = AppConfig::default();
    config.llm.azure_deployment = "from-file".to_string();
    config.apply_env_overrides();
    assert_eq!(config.llm.azure_deployment, "from-file");

    std::env::remove_var("AZURE_OPENAI_DEPLOYMENT");
}
