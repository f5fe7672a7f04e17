//! Application Configuration - run inputs, backends and enrichment tuning
//!
//! Every section implements `Default` with the values of the original
//! deployment, so a run with no config file behaves like the reference
//! tool. Endpoints may come from the environment; API keys only ever do.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults::*;
use crate::acquisition::TelemetryColumns;

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "APC_INSIGHT_CONFIG";
/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "apc_insight.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one APC deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Input and output files
    #[serde(default)]
    pub run: RunConfig,

    /// Telemetry export column names
    #[serde(default)]
    pub telemetry: TelemetryColumns,

    /// Gain map filters
    #[serde(default)]
    pub gain_map: GainMapConfig,

    /// Search backend
    #[serde(default)]
    pub search: SearchConfig,

    /// Completion backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Orchestrator behaviour
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Token-bounded context chunking
    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl AppConfig {
    /// Load configuration using the standard search order:
    /// 1. `$APC_INSIGHT_CONFIG` environment variable
    /// 2. `./apc_insight.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(
                            path = %p.display(),
                            apc = %config.run.apc,
                            "Loaded config from {}",
                            CONFIG_ENV_VAR
                        );
                        return config;
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from {}, falling back",
                            CONFIG_ENV_VAR
                        );
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(apc = %config.run.apc, "Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found - using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys are logged.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Fill empty endpoint settings from the environment.
    ///
    /// Reads `AZURE_SEARCH_ENDPOINT`, `AZURE_OPENAI_ENDPOINT` and
    /// `AZURE_OPENAI_DEPLOYMENT`; values already set in the file win.
    pub fn apply_env_overrides(&mut self) {
        fill_from_env(&mut self.search.endpoint, "AZURE_SEARCH_ENDPOINT");
        fill_from_env(&mut self.llm.azure_endpoint, "AZURE_OPENAI_ENDPOINT");
        fill_from_env(&mut self.llm.azure_deployment, "AZURE_OPENAI_DEPLOYMENT");
    }

    /// Validate settings for internal consistency.
    ///
    /// Collects every problem before failing so one run reports them all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.run.apc.is_empty() {
            errors.push("run.apc must not be empty".to_string());
        }
        if self.gain_map.subsystem_filter.is_empty() {
            errors.push("gain_map.subsystem_filter must not be empty".to_string());
        }
        if self.gain_map.gain_type_filter.is_empty() {
            errors.push("gain_map.gain_type_filter must not be empty".to_string());
        }
        if self.search.top_n == 0 {
            errors.push("search.top_n must be at least 1".to_string());
        }
        if self.llm.max_tokens == 0 {
            errors.push("llm.max_tokens must be at least 1".to_string());
        }
        if self.enrichment.concurrency == 0 {
            errors.push("enrichment.concurrency must be at least 1".to_string());
        }
        if self.enrichment.retry.max_attempts == 0 {
            errors.push("enrichment.retry.max_attempts must be at least 1".to_string());
        }
        if self.enrichment.retry.initial_backoff_ms > self.enrichment.retry.max_backoff_ms {
            errors.push(format!(
                "enrichment.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.enrichment.retry.initial_backoff_ms, self.enrichment.retry.max_backoff_ms
            ));
        }
        if self.enrichment.retrieval_timeout_secs == 0
            || self.enrichment.generation_timeout_secs == 0
        {
            errors.push("enrichment timeouts must be at least 1 second".to_string());
        }
        if self.chunking.overlap_tokens >= self.chunking.max_context_tokens {
            errors.push(format!(
                "chunking.overlap_tokens ({}) must be smaller than max_context_tokens ({})",
                self.chunking.overlap_tokens, self.chunking.max_context_tokens
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn fill_from_env(slot: &mut String, var: &str) {
    if slot.is_empty() {
        if let Ok(value) = std::env::var(var) {
            *slot = value;
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Input and output files of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// APC name matched (case-sensitive substring) against telemetry tags
    pub apc: String,
    pub telemetry_path: PathBuf,
    pub gain_map_path: PathBuf,
    pub system_prompt_path: PathBuf,
    pub report_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            apc: DEFAULT_APC.to_string(),
            telemetry_path: PathBuf::from(DEFAULT_TELEMETRY_PATH),
            gain_map_path: PathBuf::from(DEFAULT_GAIN_MAP_PATH),
            system_prompt_path: PathBuf::from(DEFAULT_SYSTEM_PROMPT_PATH),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
        }
    }
}

/// Gain map row filters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainMapConfig {
    pub subsystem_filter: String,
    pub gain_type_filter: String,
}

impl Default for GainMapConfig {
    fn default() -> Self {
        Self {
            subsystem_filter: DEFAULT_GAIN_SUBSYSTEM_FILTER.to_string(),
            gain_type_filter: DEFAULT_GAIN_TYPE_FILTER.to_string(),
        }
    }
}

/// Which search backend answers retrieval queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    #[default]
    Azure,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider: SearchProvider,
    /// Azure search endpoint; falls back to `AZURE_SEARCH_ENDPOINT`
    pub endpoint: String,
    pub index_name: String,
    pub api_version: String,
    pub top_n: usize,
    /// Corpus directory for the local provider
    pub documents_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::Azure,
            endpoint: String::new(),
            index_name: DEFAULT_SEARCH_INDEX.to_string(),
            api_version: crate::context::azure_search::DEFAULT_API_VERSION.to_string(),
            top_n: DEFAULT_TOP_N,
            documents_dir: PathBuf::from(DEFAULT_LOCAL_DOCUMENTS_DIR),
            timeout_secs: SEARCH_HTTP_TIMEOUT_SECS,
        }
    }
}

impl SearchConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which chat-completions service to call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Azure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// OpenAI model name
    pub model: String,
    pub base_url: String,
    /// Azure OpenAI endpoint; falls back to `AZURE_OPENAI_ENDPOINT`
    pub azure_endpoint: String,
    /// Azure OpenAI deployment; falls back to `AZURE_OPENAI_DEPLOYMENT`
    pub azure_deployment: String,
    pub azure_api_version: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            model: DEFAULT_MODEL.to_string(),
            base_url: crate::llm::openai::OPENAI_BASE_URL.to_string(),
            azure_endpoint: String::new(),
            azure_deployment: String::new(),
            azure_api_version: crate::llm::openai::AZURE_API_VERSION.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: LLM_HTTP_TIMEOUT_SECS,
        }
    }
}

impl LlmConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// What happens when retrieval or generation fails for one violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop scheduling and fail the run; written alerts stay valid
    #[default]
    Abort,
    /// Record the failure as the violation's answer and keep going
    Continue,
}

/// Which gain map entries are attached to a violation's question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainSelection {
    /// The first normalized entry, for every violation
    #[default]
    First,
    /// Entries whose variable name equals the violation tag
    MatchingTag,
    /// Never attach gain context
    None,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first (1 = no retry)
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: RETRY_INITIAL_BACKOFF_MS,
            max_backoff_ms: RETRY_MAX_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based count of failures so far)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Violations processed at once (1 = strictly sequential)
    pub concurrency: usize,
    /// Append alerts in violation order even when concurrent
    pub preserve_order: bool,
    pub failure_policy: FailurePolicy,
    pub gain_selection: GainSelection,
    pub retrieval_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            preserve_order: true,
            failure_policy: FailurePolicy::Abort,
            gain_selection: GainSelection::First,
            retrieval_timeout_secs: RETRIEVAL_TIMEOUT_SECS,
            generation_timeout_secs: GENERATION_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl EnrichmentConfig {
    pub const fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub const fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Split oversized context and summarize per-chunk answers
    pub enabled: bool,
    pub max_context_tokens: usize,
    pub overlap_tokens: usize,
    pub reserve_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_context_tokens: CHUNK_MAX_CONTEXT_TOKENS,
            overlap_tokens: CHUNK_OVERLAP_TOKENS,
            reserve_tokens: CHUNK_RESERVE_TOKENS,
        }
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// API keys read from the environment (never from the config file)
#[derive(Clone, Default)]
pub struct Secrets {
    pub search_key: Option<String>,
    pub openai_key: Option<String>,
    pub azure_openai_key: Option<String>,
}

impl Secrets {
    /// Read `AZURE_SEARCH_KEY`, `OPENAI_API_KEY` and `AZURE_OPENAI_KEY`.
    pub fn from_env() -> Self {
        let read = |var: &str| std::env::var(var).ok().filter(|v| !v.is_empty());
        Self {
            search_key: read("AZURE_SEARCH_KEY"),
            openai_key: read("OPENAI_API_KEY"),
            azure_openai_key: read("AZURE_OPENAI_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("search_key", &mask(&self.search_key))
            .field("openai_key", &mask(&self.openai_key))
            .field("azure_openai_key", &mask(&self.azure_openai_key))
            .finish()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}
