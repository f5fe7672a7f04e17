//! System-wide default constants.
//!
//! Values reproduce the J140 bin-level deployment the tool was first run
//! against. Grouped by subsystem for easy discovery.

// ============================================================================
// Run Inputs
// ============================================================================

/// APC whose tags are selected from the telemetry export.
pub const DEFAULT_APC: &str = "APC-J140_BIN_005C";

pub const DEFAULT_TELEMETRY_PATH: &str = "data/ADX_Export_APC_Tag_Values.csv";

pub const DEFAULT_GAIN_MAP_PATH: &str = "data/SIS-JIG T-Crushing PWO gain map.csv";

pub const DEFAULT_SYSTEM_PROMPT_PATH: &str = "prompts/system_prompt.md";

pub const DEFAULT_REPORT_PATH: &str = "reports/system_alerts_enriched.json";

// ============================================================================
// Gain Map
// ============================================================================

/// Substring a controlled-variable tag must contain to be kept.
pub const DEFAULT_GAIN_SUBSYSTEM_FILTER: &str = "J140-BIN";

/// Substring a gain tag must contain to be kept.
pub const DEFAULT_GAIN_TYPE_FILTER: &str = "PROFIT_AVERAGE_BIN_LEVEL";

// ============================================================================
// Search
// ============================================================================

pub const DEFAULT_SEARCH_INDEX: &str = "apc-j140-bin-005c";

/// Number of fragments requested per question.
pub const DEFAULT_TOP_N: usize = 10;

pub const DEFAULT_LOCAL_DOCUMENTS_DIR: &str = "docs";

/// HTTP timeout for search requests (seconds).
pub const SEARCH_HTTP_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Completion
// ============================================================================

pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Completion budget per answer (tokens).
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// HTTP timeout for completion requests (seconds).
pub const LLM_HTTP_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// Enrichment
// ============================================================================

/// Placeholder stored when no gain map entry applies to a violation.
pub const NO_GAINS_CONTEXT: &str = "No additional context available";

/// Per-call timeout around a retrieval (seconds).
pub const RETRIEVAL_TIMEOUT_SECS: u64 = 30;

/// Per-call timeout around a generation (seconds).
pub const GENERATION_TIMEOUT_SECS: u64 = 120;

/// Capacity of the queue between enrichment workers and the report writer.
pub const REPORT_QUEUE_CAPACITY: usize = 64;

pub const RETRY_INITIAL_BACKOFF_MS: u64 = 500;

pub const RETRY_MAX_BACKOFF_MS: u64 = 8_000;

// ============================================================================
// Chunking
// ============================================================================

/// Context window budget used when chunking is enabled (tokens).
pub const CHUNK_MAX_CONTEXT_TOKENS: usize = 12_000;

/// Tokens shared between consecutive chunks.
pub const CHUNK_OVERLAP_TOKENS: usize = 100;

/// Tokens held back for the response and prompt scaffolding.
pub const CHUNK_RESERVE_TOKENS: usize = 1_000;

/// Characters per token used by the token estimate.
pub const CHARS_PER_TOKEN: usize = 4;
