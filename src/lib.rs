//! APC Insight: threshold alerting for Advanced Process Control telemetry
//!
//! Flags tags outside their configured bounds and explains each violation
//! with retrieved documents and a language model.
//!
//! ## Architecture
//!
//! - **Acquisition**: telemetry export and gain map loading
//! - **Detection**: min/max violation scan with fixed-format messages
//! - **Context**: search backends behind the `ContextRetriever` trait
//! - **LLM**: chat-completion backends behind the `CompletionBackend` trait
//! - **Pipeline**: per-violation enrichment and the incremental JSON report

pub mod acquisition;
pub mod config;
pub mod context;
pub mod detection;
pub mod llm;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{AppConfig, ConfigError, Secrets};

// Re-export commonly used types
pub use types::{
    BoundKind, EnrichedAlert, GainMapEntry, TelemetryRow, VariableType, ViolationRecord,
};

// Re-export loading and detection
pub use acquisition::{load_and_filter, load_gain_map, normalize_gain_map, RawTable, SourceError};
pub use detection::detect_violations;

// Re-export collaborator traits
pub use context::{ContextRetriever, RetrievalError, SearchHit};
pub use llm::{CompletionBackend, GenerationError};

// Re-export pipeline components
pub use pipeline::{enrich, EnrichmentError, Enricher, RagAnswerer, ReportWriter, RunSummary};
