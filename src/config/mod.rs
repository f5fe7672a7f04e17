//! Application Configuration Module
//!
//! Run inputs, backend endpoints and enrichment tuning loaded from TOML,
//! with every value defaulting to the reference deployment.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line
//! 2. `APC_INSIGHT_CONFIG` environment variable (path to TOML file)
//! 3. `apc_insight.toml` in the current working directory
//! 4. Built-in defaults
//!
//! Endpoints left empty are filled from the environment and API keys are
//! only ever read from it (see [`Secrets`]). The loaded config is passed
//! explicitly to the stages that need it.

mod app_config;
pub mod defaults;
pub mod validation;

pub use app_config::*;
