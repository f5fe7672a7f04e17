//! Shared data structures for APC threshold alerting
//!
//! This module defines the core types for the enrichment pipeline:
//! - Stage 1: TelemetryRow (tag readings from a snapshot export)
//! - Stage 2: GainMapEntry (controller relationship reference data)
//! - Stage 3: ViolationRecord (out-of-bounds readings)
//! - Stage 4: EnrichedAlert (violation + retrieved context + model answer)

mod telemetry;
mod gain_map;
mod alert;

pub use telemetry::*;
pub use gain_map::*;
pub use alert::*;
