//! Shared data model for the EDGAR filing pipeline.
//!
//! This crate holds the types that cross stage boundaries: filing
//! descriptors, XBRL entities, the validated fiscal period contract, the
//! metadata document schema, the error taxonomy, and the pipeline
//! configuration. It performs no I/O.

pub mod config;
pub mod error;
pub mod models;

pub use config::{FallbackPolicy, PipelineConfig};
pub use error::{PipelineError, Result};
pub use models::*;
