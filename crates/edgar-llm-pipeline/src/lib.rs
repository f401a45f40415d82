//! SEC filing processing pipeline.
//!
//! Turns discovered EDGAR filings into validated XBRL fact sets, a
//! deterministic LLM-oriented text artifact, and a consistent metadata
//! record: rate-limited fetching, inline-XBRL extraction, linkbase
//! hierarchy resolution, fiscal period attribution, artifact formatting
//! with an optimiser pass, idempotent publication, and round-trip
//! verification.

pub mod extract;
pub mod fetch;
pub mod fiscal;
pub mod format;
pub mod hierarchy;
pub mod pipeline;
pub mod rate_limiter;
pub mod storage;
pub mod validator;
pub mod verify;

pub use extract::{ContextFormatRegistry, ExtractedFiling};
pub use fetch::SecFetcher;
pub use fiscal::FiscalRegistry;
pub use format::{FileSizeOptimizer, LlmFormatter};
pub use hierarchy::{FilingHierarchy, HierarchyResolver};
pub use pipeline::{Pipeline, RunReport};
pub use rate_limiter::SecRateLimiter;
pub use storage::{
    FilingLocation, JsonMetadataStore, LocalObjectStore, MemoryMetadataStore, MemoryObjectStore,
    MetadataStore, ObjectStore, StorageCoordinator,
};
pub use validator::FinancialValidator;
pub use verify::{CoverageReport, RawXbrlDump, Verifier};

pub use edgar_llm_core::{PipelineConfig, PipelineError, Result};
