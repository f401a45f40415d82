use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PipelineError, Result};

/// Behaviour of the storage coordinator when the fiscal lookup fails for a
/// quarterly filing and no caller-supplied values exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Publish with a "Q?" placeholder and a data-integrity annotation.
    Permissive,
    /// Refuse to publish the filing.
    Strict,
}

/// **Pipeline Configuration**
///
/// Every tunable of the filing pipeline in one place. Constructed from CLI
/// flags (or defaults) at program start and passed by reference to the
/// stages; nothing reads configuration from the environment at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// SEC fetch rate limit, requests per second (global across workers).
    pub requests_per_second: u32,

    /// Per-attempt HTTP timeout.
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,

    /// Overall deadline for one filing's pipeline.
    #[serde(with = "duration_secs")]
    pub filing_deadline: Duration,

    /// Maximum fetch attempts per URL (first try included).
    pub retry_attempts: u32,

    /// Base delay of the exponential backoff.
    #[serde(with = "duration_secs")]
    pub retry_base: Duration,

    /// Backoff growth factor per attempt.
    pub retry_factor: u32,

    /// Jitter applied to each backoff delay, as a fraction (0.2 = ±20%).
    pub retry_jitter: f64,

    /// Artifacts smaller than this many bytes fail the publication gate.
    pub min_artifact_size: u64,

    /// Verifier exact-match coverage threshold.
    pub completeness_threshold: f64,

    /// Object-store bucket (or local root directory).
    pub bucket: String,

    /// Metadata database name.
    pub metadata_database: String,

    /// Optional path to the fiscal registry JSON file.
    pub fiscal_registry_path: Option<PathBuf>,

    pub fallback_policy: FallbackPolicy,

    /// Worker pool size for concurrent filings.
    pub max_concurrency: usize,

    /// Fetch cache directory.
    pub cache_dir: PathBuf,

    /// User-agent sent to the SEC; must include a contact email.
    pub user_agent: String,

    /// Skip all object-store and metadata writes.
    pub dry_run: bool,

    /// Overwrite existing objects instead of skipping them.
    pub force_upload: bool,

    /// Emit the raw-XBRL JSON side dump next to the artifacts.
    pub raw_dump: bool,

    /// Let the validator insert derived balance-sheet totals.
    pub derive_missing_totals: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            fetch_timeout: Duration::from_secs(30),
            filing_deadline: Duration::from_secs(600),
            retry_attempts: 5,
            retry_base: Duration::from_secs(1),
            retry_factor: 2,
            retry_jitter: 0.2,
            min_artifact_size: 1024,
            completeness_threshold: 0.995,
            bucket: "edgar-llm".to_string(),
            metadata_database: "filings".to_string(),
            fiscal_registry_path: None,
            fallback_policy: FallbackPolicy::Permissive,
            max_concurrency: 4,
            cache_dir: PathBuf::from("fetch_cache"),
            user_agent: "edgar-llm/0.1 (data@edgar-llm.dev)".to_string(),
            dry_run: false,
            force_upload: false,
            raw_dump: false,
            derive_missing_totals: false,
        }
    }
}

impl PipelineConfig {
    /// Check the invariants the stages rely on.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_second == 0 {
            return Err(PipelineError::Config(
                "requests_per_second must be positive".into(),
            ));
        }
        if !self.user_agent.contains('@') {
            return Err(PipelineError::Config(
                "user agent must include a contact email".into(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(PipelineError::Config("retry_attempts must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.completeness_threshold) {
            return Err(PipelineError::Config(
                "completeness_threshold must be within [0, 1]".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(PipelineError::Config("max_concurrency must be positive".into()));
        }
        Ok(())
    }
}

/// Serialize durations as whole seconds so the config stays readable.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
