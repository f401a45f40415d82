use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rough token estimate for LLM budgeting: four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

/// **Data Integrity Record**
///
/// Machine-readable audit trail attached to every metadata document.
/// Records where the fiscal attribution came from and which fallback, if
/// any, was applied, so downstream consumers can distinguish authoritative
/// rows from fallback rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIntegrity {
    /// Component that performed the fiscal determination.
    pub validation_source: String,

    pub validation_timestamp: DateTime<Utc>,

    /// Period end date exactly as supplied by the discovery source.
    pub raw_period_end_date: Option<String>,

    /// "success", "fallback", or "failed".
    pub status: String,

    /// Fallback annotation when a fallback fired: `metadata_values`,
    /// `annual_for_10K`, or `Q?_placeholder`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataIntegrity {
    pub fn success(source: &str, raw_period_end_date: Option<&str>) -> Self {
        Self {
            validation_source: source.to_string(),
            validation_timestamp: Utc::now(),
            raw_period_end_date: raw_period_end_date.map(|s| s.to_string()),
            status: "success".to_string(),
            fallback_used: None,
            error: None,
        }
    }

    pub fn fallback(
        source: &str,
        raw_period_end_date: Option<&str>,
        fallback_used: &str,
        error: &str,
    ) -> Self {
        Self {
            validation_source: source.to_string(),
            validation_timestamp: Utc::now(),
            raw_period_end_date: raw_period_end_date.map(|s| s.to_string()),
            status: "fallback".to_string(),
            fallback_used: Some(fallback_used.to_string()),
            error: Some(error.to_string()),
        }
    }
}

/// **Filing Metadata Document**
///
/// One document in the "filings" collection of the metadata database,
/// keyed by `filing_id`. The id and the object-store paths are derived by
/// the same function so they cannot drift apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingDocument {
    pub filing_id: String,
    pub company_ticker: String,
    pub company_name: String,
    pub filing_type: String,
    pub fiscal_year: String,
    pub fiscal_period: String,

    /// Display string such as "FY2024 Q1" or "FY2024".
    pub display_period: String,

    /// Normalised period end date, when one was available.
    pub period_end_date: Option<String>,

    /// Raw period end date as discovered.
    pub period_end_date_raw: Option<String>,

    pub filing_date: String,

    pub text_file_path: Option<String>,
    pub text_file_size: u64,
    pub text_token_count: u64,

    pub llm_file_path: Option<String>,
    pub llm_file_size: u64,
    pub llm_token_count: u64,
    pub has_llm_format: bool,

    pub fiscal_source: String,
    pub fiscal_integrity_verified: bool,
    pub data_integrity: DataIntegrity,

    pub upload_date: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
}
