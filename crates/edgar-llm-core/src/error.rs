use thiserror::Error;

/// **Pipeline Error Taxonomy**
///
/// Every failure mode the filing pipeline can surface. Transient fetch
/// errors are retried locally by the fetcher; everything else is terminal
/// for the current filing and lands in the run report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Retryable fetch failure: network timeout, 5xx, or 429.
    #[error("transient fetch error for {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    /// Terminal fetch failure: 4xx other than 429, or a rejected document.
    #[error("permanent fetch error for {url}: HTTP {status}")]
    PermanentFetch { url: String, status: u16 },

    /// A raw period-end date that cannot be normalised to YYYY-MM-DD.
    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),

    /// A normalised date with no mapping in the fiscal registry.
    #[error("no fiscal mapping for {ticker} at period end {period_end_date}")]
    FiscalLookup {
        ticker: String,
        period_end_date: String,
    },

    /// Contract violation while constructing validated fiscal data.
    #[error("fiscal data contract violation: {0}")]
    FiscalData(String),

    /// Malformed XBRL beyond recovery.
    #[error("extract error: {0}")]
    Extract(String),

    /// Object-store or metadata-store failure after retries.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or incomplete pipeline configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether the error is worth retrying at the fetch layer.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch { .. })
    }
}

/// Convenient result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let err = PipelineError::TransientFetch {
            url: "https://www.sec.gov/x".to_string(),
            reason: "HTTP 503".to_string(),
        };
        assert!(err.is_transient());

        let err = PipelineError::PermanentFetch {
            url: "https://www.sec.gov/x".to_string(),
            status: 404,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn error_messages_name_the_subject() {
        let err = PipelineError::FiscalLookup {
            ticker: "AAPL".to_string(),
            period_end_date: "2099-01-01".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AAPL"));
        assert!(msg.contains("2099-01-01"));
    }
}
