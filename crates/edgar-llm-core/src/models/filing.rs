use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// **SEC Filing Type**
///
/// Closed set of SEC form types the pipeline accepts. Display strings match
/// the form names as they appear on EDGAR ("10-K", "10-Q", ...), which is
/// also the serialized representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilingType {
    #[serde(rename = "10-K")]
    TenK,
    #[serde(rename = "10-Q")]
    TenQ,
    #[serde(rename = "8-K")]
    EightK,
    #[serde(rename = "20-F")]
    TwentyF,
    #[serde(rename = "6-K")]
    SixK,
}

impl FilingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenK => "10-K",
            Self::TenQ => "10-Q",
            Self::EightK => "8-K",
            Self::TwentyF => "20-F",
            Self::SixK => "6-K",
        }
    }

    /// Annual report forms omit the fiscal-period segment in object paths
    /// and document ids.
    pub fn is_annual(&self) -> bool {
        matches!(self, Self::TenK | Self::TwentyF)
    }
}

impl fmt::Display for FilingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilingType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "10-K" => Ok(Self::TenK),
            "10-Q" => Ok(Self::TenQ),
            "8-K" => Ok(Self::EightK),
            "20-F" => Ok(Self::TwentyF),
            "6-K" => Ok(Self::SixK),
            other => Err(PipelineError::Config(format!(
                "unsupported filing type: {other}"
            ))),
        }
    }
}

/// **Filing Descriptor**
///
/// Identifies one filing as handed over by the external discovery
/// collaborator. Constructed once through [`FilingDescriptor::new`], which
/// normalises the ticker and CIK, and treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingDescriptor {
    /// Issuer ticker symbol, uppercase.
    pub ticker: String,

    /// SEC Central Index Key, left-padded to 10 digits.
    pub cik: String,

    /// SEC form type.
    pub filing_type: FilingType,

    /// Date the filing was submitted (YYYY-MM-DD).
    pub filing_date: String,

    /// Raw period-end date as discovered; may be absent or unnormalised.
    pub period_end_date: Option<String>,

    /// URL of the primary filing document.
    pub document_url: String,

    /// SEC accession number.
    pub accession_number: String,

    /// Registrant name, if the discovery source provided one.
    #[serde(default)]
    pub company_name: Option<String>,

    /// Caller-supplied fiscal year, consulted only by the storage
    /// coordinator's fallback ladder.
    #[serde(default)]
    pub fiscal_year: Option<String>,

    /// Caller-supplied fiscal period, consulted only by the storage
    /// coordinator's fallback ladder.
    #[serde(default)]
    pub fiscal_period: Option<String>,
}

impl FilingDescriptor {
    pub fn new(
        ticker: &str,
        cik: &str,
        filing_type: FilingType,
        filing_date: &str,
        period_end_date: Option<&str>,
        document_url: &str,
        accession_number: &str,
    ) -> Result<Self> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(PipelineError::Config("ticker must be non-empty".into()));
        }
        if cik.is_empty() || !cik.chars().all(|c| c.is_ascii_digit()) || cik.len() > 10 {
            return Err(PipelineError::Config(format!("invalid CIK: {cik}")));
        }
        Ok(Self {
            ticker,
            cik: pad_cik(cik),
            filing_type,
            filing_date: filing_date.to_string(),
            period_end_date: period_end_date.map(|s| s.to_string()),
            document_url: document_url.to_string(),
            accession_number: accession_number.to_string(),
            company_name: None,
            fiscal_year: None,
            fiscal_period: None,
        })
    }

    /// Display name, falling back to the ticker when the registrant name is
    /// unknown.
    pub fn display_name(&self) -> &str {
        self.company_name.as_deref().unwrap_or(&self.ticker)
    }
}

/// Pad a CIK to 10 digits with leading zeros.
pub fn pad_cik(cik: &str) -> String {
    format!("{cik:0>10}")
}
