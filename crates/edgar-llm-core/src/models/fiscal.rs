use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::models::filing::FilingType;

/// **Fiscal Period**
///
/// One of the four quarters or the annual period. `Unknown` renders as
/// "Q?" and exists only for the storage coordinator's permissive fallback;
/// a validated [`FiscalPeriodInfo`] never carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiscalPeriod {
    Q1,
    Q2,
    Q3,
    Q4,
    #[serde(rename = "annual")]
    Annual,
    #[serde(rename = "Q?")]
    Unknown,
}

impl FiscalPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
            Self::Annual => "annual",
            Self::Unknown => "Q?",
        }
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FiscalPeriod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Q1" => Ok(Self::Q1),
            "Q2" => Ok(Self::Q2),
            "Q3" => Ok(Self::Q3),
            "Q4" => Ok(Self::Q4),
            "annual" => Ok(Self::Annual),
            "Q?" => Ok(Self::Unknown),
            other => Err(PipelineError::FiscalData(format!(
                "fiscal period must be one of Q1..Q4 or annual, got: {other}"
            ))),
        }
    }
}

/// Date formats accepted for raw period-end dates, tried in order.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", // 2023-12-31
    "%Y%m%d",   // 20231231 (filename style, e.g. nvda-20210502.htm)
    "%m/%d/%Y", // 12/31/2023
    "%Y/%m/%d", // 2023/12/31
    "%m-%d-%Y", // 12-31-2023
    "%B %d, %Y", // December 31, 2023
    "%b %d, %Y", // Dec 31, 2023
];

/// Normalise a raw period-end date string to YYYY-MM-DD.
///
/// Anything that does not parse to a valid Gregorian date under one of the
/// accepted formats is rejected. Normalisation is idempotent: the output
/// always re-parses under the first format.
pub fn normalize_period_end_date(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PipelineError::InvalidDateFormat(
            "period end date cannot be empty".to_string(),
        ));
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date.format("%Y-%m-%d").to_string());
        }
    }
    Err(PipelineError::InvalidDateFormat(raw.to_string()))
}

/// **Fiscal Period Info**
///
/// Validated data contract for fiscal period attribution. All fields are
/// checked at construction and the value is immutable afterwards, so a
/// consumer holding a `FiscalPeriodInfo` never sees partial or unvalidated
/// data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalPeriodInfo {
    ticker: String,
    period_end_date: String,
    fiscal_year: String,
    fiscal_period: FiscalPeriod,
    filing_type: Option<FilingType>,
    source: String,
    confidence: f64,
    metadata: BTreeMap<String, String>,
}

impl FiscalPeriodInfo {
    /// Construct a validated fiscal period record.
    ///
    /// Fails with [`PipelineError::FiscalData`] when the ticker is empty,
    /// the fiscal year is not a four-digit year, or the period is the
    /// `Q?` placeholder; fails with [`PipelineError::InvalidDateFormat`]
    /// when the period end date cannot be normalised.
    pub fn new(
        ticker: &str,
        period_end_date: &str,
        fiscal_year: &str,
        fiscal_period: FiscalPeriod,
    ) -> Result<Self> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(PipelineError::FiscalData("ticker must be non-empty".into()));
        }
        let period_end_date = normalize_period_end_date(period_end_date)?;
        if fiscal_year.len() != 4 || !fiscal_year.chars().all(|c| c.is_ascii_digit()) {
            return Err(PipelineError::FiscalData(format!(
                "fiscal year must be a four-digit year, got: {fiscal_year}"
            )));
        }
        if fiscal_period == FiscalPeriod::Unknown {
            return Err(PipelineError::FiscalData(
                "fiscal period placeholder Q? is not a valid contract value".into(),
            ));
        }
        Ok(Self {
            ticker,
            period_end_date,
            fiscal_year: fiscal_year.to_string(),
            fiscal_period,
            filing_type: None,
            source: "company_fiscal_registry".to_string(),
            confidence: 1.0,
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_filing_type(mut self, filing_type: FilingType) -> Self {
        self.filing_type = Some(filing_type);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_confidence(self, confidence: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PipelineError::FiscalData(format!(
                "confidence must be between 0.0 and 1.0, got: {confidence}"
            )));
        }
        Ok(Self { confidence, ..self })
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    /// Normalised period end date (YYYY-MM-DD).
    pub fn period_end_date(&self) -> &str {
        &self.period_end_date
    }

    pub fn fiscal_year(&self) -> &str {
        &self.fiscal_year
    }

    pub fn fiscal_period(&self) -> FiscalPeriod {
        self.fiscal_period
    }

    pub fn filing_type(&self) -> Option<FilingType> {
        self.filing_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Display string such as "FY2024 Q1", or "FY2024" for annual periods.
    pub fn display_period(&self) -> String {
        match self.fiscal_period {
            FiscalPeriod::Annual => format!("FY{}", self.fiscal_year),
            period => format!("FY{} {}", self.fiscal_year, period),
        }
    }
}
