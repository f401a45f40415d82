use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use edgar_llm_core::{
    normalize_period_end_date, FilingType, FiscalPeriod, FiscalPeriodInfo, PipelineError, Result,
};

/// One period-end mapping inside a company calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub fiscal_year: String,
    pub fiscal_period: FiscalPeriod,
}

/// **Company Fiscal Calendar**
///
/// Explicit period-end-date mappings for one issuer. No fiscal-month
/// inference happens anywhere: a date either has an entry or the lookup is
/// an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyCalendar {
    pub ticker: String,
    pub period_end_dates: BTreeMap<String, CalendarEntry>,
}

/// **Fiscal Registry**
///
/// The single source of truth for `(ticker, period-end-date)` ->
/// `(fiscal year, fiscal period)`. Downstream identifiers (object paths,
/// document ids, display strings) all derive from this mapping, so the
/// decision is centralised here and nowhere else.
///
/// Compiled-in calendars cover the supported issuers; a JSON registry file
/// can extend them at startup. The registry is read-only after startup
/// except for [`FiscalRegistry::add_mapping`], which serialises through
/// `&mut self` and persists to the configured file.
#[derive(Debug)]
pub struct FiscalRegistry {
    calendars: BTreeMap<String, CompanyCalendar>,
    registry_path: Option<PathBuf>,
}

impl FiscalRegistry {
    /// Build the registry from compiled-in calendars plus an optional JSON
    /// file. File entries extend the compiled-in data but never override an
    /// existing date mapping.
    pub fn new(registry_path: Option<PathBuf>) -> Result<Self> {
        let mut calendars = builtin_calendars();

        if let Some(path) = registry_path.as_deref() {
            if path.exists() {
                merge_registry_file(path, &mut calendars)?;
            }
        }

        info!(companies = calendars.len(), "fiscal registry loaded");
        Ok(Self {
            calendars,
            registry_path,
        })
    }

    /// Registry with only the compiled-in calendars.
    pub fn builtin() -> Self {
        Self {
            calendars: builtin_calendars(),
            registry_path: None,
        }
    }

    /// Determine fiscal year and period for an issuer and raw period-end
    /// date.
    ///
    /// The date is normalised first; an unparseable date fails with
    /// [`PipelineError::InvalidDateFormat`] before any lookup happens. A
    /// normalised date with no mapping fails with
    /// [`PipelineError::FiscalLookup`] — a miss is an error, not a guess.
    pub fn determine(
        &self,
        ticker: &str,
        raw_date: &str,
        filing_type: Option<FilingType>,
    ) -> Result<FiscalPeriodInfo> {
        let ticker = ticker.trim().to_uppercase();
        let normalized = normalize_period_end_date(raw_date)?;

        let calendar = self.calendars.get(&ticker).ok_or_else(|| {
            error!(%ticker, "no fiscal calendar for issuer");
            PipelineError::FiscalLookup {
                ticker: ticker.clone(),
                period_end_date: normalized.clone(),
            }
        })?;

        let entry = calendar.period_end_dates.get(&normalized).ok_or_else(|| {
            error!(%ticker, %normalized, "no fiscal mapping for period end date");
            PipelineError::FiscalLookup {
                ticker: ticker.clone(),
                period_end_date: normalized.clone(),
            }
        })?;

        debug!(
            %ticker, %normalized,
            fiscal_year = %entry.fiscal_year,
            fiscal_period = %entry.fiscal_period,
            "fiscal period determined"
        );

        let mut info = FiscalPeriodInfo::new(
            &ticker,
            &normalized,
            &entry.fiscal_year,
            entry.fiscal_period,
        )?
        .with_source("company_fiscal_registry")
        .with_metadata("origin", "company_fiscal_registry")
        .with_metadata("registry_lookup", "true");
        if let Some(filing_type) = filing_type {
            info = info.with_filing_type(filing_type);
        }
        Ok(info)
    }

    /// Add a period-end mapping and persist the registry.
    ///
    /// Rejected when no registry file is configured: a mapping that cannot
    /// be persisted would silently disappear on the next run.
    pub fn add_mapping(
        &mut self,
        ticker: &str,
        raw_date: &str,
        fiscal_year: &str,
        fiscal_period: FiscalPeriod,
    ) -> Result<()> {
        let path = self.registry_path.clone().ok_or_else(|| {
            PipelineError::Config("fiscal registry file not configured; cannot add mapping".into())
        })?;

        let ticker = ticker.trim().to_uppercase();
        let normalized = normalize_period_end_date(raw_date)?;
        // Validate the pair through the contract before persisting it.
        FiscalPeriodInfo::new(&ticker, &normalized, fiscal_year, fiscal_period)?;

        self.calendars
            .entry(ticker.clone())
            .or_insert_with(|| CompanyCalendar {
                ticker: ticker.clone(),
                period_end_dates: BTreeMap::new(),
            })
            .period_end_dates
            .insert(
                normalized.clone(),
                CalendarEntry {
                    fiscal_year: fiscal_year.to_string(),
                    fiscal_period,
                },
            );

        self.save(&path)?;
        info!(%ticker, %normalized, %fiscal_year, %fiscal_period, "fiscal mapping added");
        Ok(())
    }

    pub fn has_calendar(&self, ticker: &str) -> bool {
        self.calendars.contains_key(&ticker.trim().to_uppercase())
    }

    pub fn company_count(&self) -> usize {
        self.calendars.len()
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.calendars)?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn merge_registry_file(path: &Path, calendars: &mut BTreeMap<String, CompanyCalendar>) -> Result<()> {
    let content = fs::read_to_string(path)?;
    let loaded: BTreeMap<String, CompanyCalendar> = serde_json::from_str(&content)?;
    for (ticker, calendar) in loaded {
        let ticker = ticker.to_uppercase();
        let existing = calendars.entry(ticker.clone()).or_insert_with(|| CompanyCalendar {
            ticker,
            period_end_dates: BTreeMap::new(),
        });
        for (date, entry) in calendar.period_end_dates {
            existing.period_end_dates.entry(date).or_insert(entry);
        }
    }
    Ok(())
}

fn calendar(ticker: &str, entries: &[(&str, &str, FiscalPeriod)]) -> CompanyCalendar {
    CompanyCalendar {
        ticker: ticker.to_string(),
        period_end_dates: entries
            .iter()
            .map(|(date, year, period)| {
                (
                    date.to_string(),
                    CalendarEntry {
                        fiscal_year: year.to_string(),
                        fiscal_period: *period,
                    },
                )
            })
            .collect(),
    }
}

/// Compiled-in fiscal calendars for the supported issuers, FY2021-FY2025.
/// Dates are the issuers' reported period ends; alternative dates appear
/// where an issuer's 52/53-week calendar shifts the quarter close.
fn builtin_calendars() -> BTreeMap<String, CompanyCalendar> {
    use FiscalPeriod::{Annual, Q1, Q2, Q3};

    let mut calendars = BTreeMap::new();

    // NVIDIA: fiscal year ends late January.
    calendars.insert(
        "NVDA".to_string(),
        calendar(
            "NVDA",
            &[
                ("2020-04-26", "2021", Q1),
                ("2020-07-26", "2021", Q2),
                ("2020-10-25", "2021", Q3),
                ("2021-01-31", "2021", Annual),
                ("2021-04-25", "2022", Q1),
                ("2021-05-02", "2022", Q1),
                ("2021-07-25", "2022", Q2),
                ("2021-08-01", "2022", Q2),
                ("2021-10-31", "2022", Q3),
                ("2022-01-30", "2022", Annual),
                ("2022-05-01", "2023", Q1),
                ("2022-07-31", "2023", Q2),
                ("2022-10-30", "2023", Q3),
                ("2023-01-29", "2023", Annual),
                ("2023-04-30", "2024", Q1),
                ("2023-07-30", "2024", Q2),
                ("2023-10-29", "2024", Q3),
                ("2024-01-28", "2024", Annual),
                ("2024-04-28", "2025", Q1),
                ("2024-07-28", "2025", Q2),
                ("2024-10-27", "2025", Q3),
                ("2025-01-26", "2025", Annual),
            ],
        ),
    );

    // Microsoft: fiscal year ends June 30.
    calendars.insert(
        "MSFT".to_string(),
        calendar(
            "MSFT",
            &[
                ("2020-09-30", "2021", Q1),
                ("2020-12-31", "2021", Q2),
                ("2021-03-31", "2021", Q3),
                ("2021-06-30", "2021", Annual),
                ("2021-09-30", "2022", Q1),
                ("2021-12-31", "2022", Q2),
                ("2022-03-31", "2022", Q3),
                ("2022-06-30", "2022", Annual),
                ("2022-09-30", "2023", Q1),
                ("2022-12-31", "2023", Q2),
                ("2023-03-31", "2023", Q3),
                ("2023-06-30", "2023", Annual),
                ("2023-09-30", "2024", Q1),
                ("2023-12-31", "2024", Q2),
                ("2024-03-31", "2024", Q3),
                ("2024-06-30", "2024", Annual),
                ("2024-09-30", "2025", Q1),
                ("2024-12-31", "2025", Q2),
                ("2025-03-31", "2025", Q3),
                ("2025-06-30", "2025", Annual),
            ],
        ),
    );

    // Apple: fiscal year ends late September.
    calendars.insert(
        "AAPL".to_string(),
        calendar(
            "AAPL",
            &[
                ("2020-12-26", "2021", Q1),
                ("2021-03-27", "2021", Q2),
                ("2021-06-26", "2021", Q3),
                ("2021-09-25", "2021", Annual),
                ("2021-12-25", "2022", Q1),
                ("2022-03-26", "2022", Q2),
                ("2022-06-25", "2022", Q3),
                ("2022-09-24", "2022", Annual),
                ("2022-12-31", "2023", Q1),
                ("2023-04-01", "2023", Q2),
                ("2023-07-01", "2023", Q3),
                ("2023-09-30", "2023", Annual),
                ("2023-12-30", "2024", Q1),
                ("2024-03-30", "2024", Q2),
                ("2024-06-29", "2024", Q3),
                ("2024-09-28", "2024", Annual),
                ("2024-12-28", "2025", Q1),
                ("2025-03-29", "2025", Q2),
                ("2025-06-28", "2025", Q3),
                ("2025-09-27", "2025", Annual),
            ],
        ),
    );

    // Alphabet: calendar fiscal year.
    calendars.insert(
        "GOOGL".to_string(),
        calendar(
            "GOOGL",
            &[
                ("2022-03-31", "2022", Q1),
                ("2022-06-30", "2022", Q2),
                ("2022-09-30", "2022", Q3),
                ("2022-12-31", "2022", Annual),
                ("2023-03-31", "2023", Q1),
                ("2023-06-30", "2023", Q2),
                ("2023-09-30", "2023", Q3),
                ("2023-12-31", "2023", Annual),
                ("2024-03-31", "2024", Q1),
                ("2024-06-30", "2024", Q2),
                ("2024-09-30", "2024", Q3),
                ("2024-12-31", "2024", Annual),
                ("2025-03-31", "2025", Q1),
                ("2025-06-30", "2025", Q2),
                ("2025-09-30", "2025", Q3),
                ("2025-12-31", "2025", Annual),
            ],
        ),
    );

    calendars
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    #[test]
    fn apple_fiscal_q1_crosses_calendar_years() {
        let registry = FiscalRegistry::builtin();
        let info = registry
            .determine("AAPL", "2022-12-31", Some(FilingType::TenQ))
            .unwrap();
        assert_eq!(info.fiscal_year(), "2023");
        assert_eq!(info.fiscal_period(), FiscalPeriod::Q1);
        assert_eq!(info.confidence(), 1.0);
    }

    #[test]
    fn microsoft_june_close_is_annual() {
        let registry = FiscalRegistry::builtin();
        let info = registry
            .determine("MSFT", "2024-06-30", Some(FilingType::TenK))
            .unwrap();
        assert_eq!(info.fiscal_year(), "2024");
        assert_eq!(info.fiscal_period(), FiscalPeriod::Annual);
    }

    #[test]
    fn nvidia_offset_fiscal_year() {
        let registry = FiscalRegistry::builtin();
        let info = registry.determine("NVDA", "2022-05-01", None).unwrap();
        assert_eq!(info.fiscal_year(), "2023");
        assert_eq!(info.fiscal_period(), FiscalPeriod::Q1);
    }

    #[test]
    fn alphabet_calendar_year() {
        let registry = FiscalRegistry::builtin();
        let info = registry.determine("GOOGL", "2024-12-31", None).unwrap();
        assert_eq!(info.fiscal_year(), "2024");
        assert_eq!(info.fiscal_period(), FiscalPeriod::Annual);
    }

    #[test]
    fn invalid_date_fails_before_lookup() {
        let registry = FiscalRegistry::builtin();
        assert_matches!(
            registry.determine("AAPL", "not-a-date", None),
            Err(PipelineError::InvalidDateFormat(_))
        );
    }

    #[test]
    fn unmapped_date_is_a_lookup_error() {
        let registry = FiscalRegistry::builtin();
        assert_matches!(
            registry.determine("AAPL", "2099-01-01", None),
            Err(PipelineError::FiscalLookup { .. })
        );
    }

    #[test]
    fn unknown_issuer_is_a_lookup_error() {
        let registry = FiscalRegistry::builtin();
        assert_matches!(
            registry.determine("ZZZZ", "2022-12-31", None),
            Err(PipelineError::FiscalLookup { .. })
        );
    }

    #[test]
    fn raw_date_formats_normalise_before_lookup() {
        let registry = FiscalRegistry::builtin();
        let info = registry.determine("AAPL", "12/31/2022", None).unwrap();
        assert_eq!(info.period_end_date(), "2022-12-31");
        assert_eq!(info.fiscal_period(), FiscalPeriod::Q1);
    }

    #[test]
    fn determination_is_deterministic() {
        let registry = FiscalRegistry::builtin();
        let first = registry.determine("MSFT", "2022-12-31", None).unwrap();
        for _ in 0..5 {
            let again = registry.determine("MSFT", "2022-12-31", None).unwrap();
            assert_eq!(again.fiscal_year(), first.fiscal_year());
            assert_eq!(again.fiscal_period(), first.fiscal_period());
        }
    }

    #[test]
    fn add_mapping_requires_configured_file() {
        let mut registry = FiscalRegistry::builtin();
        assert_matches!(
            registry.add_mapping("TSLA", "2024-12-31", "2024", FiscalPeriod::Annual),
            Err(PipelineError::Config(_))
        );
    }

    #[test]
    fn add_mapping_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fiscal_calendars.json");

        let mut registry = FiscalRegistry::new(Some(path.clone())).unwrap();
        registry
            .add_mapping("TSLA", "2024-12-31", "2024", FiscalPeriod::Annual)
            .unwrap();

        let reloaded = FiscalRegistry::new(Some(path)).unwrap();
        let info = reloaded.determine("TSLA", "2024-12-31", None).unwrap();
        assert_eq!(info.fiscal_year(), "2024");
        assert_eq!(info.fiscal_period(), FiscalPeriod::Annual);
    }

    #[test]
    fn file_entries_do_not_override_builtin_dates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fiscal_calendars.json");
        let conflicting = r#"{
            "MSFT": {
                "ticker": "MSFT",
                "period_end_dates": {
                    "2024-06-30": {"fiscal_year": "1999", "fiscal_period": "Q1"}
                }
            }
        }"#;
        std::fs::write(&path, conflicting).unwrap();

        let registry = FiscalRegistry::new(Some(path)).unwrap();
        let info = registry.determine("MSFT", "2024-06-30", None).unwrap();
        assert_eq!(info.fiscal_year(), "2024");
        assert_eq!(info.fiscal_period(), FiscalPeriod::Annual);
    }
}
