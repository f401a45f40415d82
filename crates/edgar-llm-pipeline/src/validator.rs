use std::collections::BTreeMap;
use tracing::{debug, warn};

use edgar_llm_core::{FactKind, ProcessedFiling, ValidationWarning, XbrlFact};

/// Relative tolerance for balance-sheet equations (0.1%).
const BALANCE_TOLERANCE: f64 = 0.001;

/// Equity concept variants, checked in order.
const EQUITY_CONCEPTS: &[&str] = &[
    "StockholdersEquity",
    "StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
];

/// Minority-interest concept variants.
const MINORITY_CONCEPTS: &[&str] = &["MinorityInterest", "NoncontrollingInterestEquity"];

/// **Financial Validator**
///
/// Domain-invariant checks over a processed filing: balance-sheet
/// consistency per context and referential completeness of context and
/// unit dictionaries. Produces [`ValidationWarning`]s; never aborts the
/// pipeline. With derivation enabled it may insert a missing balance-sheet
/// total, tagged `derived=true`.
#[derive(Debug, Clone)]
pub struct FinancialValidator {
    tolerance: f64,
    derive_missing_totals: bool,
}

impl Default for FinancialValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FinancialValidator {
    pub fn new() -> Self {
        Self {
            tolerance: BALANCE_TOLERANCE,
            derive_missing_totals: false,
        }
    }

    pub fn with_derivation(mut self, enabled: bool) -> Self {
        self.derive_missing_totals = enabled;
        self
    }

    /// Run all checks, appending warnings (and possibly derived facts) to
    /// the filing. Returns the number of warnings added.
    pub fn validate(&self, filing: &mut ProcessedFiling) -> usize {
        let mut warnings = Vec::new();

        self.check_references(filing, &mut warnings);
        let derived = self.check_balance_sheets(filing, &mut warnings);

        let added = warnings.len();
        filing.warnings.extend(warnings);
        filing.facts.extend(derived);
        added
    }

    /// Every fact must reference a known context; numeric facts must carry
    /// a resolvable unit, non-numeric facts must not carry one.
    fn check_references(&self, filing: &ProcessedFiling, warnings: &mut Vec<ValidationWarning>) {
        for fact in &filing.facts {
            if !fact.context_ref.is_empty() && !filing.contexts.contains_key(&fact.context_ref) {
                warnings.push(
                    ValidationWarning::new(
                        "orphan_context_ref",
                        format!("fact {} references unknown context", fact.name),
                    )
                    .with_context(&fact.context_ref),
                );
            }
            match (&fact.kind, &fact.unit_ref) {
                (FactKind::NonFraction, None) => warnings.push(ValidationWarning::new(
                    "unitless_numeric_fact",
                    format!("numeric fact {} has no unit reference", fact.name),
                )),
                (FactKind::NonFraction, Some(unit_ref)) => {
                    if !filing.units.contains_key(unit_ref) {
                        warnings.push(ValidationWarning::new(
                            "unresolved_unit_ref",
                            format!("fact {} references unknown unit {unit_ref}", fact.name),
                        ));
                    }
                }
                (FactKind::NonNumeric, Some(unit_ref)) => {
                    warnings.push(ValidationWarning::new(
                        "unit_on_nonnumeric",
                        format!("non-numeric fact {} carries unit {unit_ref}", fact.name),
                    ));
                }
                _ => {}
            }
        }
    }

    /// Per balance-sheet context:
    /// `Assets == Liabilities + Equity + MinorityInterests` within
    /// tolerance, and `LiabilitiesAndStockholdersEquity == Assets` when the
    /// combined total is reported.
    fn check_balance_sheets(
        &self,
        filing: &ProcessedFiling,
        warnings: &mut Vec<ValidationWarning>,
    ) -> Vec<XbrlFact> {
        let mut derived = Vec::new();

        for (context_id, context) in &filing.contexts {
            // Dimensional contexts carry segment slices, not the
            // consolidated totals the equation is stated over.
            if !context.dimensions.is_empty() {
                continue;
            }

            let values = self.collect_balance_values(filing, context_id);
            let assets = values.get("Assets").copied();
            let liabilities = values.get("Liabilities").copied();
            let equity = EQUITY_CONCEPTS.iter().find_map(|c| values.get(*c).copied());
            let minority = MINORITY_CONCEPTS
                .iter()
                .find_map(|c| values.get(*c).copied())
                .unwrap_or(0.0);
            let combined_total = values.get("LiabilitiesAndStockholdersEquity").copied();

            if let (Some(assets), Some(liabilities), Some(equity)) = (assets, liabilities, equity) {
                let total = liabilities + equity + minority;
                let tolerance = assets.abs().max(total.abs()) * self.tolerance;
                if (assets - total).abs() > tolerance {
                    warn!(
                        context = %context_id,
                        assets, liabilities, equity, minority,
                        "balance sheet does not balance"
                    );
                    warnings.push(
                        ValidationWarning::new(
                            "balance_sheet_imbalance",
                            format!(
                                "Assets ({assets}) != Liabilities ({liabilities}) + Equity \
                                 ({equity}) + Minority Interests ({minority})"
                            ),
                        )
                        .with_context(context_id),
                    );
                }
            } else if self.derive_missing_totals {
                if let Some(fact) =
                    self.derive_missing(filing, context_id, assets, liabilities, equity, minority)
                {
                    debug!(context = %context_id, concept = %fact.name, "derived missing total");
                    derived.push(fact);
                }
            }

            if let (Some(assets), Some(total)) = (assets, combined_total) {
                let tolerance = assets.abs().max(total.abs()) * self.tolerance;
                if (assets - total).abs() > tolerance {
                    warnings.push(
                        ValidationWarning::new(
                            "balance_sheet_imbalance",
                            format!(
                                "LiabilitiesAndStockholdersEquity ({total}) != Assets ({assets})"
                            ),
                        )
                        .with_context(context_id),
                    );
                }
            }
        }

        derived
    }

    /// Largest reported value per balance-sheet concept local name within
    /// one context.
    fn collect_balance_values(
        &self,
        filing: &ProcessedFiling,
        context_id: &str,
    ) -> BTreeMap<String, f64> {
        let mut values: BTreeMap<String, f64> = BTreeMap::new();
        for fact in &filing.facts {
            if fact.context_ref != context_id || fact.prefix() != "us-gaap" {
                continue;
            }
            let local = fact.local_name();
            let tracked = local == "Assets"
                || local == "Liabilities"
                || local == "LiabilitiesAndStockholdersEquity"
                || EQUITY_CONCEPTS.contains(&local)
                || MINORITY_CONCEPTS.contains(&local);
            if !tracked {
                continue;
            }
            if let Some(value) = fact.numeric_value() {
                values
                    .entry(local.to_string())
                    .and_modify(|existing| {
                        if value.abs() > existing.abs() {
                            *existing = value;
                        }
                    })
                    .or_insert(value);
            }
        }
        values
    }

    /// When exactly one of {Assets, Liabilities, Equity} is missing and the
    /// other two are present, insert the implied value tagged derived.
    fn derive_missing(
        &self,
        filing: &ProcessedFiling,
        context_id: &str,
        assets: Option<f64>,
        liabilities: Option<f64>,
        equity: Option<f64>,
        minority: f64,
    ) -> Option<XbrlFact> {
        let unit_ref = filing
            .facts
            .iter()
            .find(|f| f.context_ref == context_id && f.unit_ref.is_some())
            .and_then(|f| f.unit_ref.clone());

        let (name, value) = match (assets, liabilities, equity) {
            (None, Some(l), Some(e)) => ("us-gaap:Assets", l + e + minority),
            (Some(a), None, Some(e)) => ("us-gaap:Liabilities", a - e - minority),
            (Some(a), Some(l), None) => ("us-gaap:StockholdersEquity", a - l - minority),
            _ => return None,
        };

        Some(XbrlFact {
            kind: FactKind::NonFraction,
            name: name.to_string(),
            context_ref: context_id.to_string(),
            unit_ref,
            scale: None,
            decimals: None,
            format: Some("derived=true".to_string()),
            value: format!("{value}"),
            hidden: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgar_llm_core::{FilingDescriptor, FilingType, Period, XbrlContext, XbrlUnit};
    use std::collections::BTreeMap;

    fn filing_with(facts: Vec<(&str, &str, &str)>) -> ProcessedFiling {
        let descriptor = FilingDescriptor::new(
            "TEST",
            "123",
            FilingType::TenK,
            "2024-02-01",
            Some("2023-12-31"),
            "https://www.sec.gov/doc.htm",
            "0000000123-24-000001",
        )
        .unwrap();
        let mut filing = ProcessedFiling::new(descriptor);
        filing.contexts.insert(
            "c1".to_string(),
            XbrlContext {
                id: "c1".to_string(),
                entity_identifier: "123".to_string(),
                entity_scheme: "http://www.sec.gov/CIK".to_string(),
                period: Period::Instant {
                    date: "2023-12-31".to_string(),
                },
                dimensions: BTreeMap::new(),
                synthetic: false,
            },
        );
        filing
            .units
            .insert("usd".to_string(), XbrlUnit::Simple { measure: "iso4217:USD".into() });
        for (name, context_ref, value) in facts {
            filing.facts.push(XbrlFact {
                kind: FactKind::NonFraction,
                name: name.to_string(),
                context_ref: context_ref.to_string(),
                unit_ref: Some("usd".to_string()),
                scale: None,
                decimals: None,
                format: None,
                value: value.to_string(),
                hidden: false,
            });
        }
        filing
    }

    #[test]
    fn balanced_sheet_produces_no_warnings() {
        let mut filing = filing_with(vec![
            ("us-gaap:Assets", "c1", "1000"),
            ("us-gaap:Liabilities", "c1", "600"),
            ("us-gaap:StockholdersEquity", "c1", "400"),
        ]);
        FinancialValidator::new().validate(&mut filing);
        assert!(filing
            .warnings
            .iter()
            .all(|w| w.code != "balance_sheet_imbalance"));
    }

    #[test]
    fn small_rounding_differences_are_within_tolerance() {
        let mut filing = filing_with(vec![
            ("us-gaap:Assets", "c1", "1000000"),
            ("us-gaap:Liabilities", "c1", "600000"),
            ("us-gaap:StockholdersEquity", "c1", "400500"),
        ]);
        FinancialValidator::new().validate(&mut filing);
        assert!(filing
            .warnings
            .iter()
            .all(|w| w.code != "balance_sheet_imbalance"));
    }

    #[test]
    fn imbalance_above_tolerance_is_flagged() {
        let mut filing = filing_with(vec![
            ("us-gaap:Assets", "c1", "1000"),
            ("us-gaap:Liabilities", "c1", "600"),
            ("us-gaap:StockholdersEquity", "c1", "300"),
        ]);
        FinancialValidator::new().validate(&mut filing);
        let imbalance = filing
            .warnings
            .iter()
            .find(|w| w.code == "balance_sheet_imbalance")
            .unwrap();
        assert_eq!(imbalance.context_ref.as_deref(), Some("c1"));
    }

    #[test]
    fn combined_total_is_checked_against_assets() {
        let mut filing = filing_with(vec![
            ("us-gaap:Assets", "c1", "1000"),
            ("us-gaap:LiabilitiesAndStockholdersEquity", "c1", "900"),
        ]);
        FinancialValidator::new().validate(&mut filing);
        assert!(filing
            .warnings
            .iter()
            .any(|w| w.code == "balance_sheet_imbalance"));
    }

    #[test]
    fn minority_interest_participates() {
        let mut filing = filing_with(vec![
            ("us-gaap:Assets", "c1", "1000"),
            ("us-gaap:Liabilities", "c1", "600"),
            ("us-gaap:StockholdersEquity", "c1", "350"),
            ("us-gaap:MinorityInterest", "c1", "50"),
        ]);
        FinancialValidator::new().validate(&mut filing);
        assert!(filing
            .warnings
            .iter()
            .all(|w| w.code != "balance_sheet_imbalance"));
    }

    #[test]
    fn orphan_context_and_unit_references() {
        let mut filing = filing_with(vec![("us-gaap:Assets", "missing", "1000")]);
        filing.facts.push(XbrlFact {
            kind: FactKind::NonFraction,
            name: "us-gaap:Liabilities".to_string(),
            context_ref: "c1".to_string(),
            unit_ref: Some("eur".to_string()),
            scale: None,
            decimals: None,
            format: None,
            value: "1".to_string(),
            hidden: false,
        });
        filing.facts.push(XbrlFact {
            kind: FactKind::NonFraction,
            name: "us-gaap:NetIncomeLoss".to_string(),
            context_ref: "c1".to_string(),
            unit_ref: None,
            scale: None,
            decimals: None,
            format: None,
            value: "1".to_string(),
            hidden: false,
        });
        FinancialValidator::new().validate(&mut filing);

        let codes: Vec<&str> = filing.warnings.iter().map(|w| w.code.as_str()).collect();
        assert!(codes.contains(&"orphan_context_ref"));
        assert!(codes.contains(&"unresolved_unit_ref"));
        assert!(codes.contains(&"unitless_numeric_fact"));
    }

    #[test]
    fn derivation_inserts_tagged_equity() {
        let mut filing = filing_with(vec![
            ("us-gaap:Assets", "c1", "1000"),
            ("us-gaap:Liabilities", "c1", "600"),
        ]);
        FinancialValidator::new()
            .with_derivation(true)
            .validate(&mut filing);

        let derived = filing
            .facts
            .iter()
            .find(|f| f.format.as_deref() == Some("derived=true"))
            .unwrap();
        assert_eq!(derived.name, "us-gaap:StockholdersEquity");
        assert_eq!(derived.value, "400");
    }

    #[test]
    fn dimensional_contexts_are_skipped() {
        let mut filing = filing_with(vec![]);
        let mut dims = BTreeMap::new();
        dims.insert(
            "us-gaap:StatementBusinessSegmentsAxis".to_string(),
            "test:SegmentMember".to_string(),
        );
        filing.contexts.insert(
            "c2".to_string(),
            XbrlContext {
                id: "c2".to_string(),
                entity_identifier: "123".to_string(),
                entity_scheme: "http://www.sec.gov/CIK".to_string(),
                period: Period::Instant {
                    date: "2023-12-31".to_string(),
                },
                dimensions: dims,
                synthetic: false,
            },
        );
        filing.facts.push(XbrlFact {
            kind: FactKind::NonFraction,
            name: "us-gaap:Assets".to_string(),
            context_ref: "c2".to_string(),
            unit_ref: Some("usd".to_string()),
            scale: None,
            decimals: None,
            format: None,
            value: "42".to_string(),
            hidden: false,
        });
        FinancialValidator::new().validate(&mut filing);
        assert!(filing
            .warnings
            .iter()
            .all(|w| w.code != "balance_sheet_imbalance"));
    }
}
