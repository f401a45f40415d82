pub mod optimizer;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use tracing::debug;

use edgar_llm_core::{FiscalPeriodInfo, ProcessedFiling, StatementType};

use crate::hierarchy::FilingHierarchy;

pub use optimizer::FileSizeOptimizer;

/// Assign compact context codes `c-1`, `c-2`, ... to the original context
/// ids, in sorted id order so the assignment is deterministic.
pub fn context_codes(filing: &ProcessedFiling) -> BTreeMap<String, String> {
    filing
        .contexts
        .keys()
        .enumerate()
        .map(|(i, id)| (id.clone(), format!("c-{}", i + 1)))
        .collect()
}

/// Table cells and fact values share the pipe-delimited line grammar;
/// embedded pipes are rewritten so the line stays parseable.
fn sanitize(value: &str) -> String {
    value.replace('|', "/")
}

/// **LLM Formatter**
///
/// Renders a processed filing into the verbose text document. The
/// published artifact is this output run through [`FileSizeOptimizer`];
/// together they produce a byte-stable encoding: sections in fixed order,
/// concepts by hierarchy depth then name, contexts by dictionary code.
#[derive(Debug, Default)]
pub struct LlmFormatter;

impl LlmFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        &self,
        filing: &ProcessedFiling,
        hierarchy: &FilingHierarchy,
        fiscal: Option<&FiscalPeriodInfo>,
    ) -> String {
        let codes = context_codes(filing);
        let mut out = String::new();

        self.render_metadata(filing, fiscal, &mut out);
        self.render_context_dictionary(filing, &codes, &mut out);
        self.render_unit_dictionary(filing, &mut out);
        self.render_narrative(filing, &mut out);
        self.render_statements(filing, hierarchy, &codes, &mut out);
        self.render_statement_mapping(filing, &mut out);
        self.render_facts(filing, &codes, &mut out);
        self.render_summary(filing, &mut out);

        debug!(bytes = out.len(), "rendered verbose artifact");
        out
    }

    fn render_metadata(
        &self,
        filing: &ProcessedFiling,
        fiscal: Option<&FiscalPeriodInfo>,
        out: &mut String,
    ) {
        let d = &filing.descriptor;
        let _ = writeln!(out, "@DOCUMENT_METADATA");
        let _ = writeln!(out, "@COMPANY: {}", d.display_name());
        let _ = writeln!(out, "@TICKER: {}", d.ticker);
        let _ = writeln!(out, "@FILING_TYPE: {}", d.filing_type);
        if let Some(fiscal) = fiscal {
            let _ = writeln!(out, "@FISCAL_YEAR: {}", fiscal.fiscal_year());
            let _ = writeln!(out, "@FISCAL_PERIOD: {}", fiscal.fiscal_period());
        }
        let _ = writeln!(out, "@FILING_DATE: {}", d.filing_date);
        if let Some(period_end) = fiscal
            .map(|f| f.period_end_date().to_string())
            .or_else(|| d.period_end_date.clone())
        {
            let _ = writeln!(out, "@PERIOD_END_DATE: {period_end}");
        }
        out.push('\n');
    }

    fn render_context_dictionary(
        &self,
        filing: &ProcessedFiling,
        codes: &BTreeMap<String, String>,
        out: &mut String,
    ) {
        let _ = writeln!(out, "@DATA_DICTIONARY: CONTEXTS");
        for (id, context) in &filing.contexts {
            let code = &codes[id];
            let _ = writeln!(out, "{code} | @CODE: {id}");
            let _ = writeln!(out, "     @LABEL: {}", context.period.label());
            for (dimension, member) in &context.dimensions {
                let _ = writeln!(out, "     @DIMENSION: {dimension} = {member}");
            }
        }
        out.push('\n');
    }

    fn render_unit_dictionary(&self, filing: &ProcessedFiling, out: &mut String) {
        if filing.units.is_empty() {
            return;
        }
        let _ = writeln!(out, "@DATA_DICTIONARY: UNITS");
        for (id, unit) in &filing.units {
            let _ = writeln!(out, "{id} | {}", unit.label());
        }
        out.push('\n');
    }

    fn render_narrative(&self, filing: &ProcessedFiling, out: &mut String) {
        for section in filing.sections.values() {
            let _ = writeln!(out, "@NARRATIVE_TEXT: {}", sanitize(&section.title));
            let _ = writeln!(out, "{}", sanitize(&section.body));
            out.push('\n');
        }
    }

    /// Wide per-statement tables (context columns), flattened to the long
    /// normalized form by the optimiser. Rows are ordered by hierarchy
    /// depth ascending, then concept name; columns by context code.
    fn render_statements(
        &self,
        filing: &ProcessedFiling,
        hierarchy: &FilingHierarchy,
        codes: &BTreeMap<String, String>,
        out: &mut String,
    ) {
        // (concept, context code) -> first reported value.
        let mut values: BTreeMap<(String, String), String> = BTreeMap::new();
        for fact in &filing.facts {
            if fact.value.is_empty() {
                continue;
            }
            let Some(code) = codes.get(&fact.context_ref) else {
                continue;
            };
            values
                .entry((fact.name.clone(), code.clone()))
                .or_insert_with(|| sanitize(&fact.value));
        }

        for statement in StatementType::ALL {
            if statement == StatementType::Other {
                continue;
            }

            let mut concepts: Vec<(usize, String)> = filing
                .statement_mapping
                .iter()
                .filter(|(_, st)| **st == statement)
                .map(|(concept, _)| (hierarchy.level(concept).1, concept.clone()))
                .collect();
            concepts.sort();

            let mut columns: BTreeSet<String> = BTreeSet::new();
            for (_, concept) in &concepts {
                for code in codes.values() {
                    if values.contains_key(&(concept.clone(), code.clone())) {
                        columns.insert(code.clone());
                    }
                }
            }
            if concepts.is_empty() || columns.is_empty() {
                continue;
            }
            let columns: Vec<String> = sort_codes(columns);

            let _ = writeln!(out, "@FINANCIAL_STATEMENT: {statement}");
            let labels: Vec<String> = columns
                .iter()
                .map(|code| {
                    let label = filing
                        .contexts
                        .iter()
                        .find(|(id, _)| codes[*id] == *code)
                        .map(|(_, c)| c.period.label())
                        .unwrap_or_default();
                    format!("{code} ({label})")
                })
                .collect();
            let _ = writeln!(out, "@CONTEXT_LABELS: {}", labels.join("; "));
            let _ = writeln!(out, "Line Item | {}", columns.join(" | "));

            for (_, concept) in &concepts {
                let row: Vec<String> = columns
                    .iter()
                    .map(|code| {
                        values
                            .get(&(concept.clone(), code.clone()))
                            .cloned()
                            .unwrap_or_else(|| "-".to_string())
                    })
                    .collect();
                if row.iter().all(|cell| cell == "-") {
                    continue;
                }
                let _ = writeln!(out, "{concept} | {}", row.join(" | "));
            }
            out.push('\n');
        }
    }

    fn render_statement_mapping(&self, filing: &ProcessedFiling, out: &mut String) {
        let _ = writeln!(out, "@FINANCIAL_STATEMENTS_MAPPING");
        for statement in StatementType::ALL {
            // prefix -> local names mapped to this statement.
            let mut by_prefix: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (concept, st) in &filing.statement_mapping {
                if st != &statement {
                    continue;
                }
                let (prefix, local) = match concept.split_once(':') {
                    Some((prefix, local)) => (prefix.to_string(), local.to_string()),
                    None => (String::new(), concept.clone()),
                };
                by_prefix.entry(prefix).or_default().push(local);
            }
            if by_prefix.is_empty() {
                continue;
            }
            let _ = writeln!(out, "@STATEMENT_TYPE: {statement}");
            for (prefix, mut locals) in by_prefix {
                locals.sort();
                let _ = writeln!(out, "{prefix}: {}", locals.join(", "));
            }
        }
        out.push('\n');
    }

    /// Every fact tuple, once. This section is what the round-trip
    /// verifier reconstructs tuples from.
    fn render_facts(
        &self,
        filing: &ProcessedFiling,
        codes: &BTreeMap<String, String>,
        out: &mut String,
    ) {
        let _ = writeln!(out, "@FACTS");
        let _ = writeln!(out, "@FORMAT: Concept|Value|Context|Unit|Decimals");

        let mut seen: BTreeSet<(String, String, String, String)> = BTreeSet::new();
        for fact in &filing.facts {
            let context = codes
                .get(&fact.context_ref)
                .cloned()
                .unwrap_or_else(|| fact.context_ref.clone());
            let unit = fact.unit_ref.clone().unwrap_or_default();
            let value = sanitize(&fact.value);
            if !seen.insert((fact.name.clone(), context.clone(), unit.clone(), value.clone())) {
                continue;
            }
            let decimals = fact.decimals.clone().unwrap_or_default();
            let _ = writeln!(out, "{}|{value}|{context}|{unit}|{decimals}", fact.name);
        }
        out.push('\n');
    }

    fn render_summary(&self, filing: &ProcessedFiling, out: &mut String) {
        let _ = writeln!(out, "@SECTION: DOCUMENT_SUMMARY");
        let _ = writeln!(out, "@FACT_COUNT: {}", filing.facts.len());
        let _ = writeln!(out, "@CONTEXT_COUNT: {}", filing.contexts.len());
        let _ = writeln!(out, "@UNIT_COUNT: {}", filing.units.len());
        if filing.contexts_synthetic {
            let _ = writeln!(out, "@CONTEXTS_SYNTHETIC: true");
        }
        if !filing.warnings.is_empty() {
            let _ = writeln!(out, "@WARNING_COUNT: {}", filing.warnings.len());
        }
    }
}

/// Sort context codes numerically (`c-2` before `c-10`).
pub fn sort_codes<I: IntoIterator<Item = String>>(codes: I) -> Vec<String> {
    let mut codes: Vec<String> = codes.into_iter().collect();
    codes.sort_by_key(|code| {
        code.strip_prefix("c-")
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or(u64::MAX)
    });
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyResolver;
    use edgar_llm_core::{
        FactKind, FilingDescriptor, FilingType, FiscalPeriod, NarrativeSection, Period,
        XbrlContext, XbrlFact, XbrlUnit,
    };
    use std::collections::BTreeSet;

    fn sample_filing() -> ProcessedFiling {
        let descriptor = FilingDescriptor::new(
            "AAPL",
            "320193",
            FilingType::TenQ,
            "2023-02-03",
            Some("2022-12-31"),
            "https://www.sec.gov/aapl.htm",
            "0000320193-23-000006",
        )
        .unwrap();
        let mut filing = ProcessedFiling::new(descriptor);

        filing.contexts.insert(
            "C_0000320193_20221231".into(),
            XbrlContext {
                id: "C_0000320193_20221231".into(),
                entity_identifier: "0000320193".into(),
                entity_scheme: "http://www.sec.gov/CIK".into(),
                period: Period::Instant {
                    date: "2022-12-31".into(),
                },
                dimensions: BTreeMap::new(),
                synthetic: false,
            },
        );
        filing.contexts.insert(
            "C_0000320193_20221001_20221231".into(),
            XbrlContext {
                id: "C_0000320193_20221001_20221231".into(),
                entity_identifier: "0000320193".into(),
                entity_scheme: "http://www.sec.gov/CIK".into(),
                period: Period::Duration {
                    start_date: "2022-10-01".into(),
                    end_date: "2022-12-31".into(),
                },
                dimensions: BTreeMap::new(),
                synthetic: false,
            },
        );
        filing.units.insert(
            "usd".into(),
            XbrlUnit::Simple {
                measure: "iso4217:USD".into(),
            },
        );

        for (name, context, value) in [
            ("us-gaap:Assets", "C_0000320193_20221231", "346,747"),
            ("us-gaap:AssetsCurrent", "C_0000320193_20221231", "128,777"),
            (
                "us-gaap:NetIncomeLoss",
                "C_0000320193_20221001_20221231",
                "29,998",
            ),
        ] {
            filing.facts.push(XbrlFact {
                kind: FactKind::NonFraction,
                name: name.into(),
                context_ref: context.into(),
                unit_ref: Some("usd".into()),
                scale: Some("6".into()),
                decimals: Some("-6".into()),
                format: None,
                value: value.into(),
                hidden: false,
            });
        }
        filing.statement_mapping.insert(
            "us-gaap:Assets".into(),
            StatementType::BalanceSheet,
        );
        filing.statement_mapping.insert(
            "us-gaap:AssetsCurrent".into(),
            StatementType::BalanceSheet,
        );
        filing.statement_mapping.insert(
            "us-gaap:NetIncomeLoss".into(),
            StatementType::IncomeStatement,
        );
        filing.sections.insert(
            "SignificantAccountingPoliciesTextBlock".into(),
            NarrativeSection {
                title: "Significant Accounting Policies".into(),
                body: "Summary of significant accounting policies.".into(),
            },
        );
        filing
    }

    fn render_sample() -> String {
        let filing = sample_filing();
        let hierarchy = HierarchyResolver::new().resolve(
            &[],
            &[],
            &filing.facts.iter().map(|f| f.name.clone()).collect(),
        );
        let fiscal =
            FiscalPeriodInfo::new("AAPL", "2022-12-31", "2023", FiscalPeriod::Q1).unwrap();
        LlmFormatter::new().render(&filing, &hierarchy, Some(&fiscal))
    }

    #[test]
    fn metadata_header_carries_fiscal_attribution() {
        let rendered = render_sample();
        assert!(rendered.starts_with("@DOCUMENT_METADATA\n"));
        assert!(rendered.contains("@TICKER: AAPL"));
        assert!(rendered.contains("@FISCAL_YEAR: 2023"));
        assert!(rendered.contains("@FISCAL_PERIOD: Q1"));
        assert!(rendered.contains("@PERIOD_END_DATE: 2022-12-31"));
    }

    #[test]
    fn context_codes_are_assigned_in_sorted_order() {
        let filing = sample_filing();
        let codes = context_codes(&filing);
        // BTreeMap iteration order: the duration id sorts before the
        // instant id.
        assert_eq!(codes["C_0000320193_20221001_20221231"], "c-1");
        assert_eq!(codes["C_0000320193_20221231"], "c-2");
    }

    #[test]
    fn dictionary_maps_codes_to_original_ids() {
        let rendered = render_sample();
        assert!(rendered.contains("@DATA_DICTIONARY: CONTEXTS"));
        assert!(rendered.contains("c-1 | @CODE: C_0000320193_20221001_20221231"));
        assert!(rendered.contains("@LABEL: Period 2022-10-01 to 2022-12-31"));
        assert!(rendered.contains("c-2 | @CODE: C_0000320193_20221231"));
    }

    #[test]
    fn statements_render_as_wide_tables() {
        let rendered = render_sample();
        assert!(rendered.contains("@FINANCIAL_STATEMENT: Balance_Sheet"));
        assert!(rendered.contains("Line Item | c-2"));
        assert!(rendered.contains("us-gaap:Assets | 346,747"));
        assert!(rendered.contains("@FINANCIAL_STATEMENT: Income_Statement"));
    }

    #[test]
    fn facts_section_lists_every_tuple() {
        let rendered = render_sample();
        assert!(rendered.contains("@FACTS"));
        assert!(rendered.contains("@FORMAT: Concept|Value|Context|Unit|Decimals"));
        assert!(rendered.contains("us-gaap:Assets|346,747|c-2|usd|-6"));
        assert!(rendered.contains("us-gaap:NetIncomeLoss|29,998|c-1|usd|-6"));
    }

    #[test]
    fn rendering_is_byte_stable() {
        assert_eq!(render_sample(), render_sample());
    }

    #[test]
    fn duplicate_tuples_are_emitted_once() {
        let mut filing = sample_filing();
        let duplicate = filing.facts[0].clone();
        filing.facts.push(duplicate);
        let hierarchy = HierarchyResolver::new().resolve(&[], &[], &BTreeSet::new());
        let rendered = LlmFormatter::new().render(&filing, &hierarchy, None);
        assert_eq!(rendered.matches("us-gaap:Assets|346,747|c-2|usd").count(), 1);
    }

    #[test]
    fn code_sort_is_numeric() {
        let codes = sort_codes(vec!["c-10".to_string(), "c-2".to_string(), "c-1".to_string()]);
        assert_eq!(codes, vec!["c-1", "c-2", "c-10"]);
    }
}
