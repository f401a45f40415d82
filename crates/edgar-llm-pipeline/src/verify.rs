use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use edgar_llm_core::{ProcessedFiling, Result, XbrlContext, XbrlUnit};

/// One fact record in the raw-XBRL side dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFactRecord {
    pub name: String,
    #[serde(rename = "contextRef")]
    pub context_ref: String,
    #[serde(rename = "unitRef")]
    pub unit_ref: Option<String>,
    pub value: String,
    pub decimals: Option<String>,
    pub scale: Option<String>,
}

/// **Raw XBRL Dump**
///
/// JSON side artifact carrying every extracted fact plus the context and
/// unit dictionaries. Written next to the published artifacts when
/// enabled; always built in memory so the verifier has ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawXbrlDump {
    pub facts: Vec<RawFactRecord>,
    pub contexts: BTreeMap<String, XbrlContext>,
    pub units: BTreeMap<String, XbrlUnit>,
}

impl RawXbrlDump {
    pub fn from_filing(filing: &ProcessedFiling) -> Self {
        Self {
            facts: filing
                .facts
                .iter()
                .map(|fact| RawFactRecord {
                    name: fact.name.clone(),
                    context_ref: fact.context_ref.clone(),
                    unit_ref: fact.unit_ref.clone(),
                    value: fact.value.clone(),
                    decimals: fact.decimals.clone(),
                    scale: fact.scale.clone(),
                })
                .collect(),
            contexts: filing.contexts.clone(),
            units: filing.units.clone(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// **Coverage Report**
///
/// Result of comparing the emitted artifact against the raw dump:
/// exact-tuple coverage, concept-name coverage, and sample mismatches for
/// debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub raw_tuples: usize,
    pub exact_matches: usize,
    pub name_matches: usize,
    pub exact_coverage: f64,
    pub name_coverage: f64,
    pub threshold: f64,
    pub mismatch_samples: Vec<String>,
}

impl CoverageReport {
    pub fn passed(&self) -> bool {
        self.exact_coverage >= self.threshold
    }
}

/// **Round-Trip Verifier**
///
/// Parses the published LLM artifact back into
/// `(concept, contextRef, unitRef, value)` tuples and intersects them with
/// the raw dump. Runs after publication, so it always observes the final
/// artifact bytes.
#[derive(Debug)]
pub struct Verifier {
    threshold: f64,
    dictionary_line: Regex,
}

impl Verifier {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            dictionary_line: Regex::new(r"^(c-\d+)\s*\|?\s*@CODE:\s*(\S+)").expect("static regex"),
        }
    }

    pub fn verify(&self, raw: &RawXbrlDump, artifact: &str) -> CoverageReport {
        let emitted = self.parse_artifact(artifact);
        let emitted_names: BTreeSet<&str> =
            emitted.iter().map(|(name, _, _, _)| name.as_str()).collect();

        let mut raw_tuples: BTreeSet<(String, String, String, String)> = BTreeSet::new();
        for fact in &raw.facts {
            raw_tuples.insert((
                fact.name.clone(),
                fact.context_ref.clone(),
                fact.unit_ref.clone().unwrap_or_default(),
                fact.value.replace('|', "/"),
            ));
        }

        let mut exact_matches = 0usize;
        let mut name_matches = 0usize;
        let mut mismatch_samples = Vec::new();
        for tuple in &raw_tuples {
            if emitted.contains(tuple) {
                exact_matches += 1;
                name_matches += 1;
            } else if emitted_names.contains(tuple.0.as_str()) {
                name_matches += 1;
                if mismatch_samples.len() < 10 {
                    mismatch_samples.push(format!(
                        "value/context mismatch for {} in context {}",
                        tuple.0, tuple.1
                    ));
                }
            } else if mismatch_samples.len() < 10 {
                mismatch_samples.push(format!("concept {} missing from artifact", tuple.0));
            }
        }

        let total = raw_tuples.len();
        let report = CoverageReport {
            raw_tuples: total,
            exact_matches,
            name_matches,
            exact_coverage: coverage(exact_matches, total),
            name_coverage: coverage(name_matches, total),
            threshold: self.threshold,
            mismatch_samples,
        };

        if report.passed() {
            info!(
                exact = report.exact_coverage,
                by_name = report.name_coverage,
                "round-trip verification passed"
            );
        } else {
            warn!(
                exact = report.exact_coverage,
                threshold = self.threshold,
                "round-trip verification failed"
            );
        }
        report
    }

    /// Reconstruct `(concept, original contextRef, unitRef, value)` tuples
    /// from the artifact's `@FACTS` section, mapping `c-k` codes back
    /// through the context dictionary.
    fn parse_artifact(&self, artifact: &str) -> BTreeSet<(String, String, String, String)> {
        let mut code_to_id: BTreeMap<String, String> = BTreeMap::new();
        for line in artifact.lines() {
            if let Some(caps) = self.dictionary_line.captures(line.trim()) {
                code_to_id.insert(caps[1].to_string(), caps[2].to_string());
            }
        }

        let mut tuples = BTreeSet::new();
        let mut in_facts = false;
        for line in artifact.lines() {
            let trimmed = line.trim();
            if trimmed == "@FACTS" {
                in_facts = true;
                continue;
            }
            if !in_facts {
                continue;
            }
            if trimmed.starts_with('@') && !trimmed.starts_with("@FORMAT:") {
                if trimmed.starts_with("@SEC") || trimmed.starts_with("@SECTION") {
                    break;
                }
                continue;
            }
            if trimmed.starts_with("@FORMAT:") || trimmed.is_empty() {
                continue;
            }

            let parts: Vec<&str> = trimmed.split('|').collect();
            if parts.len() < 4 {
                continue;
            }
            let concept = parts[0].to_string();
            let value = parts[1].to_string();
            let context = code_to_id
                .get(parts[2])
                .cloned()
                .unwrap_or_else(|| parts[2].to_string());
            let unit = parts[3].to_string();
            tuples.insert((concept, context, unit, value));
        }
        tuples
    }
}

fn coverage(matches: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        matches as f64 / total as f64
    }
}
