use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::filing::FilingDescriptor;

/// **XBRL Reporting Period**
///
/// Either a point-in-time balance (instant) or a flow over a date range
/// (duration). Contexts synthesised from opaque ids that no format handler
/// recognised carry `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Instant { date: String },
    Duration { start_date: String, end_date: String },
    Unknown,
}

impl Period {
    /// Human-readable label used in the context dictionary of the emitted
    /// artifact.
    pub fn label(&self) -> String {
        match self {
            Self::Instant { date } => format!("As of {date}"),
            Self::Duration {
                start_date,
                end_date,
            } => format!("Period {start_date} to {end_date}"),
            Self::Unknown => "Unknown period".to_string(),
        }
    }
}

/// **XBRL Context**
///
/// Binds facts to a reporting entity and period. Unique by id within a
/// filing; dimensional segments qualify the context (e.g. a business
/// segment or geography member).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XbrlContext {
    /// Context id exactly as it appears in the source document.
    pub id: String,

    /// Entity identifier (typically the CIK).
    pub entity_identifier: String,

    /// Identifier scheme URI.
    pub entity_scheme: String,

    pub period: Period,

    /// Dimension URI -> member qualified name.
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,

    /// True when the context was synthesised from the context-id format
    /// rather than read from the resources section.
    #[serde(default)]
    pub synthetic: bool,
}

/// **XBRL Unit**
///
/// Unit of measure for numeric facts: a simple measure such as
/// `iso4217:USD`, or a ratio such as USD per share for EPS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XbrlUnit {
    Simple {
        measure: String,
    },
    Divide {
        numerator: String,
        denominator: String,
    },
}

impl XbrlUnit {
    pub fn label(&self) -> String {
        match self {
            Self::Simple { measure } => measure.clone(),
            Self::Divide {
                numerator,
                denominator,
            } => format!("{numerator}/{denominator}"),
        }
    }
}

/// Kind of inline-XBRL fact tag. Unknown tag names are preserved and routed
/// to the diagnostics channel instead of being dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactKind {
    NonNumeric,
    NonFraction,
    Unknown,
}

/// **XBRL Fact**
///
/// One reported datum. Facts form a multiset: identical
/// (concept, context_ref, unit_ref) triples may repeat in a filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XbrlFact {
    pub kind: FactKind,

    /// Concept qualified name, prefix included (e.g. `us-gaap:Assets`).
    pub name: String,

    pub context_ref: String,

    /// Required for numeric facts, absent for non-numeric ones.
    pub unit_ref: Option<String>,

    pub scale: Option<String>,
    pub decimals: Option<String>,
    pub format: Option<String>,

    /// Visible (or hidden-section) text content of the fact tag.
    pub value: String,

    /// True when the fact came from an `ix:hidden` section.
    #[serde(default)]
    pub hidden: bool,
}

impl XbrlFact {
    /// Local name without the namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    /// Namespace prefix, empty for unprefixed concepts.
    pub fn prefix(&self) -> &str {
        match self.name.split_once(':') {
            Some((prefix, _)) => prefix,
            None => "",
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == FactKind::NonFraction
    }

    /// Numeric value with display formatting stripped, scale applied.
    pub fn numeric_value(&self) -> Option<f64> {
        let cleaned = self.value.replace([',', '$', '(', ')'], "");
        let mut value: f64 = cleaned.trim().parse().ok()?;
        if self.value.trim_start().starts_with('(') {
            value = -value;
        }
        if let Some(scale) = self.scale.as_deref().and_then(|s| s.parse::<i32>().ok()) {
            value *= 10f64.powi(scale);
        }
        Some(value)
    }
}

/// **Taxonomy Concept**
///
/// Element definition from a taxonomy schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub qualified_name: String,
    pub id: Option<String>,
    pub data_type: Option<String>,
    pub substitution_group: Option<String>,
    pub balance: Balance,
    pub period_type: ConceptPeriodType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Balance {
    Debit,
    Credit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptPeriodType {
    Instant,
    Duration,
}

/// Arc-kind specific payload of a linkbase relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArcKind {
    Presentation,
    Calculation { weight: f64 },
    Definition { arcrole: String },
}

/// **Relationship Arc**
///
/// One edge in a linkbase graph, already resolved from locator labels to
/// concept qualified names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipArc {
    pub parent: String,
    pub child: String,
    pub role: String,
    pub order: f64,
    pub kind: ArcKind,
}

/// **Statement Type**
///
/// Classification target for concepts and linkbase roles. `ALL` lists the
/// types in the fixed emission order of the LLM artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatementType {
    BalanceSheet,
    IncomeStatement,
    CashFlowStatement,
    StatementOfEquity,
    Other,
}

impl StatementType {
    pub const ALL: [StatementType; 5] = [
        Self::BalanceSheet,
        Self::IncomeStatement,
        Self::CashFlowStatement,
        Self::StatementOfEquity,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BalanceSheet => "Balance_Sheet",
            Self::IncomeStatement => "Income_Statement",
            Self::CashFlowStatement => "Cash_Flow_Statement",
            Self::StatementOfEquity => "Statement_Of_Equity",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// **Validation Warning**
///
/// Non-fatal diagnostic produced by the financial validator or the
/// extractor. Attached to the processed filing and echoed into the run
/// report; never aborts the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Stable machine-readable code (e.g. `orphan_context_ref`).
    pub code: String,

    pub message: String,

    /// Context id the warning refers to, when applicable.
    #[serde(default)]
    pub context_ref: Option<String>,
}

impl ValidationWarning {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            context_ref: None,
        }
    }

    pub fn with_context(mut self, context_ref: &str) -> Self {
        self.context_ref = Some(context_ref.to_string());
        self
    }
}

/// **Processed Filing**
///
/// Output aggregate assembled in place by the pipeline stages. Becomes
/// read-only once handed to the storage coordinator; each worker owns its
/// instance exclusively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedFiling {
    pub descriptor: FilingDescriptor,

    pub facts: Vec<XbrlFact>,

    /// Context id -> context. Every fact's `context_ref` must resolve here;
    /// orphans are reported as warnings.
    pub contexts: BTreeMap<String, XbrlContext>,

    /// Unit id -> unit. Every numeric fact's `unit_ref` must resolve here.
    pub units: BTreeMap<String, XbrlUnit>,

    /// Concept qualified name -> statement classification.
    pub statement_mapping: BTreeMap<String, StatementType>,

    /// Resolved linkbase arcs, deduplicated.
    pub arcs: Vec<RelationshipArc>,

    /// Narrative sections keyed by section id (concept local name for
    /// text-block facts, item id for item-level disclosures).
    pub sections: BTreeMap<String, NarrativeSection>,

    pub warnings: Vec<ValidationWarning>,

    /// True when contexts were synthesised from context-id formats because
    /// the resources section was missing.
    #[serde(default)]
    pub contexts_synthetic: bool,
}

/// A titled narrative block extracted from the filing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeSection {
    pub title: String,
    pub body: String,
}

impl ProcessedFiling {
    pub fn new(descriptor: FilingDescriptor) -> Self {
        Self {
            descriptor,
            facts: Vec::new(),
            contexts: BTreeMap::new(),
            units: BTreeMap::new(),
            statement_mapping: BTreeMap::new(),
            arcs: Vec::new(),
            sections: BTreeMap::new(),
            warnings: Vec::new(),
            contexts_synthetic: false,
        }
    }
}
