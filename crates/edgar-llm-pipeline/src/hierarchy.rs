use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info};

use edgar_llm_core::{
    ArcKind, Balance, Concept, ConceptPeriodType, RelationshipArc, StatementType,
};

/// Standard label role, preferred when a concept carries several labels.
const STANDARD_LABEL_ROLE: &str = "http://www.xbrl.org/2003/role/label";

/// Seed top-level concepts per statement, used when linkbases are sparse or
/// absent and as a floor under the computed top level.
const SEED_TOP_LEVEL: &[(StatementType, &[&str])] = &[
    (
        StatementType::BalanceSheet,
        &[
            "us-gaap:Assets",
            "us-gaap:Liabilities",
            "us-gaap:StockholdersEquity",
            "us-gaap:LiabilitiesAndStockholdersEquity",
        ],
    ),
    (
        StatementType::IncomeStatement,
        &[
            "us-gaap:Revenues",
            "us-gaap:CostsAndExpenses",
            "us-gaap:OperatingIncomeLoss",
            "us-gaap:NetIncomeLoss",
        ],
    ),
    (
        StatementType::CashFlowStatement,
        &[
            "us-gaap:NetCashProvidedByUsedInOperatingActivities",
            "us-gaap:NetCashProvidedByUsedInInvestingActivities",
            "us-gaap:NetCashProvidedByUsedInFinancingActivities",
        ],
    ),
    (
        StatementType::StatementOfEquity,
        &["us-gaap:StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest"],
    ),
];

/// Parent/child suffix pairs for the pattern fallback when no presentation
/// linkbase is available.
const FALLBACK_PATTERNS: &[(&str, &[&str])] = &[
    ("Assets", &["AssetsCurrent", "AssetsNoncurrent"]),
    (
        "AssetsCurrent",
        &[
            "CashAndCashEquivalents",
            "ShortTermInvestments",
            "AccountsReceivable",
            "Inventory",
        ],
    ),
    (
        "AssetsNoncurrent",
        &["PropertyPlantAndEquipment", "Goodwill", "IntangibleAssets"],
    ),
    ("Liabilities", &["LiabilitiesCurrent", "LiabilitiesNoncurrent"]),
    (
        "LiabilitiesCurrent",
        &["AccountsPayable", "AccruedLiabilities", "DeferredRevenue"],
    ),
    (
        "LiabilitiesNoncurrent",
        &["LongTermDebt", "DeferredTaxLiabilities", "LeaseLiability"],
    ),
    (
        "StockholdersEquity",
        &[
            "CommonStock",
            "AdditionalPaidInCapital",
            "RetainedEarnings",
            "AccumulatedOtherComprehensiveIncome",
        ],
    ),
    (
        "Revenues",
        &["RevenueFromContractWithCustomer", "InterestIncome", "OtherIncome"],
    ),
    (
        "CostsAndExpenses",
        &[
            "CostOfGoodsAndServicesSold",
            "ResearchAndDevelopmentExpense",
            "SellingGeneralAndAdministrativeExpense",
        ],
    ),
];

/// **Filing Hierarchy**
///
/// Resolved linkbase graphs for one filing: deduplicated arcs, the
/// presentation tree, statement classification for every known concept,
/// top-level concepts per statement, labels, and schema concept metadata.
#[derive(Debug, Default)]
pub struct FilingHierarchy {
    pub arcs: Vec<RelationshipArc>,

    /// Presentation parent -> ordered children.
    pub children: BTreeMap<String, Vec<(String, f64)>>,

    pub statement_mapping: BTreeMap<String, StatementType>,

    pub top_level: BTreeMap<StatementType, BTreeSet<String>>,

    /// (concept, label role) -> label text.
    pub labels: BTreeMap<(String, String), String>,

    /// Concept qualified name -> schema definition, when a taxonomy schema
    /// was provided.
    pub concepts: BTreeMap<String, Concept>,

    /// Concept -> presentation depth, computed once by work-list traversal.
    depths: BTreeMap<String, usize>,
}

impl FilingHierarchy {
    /// Statement classification and hierarchical depth for a concept.
    /// Depth 0 is top-level, 1 a direct child, 2 everything deeper or
    /// unplaced.
    pub fn level(&self, concept: &str) -> (StatementType, usize) {
        let statement = self.statement_of(concept);
        let depth = self.depths.get(concept).copied().unwrap_or(2);
        (statement, depth)
    }

    pub fn statement_of(&self, concept: &str) -> StatementType {
        self.statement_mapping
            .get(concept)
            .copied()
            .unwrap_or_else(|| classify_concept_name(concept))
    }

    /// Preferred label for a concept: the standard role when present,
    /// otherwise any label.
    pub fn label(&self, concept: &str) -> Option<&str> {
        if let Some(label) = self
            .labels
            .get(&(concept.to_string(), STANDARD_LABEL_ROLE.to_string()))
        {
            return Some(label);
        }
        self.labels
            .iter()
            .find(|((c, _), _)| c == concept)
            .map(|(_, label)| label.as_str())
    }

    pub fn concept(&self, qualified_name: &str) -> Option<&Concept> {
        self.concepts.get(qualified_name)
    }
}

/// **Hierarchy Resolver**
///
/// Builds a [`FilingHierarchy`] from presentation/calculation/definition/
/// label linkbases and an optional taxonomy schema, with a pattern-based
/// fallback for filings whose linkbases are missing or sparse.
#[derive(Debug, Default)]
pub struct HierarchyResolver;

impl HierarchyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve linkbase documents against the set of concept names observed
    /// in the filing's facts.
    pub fn resolve(
        &self,
        linkbases: &[Vec<u8>],
        schemas: &[Vec<u8>],
        fact_concepts: &BTreeSet<String>,
    ) -> FilingHierarchy {
        let mut hierarchy = FilingHierarchy::default();

        for doc in linkbases {
            let content = String::from_utf8_lossy(doc);
            parse_linkbase(&content, &mut hierarchy);
        }
        for doc in schemas {
            let content = String::from_utf8_lossy(doc);
            parse_schema_concepts(&content, &mut hierarchy.concepts);
        }

        dedup_arcs(&mut hierarchy.arcs);
        build_presentation_tree(&mut hierarchy);

        if hierarchy.children.is_empty() {
            debug!("no presentation arcs resolved; falling back to name patterns");
            apply_pattern_fallback(fact_concepts, &mut hierarchy);
        }

        // Facts without a role-derived classification fall back to name
        // patterns so every concept lands somewhere.
        for concept in fact_concepts {
            hierarchy
                .statement_mapping
                .entry(concept.clone())
                .or_insert_with(|| classify_concept_name(concept));
        }

        compute_top_level(&mut hierarchy, fact_concepts);
        compute_depths(&mut hierarchy);

        info!(
            arcs = hierarchy.arcs.len(),
            concepts = hierarchy.statement_mapping.len(),
            "hierarchy resolved"
        );
        hierarchy
    }
}

/// Classify a linkbase role URI by keyword, case-insensitively.
pub fn classify_role(role: &str) -> StatementType {
    let role = role.to_lowercase();
    if role.contains("balance") || role.contains("financial position") || role.contains("financialposition") {
        StatementType::BalanceSheet
    } else if role.contains("income")
        || role.contains("operations")
        || role.contains("profit")
        || role.contains("loss")
    {
        StatementType::IncomeStatement
    } else if role.contains("cash flow") || role.contains("cashflow") || role.contains("cashflows") {
        StatementType::CashFlowStatement
    } else if role.contains("equity") || role.contains("stockholder") || role.contains("shareholder")
    {
        StatementType::StatementOfEquity
    } else {
        StatementType::Other
    }
}

/// Classify a concept by its local-name patterns; used when no role
/// classification is available.
pub fn classify_concept_name(concept: &str) -> StatementType {
    let local = concept.rsplit(':').next().unwrap_or(concept);
    const CF_PATTERNS: &[&str] = &["CashFlow", "CashAndCashEquivalent", "NetCashProvidedByUsedIn"];
    const BS_PATTERNS: &[&str] = &["Asset", "Liabilit", "StockholdersEquity", "Equity"];
    const IS_PATTERNS: &[&str] = &[
        "Revenue",
        "Income",
        "Expense",
        "EarningsPerShare",
        "GrossProfit",
        "OperatingIncome",
        "NetIncome",
    ];
    const SE_PATTERNS: &[&str] = &[
        "ShareCapital",
        "RetainedEarnings",
        "AccumulatedOtherComprehensiveIncome",
    ];

    if CF_PATTERNS.iter().any(|p| local.contains(p)) {
        StatementType::CashFlowStatement
    } else if BS_PATTERNS.iter().any(|p| local.contains(p)) {
        StatementType::BalanceSheet
    } else if IS_PATTERNS.iter().any(|p| local.contains(p)) {
        StatementType::IncomeStatement
    } else if SE_PATTERNS.iter().any(|p| local.contains(p)) {
        StatementType::StatementOfEquity
    } else {
        StatementType::Other
    }
}

fn local_lower(name: &[u8]) -> String {
    let local = match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    };
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

fn attr_value(element: &BytesStart<'_>, wanted: &str) -> Option<String> {
    for attr in element.attributes().with_checks(false).flatten() {
        if local_lower(attr.key.as_ref()) == wanted {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// Resolve an `xlink:href` to a prefixed concept qualified name:
/// `aapl-20221231.xsd#us-gaap_Assets` -> `us-gaap:Assets`.
fn href_to_concept(href: &str) -> Option<String> {
    let fragment = href.rsplit('#').next()?;
    if fragment.is_empty() || fragment == href {
        return None;
    }
    Some(match fragment.split_once('_') {
        Some((prefix, local)) => format!("{prefix}:{local}"),
        None => fragment.to_string(),
    })
}

/// One extended link's worth of parse state.
#[derive(Default)]
struct LinkScope {
    role: String,
    kind: Option<LinkKind>,
    locators: BTreeMap<String, String>,
    // Raw arcs as (from-label, to-label, order, kind payload).
    arcs: Vec<(String, String, f64, ArcPayload)>,
    // Label linkbase pieces.
    label_arcs: Vec<(String, String)>,
    label_resources: BTreeMap<String, (String, String)>, // label -> (role, text)
}

#[derive(Clone, Copy, PartialEq)]
enum LinkKind {
    Presentation,
    Calculation,
    Definition,
    Label,
}

enum ArcPayload {
    Presentation,
    Calculation { weight: f64 },
    Definition { arcrole: String },
}

fn parse_linkbase(content: &str, hierarchy: &mut FilingHierarchy) {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::new();

    let mut scope: Option<LinkScope> = None;
    let mut pending_label: Option<String> = None;
    let mut pending_label_role: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = local_lower(e.name().as_ref());
                match local.as_str() {
                    "presentationlink" | "calculationlink" | "definitionlink" | "labellink" => {
                        if let Some(finished) = scope.take() {
                            flush_scope(finished, hierarchy);
                        }
                        let kind = match local.as_str() {
                            "presentationlink" => LinkKind::Presentation,
                            "calculationlink" => LinkKind::Calculation,
                            "definitionlink" => LinkKind::Definition,
                            _ => LinkKind::Label,
                        };
                        scope = Some(LinkScope {
                            role: attr_value(&e, "role").unwrap_or_default(),
                            kind: Some(kind),
                            ..LinkScope::default()
                        });
                    }
                    "loc" => {
                        if let Some(scope) = scope.as_mut() {
                            if let (Some(label), Some(href)) =
                                (attr_value(&e, "label"), attr_value(&e, "href"))
                            {
                                if let Some(concept) = href_to_concept(&href) {
                                    scope.locators.insert(label, concept);
                                }
                            }
                        }
                    }
                    "presentationarc" | "calculationarc" | "definitionarc" => {
                        if let Some(scope) = scope.as_mut() {
                            let from = attr_value(&e, "from").unwrap_or_default();
                            let to = attr_value(&e, "to").unwrap_or_default();
                            if from.is_empty() || to.is_empty() {
                                buf.clear();
                                continue;
                            }
                            let order = attr_value(&e, "order")
                                .and_then(|v| v.parse::<f64>().ok())
                                .unwrap_or(0.0);
                            let payload = match local.as_str() {
                                "presentationarc" => ArcPayload::Presentation,
                                "calculationarc" => ArcPayload::Calculation {
                                    weight: attr_value(&e, "weight")
                                        .and_then(|v| v.parse::<f64>().ok())
                                        .unwrap_or(1.0),
                                },
                                _ => ArcPayload::Definition {
                                    arcrole: attr_value(&e, "arcrole").unwrap_or_default(),
                                },
                            };
                            scope.arcs.push((from, to, order, payload));
                        }
                    }
                    "labelarc" => {
                        if let Some(scope) = scope.as_mut() {
                            if let (Some(from), Some(to)) =
                                (attr_value(&e, "from"), attr_value(&e, "to"))
                            {
                                scope.label_arcs.push((from, to));
                            }
                        }
                    }
                    "label" => {
                        pending_label = attr_value(&e, "label");
                        pending_label_role =
                            Some(attr_value(&e, "role").unwrap_or_else(|| {
                                STANDARD_LABEL_ROLE.to_string()
                            }));
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(scope), Some(label)) = (scope.as_mut(), pending_label.take()) {
                    let role = pending_label_role
                        .take()
                        .unwrap_or_else(|| STANDARD_LABEL_ROLE.to_string());
                    let text = t
                        .unescape()
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).trim().to_string());
                    scope.label_resources.insert(label, (role, text));
                }
            }
            Ok(Event::End(e)) => {
                let local = local_lower(e.name().as_ref());
                if matches!(
                    local.as_str(),
                    "presentationlink" | "calculationlink" | "definitionlink" | "labellink"
                ) {
                    if let Some(finished) = scope.take() {
                        flush_scope(finished, hierarchy);
                    }
                }
                if local == "label" {
                    pending_label = None;
                    pending_label_role = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(finished) = scope.take() {
        flush_scope(finished, hierarchy);
    }
}

fn flush_scope(scope: LinkScope, hierarchy: &mut FilingHierarchy) {
    let statement = classify_role(&scope.role);

    if scope.kind == Some(LinkKind::Label) {
        for (from, to) in &scope.label_arcs {
            let Some(concept) = scope.locators.get(from) else {
                continue;
            };
            if let Some((role, text)) = scope.label_resources.get(to) {
                hierarchy
                    .labels
                    .insert((concept.clone(), role.clone()), text.clone());
            }
        }
        return;
    }

    for (from, to, order, payload) in scope.arcs {
        let (Some(parent), Some(child)) = (scope.locators.get(&from), scope.locators.get(&to))
        else {
            continue;
        };
        if parent == child {
            continue;
        }
        let kind = match payload {
            ArcPayload::Presentation => ArcKind::Presentation,
            ArcPayload::Calculation { weight } => ArcKind::Calculation { weight },
            ArcPayload::Definition { arcrole } => ArcKind::Definition { arcrole },
        };
        hierarchy.arcs.push(RelationshipArc {
            parent: parent.clone(),
            child: child.clone(),
            role: scope.role.clone(),
            order,
            kind,
        });
        if statement != StatementType::Other {
            hierarchy
                .statement_mapping
                .insert(parent.clone(), statement);
            hierarchy.statement_mapping.insert(child.clone(), statement);
        }
    }
}

/// Drop duplicate (from, to, role) arcs, keeping the first occurrence.
fn dedup_arcs(arcs: &mut Vec<RelationshipArc>) {
    let mut seen: BTreeSet<(String, String, String, u8)> = BTreeSet::new();
    arcs.retain(|arc| {
        let kind_tag = match arc.kind {
            ArcKind::Presentation => 0,
            ArcKind::Calculation { .. } => 1,
            ArcKind::Definition { .. } => 2,
        };
        seen.insert((
            arc.parent.clone(),
            arc.child.clone(),
            arc.role.clone(),
            kind_tag,
        ))
    });
}

fn build_presentation_tree(hierarchy: &mut FilingHierarchy) {
    for arc in &hierarchy.arcs {
        if !matches!(arc.kind, ArcKind::Presentation) {
            continue;
        }
        hierarchy
            .children
            .entry(arc.parent.clone())
            .or_default()
            .push((arc.child.clone(), arc.order));
    }
    for children in hierarchy.children.values_mut() {
        children.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    }
}

fn apply_pattern_fallback(fact_concepts: &BTreeSet<String>, hierarchy: &mut FilingHierarchy) {
    for (parent_suffix, child_suffixes) in FALLBACK_PATTERNS {
        let parents: Vec<&String> = fact_concepts
            .iter()
            .filter(|c| local_name(c) == *parent_suffix)
            .collect();
        for parent in parents {
            for child_suffix in *child_suffixes {
                for child in fact_concepts
                    .iter()
                    .filter(|c| local_name(c).ends_with(child_suffix) && *c != parent)
                {
                    let order = hierarchy
                        .children
                        .get(parent.as_str())
                        .map(|c| c.len())
                        .unwrap_or(0) as f64;
                    hierarchy
                        .children
                        .entry(parent.clone())
                        .or_default()
                        .push((child.clone(), order));
                    let statement = classify_concept_name(parent);
                    hierarchy.statement_mapping.insert(parent.clone(), statement);
                    hierarchy.statement_mapping.insert(child.clone(), statement);
                }
            }
        }
    }
}

fn local_name(concept: &str) -> &str {
    concept.rsplit(':').next().unwrap_or(concept)
}

/// Top-level concepts: parents that never appear as children, per
/// statement, floored by the seed set for concepts actually present.
fn compute_top_level(hierarchy: &mut FilingHierarchy, fact_concepts: &BTreeSet<String>) {
    let all_children: BTreeSet<&String> = hierarchy
        .children
        .values()
        .flat_map(|c| c.iter().map(|(child, _)| child))
        .collect();

    for statement in StatementType::ALL {
        let mut top: BTreeSet<String> = hierarchy
            .children
            .keys()
            .filter(|parent| !all_children.contains(*parent))
            .filter(|parent| hierarchy.statement_of(parent) == statement)
            .cloned()
            .collect();

        if top.is_empty() {
            if let Some((_, seeds)) = SEED_TOP_LEVEL.iter().find(|(s, _)| *s == statement) {
                top.extend(
                    seeds
                        .iter()
                        .filter(|seed| fact_concepts.contains(**seed))
                        .map(|seed| seed.to_string()),
                );
            }
        }
        hierarchy.top_level.insert(statement, top);
    }
}

/// Work-list BFS over the presentation tree; large taxonomies must not
/// recurse.
fn compute_depths(hierarchy: &mut FilingHierarchy) {
    let mut depths: BTreeMap<String, usize> = BTreeMap::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();

    for tops in hierarchy.top_level.values() {
        for concept in tops {
            depths.insert(concept.clone(), 0);
            queue.push_back((concept.clone(), 0));
        }
    }

    while let Some((concept, depth)) = queue.pop_front() {
        if let Some(children) = hierarchy.children.get(&concept) {
            for (child, _) in children {
                let next = depth + 1;
                if depths.get(child).map_or(true, |&known| known > next) {
                    depths.insert(child.clone(), next);
                    queue.push_back((child.clone(), next));
                }
            }
        }
    }

    hierarchy.depths = depths;
}

/// Pull concept declarations out of a taxonomy schema document.
fn parse_schema_concepts(content: &str, concepts: &mut BTreeMap<String, Concept>) {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    reader.config_mut().check_end_names = false;
    let mut buf = Vec::new();

    // Schema target prefix is taken from the element id convention
    // (`us-gaap_Assets`), falling back to the bare name.
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if local_lower(e.name().as_ref()) != "element" {
                    buf.clear();
                    continue;
                }
                let Some(name) = attr_value(&e, "name") else {
                    buf.clear();
                    continue;
                };
                let id = attr_value(&e, "id");
                let qualified_name = id
                    .as_deref()
                    .and_then(|id| id.split_once('_'))
                    .map(|(prefix, local)| format!("{prefix}:{local}"))
                    .unwrap_or_else(|| name.clone());

                let balance = match attr_value(&e, "balance").as_deref() {
                    Some("debit") => Balance::Debit,
                    Some("credit") => Balance::Credit,
                    _ => Balance::None,
                };
                let period_type = match attr_value(&e, "periodtype").as_deref() {
                    Some("instant") => ConceptPeriodType::Instant,
                    _ => ConceptPeriodType::Duration,
                };

                concepts.insert(
                    qualified_name.clone(),
                    Concept {
                        qualified_name,
                        id,
                        data_type: attr_value(&e, "type"),
                        substitution_group: attr_value(&e, "substitutiongroup"),
                        balance,
                        period_type,
                    },
                );
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESENTATION_LINKBASE: &str = r#"<?xml version="1.0"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
<link:presentationLink xlink:role="http://example.com/role/CONSOLIDATEDBALANCESHEETS">
  <link:loc xlink:label="loc_assets" xlink:href="aapl.xsd#us-gaap_Assets"/>
  <link:loc xlink:label="loc_assetscurrent" xlink:href="aapl.xsd#us-gaap_AssetsCurrent"/>
  <link:loc xlink:label="loc_cash" xlink:href="aapl.xsd#us-gaap_CashAndCashEquivalentsAtCarryingValue"/>
  <link:presentationArc xlink:from="loc_assets" xlink:to="loc_assetscurrent" order="1"/>
  <link:presentationArc xlink:from="loc_assetscurrent" xlink:to="loc_cash" order="1"/>
  <link:presentationArc xlink:from="loc_assets" xlink:to="loc_assetscurrent" order="1"/>
  <link:presentationArc xlink:from="loc_assets" xlink:to="loc_assets" order="2"/>
</link:presentationLink>
<link:calculationLink xlink:role="http://example.com/role/CONSOLIDATEDBALANCESHEETS">
  <link:loc xlink:label="loc_assets" xlink:href="aapl.xsd#us-gaap_Assets"/>
  <link:loc xlink:label="loc_assetscurrent" xlink:href="aapl.xsd#us-gaap_AssetsCurrent"/>
  <link:calculationArc xlink:from="loc_assets" xlink:to="loc_assetscurrent" order="1" weight="1.0"/>
</link:calculationLink>
<link:labelLink xlink:role="http://www.xbrl.org/2003/role/link">
  <link:loc xlink:label="loc_assets" xlink:href="aapl.xsd#us-gaap_Assets"/>
  <link:labelArc xlink:from="loc_assets" xlink:to="lab_assets"/>
  <link:label xlink:label="lab_assets" xlink:role="http://www.xbrl.org/2003/role/label">Total assets</link:label>
</link:labelLink>
</link:linkbase>"#;

    fn concepts(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn resolve_sample() -> FilingHierarchy {
        HierarchyResolver::new().resolve(
            &[PRESENTATION_LINKBASE.as_bytes().to_vec()],
            &[],
            &concepts(&[
                "us-gaap:Assets",
                "us-gaap:AssetsCurrent",
                "us-gaap:CashAndCashEquivalentsAtCarryingValue",
            ]),
        )
    }

    #[test]
    fn arcs_resolve_through_locators() {
        let hierarchy = resolve_sample();
        let presentation: Vec<_> = hierarchy
            .arcs
            .iter()
            .filter(|a| matches!(a.kind, ArcKind::Presentation))
            .collect();
        // Duplicate arc and self-reference are dropped.
        assert_eq!(presentation.len(), 2);
        assert!(presentation
            .iter()
            .any(|a| a.parent == "us-gaap:Assets" && a.child == "us-gaap:AssetsCurrent"));
    }

    #[test]
    fn calculation_arcs_carry_weight() {
        let hierarchy = resolve_sample();
        let calc = hierarchy
            .arcs
            .iter()
            .find(|a| matches!(a.kind, ArcKind::Calculation { .. }))
            .unwrap();
        assert_eq!(calc.kind, ArcKind::Calculation { weight: 1.0 });
    }

    #[test]
    fn role_classification_flows_to_concepts() {
        let hierarchy = resolve_sample();
        assert_eq!(
            hierarchy.statement_of("us-gaap:Assets"),
            StatementType::BalanceSheet
        );
        assert_eq!(
            hierarchy.statement_of("us-gaap:CashAndCashEquivalentsAtCarryingValue"),
            StatementType::BalanceSheet
        );
    }

    #[test]
    fn top_level_and_depths() {
        let hierarchy = resolve_sample();
        assert!(hierarchy.top_level[&StatementType::BalanceSheet].contains("us-gaap:Assets"));

        assert_eq!(hierarchy.level("us-gaap:Assets"), (StatementType::BalanceSheet, 0));
        assert_eq!(
            hierarchy.level("us-gaap:AssetsCurrent"),
            (StatementType::BalanceSheet, 1)
        );
        assert_eq!(
            hierarchy.level("us-gaap:CashAndCashEquivalentsAtCarryingValue"),
            (StatementType::BalanceSheet, 2)
        );
    }

    #[test]
    fn standard_label_is_preferred() {
        let hierarchy = resolve_sample();
        assert_eq!(hierarchy.label("us-gaap:Assets"), Some("Total assets"));
    }

    #[test]
    fn pattern_fallback_builds_a_tree() {
        let hierarchy = HierarchyResolver::new().resolve(
            &[],
            &[],
            &concepts(&[
                "us-gaap:Assets",
                "us-gaap:AssetsCurrent",
                "us-gaap:Inventory",
                "us-gaap:NetIncomeLoss",
            ]),
        );
        assert!(hierarchy
            .children
            .get("us-gaap:Assets")
            .map(|c| c.iter().any(|(child, _)| child == "us-gaap:AssetsCurrent"))
            .unwrap_or(false));
        assert_eq!(
            hierarchy.statement_of("us-gaap:NetIncomeLoss"),
            StatementType::IncomeStatement
        );
    }

    #[test]
    fn role_keywords() {
        assert_eq!(
            classify_role("http://x/role/ConsolidatedBalanceSheets"),
            StatementType::BalanceSheet
        );
        assert_eq!(
            classify_role("http://x/role/CONSOLIDATEDSTATEMENTSOFOPERATIONS"),
            StatementType::IncomeStatement
        );
        assert_eq!(
            classify_role("http://x/role/StatementsOfCashFlows"),
            StatementType::CashFlowStatement
        );
        assert_eq!(
            classify_role("http://x/role/StatementsOfShareholdersEquity"),
            StatementType::StatementOfEquity
        );
        assert_eq!(classify_role("http://x/role/Cover"), StatementType::Other);
    }

    #[test]
    fn concept_name_patterns() {
        assert_eq!(
            classify_concept_name("us-gaap:NetCashProvidedByUsedInOperatingActivities"),
            StatementType::CashFlowStatement
        );
        assert_eq!(
            classify_concept_name("us-gaap:LiabilitiesCurrent"),
            StatementType::BalanceSheet
        );
        assert_eq!(
            classify_concept_name("us-gaap:RevenueFromContractWithCustomerExcludingAssessedTax"),
            StatementType::IncomeStatement
        );
        assert_eq!(
            classify_concept_name("dei:DocumentType"),
            StatementType::Other
        );
    }

    #[test]
    fn schema_concepts_parse_balance_and_period() {
        let schema = r#"<?xml version="1.0"?>
<xsd:schema xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xbrli="http://www.xbrl.org/2003/instance">
  <xsd:element name="Assets" id="us-gaap_Assets" type="xbrli:monetaryItemType"
      substitutionGroup="xbrli:item" xbrli:balance="debit" xbrli:periodType="instant"/>
</xsd:schema>"#;
        let hierarchy =
            HierarchyResolver::new().resolve(&[], &[schema.as_bytes().to_vec()], &BTreeSet::new());
        let concept = hierarchy.concept("us-gaap:Assets").unwrap();
        assert_eq!(concept.balance, Balance::Debit);
        assert_eq!(concept.period_type, ConceptPeriodType::Instant);
    }

    #[test]
    fn href_fragment_resolution() {
        assert_eq!(
            href_to_concept("aapl-20221231.xsd#us-gaap_Assets"),
            Some("us-gaap:Assets".to_string())
        );
        assert_eq!(href_to_concept("no-fragment.xsd"), None);
    }
}
