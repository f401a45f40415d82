pub mod context_format;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use edgar_llm_core::{
    FactKind, NarrativeSection, Period, PipelineError, Result, ValidationWarning, XbrlContext,
    XbrlFact, XbrlUnit,
};

pub use context_format::ContextFormatRegistry;

/// Reference to a linkbase document embedded in the filing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkbaseRef {
    pub href: String,
    pub role: Option<String>,
}

/// Document-level facts from the `dei` namespace.
#[derive(Debug, Clone, Default)]
pub struct DocumentInfo {
    pub document_type: Option<String>,
    pub period_end_date: Option<String>,
    pub entity_name: Option<String>,
    pub cik: Option<String>,
}

/// **Extraction Result**
///
/// Everything pulled out of one primary filing document: the fact multiset
/// (hidden-section facts folded in with `hidden = true`), the context and
/// unit dictionaries, references to taxonomy schemas and linkbases, and
/// any diagnostics raised along the way.
#[derive(Debug)]
pub struct ExtractedFiling {
    pub facts: Vec<XbrlFact>,
    pub contexts: BTreeMap<String, XbrlContext>,
    pub units: BTreeMap<String, XbrlUnit>,
    pub schema_refs: Vec<String>,
    pub linkbase_refs: Vec<LinkbaseRef>,
    pub document_info: DocumentInfo,
    pub warnings: Vec<ValidationWarning>,
    pub contexts_synthetic: bool,
}

/// HTML void elements never receive a closing tag; tracked so element depth
/// does not drift when a filing uses plain-HTML markup.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Structural `ix:` elements that are not facts.
const IX_STRUCTURAL: &[&str] = &[
    "header",
    "hidden",
    "references",
    "resources",
    "relationship",
    "footnote",
    "continuation",
    "exclude",
    "numerator",
    "denominator",
    "tuple",
];

/// XBRL instance elements that are never facts.
const STANDARD_INSTANCE_ELEMENTS: &[&str] = &[
    "xbrl",
    "context",
    "entity",
    "identifier",
    "segment",
    "scenario",
    "period",
    "startdate",
    "enddate",
    "instant",
    "forever",
    "unit",
    "measure",
    "divide",
    "unitnumerator",
    "unitdenominator",
    "schemaref",
    "linkbaseref",
    "roleref",
    "arcroleref",
    "explicitmember",
    "typedmember",
    "footnotelink",
];

/// Extract facts, contexts, units and references from a primary filing
/// document, detecting inline XBRL versus a plain XBRL instance.
pub fn extract(content: &[u8], registry: &ContextFormatRegistry) -> Result<ExtractedFiling> {
    let content = String::from_utf8_lossy(content);
    let mut warnings = Vec::new();

    let inline = detect_inline_xbrl(&content);
    debug!(inline, "document format detected");

    let facts = if inline {
        scan_inline_facts(&content, &mut warnings)
    } else {
        scan_instance_facts(&content)
    };

    let (contexts, units) = scan_resources(&content);
    let (schema_refs, linkbase_refs) = scan_references(&content);

    if facts.is_empty() && contexts.is_empty() && units.is_empty() {
        return Err(PipelineError::Extract(
            "document contains no recognisable XBRL content".to_string(),
        ));
    }

    if facts.is_empty() {
        warnings.push(ValidationWarning::new(
            "no_facts",
            "document has a resources section but no fact tags",
        ));
    }

    let document_info = document_info_from_facts(&facts);

    let mut extracted = ExtractedFiling {
        facts,
        contexts,
        units,
        schema_refs,
        linkbase_refs,
        document_info,
        warnings,
        contexts_synthetic: false,
    };
    synthesize_missing_contexts(&mut extracted, registry);

    info!(
        facts = extracted.facts.len(),
        contexts = extracted.contexts.len(),
        units = extracted.units.len(),
        synthetic = extracted.contexts_synthetic,
        "extraction complete"
    );
    Ok(extracted)
}

/// Linkbase references embedded in a schema or instance document.
pub fn linkbase_refs_in(content: &[u8]) -> Vec<LinkbaseRef> {
    let content = String::from_utf8_lossy(content);
    scan_references(&content).1
}

/// Inline-XBRL detection: namespace declarations, `ix:` tag names, or the
/// SEC viewer markers.
pub fn detect_inline_xbrl(content: &str) -> bool {
    let lower = content.to_lowercase();
    const MARKERS: &[&str] = &[
        "xmlns:ix",
        "http://www.xbrl.org/2013/inlinexbrl",
        "ix:nonfraction",
        "ix:nonnumeric",
        "ix:header",
        "ix:references",
        "ix:resources",
        "ix:hidden",
        "inline xbrl",
        "xbrl viewer",
    ];
    MARKERS.iter().any(|marker| lower.contains(marker))
}

fn reader_for(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    reader
}

fn local_lower(name: &[u8]) -> String {
    let local = match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    };
    String::from_utf8_lossy(local).to_ascii_lowercase()
}

fn prefix_lower(name: &[u8]) -> String {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => String::from_utf8_lossy(&name[..pos]).to_ascii_lowercase(),
        None => String::new(),
    }
}

fn attr_value(element: &BytesStart<'_>, wanted: &str) -> Option<String> {
    for attr in element.attributes().with_checks(false).flatten() {
        if local_lower(attr.key.as_ref()) == wanted {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fact_from_element(element: &BytesStart<'_>, kind: FactKind, hidden: bool) -> Option<XbrlFact> {
    let name = attr_value(element, "name")?;
    Some(XbrlFact {
        kind,
        name,
        context_ref: attr_value(element, "contextref").unwrap_or_default(),
        unit_ref: attr_value(element, "unitref"),
        scale: attr_value(element, "scale"),
        decimals: attr_value(element, "decimals"),
        format: attr_value(element, "format"),
        value: String::new(),
        hidden,
    })
}

/// Scan an inline-XBRL document for `ix:nonFraction` / `ix:nonNumeric`
/// facts, tracking the `ix:hidden` section and nested fact tags.
fn scan_inline_facts(content: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<XbrlFact> {
    let mut reader = reader_for(content);
    let mut buf = Vec::new();

    let mut facts = Vec::new();
    let mut unknown_tags: BTreeSet<String> = BTreeSet::new();
    let mut depth: usize = 0;
    let mut hidden_depth: Option<usize> = None;
    // Open fact frames: (depth at which the fact element started, fact).
    let mut open: Vec<(usize, XbrlFact)> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = local_lower(e.name().as_ref());
                if VOID_ELEMENTS.contains(&local.as_str()) {
                    buf.clear();
                    continue;
                }
                depth += 1;
                let prefix = prefix_lower(e.name().as_ref());
                if prefix == "ix" {
                    match local.as_str() {
                        "hidden" => {
                            if hidden_depth.is_none() {
                                hidden_depth = Some(depth);
                            }
                        }
                        "nonfraction" | "nonnumeric" | "fraction" => {
                            let kind = match local.as_str() {
                                "nonfraction" => FactKind::NonFraction,
                                "nonnumeric" => FactKind::NonNumeric,
                                _ => FactKind::Unknown,
                            };
                            if let Some(fact) =
                                fact_from_element(&e, kind, hidden_depth.is_some())
                            {
                                open.push((depth, fact));
                            }
                        }
                        other if !IX_STRUCTURAL.contains(&other) => {
                            unknown_tags.insert(format!("ix:{other}"));
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let prefix = prefix_lower(e.name().as_ref());
                let local = local_lower(e.name().as_ref());
                if prefix == "ix" {
                    match local.as_str() {
                        "nonfraction" | "nonnumeric" => {
                            let kind = if local == "nonfraction" {
                                FactKind::NonFraction
                            } else {
                                FactKind::NonNumeric
                            };
                            if let Some(fact) =
                                fact_from_element(&e, kind, hidden_depth.is_some())
                            {
                                facts.push(fact);
                            }
                        }
                        other if !IX_STRUCTURAL.contains(&other) && other != "fraction" => {
                            unknown_tags.insert(format!("ix:{other}"));
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if !open.is_empty() {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    for (_, fact) in open.iter_mut() {
                        if !fact.value.is_empty() {
                            fact.value.push(' ');
                        }
                        fact.value.push_str(text.trim());
                    }
                }
            }
            Ok(Event::End(_)) => {
                if hidden_depth == Some(depth) {
                    hidden_depth = None;
                }
                while open.last().is_some_and(|(fact_depth, _)| *fact_depth == depth) {
                    if let Some((_, mut fact)) = open.pop() {
                        fact.value = collapse_whitespace(&fact.value);
                        facts.push(fact);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "tolerant parse stopped early");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    // Unclosed fact frames at EOF still carry their text.
    for (_, mut fact) in open {
        fact.value = collapse_whitespace(&fact.value);
        facts.push(fact);
    }

    if !unknown_tags.is_empty() {
        let tags = unknown_tags.into_iter().collect::<Vec<_>>().join(", ");
        warnings.push(ValidationWarning::new(
            "unknown_inline_tags",
            format!("unrecognised inline XBRL fact tags: {tags}"),
        ));
    }

    facts
}

/// Scan a plain XBRL instance: any non-standard element carrying a
/// `contextRef` attribute is a fact.
fn scan_instance_facts(content: &str) -> Vec<XbrlFact> {
    let mut reader = reader_for(content);
    let mut buf = Vec::new();

    let mut facts = Vec::new();
    let mut depth: usize = 0;
    let mut open: Vec<(usize, XbrlFact)> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                let local = local_lower(e.name().as_ref());
                if STANDARD_INSTANCE_ELEMENTS.contains(&local.as_str()) {
                    buf.clear();
                    continue;
                }
                if let Some(context_ref) = attr_value(&e, "contextref") {
                    let unit_ref = attr_value(&e, "unitref");
                    let kind = if unit_ref.is_some() {
                        FactKind::NonFraction
                    } else {
                        FactKind::NonNumeric
                    };
                    let name = qualified_element_name(&e);
                    open.push((
                        depth,
                        XbrlFact {
                            kind,
                            name,
                            context_ref,
                            unit_ref,
                            scale: attr_value(&e, "scale"),
                            decimals: attr_value(&e, "decimals"),
                            format: None,
                            value: String::new(),
                            hidden: false,
                        },
                    ));
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, fact)) = open.last_mut() {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    if !fact.value.is_empty() {
                        fact.value.push(' ');
                    }
                    fact.value.push_str(text.trim());
                }
            }
            Ok(Event::End(_)) => {
                while open.last().is_some_and(|(fact_depth, _)| *fact_depth == depth) {
                    if let Some((_, mut fact)) = open.pop() {
                        fact.value = collapse_whitespace(&fact.value);
                        facts.push(fact);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "tolerant parse stopped early");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    facts
}

fn qualified_element_name(element: &BytesStart<'_>) -> String {
    let raw = element.name();
    let name = String::from_utf8_lossy(raw.as_ref()).into_owned();
    name
}

/// Scan the document for `xbrli:context` and `xbrli:unit` definitions,
/// wherever they appear (the `ix:resources` section for inline documents,
/// the instance root otherwise).
fn scan_resources(content: &str) -> (BTreeMap<String, XbrlContext>, BTreeMap<String, XbrlUnit>) {
    let mut reader = reader_for(content);
    let mut buf = Vec::new();

    let mut contexts = BTreeMap::new();
    let mut units = BTreeMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = local_lower(e.name().as_ref());
                match local.as_str() {
                    "context" => {
                        if let Some(context) = parse_context(&mut reader, &e) {
                            contexts.insert(context.id.clone(), context);
                        }
                    }
                    "unit" => {
                        if let Some((id, unit)) = parse_unit(&mut reader, &e) {
                            units.insert(id, unit);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(error = %e, "tolerant parse stopped early");
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    (contexts, units)
}

fn parse_context(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Option<XbrlContext> {
    let id = attr_value(start, "id")?;

    let mut entity_identifier = String::new();
    let mut entity_scheme = String::new();
    let mut instant: Option<String> = None;
    let mut start_date: Option<String> = None;
    let mut end_date: Option<String> = None;
    let mut dimensions = BTreeMap::new();

    let mut buf = Vec::new();
    let mut leaf: Option<String> = None;
    let mut pending_dimension: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let local = local_lower(e.name().as_ref());
                match local.as_str() {
                    "identifier" => {
                        if let Some(scheme) = attr_value(&e, "scheme") {
                            entity_scheme = scheme;
                        }
                        leaf = Some("identifier".to_string());
                    }
                    "instant" | "startdate" | "enddate" => leaf = Some(local),
                    "explicitmember" => {
                        pending_dimension = attr_value(&e, "dimension");
                        leaf = Some("explicitmember".to_string());
                    }
                    _ => leaf = None,
                }
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).trim().to_string());
                match leaf.as_deref() {
                    Some("identifier") => entity_identifier = text,
                    Some("instant") => instant = Some(text),
                    Some("startdate") => start_date = Some(text),
                    Some("enddate") => end_date = Some(text),
                    Some("explicitmember") => {
                        if let Some(dimension) = pending_dimension.take() {
                            dimensions.insert(dimension, text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if local_lower(e.name().as_ref()) == "context" {
                    break;
                }
                leaf = None;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let period = match (instant, start_date, end_date) {
        (Some(date), _, _) => Period::Instant { date },
        (None, Some(start_date), Some(end_date)) => Period::Duration {
            start_date,
            end_date,
        },
        _ => Period::Unknown,
    };

    Some(XbrlContext {
        id,
        entity_identifier,
        entity_scheme,
        period,
        dimensions,
        synthetic: false,
    })
}

fn parse_unit(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Option<(String, XbrlUnit)> {
    let id = attr_value(start, "id")?;

    let mut plain_measure: Option<String> = None;
    let mut numerator: Option<String> = None;
    let mut denominator: Option<String> = None;

    let mut in_numerator = false;
    let mut in_denominator = false;
    let mut in_measure = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match local_lower(e.name().as_ref()).as_str() {
                "unitnumerator" => in_numerator = true,
                "unitdenominator" => in_denominator = true,
                "measure" => in_measure = true,
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_measure {
                    let text = t
                        .unescape()
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).trim().to_string());
                    if in_numerator {
                        numerator = Some(text);
                    } else if in_denominator {
                        denominator = Some(text);
                    } else {
                        plain_measure = Some(text);
                    }
                }
            }
            Ok(Event::End(e)) => match local_lower(e.name().as_ref()).as_str() {
                "unit" => break,
                "unitnumerator" => in_numerator = false,
                "unitdenominator" => in_denominator = false,
                "measure" => in_measure = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    match (numerator, denominator, plain_measure) {
        (Some(numerator), Some(denominator), _) => Some((
            id,
            XbrlUnit::Divide {
                numerator,
                denominator,
            },
        )),
        (_, _, Some(measure)) => Some((id, XbrlUnit::Simple { measure })),
        _ => None,
    }
}

/// Collect `link:schemaRef` and `link:linkbaseRef` hrefs so the fetcher can
/// pull the taxonomy documents.
fn scan_references(content: &str) -> (Vec<String>, Vec<LinkbaseRef>) {
    let mut reader = reader_for(content);
    let mut buf = Vec::new();

    let mut schema_refs = Vec::new();
    let mut linkbase_refs = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                match local_lower(e.name().as_ref()).as_str() {
                    "schemaref" => {
                        if let Some(href) = attr_value(&e, "href") {
                            schema_refs.push(href);
                        }
                    }
                    "linkbaseref" => {
                        if let Some(href) = attr_value(&e, "href") {
                            linkbase_refs.push(LinkbaseRef {
                                href,
                                role: attr_value(&e, "role"),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    (schema_refs, linkbase_refs)
}

fn document_info_from_facts(facts: &[XbrlFact]) -> DocumentInfo {
    let mut info = DocumentInfo::default();
    for fact in facts {
        if fact.prefix() != "dei" {
            continue;
        }
        match fact.local_name() {
            "DocumentType" => info.document_type = Some(fact.value.clone()),
            "DocumentPeriodEndDate" => info.period_end_date = Some(fact.value.clone()),
            "EntityRegistrantName" => info.entity_name = Some(fact.value.clone()),
            "EntityCentralIndexKey" => info.cik = Some(fact.value.clone()),
            _ => {}
        }
    }
    info
}

/// Degraded mode: a document with facts but no resources section gets
/// contexts synthesised from the context-id formats, flagged so the report
/// can call it out.
fn synthesize_missing_contexts(extracted: &mut ExtractedFiling, registry: &ContextFormatRegistry) {
    if !extracted.contexts.is_empty() || extracted.facts.is_empty() {
        return;
    }

    let cik = extracted.document_info.cik.clone().unwrap_or_default();
    let mut refs: BTreeSet<String> = BTreeSet::new();
    for fact in &extracted.facts {
        if !fact.context_ref.is_empty() {
            refs.insert(fact.context_ref.clone());
        }
    }
    for context_ref in refs {
        let period = registry
            .extract_period(&context_ref)
            .unwrap_or(Period::Unknown);
        extracted.contexts.insert(
            context_ref.clone(),
            XbrlContext {
                id: context_ref,
                entity_identifier: cik.clone(),
                entity_scheme: "http://www.sec.gov/CIK".to_string(),
                period,
                dimensions: BTreeMap::new(),
                synthetic: true,
            },
        );
    }

    extracted.contexts_synthetic = true;
    extracted.warnings.push(ValidationWarning::new(
        "contexts_synthetic",
        "resources section missing; contexts synthesised from context-id formats",
    ));
}

/// Derive titled narrative sections from `*TextBlock` facts.
pub fn narrative_sections(facts: &[XbrlFact]) -> BTreeMap<String, NarrativeSection> {
    let mut sections = BTreeMap::new();
    for fact in facts {
        let local = fact.local_name();
        if !local.ends_with("TextBlock") || fact.value.is_empty() {
            continue;
        }
        sections
            .entry(local.to_string())
            .or_insert_with(|| NarrativeSection {
                title: humanize_concept(local),
                body: fact.value.clone(),
            });
    }
    sections
}

/// "SignificantAccountingPoliciesTextBlock" -> "Significant Accounting Policies".
fn humanize_concept(local_name: &str) -> String {
    let base = local_name.strip_suffix("TextBlock").unwrap_or(local_name);
    let mut words = String::with_capacity(base.len() + 8);
    for (i, c) in base.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            words.push(' ');
        }
        words.push(c);
    }
    words
}
