use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

/// **File Size Optimizer**
///
/// Shrinks a rendered artifact while preserving every fact. Five passes,
/// applied in order:
///
/// 1. context consolidation — raw context ids outside the dictionary are
///    rewritten to their `c-k` codes;
/// 2. text-block deduplication — narrative blocks move to a `@TEXT_BLOCKS`
///    section, occurrences become `@TEXT_REF` entries, duplicates share an
///    id;
/// 3. financial-statement normalisation — wide context-column tables are
///    flattened to `Statement|Concept|Value|Context|Context_Label` lines;
/// 4. tag shortening — table-driven, lossless rewrites of verbose markers;
/// 5. whitespace reduction — blank-line runs collapse, trailing spaces and
///    padding around table pipes are stripped.
///
/// The whole transformation is idempotent: optimising an already-optimised
/// artifact returns it byte-identical.
#[derive(Debug)]
pub struct FileSizeOptimizer {
    tag_mappings: Vec<(&'static str, &'static str)>,
    dictionary_line: Regex,
    context_label: Regex,
}

impl Default for FileSizeOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSizeOptimizer {
    pub fn new() -> Self {
        Self {
            tag_mappings: vec![
                ("@FINANCIAL_STATEMENT:", "@FS:"),
                ("@STATEMENT_TYPE:", "@ST:"),
                ("@NARRATIVE_TEXT:", "@NT:"),
                ("@CONTEXT_LABELS:", "@CL:"),
                ("@DATA_DICTIONARY: CONTEXTS", "@DD_CONTEXTS"),
                ("@DATA_DICTIONARY: UNITS", "@DD_UNITS"),
                ("@SECTION:", "@SEC:"),
            ],
            dictionary_line: Regex::new(r"^(c-\d+)\s*\|\s*@CODE:\s*(\S+)\s*$")
                .expect("static regex"),
            context_label: Regex::new(r"(c-\d+) \(([^)]*)\)").expect("static regex"),
        }
    }

    pub fn optimize(&self, content: &str) -> String {
        let content = self.consolidate_contexts(content);
        let content = self.deduplicate_text_blocks(&content);
        let content = self.normalize_financial_statements(&content);
        let content = self.shorten_tags(&content);
        self.reduce_whitespace(&content)
    }

    /// Rewrite raw context ids to their dictionary codes everywhere except
    /// the `@CODE:` lines that define the mapping.
    fn consolidate_contexts(&self, content: &str) -> String {
        let mut mapping: BTreeMap<String, String> = BTreeMap::new();
        for line in content.lines() {
            if let Some(caps) = self.dictionary_line.captures(line.trim()) {
                mapping.insert(caps[2].to_string(), caps[1].to_string());
            }
        }
        if mapping.is_empty() {
            return content.to_string();
        }

        // Longest id first: an instant id can be a prefix of a duration id
        // and must not clobber it.
        let mut ordered: Vec<(&String, &String)> = mapping.iter().collect();
        ordered.sort_by_key(|(original, _)| std::cmp::Reverse(original.len()));

        let mut out = String::with_capacity(content.len());
        for line in content.lines() {
            if line.contains("@CODE:") {
                out.push_str(line);
            } else {
                let mut rewritten = line.to_string();
                for (original, code) in &ordered {
                    if rewritten.contains(original.as_str()) {
                        rewritten = rewritten.replace(original.as_str(), code.as_str());
                    }
                }
                out.push_str(&rewritten);
            }
            out.push('\n');
        }
        out
    }

    /// Move narrative blocks into a `@TEXT_BLOCKS` section; every original
    /// location becomes a `@TEXT_REF`, and blocks with identical bodies
    /// share one id.
    fn deduplicate_text_blocks(&self, content: &str) -> String {
        let lines: Vec<&str> = content.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());

        // body hash -> (id, title, body), in first-appearance order.
        let mut blocks: Vec<(String, String, String)> = Vec::new();
        let mut ids_by_hash: BTreeMap<String, String> = BTreeMap::new();
        let mut insertion_point: Option<usize> = None;

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if let Some(title) = line.strip_prefix("@NARRATIVE_TEXT: ") {
                let mut body = String::new();
                i += 1;
                while i < lines.len() && !lines[i].trim().is_empty() {
                    if !body.is_empty() {
                        body.push('\n');
                    }
                    body.push_str(lines[i]);
                    i += 1;
                }

                let hash = hex::encode(Sha256::digest(body.as_bytes()));
                let id = ids_by_hash.entry(hash).or_insert_with(|| {
                    let id = format!("tb-{}", blocks.len() + 1);
                    blocks.push((id.clone(), title.to_string(), body.clone()));
                    id
                });
                if insertion_point.is_none() {
                    insertion_point = Some(out.len());
                }
                out.push(format!("@TEXT_REF: {title} | {id}"));
                continue;
            }
            out.push(line.to_string());
            i += 1;
        }

        if blocks.is_empty() {
            return content.to_string();
        }
        debug!(unique = blocks.len(), "text blocks deduplicated");

        let mut section: Vec<String> = vec!["@TEXT_BLOCKS".to_string()];
        for (id, title, body) in &blocks {
            section.push(format!("{id} | @TITLE: {title}"));
            section.push(format!("@TEXT: {body}"));
            section.push(String::new());
        }

        let at = insertion_point.unwrap_or(out.len());
        let mut result: Vec<String> = Vec::with_capacity(out.len() + section.len());
        result.extend(out[..at].iter().cloned());
        result.extend(section);
        result.extend(out[at..].iter().cloned());
        result.join("\n") + "\n"
    }

    /// Flatten wide `@FINANCIAL_STATEMENT:` tables into the long normalized
    /// form, dropping empty and dash-only cells.
    fn normalize_financial_statements(&self, content: &str) -> String {
        let lines: Vec<&str> = content.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());

        // statement -> rows of (concept, value, context, label).
        let mut grouped: Vec<(String, Vec<(String, String, String, String)>)> = Vec::new();
        let mut insertion_point: Option<usize> = None;

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            let Some(statement) = line.strip_prefix("@FINANCIAL_STATEMENT: ") else {
                out.push(line.to_string());
                i += 1;
                continue;
            };
            let statement = statement.trim().to_string();
            if insertion_point.is_none() {
                insertion_point = Some(out.len());
            }
            i += 1;

            let mut labels: BTreeMap<String, String> = BTreeMap::new();
            if i < lines.len() {
                if let Some(rest) = lines[i].strip_prefix("@CONTEXT_LABELS: ") {
                    for caps in self.context_label.captures_iter(rest) {
                        labels.insert(caps[1].to_string(), caps[2].to_string());
                    }
                    i += 1;
                }
            }

            let mut columns: Vec<String> = Vec::new();
            if i < lines.len() && lines[i].starts_with("Line Item") {
                columns = lines[i]
                    .split('|')
                    .skip(1)
                    .map(|c| c.trim().to_string())
                    .collect();
                i += 1;
            }

            let mut rows: Vec<(String, String, String, String)> = Vec::new();
            while i < lines.len() && !lines[i].trim().is_empty() {
                let mut cells = lines[i].split('|');
                let concept = cells.next().unwrap_or_default().trim().to_string();
                if concept.is_empty() || concept.starts_with('-') {
                    i += 1;
                    continue;
                }
                for (column, cell) in columns.iter().zip(cells) {
                    let value = cell.trim();
                    if value.is_empty() || value == "-" {
                        continue;
                    }
                    rows.push((
                        concept.clone(),
                        value.to_string(),
                        column.clone(),
                        labels.get(column).cloned().unwrap_or_default(),
                    ));
                }
                i += 1;
            }

            if !rows.is_empty() {
                grouped.push((statement, rows));
            }
            // Swallow the blank line that closed the section.
            if i < lines.len() && lines[i].trim().is_empty() {
                i += 1;
            }
        }

        if grouped.is_empty() {
            return content.to_string();
        }
        debug!(statements = grouped.len(), "financial statements normalized");

        let mut section: Vec<String> = vec![
            "@NORMALIZED_FINANCIAL_STATEMENTS".to_string(),
            "@NORMALIZED_FORMAT: Statement|Concept|Value|Context|Context_Label".to_string(),
            String::new(),
        ];
        for (statement, rows) in &grouped {
            section.push(format!("@STATEMENT: {statement}"));
            for (concept, value, context, label) in rows {
                section.push(format!("{statement}|{concept}|{value}|{context}|{label}"));
            }
            section.push(String::new());
        }

        let at = insertion_point.unwrap_or(out.len());
        let mut result: Vec<String> = Vec::with_capacity(out.len() + section.len());
        result.extend(out[..at].iter().cloned());
        result.extend(section);
        result.extend(out[at..].iter().cloned());
        result.join("\n") + "\n"
    }

    /// Table-driven, lossless marker rewrites.
    fn shorten_tags(&self, content: &str) -> String {
        let mut content = content.to_string();
        for (long, short) in &self.tag_mappings {
            content = content.replace(long, short);
        }
        content
    }

    /// Collapse blank-line runs, strip trailing spaces, tighten table
    /// separators.
    fn reduce_whitespace(&self, content: &str) -> String {
        let trailing = Regex::new(r"[ \t]+\n").expect("static regex");
        let blank_runs = Regex::new(r"\n{3,}").expect("static regex");
        let pipe_right = Regex::new(r"\| +").expect("static regex");
        let pipe_left = Regex::new(r" +\|").expect("static regex");

        let content = trailing.replace_all(content, "\n");
        let content = blank_runs.replace_all(&content, "\n\n");
        let content = pipe_right.replace_all(&content, "|");
        let content = pipe_left.replace_all(&content, "|");

        let mut content = content.into_owned();
        let end = content.trim_end().len();
        content.truncate(end);
        content.push('\n');
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERED: &str = "@DOCUMENT_METADATA\n@TICKER: AAPL\n\n\
@DATA_DICTIONARY: CONTEXTS\nc-1 | @CODE: C_0000320193_20221001_20221231\n     @LABEL: Period 2022-10-01 to 2022-12-31\nc-2 | @CODE: C_0000320193_20221231\n     @LABEL: As of 2022-12-31\n\n\
@NARRATIVE_TEXT: Significant Accounting Policies\nSummary of significant accounting policies.\n\n\
@NARRATIVE_TEXT: Accounting Policies Restated\nSummary of significant accounting policies.\n\n\
@FINANCIAL_STATEMENT: Balance_Sheet\n@CONTEXT_LABELS: c-2 (As of 2022-12-31)\nLine Item | c-2\nus-gaap:Assets | 346,747\nus-gaap:AssetsCurrent | -\n\n\
@FACTS\n@FORMAT: Concept|Value|Context|Unit|Decimals\nus-gaap:Assets|346,747|c-2|usd|-6\n\n\n\n\
@SECTION: DOCUMENT_SUMMARY\n@FACT_COUNT: 1   \n";

    #[test]
    fn optimize_is_idempotent() {
        let optimizer = FileSizeOptimizer::new();
        let once = optimizer.optimize(RENDERED);
        let twice = optimizer.optimize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn duplicate_blocks_share_an_id() {
        let optimizer = FileSizeOptimizer::new();
        let optimized = optimizer.optimize(RENDERED);

        assert!(optimized.contains("@TEXT_BLOCKS"));
        assert!(optimized.contains("tb-1|@TITLE: Significant Accounting Policies"));
        // Both occurrences reference the same block.
        assert!(optimized.contains("@TEXT_REF: Significant Accounting Policies|tb-1"));
        assert!(optimized.contains("@TEXT_REF: Accounting Policies Restated|tb-1"));
        assert!(!optimized.contains("tb-2"));
    }

    #[test]
    fn wide_tables_flatten_to_normalized_lines() {
        let optimizer = FileSizeOptimizer::new();
        let optimized = optimizer.optimize(RENDERED);

        assert!(optimized.contains("@NORMALIZED_FINANCIAL_STATEMENTS"));
        assert!(optimized
            .contains("@NORMALIZED_FORMAT: Statement|Concept|Value|Context|Context_Label"));
        assert!(optimized.contains("Balance_Sheet|us-gaap:Assets|346,747|c-2|As of 2022-12-31"));
        // Dash-only cells are dropped.
        assert!(!optimized.contains("AssetsCurrent|-"));
        // The wide table is gone.
        assert!(!optimized.contains("Line Item"));
    }

    #[test]
    fn tags_are_shortened() {
        let optimizer = FileSizeOptimizer::new();
        let optimized = optimizer.optimize(RENDERED);
        assert!(optimized.contains("@DD_CONTEXTS"));
        assert!(optimized.contains("@SEC: DOCUMENT_SUMMARY"));
        assert!(!optimized.contains("@DATA_DICTIONARY: CONTEXTS"));
        assert!(!optimized.contains("@SECTION:"));
    }

    #[test]
    fn whitespace_is_reduced() {
        let optimizer = FileSizeOptimizer::new();
        let optimized = optimizer.optimize(RENDERED);
        assert!(!optimized.contains("\n\n\n"));
        assert!(!optimized.contains("   \n"));
        assert!(optimized.ends_with('\n'));
        assert!(!optimized.ends_with("\n\n"));
    }

    #[test]
    fn raw_context_ids_outside_dictionary_are_rewritten() {
        let optimizer = FileSizeOptimizer::new();
        let content = "@DATA_DICTIONARY: CONTEXTS\nc-1 | @CODE: C_0000320193_20221231\n\n\
@FACTS\nus-gaap:Assets|1|C_0000320193_20221231|usd|\n";
        let optimized = optimizer.optimize(content);
        assert!(optimized.contains("us-gaap:Assets|1|c-1|usd|"));
        // The dictionary line keeps the original id.
        assert!(optimized.contains("@CODE: C_0000320193_20221231"));
    }
}
