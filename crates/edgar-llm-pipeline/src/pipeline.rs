use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use edgar_llm_core::{
    FilingDescriptor, FiscalPeriodInfo, PipelineConfig, ProcessedFiling, Result,
};

use crate::extract::{self, ContextFormatRegistry, ExtractedFiling};
use crate::fetch::SecFetcher;
use crate::fiscal::FiscalRegistry;
use crate::format::{FileSizeOptimizer, LlmFormatter};
use crate::hierarchy::{FilingHierarchy, HierarchyResolver};
use crate::rate_limiter::SecRateLimiter;
use crate::storage::{MetadataStore, ObjectStore, StorageCoordinator};
use crate::validator::FinancialValidator;
use crate::verify::{CoverageReport, RawXbrlDump, Verifier};

/// Outcome of one filing's pipeline.
#[derive(Debug)]
pub struct FilingOutcome {
    pub document_id: String,
    pub coverage: CoverageReport,
    pub warning_count: usize,
    pub uploaded: usize,
    pub skipped_existing: usize,
}

/// Per-filing line in the run report.
#[derive(Debug)]
pub struct FilingReport {
    pub ticker: String,
    pub filing_type: String,
    pub accession_number: String,
    pub passed: bool,
    pub reason: Option<String>,
    pub document_id: Option<String>,
    pub exact_coverage: Option<f64>,
    pub warning_count: usize,
}

/// **Run Report**
///
/// One entry per filing, in completion order. The process exit code is
/// derived from [`RunReport::all_passed`].
#[derive(Debug, Default)]
pub struct RunReport {
    pub filings: Vec<FilingReport>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.filings.iter().filter(|f| f.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.filings.len() - self.passed()
    }

    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }

    /// Human-readable per-filing summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for filing in &self.filings {
            let status = if filing.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "{status} {} {} {}",
                filing.ticker, filing.filing_type, filing.accession_number
            ));
            if let Some(id) = &filing.document_id {
                out.push_str(&format!(" -> {id}"));
            }
            if let Some(coverage) = filing.exact_coverage {
                out.push_str(&format!(" (coverage {:.2}%)", coverage * 100.0));
            }
            if filing.warning_count > 0 {
                out.push_str(&format!(" [{} warnings]", filing.warning_count));
            }
            if let Some(reason) = &filing.reason {
                out.push_str(&format!(": {reason}"));
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "{} passed, {} failed of {}\n",
            self.passed(),
            self.failed(),
            self.filings.len()
        ));
        out
    }
}

/// **Filing Pipeline**
///
/// Sequences the per-filing stages and coordinates the worker pool. Each
/// worker owns its `ProcessedFiling` end-to-end; the only shared state is
/// the global rate limiter and the read-only fiscal registry. Publication
/// is the last stage of each filing, so a cancelled or timed-out filing
/// never leaves partial writes.
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<FiscalRegistry>,
    fetcher: SecFetcher,
    context_formats: ContextFormatRegistry,
    resolver: HierarchyResolver,
    validator: FinancialValidator,
    formatter: LlmFormatter,
    optimizer: FileSizeOptimizer,
    coordinator: StorageCoordinator,
    verifier: Verifier,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<FiscalRegistry>,
        object_store: Arc<dyn ObjectStore>,
        metadata_store: Arc<dyn MetadataStore>,
    ) -> Result<Self> {
        config.validate()?;
        let limiter = Arc::new(SecRateLimiter::new(config.requests_per_second));
        let fetcher = SecFetcher::new(&config, limiter)?;
        let coordinator =
            StorageCoordinator::new(config.clone(), object_store, metadata_store);
        let validator = FinancialValidator::new().with_derivation(config.derive_missing_totals);
        let verifier = Verifier::new(config.completeness_threshold);

        Ok(Self {
            config,
            registry,
            fetcher,
            context_formats: ContextFormatRegistry::new(),
            resolver: HierarchyResolver::new(),
            validator,
            formatter: LlmFormatter::new(),
            optimizer: FileSizeOptimizer::new(),
            coordinator,
            verifier,
        })
    }

    /// Process filings with a bounded worker pool; each filing runs its
    /// stages sequentially under the per-filing deadline.
    pub async fn run(&self, filings: Vec<FilingDescriptor>) -> RunReport {
        let reports = stream::iter(
            filings
                .into_iter()
                .map(|descriptor| self.process_with_deadline(descriptor)),
        )
        .buffer_unordered(self.config.max_concurrency)
        .collect::<Vec<_>>()
        .await;

        let report = RunReport { filings: reports };
        info!(
            passed = report.passed(),
            failed = report.failed(),
            "run complete"
        );
        report
    }

    async fn process_with_deadline(&self, descriptor: FilingDescriptor) -> FilingReport {
        let ticker = descriptor.ticker.clone();
        let filing_type = descriptor.filing_type.to_string();
        let accession_number = descriptor.accession_number.clone();

        let outcome =
            tokio::time::timeout(self.config.filing_deadline, self.process_filing(descriptor))
                .await;

        match outcome {
            Ok(Ok(outcome)) => {
                let passed = outcome.coverage.passed();
                FilingReport {
                    ticker,
                    filing_type,
                    accession_number,
                    passed,
                    reason: (!passed).then(|| {
                        format!(
                            "coverage {:.3} below threshold {:.3}",
                            outcome.coverage.exact_coverage, outcome.coverage.threshold
                        )
                    }),
                    document_id: Some(outcome.document_id),
                    exact_coverage: Some(outcome.coverage.exact_coverage),
                    warning_count: outcome.warning_count,
                }
            }
            Ok(Err(e)) => {
                error!(%ticker, %accession_number, error = %e, "filing failed");
                FilingReport {
                    ticker,
                    filing_type,
                    accession_number,
                    passed: false,
                    reason: Some(e.to_string()),
                    document_id: None,
                    exact_coverage: None,
                    warning_count: 0,
                }
            }
            Err(_) => {
                error!(%ticker, %accession_number, "filing deadline exceeded");
                FilingReport {
                    ticker,
                    filing_type,
                    accession_number,
                    passed: false,
                    reason: Some(format!(
                        "deadline of {:?} exceeded",
                        self.config.filing_deadline
                    )),
                    document_id: None,
                    exact_coverage: None,
                    warning_count: 0,
                }
            }
        }
    }

    async fn process_filing(&self, descriptor: FilingDescriptor) -> Result<FilingOutcome> {
        info!(
            ticker = %descriptor.ticker,
            accession = %descriptor.accession_number,
            url = %descriptor.document_url,
            "processing filing"
        );

        let primary = self.fetcher.fetch(&descriptor.document_url).await?;
        let extracted = extract::extract(&primary, &self.context_formats)?;
        let (linkbases, schemas) = self
            .fetch_taxonomy(&descriptor.document_url, &extracted)
            .await;

        let (mut filing, hierarchy) = self.assemble(descriptor, extracted, &linkbases, &schemas);
        self.validator.validate(&mut filing);

        let fiscal_header = self.fiscal_for_header(&filing.descriptor);
        let text_artifact = self
            .formatter
            .render(&filing, &hierarchy, fiscal_header.as_ref());
        let llm_artifact = self.optimizer.optimize(&text_artifact);

        let raw_dump = RawXbrlDump::from_filing(&filing);
        let raw_bytes = if self.config.raw_dump {
            Some(raw_dump.to_json()?)
        } else {
            None
        };

        let publish = self
            .coordinator
            .publish(
                &self.registry,
                &filing,
                &text_artifact,
                &llm_artifact,
                raw_bytes.as_deref(),
            )
            .await?;

        // Publication succeeded; the verifier observes the final artifact.
        let coverage = self.verifier.verify(&raw_dump, &llm_artifact);

        Ok(FilingOutcome {
            document_id: publish.location.document_id,
            coverage,
            warning_count: filing.warnings.len(),
            uploaded: publish.uploaded.len(),
            skipped_existing: publish.skipped_existing.len(),
        })
    }

    /// Network-free core: extraction through validation. Used directly by
    /// tests that drive the pipeline from document bytes.
    pub fn process_document(
        &self,
        descriptor: FilingDescriptor,
        primary: &[u8],
        linkbases: &[Vec<u8>],
        schemas: &[Vec<u8>],
    ) -> Result<(ProcessedFiling, FilingHierarchy)> {
        let extracted = extract::extract(primary, &self.context_formats)?;
        let (mut filing, hierarchy) = self.assemble(descriptor, extracted, linkbases, schemas);
        self.validator.validate(&mut filing);
        Ok((filing, hierarchy))
    }

    /// Render and optimise the artifacts for an already-assembled filing.
    pub fn render_artifacts(
        &self,
        filing: &ProcessedFiling,
        hierarchy: &FilingHierarchy,
    ) -> (String, String) {
        let fiscal_header = self.fiscal_for_header(&filing.descriptor);
        let text = self
            .formatter
            .render(filing, hierarchy, fiscal_header.as_ref());
        let llm = self.optimizer.optimize(&text);
        (text, llm)
    }

    fn fiscal_for_header(&self, descriptor: &FilingDescriptor) -> Option<FiscalPeriodInfo> {
        let raw = descriptor.period_end_date.as_deref()?;
        self.registry
            .determine(&descriptor.ticker, raw, Some(descriptor.filing_type))
            .ok()
    }

    fn assemble(
        &self,
        descriptor: FilingDescriptor,
        extracted: ExtractedFiling,
        linkbases: &[Vec<u8>],
        schemas: &[Vec<u8>],
    ) -> (ProcessedFiling, FilingHierarchy) {
        let fact_concepts: BTreeSet<String> =
            extracted.facts.iter().map(|f| f.name.clone()).collect();
        let hierarchy = self.resolver.resolve(linkbases, schemas, &fact_concepts);

        let mut filing = ProcessedFiling::new(descriptor);
        filing.sections = extract::narrative_sections(&extracted.facts);
        filing.facts = extracted.facts;
        filing.contexts = extracted.contexts;
        filing.units = extracted.units;
        filing.warnings = extracted.warnings;
        filing.contexts_synthetic = extracted.contexts_synthetic;
        filing.arcs = hierarchy.arcs.clone();
        for concept in &fact_concepts {
            filing
                .statement_mapping
                .insert(concept.clone(), hierarchy.statement_of(concept));
        }

        (filing, hierarchy)
    }

    /// Fetch the company taxonomy: relative schema refs from the primary
    /// document, then linkbase refs discovered inside those schemas.
    /// Failures degrade to the pattern fallback rather than failing the
    /// filing.
    async fn fetch_taxonomy(
        &self,
        document_url: &str,
        extracted: &ExtractedFiling,
    ) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let mut schemas = Vec::new();
        let mut linkbases = Vec::new();
        let mut linkbase_urls: Vec<String> = extracted
            .linkbase_refs
            .iter()
            .filter_map(|r| resolve_relative(document_url, &r.href))
            .collect();

        for href in &extracted.schema_refs {
            let Some(url) = resolve_relative(document_url, href) else {
                continue;
            };
            match self.fetcher.fetch(&url).await {
                Ok(bytes) => {
                    for linkbase_ref in extract::linkbase_refs_in(&bytes) {
                        if let Some(url) = resolve_relative(&url, &linkbase_ref.href) {
                            linkbase_urls.push(url);
                        }
                    }
                    schemas.push(bytes);
                }
                Err(e) => warn!(%url, error = %e, "schema fetch failed; continuing"),
            }
        }

        linkbase_urls.sort();
        linkbase_urls.dedup();
        for url in linkbase_urls {
            match self.fetcher.fetch(&url).await {
                Ok(bytes) => linkbases.push(bytes),
                Err(e) => warn!(%url, error = %e, "linkbase fetch failed; continuing"),
            }
        }

        (linkbases, schemas)
    }
}

/// Resolve a possibly-relative href against the document URL. Absolute
/// URLs to other hosts (standard taxonomy schemas) are skipped; the
/// company taxonomy travels as siblings of the primary document.
fn resolve_relative(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        let sec_hosted = href.contains("sec.gov/Archives/");
        return sec_hosted.then(|| href.to_string());
    }
    let dir_end = base.rfind('/')?;
    Some(format!("{}/{}", &base[..dir_end], href))
}
