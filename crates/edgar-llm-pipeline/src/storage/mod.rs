pub mod metadata_store;
pub mod object_store;

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use edgar_llm_core::{
    estimate_tokens, DataIntegrity, FallbackPolicy, FilingDescriptor, FilingDocument,
    FiscalPeriodInfo, PipelineConfig, PipelineError, ProcessedFiling, Result,
};

use crate::fiscal::FiscalRegistry;

pub use metadata_store::{JsonMetadataStore, MemoryMetadataStore, MetadataStore};
pub use object_store::{LocalObjectStore, MemoryObjectStore, ObjectStore};

const CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const VALIDATION_SOURCE: &str = "storage_coordinator:fiscal_determination";

/// **Filing Location**
///
/// Canonical object prefix and document id for a filing. Both come from
/// the same derivation so they cannot drift apart: the metadata document's
/// paths always agree bit-for-bit with the object keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingLocation {
    pub object_prefix: String,
    pub document_id: String,
}

impl FilingLocation {
    /// `companies/<TICKER>/<FILING_TYPE>/<FISCAL_YEAR>[/<FISCAL_PERIOD>]`
    /// and `<TICKER>_<FILING_TYPE>_<FISCAL_YEAR>[_<FISCAL_PERIOD>]`.
    /// Annual-report forms omit the fiscal-period segment.
    pub fn derive(
        ticker: &str,
        filing_type: edgar_llm_core::FilingType,
        fiscal_year: &str,
        fiscal_period: &str,
    ) -> Self {
        let base_prefix = format!("companies/{ticker}/{filing_type}/{fiscal_year}");
        let base_id = format!("{ticker}_{filing_type}_{fiscal_year}");
        if filing_type.is_annual() {
            Self {
                object_prefix: base_prefix,
                document_id: base_id,
            }
        } else {
            Self {
                object_prefix: format!("{base_prefix}/{fiscal_period}"),
                document_id: format!("{base_id}_{fiscal_period}"),
            }
        }
    }

    pub fn text_path(&self) -> String {
        format!("{}/text.txt", self.object_prefix)
    }

    pub fn llm_path(&self) -> String {
        format!("{}/llm.txt", self.object_prefix)
    }

    pub fn raw_dump_path(&self) -> String {
        format!("{}/xbrl_raw.json", self.object_prefix)
    }
}

/// Fiscal attribution as resolved for publication, including the audit
/// trail of any fallback that fired.
#[derive(Debug)]
pub struct FiscalResolution {
    pub fiscal_year: String,
    pub fiscal_period: String,
    pub info: Option<FiscalPeriodInfo>,
    pub data_integrity: DataIntegrity,
}

impl FiscalResolution {
    pub fn verified(&self) -> bool {
        self.data_integrity.status == "success"
    }
}

/// Result of one publication.
#[derive(Debug)]
pub struct PublishOutcome {
    pub location: FilingLocation,
    pub uploaded: Vec<String>,
    pub skipped_existing: Vec<String>,
    pub fiscal: FiscalResolution,
    pub dry_run: bool,
}

/// **Storage Coordinator**
///
/// Publishes artifacts to the object store and upserts the metadata
/// document, idempotently. Fiscal attribution comes from the registry;
/// when that fails the documented fallback ladder applies, and every
/// fallback is recorded in the document's `data_integrity` block.
pub struct StorageCoordinator {
    config: PipelineConfig,
    object_store: Arc<dyn ObjectStore>,
    metadata_store: Arc<dyn MetadataStore>,
}

impl StorageCoordinator {
    pub fn new(
        config: PipelineConfig,
        object_store: Arc<dyn ObjectStore>,
        metadata_store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            config,
            object_store,
            metadata_store,
        }
    }

    /// Resolve fiscal attribution for a descriptor, applying the fallback
    /// ladder when the registry cannot answer:
    ///
    /// 1. caller-supplied fiscal fields on the descriptor
    ///    (`metadata_values`);
    /// 2. annual forms get `annual` with the year taken from the filing
    ///    date (`annual_for_10K`);
    /// 3. the `Q?` placeholder (`Q?_placeholder`) — or an error under the
    ///    strict fallback policy.
    pub fn resolve_fiscal(
        &self,
        registry: &FiscalRegistry,
        descriptor: &FilingDescriptor,
    ) -> Result<FiscalResolution> {
        let raw_date = descriptor.period_end_date.as_deref();

        let failure = match raw_date {
            Some(raw) => {
                match registry.determine(&descriptor.ticker, raw, Some(descriptor.filing_type)) {
                    Ok(info) => {
                        return Ok(FiscalResolution {
                            fiscal_year: info.fiscal_year().to_string(),
                            fiscal_period: info.fiscal_period().to_string(),
                            data_integrity: DataIntegrity::success(VALIDATION_SOURCE, Some(raw)),
                            info: Some(info),
                        });
                    }
                    Err(e) => e.to_string(),
                }
            }
            None => "missing period_end_date".to_string(),
        };

        warn!(
            ticker = %descriptor.ticker,
            accession = %descriptor.accession_number,
            %failure,
            "fiscal determination failed; applying fallbacks"
        );

        if let (Some(fiscal_year), Some(fiscal_period)) =
            (&descriptor.fiscal_year, &descriptor.fiscal_period)
        {
            return Ok(FiscalResolution {
                fiscal_year: fiscal_year.clone(),
                fiscal_period: fiscal_period.clone(),
                info: None,
                data_integrity: DataIntegrity::fallback(
                    VALIDATION_SOURCE,
                    raw_date,
                    "metadata_values",
                    &failure,
                ),
            });
        }

        let fiscal_year = year_from_date(&descriptor.filing_date)
            .or_else(|| raw_date.and_then(year_from_date))
            .unwrap_or_else(|| "unknown".to_string());

        if descriptor.filing_type.is_annual() {
            return Ok(FiscalResolution {
                fiscal_year,
                fiscal_period: "annual".to_string(),
                info: None,
                data_integrity: DataIntegrity::fallback(
                    VALIDATION_SOURCE,
                    raw_date,
                    "annual_for_10K",
                    &failure,
                ),
            });
        }

        if self.config.fallback_policy == FallbackPolicy::Strict {
            return Err(PipelineError::FiscalData(format!(
                "strict fallback policy refuses placeholder period for {}: {failure}",
                descriptor.ticker
            )));
        }

        Ok(FiscalResolution {
            fiscal_year,
            fiscal_period: "Q?".to_string(),
            info: None,
            data_integrity: DataIntegrity::fallback(
                VALIDATION_SOURCE,
                raw_date,
                "Q?_placeholder",
                &failure,
            ),
        })
    }

    /// Publish the text and LLM artifacts plus the metadata document.
    ///
    /// Existing objects are skipped unless `force_upload`; the metadata
    /// document is upserted on every call so `last_accessed` refreshes and
    /// `access_count` is preserved.
    pub async fn publish(
        &self,
        registry: &FiscalRegistry,
        filing: &ProcessedFiling,
        text_artifact: &str,
        llm_artifact: &str,
        raw_dump: Option<&[u8]>,
    ) -> Result<PublishOutcome> {
        let descriptor = &filing.descriptor;

        if (llm_artifact.len() as u64) < self.config.min_artifact_size {
            return Err(PipelineError::Storage(format!(
                "artifact below minimum size ({} < {} bytes)",
                llm_artifact.len(),
                self.config.min_artifact_size
            )));
        }

        let fiscal = self.resolve_fiscal(registry, descriptor)?;
        let location = FilingLocation::derive(
            &descriptor.ticker,
            descriptor.filing_type,
            &fiscal.fiscal_year,
            &fiscal.fiscal_period,
        );

        let mut outcome = PublishOutcome {
            location: location.clone(),
            uploaded: Vec::new(),
            skipped_existing: Vec::new(),
            fiscal,
            dry_run: self.config.dry_run,
        };

        if self.config.dry_run {
            info!(document_id = %location.document_id, "dry run; skipping publication");
            return Ok(outcome);
        }

        let mut objects: Vec<(String, &[u8])> = vec![
            (location.text_path(), text_artifact.as_bytes()),
            (location.llm_path(), llm_artifact.as_bytes()),
        ];
        if let Some(raw) = raw_dump {
            objects.push((location.raw_dump_path(), raw));
        }

        for (path, bytes) in objects {
            if !self.config.force_upload && self.object_store.exists(&path).await? {
                info!(%path, "object exists; skipping upload");
                outcome.skipped_existing.push(path);
                continue;
            }
            self.object_store.put(&path, bytes, CONTENT_TYPE).await?;
            outcome.uploaded.push(path);
        }

        let document = self
            .build_document(filing, &outcome, text_artifact, llm_artifact)
            .await?;
        self.metadata_store.upsert(&document).await?;

        info!(
            document_id = %location.document_id,
            uploaded = outcome.uploaded.len(),
            skipped = outcome.skipped_existing.len(),
            "filing published"
        );
        Ok(outcome)
    }

    async fn build_document(
        &self,
        filing: &ProcessedFiling,
        outcome: &PublishOutcome,
        text_artifact: &str,
        llm_artifact: &str,
    ) -> Result<FilingDocument> {
        let descriptor = &filing.descriptor;
        let location = &outcome.location;
        let fiscal = &outcome.fiscal;
        let now = Utc::now();

        let existing = self.metadata_store.get(&location.document_id).await?;
        let (upload_date, access_count) = existing
            .map(|doc| (doc.upload_date, doc.access_count))
            .unwrap_or((now, 0));

        let display_period = match fiscal.info.as_ref() {
            Some(info) => info.display_period(),
            None if fiscal.fiscal_period == "annual" => format!("FY{}", fiscal.fiscal_year),
            None => format!("FY{} {}", fiscal.fiscal_year, fiscal.fiscal_period),
        };

        Ok(FilingDocument {
            filing_id: location.document_id.clone(),
            company_ticker: descriptor.ticker.clone(),
            company_name: descriptor.display_name().to_string(),
            filing_type: descriptor.filing_type.to_string(),
            fiscal_year: fiscal.fiscal_year.clone(),
            fiscal_period: fiscal.fiscal_period.clone(),
            display_period,
            period_end_date: fiscal
                .info
                .as_ref()
                .map(|info| info.period_end_date().to_string()),
            period_end_date_raw: descriptor.period_end_date.clone(),
            filing_date: descriptor.filing_date.clone(),
            text_file_path: Some(location.text_path()),
            text_file_size: text_artifact.len() as u64,
            text_token_count: estimate_tokens(text_artifact),
            llm_file_path: Some(location.llm_path()),
            llm_file_size: llm_artifact.len() as u64,
            llm_token_count: estimate_tokens(llm_artifact),
            has_llm_format: true,
            fiscal_source: "company_fiscal_registry".to_string(),
            fiscal_integrity_verified: fiscal.verified(),
            data_integrity: fiscal.data_integrity.clone(),
            upload_date,
            last_accessed: now,
            access_count,
        })
    }
}

fn year_from_date(date: &str) -> Option<String> {
    let year: String = date.chars().take(4).collect();
    if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
        Some(year)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use edgar_llm_core::FilingType;

    fn descriptor(
        ticker: &str,
        filing_type: FilingType,
        filing_date: &str,
        period_end: Option<&str>,
    ) -> FilingDescriptor {
        FilingDescriptor::new(
            ticker,
            "320193",
            filing_type,
            filing_date,
            period_end,
            "https://www.sec.gov/doc.htm",
            "0000320193-23-000006",
        )
        .unwrap()
    }

    fn coordinator(config: PipelineConfig) -> (StorageCoordinator, Arc<MemoryObjectStore>, Arc<MemoryMetadataStore>) {
        let objects = Arc::new(MemoryObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        (
            StorageCoordinator::new(config, objects.clone(), metadata.clone()),
            objects,
            metadata,
        )
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            min_artifact_size: 1,
            ..PipelineConfig::default()
        }
    }

    fn processed(descriptor: FilingDescriptor) -> ProcessedFiling {
        ProcessedFiling::new(descriptor)
    }

    #[test]
    fn quarterly_location_includes_period_segment() {
        let location = FilingLocation::derive("AAPL", FilingType::TenQ, "2023", "Q1");
        assert_eq!(location.llm_path(), "companies/AAPL/10-Q/2023/Q1/llm.txt");
        assert_eq!(location.document_id, "AAPL_10-Q_2023_Q1");
    }

    #[test]
    fn annual_location_omits_period_segment() {
        let location = FilingLocation::derive("MSFT", FilingType::TenK, "2024", "annual");
        assert_eq!(location.llm_path(), "companies/MSFT/10-K/2024/llm.txt");
        assert_eq!(location.document_id, "MSFT_10-K_2024");
    }

    #[test]
    fn registry_hit_is_authoritative() {
        let (coordinator, _, _) = coordinator(small_config());
        let registry = FiscalRegistry::builtin();
        let d = descriptor("AAPL", FilingType::TenQ, "2023-02-03", Some("2022-12-31"));

        let fiscal = coordinator.resolve_fiscal(&registry, &d).unwrap();
        assert_eq!(fiscal.fiscal_year, "2023");
        assert_eq!(fiscal.fiscal_period, "Q1");
        assert!(fiscal.verified());
        assert!(fiscal.data_integrity.fallback_used.is_none());
    }

    #[test]
    fn descriptor_values_are_the_first_fallback() {
        let (coordinator, _, _) = coordinator(small_config());
        let registry = FiscalRegistry::builtin();
        let mut d = descriptor("ZZZZ", FilingType::TenQ, "2024-05-01", Some("2024-03-31"));
        d.fiscal_year = Some("2024".to_string());
        d.fiscal_period = Some("Q3".to_string());

        let fiscal = coordinator.resolve_fiscal(&registry, &d).unwrap();
        assert_eq!(fiscal.fiscal_year, "2024");
        assert_eq!(fiscal.fiscal_period, "Q3");
        assert_eq!(
            fiscal.data_integrity.fallback_used.as_deref(),
            Some("metadata_values")
        );
    }

    #[test]
    fn missing_period_end_on_annual_form_falls_back() {
        let (coordinator, _, _) = coordinator(small_config());
        let registry = FiscalRegistry::builtin();
        let d = descriptor("MSFT", FilingType::TenK, "2024-07-15", None);

        let fiscal = coordinator.resolve_fiscal(&registry, &d).unwrap();
        assert_eq!(fiscal.fiscal_year, "2024");
        assert_eq!(fiscal.fiscal_period, "annual");
        assert_eq!(
            fiscal.data_integrity.fallback_used.as_deref(),
            Some("annual_for_10K")
        );
        assert!(!fiscal.verified());
    }

    #[test]
    fn quarterly_placeholder_under_permissive_policy() {
        let (coordinator, _, _) = coordinator(small_config());
        let registry = FiscalRegistry::builtin();
        let d = descriptor("ZZZZ", FilingType::TenQ, "2024-05-01", Some("2024-03-31"));

        let fiscal = coordinator.resolve_fiscal(&registry, &d).unwrap();
        assert_eq!(fiscal.fiscal_period, "Q?");
        assert_eq!(
            fiscal.data_integrity.fallback_used.as_deref(),
            Some("Q?_placeholder")
        );
    }

    #[test]
    fn strict_policy_refuses_placeholder() {
        let config = PipelineConfig {
            fallback_policy: FallbackPolicy::Strict,
            ..small_config()
        };
        let (coordinator, _, _) = coordinator(config);
        let registry = FiscalRegistry::builtin();
        let d = descriptor("ZZZZ", FilingType::TenQ, "2024-05-01", Some("2024-03-31"));

        assert_matches!(
            coordinator.resolve_fiscal(&registry, &d),
            Err(PipelineError::FiscalData(_))
        );
    }

    #[tokio::test]
    async fn publish_writes_objects_and_metadata() {
        let (coordinator, objects, metadata) = coordinator(small_config());
        let registry = FiscalRegistry::builtin();
        let filing = processed(descriptor(
            "AAPL",
            FilingType::TenQ,
            "2023-02-03",
            Some("2022-12-31"),
        ));

        let outcome = coordinator
            .publish(&registry, &filing, "text artifact", "llm artifact", None)
            .await
            .unwrap();

        assert_eq!(outcome.uploaded.len(), 2);
        assert!(objects
            .paths()
            .await
            .contains(&"companies/AAPL/10-Q/2023/Q1/llm.txt".to_string()));

        let doc = metadata.get("AAPL_10-Q_2023_Q1").await.unwrap().unwrap();
        assert_eq!(doc.display_period, "FY2023 Q1");
        assert_eq!(doc.llm_file_path.as_deref(), Some("companies/AAPL/10-Q/2023/Q1/llm.txt"));
        assert_eq!(doc.llm_token_count, "llm artifact".len() as u64 / 4);
        assert!(doc.fiscal_integrity_verified);
    }

    #[tokio::test]
    async fn path_and_document_id_share_one_derivation() {
        let (coordinator, _, metadata) = coordinator(small_config());
        let registry = FiscalRegistry::builtin();
        let filing = processed(descriptor(
            "MSFT",
            FilingType::TenK,
            "2024-07-30",
            Some("2024-06-30"),
        ));

        coordinator
            .publish(&registry, &filing, "text", "llm artifact", None)
            .await
            .unwrap();

        let doc = metadata.get("MSFT_10-K_2024").await.unwrap().unwrap();
        let rederived = FilingLocation::derive(
            &doc.company_ticker,
            FilingType::TenK,
            &doc.fiscal_year,
            &doc.fiscal_period,
        );
        assert_eq!(doc.text_file_path.as_deref(), Some(rederived.text_path().as_str()));
        assert_eq!(doc.llm_file_path.as_deref(), Some(rederived.llm_path().as_str()));
        assert_eq!(doc.filing_id, rederived.document_id);
    }

    #[tokio::test]
    async fn rerun_without_force_skips_uploads_but_upserts_metadata() {
        let (coordinator, objects, metadata) = coordinator(small_config());
        let registry = FiscalRegistry::builtin();
        let filing = processed(descriptor(
            "AAPL",
            FilingType::TenQ,
            "2023-02-03",
            Some("2022-12-31"),
        ));

        coordinator
            .publish(&registry, &filing, "text", "llm artifact", None)
            .await
            .unwrap();
        let first_doc = metadata.get("AAPL_10-Q_2023_Q1").await.unwrap().unwrap();
        assert_eq!(objects.put_count(), 2);

        let outcome = coordinator
            .publish(&registry, &filing, "text", "llm artifact", None)
            .await
            .unwrap();

        assert!(outcome.uploaded.is_empty());
        assert_eq!(outcome.skipped_existing.len(), 2);
        assert_eq!(objects.put_count(), 2);

        let second_doc = metadata.get("AAPL_10-Q_2023_Q1").await.unwrap().unwrap();
        assert_eq!(second_doc.upload_date, first_doc.upload_date);
        assert!(second_doc.last_accessed >= first_doc.last_accessed);
    }

    #[tokio::test]
    async fn force_upload_overwrites() {
        let config = PipelineConfig {
            force_upload: true,
            ..small_config()
        };
        let (coordinator, objects, _) = coordinator(config);
        let registry = FiscalRegistry::builtin();
        let filing = processed(descriptor(
            "AAPL",
            FilingType::TenQ,
            "2023-02-03",
            Some("2022-12-31"),
        ));

        coordinator
            .publish(&registry, &filing, "text", "llm artifact", None)
            .await
            .unwrap();
        coordinator
            .publish(&registry, &filing, "text", "llm artifact", None)
            .await
            .unwrap();
        assert_eq!(objects.put_count(), 4);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let config = PipelineConfig {
            dry_run: true,
            ..small_config()
        };
        let (coordinator, objects, metadata) = coordinator(config);
        let registry = FiscalRegistry::builtin();
        let filing = processed(descriptor(
            "AAPL",
            FilingType::TenQ,
            "2023-02-03",
            Some("2022-12-31"),
        ));

        let outcome = coordinator
            .publish(&registry, &filing, "text", "llm artifact", None)
            .await
            .unwrap();
        assert!(outcome.dry_run);
        assert_eq!(objects.put_count(), 0);
        assert!(metadata.is_empty().await);
    }

    #[tokio::test]
    async fn undersized_artifact_is_rejected() {
        let (coordinator, _, _) = coordinator(PipelineConfig::default());
        let registry = FiscalRegistry::builtin();
        let filing = processed(descriptor(
            "AAPL",
            FilingType::TenQ,
            "2023-02-03",
            Some("2022-12-31"),
        ));

        assert_matches!(
            coordinator
                .publish(&registry, &filing, "text", "tiny", None)
                .await,
            Err(PipelineError::Storage(_))
        );
    }
}
