//! End-to-end pipeline tests over an inline-XBRL fixture, exercising
//! extraction through publication and round-trip verification without any
//! network access.

use std::sync::Arc;

use edgar_llm_core::{FilingDescriptor, FilingType, PipelineConfig};
use edgar_llm_pipeline::{
    FileSizeOptimizer, FiscalRegistry, MemoryMetadataStore, MemoryObjectStore, Pipeline,
    RawXbrlDump, StorageCoordinator, Verifier,
};

const FIXTURE: &str = r#"<?xml version="1.0"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL"
      xmlns:xbrli="http://www.xbrl.org/2003/instance">
<body>
<div style="display:none">
<ix:header>
<ix:hidden>
<ix:nonNumeric name="dei:EntityCentralIndexKey" contextRef="C_0000320193_20221001_20221231">0000320193</ix:nonNumeric>
<ix:nonNumeric name="dei:EntityRegistrantName" contextRef="C_0000320193_20221001_20221231">Apple Inc.</ix:nonNumeric>
<ix:nonNumeric name="dei:DocumentPeriodEndDate" contextRef="C_0000320193_20221001_20221231">2022-12-31</ix:nonNumeric>
</ix:hidden>
<ix:resources>
<xbrli:context id="C_0000320193_20221001_20221231">
  <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
  <xbrli:period><xbrli:startDate>2022-10-01</xbrli:startDate><xbrli:endDate>2022-12-31</xbrli:endDate></xbrli:period>
</xbrli:context>
<xbrli:context id="C_0000320193_20221231">
  <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
  <xbrli:period><xbrli:instant>2022-12-31</xbrli:instant></xbrli:period>
</xbrli:context>
<xbrli:unit id="usd"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
</ix:resources>
</ix:header>
</div>
<p>Condensed balance sheet:</p>
<ix:nonFraction name="us-gaap:Assets" contextRef="C_0000320193_20221231" unitRef="usd" decimals="-6">346,747</ix:nonFraction>
<ix:nonFraction name="us-gaap:Liabilities" contextRef="C_0000320193_20221231" unitRef="usd" decimals="-6">290,020</ix:nonFraction>
<ix:nonFraction name="us-gaap:StockholdersEquity" contextRef="C_0000320193_20221231" unitRef="usd" decimals="-6">56,727</ix:nonFraction>
<ix:nonFraction name="us-gaap:NetIncomeLoss" contextRef="C_0000320193_20221001_20221231" unitRef="usd" decimals="-6">29,998</ix:nonFraction>
<ix:nonNumeric name="us-gaap:SignificantAccountingPoliciesTextBlock" contextRef="C_0000320193_20221001_20221231">Summary of significant accounting policies.</ix:nonNumeric>
</body>
</html>"#;

fn descriptor() -> FilingDescriptor {
    FilingDescriptor::new(
        "AAPL",
        "320193",
        FilingType::TenQ,
        "2023-02-03",
        Some("2022-12-31"),
        "https://www.sec.gov/Archives/edgar/data/320193/000032019323000006/aapl-20221231.htm",
        "0000320193-23-000006",
    )
    .unwrap()
}

fn config() -> PipelineConfig {
    PipelineConfig {
        min_artifact_size: 64,
        ..PipelineConfig::default()
    }
}

fn pipeline() -> (Pipeline, Arc<MemoryObjectStore>, Arc<MemoryMetadataStore>) {
    let objects = Arc::new(MemoryObjectStore::new());
    let metadata = Arc::new(MemoryMetadataStore::new());
    let pipeline = Pipeline::new(
        config(),
        Arc::new(FiscalRegistry::builtin()),
        objects.clone(),
        metadata.clone(),
    )
    .unwrap();
    (pipeline, objects, metadata)
}

#[test]
fn fixture_extracts_balanced_filing() {
    let (pipeline, _, _) = pipeline();
    let (filing, _) = pipeline
        .process_document(descriptor(), FIXTURE.as_bytes(), &[], &[])
        .unwrap();

    assert_eq!(filing.contexts.len(), 2);
    assert_eq!(filing.units.len(), 1);
    assert!(filing.facts.len() >= 8);
    // 290,020 + 56,727 == 346,747: no imbalance warning.
    assert!(filing
        .warnings
        .iter()
        .all(|w| w.code != "balance_sheet_imbalance"));
}

#[test]
fn artifacts_are_deterministic_and_optimizer_is_idempotent() {
    let (pipeline, _, _) = pipeline();
    let (filing, hierarchy) = pipeline
        .process_document(descriptor(), FIXTURE.as_bytes(), &[], &[])
        .unwrap();

    let (text_a, llm_a) = pipeline.render_artifacts(&filing, &hierarchy);
    let (text_b, llm_b) = pipeline.render_artifacts(&filing, &hierarchy);
    assert_eq!(text_a, text_b);
    assert_eq!(llm_a, llm_b);

    let optimizer = FileSizeOptimizer::new();
    assert_eq!(optimizer.optimize(&llm_a), llm_a);
}

#[test]
fn artifact_header_carries_registry_fiscal_attribution() {
    let (pipeline, _, _) = pipeline();
    let (filing, hierarchy) = pipeline
        .process_document(descriptor(), FIXTURE.as_bytes(), &[], &[])
        .unwrap();
    let (_, llm) = pipeline.render_artifacts(&filing, &hierarchy);

    assert!(llm.contains("@FISCAL_YEAR: 2023"));
    assert!(llm.contains("@FISCAL_PERIOD: Q1"));
    assert!(llm.contains("@DD_CONTEXTS"));
}

#[tokio::test]
async fn publication_round_trip_passes_verification() {
    let (pipeline, objects, metadata) = pipeline();
    let (filing, hierarchy) = pipeline
        .process_document(descriptor(), FIXTURE.as_bytes(), &[], &[])
        .unwrap();
    let (text, llm) = pipeline.render_artifacts(&filing, &hierarchy);

    let registry = FiscalRegistry::builtin();
    let coordinator = StorageCoordinator::new(config(), objects.clone(), metadata.clone());
    let outcome = coordinator
        .publish(&registry, &filing, &text, &llm, None)
        .await
        .unwrap();

    assert_eq!(outcome.location.document_id, "AAPL_10-Q_2023_Q1");
    assert!(objects
        .paths()
        .await
        .contains(&"companies/AAPL/10-Q/2023/Q1/llm.txt".to_string()));

    use edgar_llm_pipeline::MetadataStore;
    let document = metadata
        .get("AAPL_10-Q_2023_Q1")
        .await
        .unwrap()
        .expect("document present");
    assert_eq!(document.fiscal_year, "2023");
    assert_eq!(document.fiscal_period, "Q1");
    assert_eq!(document.display_period, "FY2023 Q1");
    assert!(document.fiscal_integrity_verified);
    assert_eq!(
        document.llm_file_path.as_deref(),
        Some("companies/AAPL/10-Q/2023/Q1/llm.txt")
    );

    let raw = RawXbrlDump::from_filing(&filing);
    let report = Verifier::new(0.995).verify(&raw, &llm);
    assert_eq!(report.exact_coverage, 1.0);
    assert!(report.passed());
}
