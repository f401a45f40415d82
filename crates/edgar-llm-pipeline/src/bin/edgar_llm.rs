use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edgar_llm_core::{
    FallbackPolicy, FilingDescriptor, FilingType, PipelineConfig, Result,
};
use edgar_llm_pipeline::{
    FiscalRegistry, JsonMetadataStore, LocalObjectStore, Pipeline, RawXbrlDump, Verifier,
};

/// **EDGAR LLM Pipeline CLI**
///
/// Processes discovered SEC filings into LLM-oriented artifacts and
/// publishes them with consistent fiscal metadata.
#[derive(Parser)]
#[command(name = "edgar-llm")]
#[command(about = "SEC filing to LLM artifact pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process filings from a discovery manifest
    Process {
        /// JSON manifest of filing descriptors from the discovery service
        #[arg(short, long)]
        manifest: PathBuf,

        /// Tickers to include (comma-separated; default all)
        #[arg(short, long)]
        tickers: Option<String>,

        /// Filing types to include (comma-separated, e.g. "10-K,10-Q")
        #[arg(short, long)]
        filing_types: Option<String>,

        /// Filing-date year range, "2023" or "2021-2024"
        #[arg(short, long)]
        years: Option<String>,

        /// Worker pool size
        #[arg(long, default_value = "4")]
        max_concurrency: usize,

        /// Fetch cache directory
        #[arg(long, default_value = "fetch_cache")]
        cache_dir: PathBuf,

        /// Object-store bucket name
        #[arg(long, default_value = "edgar-llm")]
        bucket: String,

        /// Cloud project owning the bucket (informational for local runs)
        #[arg(long)]
        project: Option<String>,

        /// Local root directory backing the object store
        #[arg(long, default_value = "objects")]
        output_dir: PathBuf,

        /// Directory backing the filings metadata collection
        #[arg(long, default_value = "metadata")]
        metadata_dir: PathBuf,

        /// Fiscal registry JSON file
        #[arg(long)]
        fiscal_registry: Option<PathBuf>,

        /// SEC fetch rate limit (requests per second)
        #[arg(long, default_value = "10")]
        rate_limit: u32,

        /// User agent, must include a contact email
        #[arg(long, default_value = "edgar-llm/0.1 (data@edgar-llm.dev)")]
        user_agent: String,

        /// Verifier exact-match coverage threshold
        #[arg(long, default_value = "0.995")]
        threshold: f64,

        /// Skip all object-store and metadata writes
        #[arg(long)]
        dry_run: bool,

        /// Overwrite existing objects
        #[arg(long)]
        force: bool,

        /// Refuse placeholder fiscal periods instead of publishing them
        #[arg(long)]
        strict_fiscal: bool,

        /// Publish the raw-XBRL JSON side dump next to the artifacts
        #[arg(long)]
        raw_dump: bool,
    },

    /// Verify an emitted LLM artifact against its raw-XBRL dump
    Verify {
        /// Path to the llm.txt artifact
        #[arg(short, long)]
        llm_file: PathBuf,

        /// Path to the raw-XBRL JSON dump
        #[arg(short, long)]
        xbrl_file: PathBuf,

        /// Exact-match coverage threshold
        #[arg(short, long, default_value = "0.995")]
        threshold: f64,
    },

    /// Look up or extend the fiscal registry
    Fiscal {
        /// Company ticker symbol
        #[arg(short, long)]
        ticker: String,

        /// Period end date, any accepted format
        #[arg(short, long)]
        date: String,

        /// Filing type context for the lookup
        #[arg(short, long)]
        filing_type: Option<String>,

        /// Fiscal registry JSON file
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Add a mapping: fiscal year (requires --add-period and --registry)
        #[arg(long)]
        add_year: Option<String>,

        /// Add a mapping: fiscal period (Q1..Q4 or annual)
        #[arg(long)]
        add_period: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edgar_llm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Process {
            manifest,
            tickers,
            filing_types,
            years,
            max_concurrency,
            cache_dir,
            bucket,
            project,
            output_dir,
            metadata_dir,
            fiscal_registry,
            rate_limit,
            user_agent,
            threshold,
            dry_run,
            force,
            strict_fiscal,
            raw_dump,
        } => {
            let config = PipelineConfig {
                requests_per_second: rate_limit,
                completeness_threshold: threshold,
                bucket,
                fiscal_registry_path: fiscal_registry.clone(),
                fallback_policy: if strict_fiscal {
                    FallbackPolicy::Strict
                } else {
                    FallbackPolicy::Permissive
                },
                max_concurrency,
                cache_dir,
                user_agent,
                dry_run,
                force_upload: force,
                raw_dump,
                ..PipelineConfig::default()
            };
            if let Some(project) = &project {
                info!(%project, bucket = %config.bucket, "publishing to configured bucket");
            }
            process_command(
                config,
                manifest,
                tickers,
                filing_types,
                years,
                output_dir,
                metadata_dir,
                fiscal_registry,
            )
            .await
        }
        Commands::Verify {
            llm_file,
            xbrl_file,
            threshold,
        } => verify_command(llm_file, xbrl_file, threshold),
        Commands::Fiscal {
            ticker,
            date,
            filing_type,
            registry,
            add_year,
            add_period,
        } => fiscal_command(ticker, date, filing_type, registry, add_year, add_period),
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_command(
    config: PipelineConfig,
    manifest: PathBuf,
    tickers: Option<String>,
    filing_types: Option<String>,
    years: Option<String>,
    output_dir: PathBuf,
    metadata_dir: PathBuf,
    fiscal_registry: Option<PathBuf>,
) -> Result<i32> {
    let filings = load_manifest(&manifest)?;
    let filings = filter_filings(filings, tickers, filing_types, years)?;
    if filings.is_empty() {
        println!("no filings matched the filters");
        return Ok(0);
    }
    info!(filings = filings.len(), "starting run");

    let registry = Arc::new(FiscalRegistry::new(fiscal_registry)?);
    let object_store = Arc::new(LocalObjectStore::new(output_dir.join(&config.bucket)));
    let metadata_store = Arc::new(JsonMetadataStore::new(metadata_dir));
    let pipeline = Pipeline::new(config, registry, object_store, metadata_store)?;

    let report = pipeline.run(filings).await;
    print!("{}", report.render());
    Ok(if report.all_passed() { 0 } else { 1 })
}

fn load_manifest(path: &PathBuf) -> Result<Vec<FilingDescriptor>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn filter_filings(
    filings: Vec<FilingDescriptor>,
    tickers: Option<String>,
    filing_types: Option<String>,
    years: Option<String>,
) -> Result<Vec<FilingDescriptor>> {
    let tickers: Option<Vec<String>> = tickers.map(|list| {
        list.split(',')
            .map(|t| t.trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect()
    });
    let filing_types: Option<Vec<FilingType>> = filing_types
        .map(|list| {
            list.split(',')
                .map(|t| t.trim().parse::<FilingType>())
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;
    let year_range = years.map(|range| parse_year_range(&range)).transpose()?;

    Ok(filings
        .into_iter()
        .filter(|filing| {
            if let Some(tickers) = &tickers {
                if !tickers.contains(&filing.ticker) {
                    return false;
                }
            }
            if let Some(types) = &filing_types {
                if !types.contains(&filing.filing_type) {
                    return false;
                }
            }
            if let Some((from, to)) = year_range {
                let year: i32 = filing
                    .filing_date
                    .chars()
                    .take(4)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0);
                if year < from || year > to {
                    return false;
                }
            }
            true
        })
        .collect())
}

fn parse_year_range(range: &str) -> Result<(i32, i32)> {
    use edgar_llm_core::PipelineError;
    let parse = |s: &str| -> Result<i32> {
        s.trim()
            .parse::<i32>()
            .map_err(|_| PipelineError::Config(format!("invalid year: {s}")))
    };
    match range.split_once('-') {
        Some((from, to)) => Ok((parse(from)?, parse(to)?)),
        None => {
            let year = parse(range)?;
            Ok((year, year))
        }
    }
}

fn verify_command(llm_file: PathBuf, xbrl_file: PathBuf, threshold: f64) -> Result<i32> {
    let artifact = std::fs::read_to_string(&llm_file)?;
    let dump = RawXbrlDump::from_json(&std::fs::read(&xbrl_file)?)?;

    let report = Verifier::new(threshold).verify(&dump, &artifact);
    println!("Verification results:");
    println!("  Raw tuples: {}", report.raw_tuples);
    println!(
        "  Exact coverage: {:.3}% ({} matches)",
        report.exact_coverage * 100.0,
        report.exact_matches
    );
    println!(
        "  Concept-name coverage: {:.3}% ({} matches)",
        report.name_coverage * 100.0,
        report.name_matches
    );
    if !report.mismatch_samples.is_empty() {
        println!("  Sample mismatches:");
        for sample in &report.mismatch_samples {
            println!("    - {sample}");
        }
    }
    println!("  Result: {}", if report.passed() { "PASS" } else { "FAIL" });
    Ok(if report.passed() { 0 } else { 1 })
}

fn fiscal_command(
    ticker: String,
    date: String,
    filing_type: Option<String>,
    registry_path: Option<PathBuf>,
    add_year: Option<String>,
    add_period: Option<String>,
) -> Result<i32> {
    let filing_type = filing_type
        .map(|t| t.parse::<FilingType>())
        .transpose()?;

    if let (Some(year), Some(period)) = (&add_year, &add_period) {
        let mut registry = FiscalRegistry::new(registry_path)?;
        registry.add_mapping(&ticker, &date, year, period.parse()?)?;
        println!("added mapping: {ticker} {date} -> FY{year} {period}");
        return Ok(0);
    }

    let registry = FiscalRegistry::new(registry_path)?;
    match registry.determine(&ticker, &date, filing_type) {
        Ok(info) => {
            println!("Fiscal determination for {}:", info.ticker());
            println!("  Period end date: {}", info.period_end_date());
            println!("  Fiscal year: {}", info.fiscal_year());
            println!("  Fiscal period: {}", info.fiscal_period());
            println!("  Display period: {}", info.display_period());
            println!("  Source: {} (confidence {})", info.source(), info.confidence());
            Ok(0)
        }
        Err(e) => {
            println!("lookup failed: {e}");
            Ok(1)
        }
    }
}
