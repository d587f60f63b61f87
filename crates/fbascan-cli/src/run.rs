//! The `run` command: one supplier through the whole pipeline.
//!
//! Report rows go to stdout as JSON lines; logs go to stderr.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use fbascan_analysis::{CurrencyConverter, HttpRateSource};
use fbascan_core::{AppConfig, ConfigStore, RunConfig};
use fbascan_db::{BackendStore, LinkingMap, SnapshotCache};
use fbascan_pipeline::{CachedCatalog, PipelineOrchestrator, RunReport, SnapshotCatalog};
use fbascan_scraper::{HttpTransport, RetryPolicy};

use crate::RunArgs;

/// Applies command-line overrides on top of the file-based run config.
pub(crate) fn apply_overrides(run: &RunConfig, args: &RunArgs) -> RunConfig {
    let mut run = run.clone();
    if let Some(n) = args.max_analyzed {
        run.max_analyzed_products = n;
    }
    if let Some(n) = args.max_per_category {
        run.max_products_per_category = n;
    }
    if args.bypass_parsing {
        run.bypass_specialized_parsing = true;
    }
    run
}

pub(crate) fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.fetch_max_attempts,
        Duration::from_millis(config.fetch_backoff_base_ms),
        Duration::from_millis(config.fetch_backoff_cap_ms),
    )
}

/// # Errors
///
/// Returns an error if configuration is invalid, the linking map or catalog
/// cannot be opened, or the run fails while preparing. Per-product failures
/// are counted in the report, not propagated.
pub(crate) async fn run_supplier(config: &AppConfig, args: RunArgs) -> anyhow::Result<()> {
    let store = ConfigStore::load(config)?;
    let store = store.with_run_config(apply_overrides(&store.run, &args))?;

    let snapshots = SnapshotCache::new(
        config.snapshot_dir(),
        Duration::from_secs(config.snapshot_max_age_secs),
    );
    let catalog_dir = config.catalog_dir();
    let catalog = SnapshotCatalog::load_dir(&catalog_dir)
        .await
        .with_context(|| format!("failed to load catalog from {}", catalog_dir.display()))?;
    let catalog = CachedCatalog::new(catalog, snapshots.clone());

    let backend = BackendStore::open(config)
        .await
        .context("failed to open linking map store")?;
    let linking = Arc::new(LinkingMap::open(backend).await?);

    let transport = HttpTransport::new(config.fetch_timeout_secs, &config.user_agent)?;
    let rates = HttpRateSource::new(&config.rates_url, config.fetch_timeout_secs)?;
    let converter = Arc::new(CurrencyConverter::new(
        rates,
        Duration::from_secs(config.rates_refresh_secs),
    ));

    let orchestrator =
        PipelineOrchestrator::new(Arc::new(store), transport, catalog, linking, snapshots)
            .with_retry_policy(retry_policy(config))
            .with_converter(converter);

    let report = orchestrator.run(&args.supplier).await?;
    print_report(&report)?;

    if let Some(path) = &args.report {
        let json = serde_json::to_vec_pretty(&report)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    tracing::info!(
        run_id = %report.run_id,
        supplier = %report.supplier_id,
        results = report.results.len(),
        analyzed = report.analyzed(),
        unparsed = report.unparsed.len(),
        skipped = report.tally.total(),
        "run complete"
    );
    Ok(())
}

fn print_report(report: &RunReport) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for row in report.rows() {
        serde_json::to_writer(&mut out, &row)?;
        writeln!(out)?;
    }
    for item in &report.unparsed {
        serde_json::to_writer(&mut out, item)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
