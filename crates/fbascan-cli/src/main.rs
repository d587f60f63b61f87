use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cache;
mod linking;
mod run;

use cache::CacheCommands;
use linking::LinkingMapCommands;

#[derive(Debug, Parser)]
#[command(name = "fbascan")]
#[command(about = "Supplier catalog scanner and FBA profitability analyzer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan one supplier and print a JSON line per matched product
    Run(RunArgs),
    /// Inspect the supplier-to-catalog linking map
    LinkingMap {
        #[command(subcommand)]
        command: LinkingMapCommands,
    },
    /// Manage on-disk snapshots
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Validate configuration files
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Supplier id from the suppliers file
    #[arg(long)]
    supplier: String,

    /// Override `max_analyzed_products`
    #[arg(long)]
    max_analyzed: Option<usize>,

    /// Override `max_products_per_category`
    #[arg(long)]
    max_per_category: Option<usize>,

    /// Emit raw item nodes without field extraction or analysis
    #[arg(long)]
    bypass_parsing: bool,

    /// Also write the full run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Load every configuration source and report what was found
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let config = fbascan_core::load_app_config().context("invalid environment configuration")?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Run(args)) => run::run_supplier(&config, args).await?,
        Some(Commands::LinkingMap { command }) => linking::run_linking_map(&config, command).await?,
        Some(Commands::Cache { command }) => cache::run_cache(&config, command).await?,
        Some(Commands::Config {
            command: ConfigCommands::Check,
        }) => check_config(&config)?,
        None => println!("fbascan ready; see `fbascan --help`"),
    }

    Ok(())
}

fn check_config(config: &fbascan_core::AppConfig) -> anyhow::Result<()> {
    let store = fbascan_core::ConfigStore::load(config)?;
    println!(
        "env={} linking_backend={} data_dir={}",
        config.env,
        config.linking_backend,
        config.data_dir.display()
    );
    println!(
        "run: max_analyzed_products={} max_products_per_category={} max_in_flight={} bypass={} conversion={} rematch={}",
        store.run.max_analyzed_products,
        store.run.max_products_per_category,
        store.run.max_in_flight,
        store.run.bypass_specialized_parsing,
        store.run.enable_currency_conversion,
        store.run.rematch_existing,
    );
    println!(
        "fees: currency={} tiers={}",
        store.fees.currency,
        store.fees.size_tiers.len()
    );
    for supplier in &store.suppliers.suppliers {
        // Compiles every selector and regex.
        fbascan_scraper::FieldExtractor::new(supplier)
            .with_context(|| format!("supplier '{}' has an unusable extraction rule", supplier.id))?;
        let urls: usize = supplier.categories.iter().map(|c| c.urls.len()).sum();
        println!(
            "supplier {}: currency={} fields={} categories={} urls={urls}",
            supplier.id,
            supplier.currency,
            supplier.fields.len(),
            supplier.categories.len(),
        );
    }
    Ok(())
}
