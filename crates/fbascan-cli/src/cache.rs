use std::time::Duration;

use clap::Subcommand;
use fbascan_core::AppConfig;
use fbascan_db::SnapshotCache;

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Remove cached snapshots
    Clear {
        /// Clear only these namespaces (e.g. `supplier`, `catalog`); all when omitted
        #[arg(long = "namespace")]
        namespaces: Vec<String>,
    },
}

pub(crate) async fn run_cache(config: &AppConfig, command: CacheCommands) -> anyhow::Result<()> {
    let cache = SnapshotCache::new(
        config.snapshot_dir(),
        Duration::from_secs(config.snapshot_max_age_secs),
    );
    match command {
        CacheCommands::Clear { namespaces } if namespaces.is_empty() => {
            let removed = cache.clear_all().await?;
            println!("cleared {removed} cache namespaces under {}", cache.root().display());
        }
        CacheCommands::Clear { namespaces } => {
            let removed = cache.clear_namespaces(&namespaces).await?;
            println!("cleared {removed} of [{}]", namespaces.join(", "));
        }
    }
    Ok(())
}
