use clap::Subcommand;
use fbascan_core::{AppConfig, ProductKey};
use fbascan_db::{BackendStore, LinkingMap};

#[derive(Debug, Subcommand)]
pub enum LinkingMapCommands {
    /// Entry counts by key kind
    Stats,
    /// Print entries as JSON lines, or one entry by supplier product key
    Show {
        /// A key such as `EAN_5012345678900`
        #[arg(long)]
        key: Option<String>,
    },
}

pub(crate) async fn run_linking_map(
    config: &AppConfig,
    command: LinkingMapCommands,
) -> anyhow::Result<()> {
    let map = LinkingMap::open(BackendStore::open(config).await?).await?;
    match command {
        LinkingMapCommands::Stats => {
            let stats = map.stats();
            println!(
                "backend={} total={} ean_keyed={} url_keyed={}",
                config.linking_backend, stats.total, stats.ean_keyed, stats.url_keyed
            );
        }
        LinkingMapCommands::Show { key: Some(key) } => {
            let key = ProductKey::from_raw(key);
            let entry = map
                .entry(&key)
                .ok_or_else(|| anyhow::anyhow!("no linking map entry for '{key}'"))?;
            println!("{}", serde_json::to_string(&entry)?);
        }
        LinkingMapCommands::Show { key: None } => {
            for entry in map.entries() {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
    }
    Ok(())
}
