use fbascan_core::ConfigError;
use fbascan_db::SnapshotError;
use fbascan_scraper::ExtractError;
use thiserror::Error;

/// Fatal run errors. Everything per-product is contained and tallied instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Extractor(#[from] ExtractError),

    #[error("failed to apply cache policy: {0}")]
    Cache(#[from] SnapshotError),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog file {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
