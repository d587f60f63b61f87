pub mod app_config;
pub mod catalog;
pub mod config;
pub mod fees;
pub mod products;
pub mod run_config;
pub mod store;
pub mod suppliers;

pub use app_config::{AppConfig, Environment, LinkingBackend};
pub use catalog::{parse_count, parse_monthly_sales_badge, CatalogProduct, CatalogRecord};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use fees::{FeeSchedule, SizeTier};
pub use products::{AnalysisResult, ProductKey, ReportRow, SupplierProduct};
pub use run_config::{load_run_config, CachePolicy, RunConfig};
pub use store::ConfigStore;
pub use suppliers::{
    load_suppliers, CategoryConfig, ExtractionRule, FieldKind, FieldSpec, RateLimitConfig,
    SupplierConfig, SuppliersFile, MAX_RATE_WINDOW_SECS,
};

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// Every variant is fatal for a run: the orchestrator refuses to admit work
/// when any configuration source fails to load.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for env var {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config validation failed: {0}")]
    Validation(String),

    #[error("unknown supplier: {0}")]
    UnknownSupplier(String),
}

/// Read a YAML file from disk and deserialize it, mapping failures to
/// [`ConfigError`] with the offending path attached.
pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(
    path: &std::path::Path,
) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse {
        path: path.display().to_string(),
        source: e,
    })
}
