//! Per-run settings read from the `system:` section of `system.yaml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Cache handling applied in the `Preparing` stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "RawCachePolicy", into = "RawCachePolicy")]
pub enum CachePolicy {
    /// Reuse whatever snapshots are on disk (subject to staleness).
    #[default]
    Keep,
    /// Remove every cached snapshot before the run starts.
    ClearAll,
    /// Remove only the listed snapshot namespaces (e.g. `supplier`).
    Selective(Vec<String>),
}

/// Accepts either `clear_cache: true|false` or `clear_cache: { selective: [...] }`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawCachePolicy {
    Flag(bool),
    Selective { selective: Vec<String> },
}

impl From<RawCachePolicy> for CachePolicy {
    fn from(raw: RawCachePolicy) -> Self {
        match raw {
            RawCachePolicy::Flag(false) => CachePolicy::Keep,
            RawCachePolicy::Flag(true) => CachePolicy::ClearAll,
            RawCachePolicy::Selective { selective } => CachePolicy::Selective(selective),
        }
    }
}

impl From<CachePolicy> for RawCachePolicy {
    fn from(policy: CachePolicy) -> Self {
        match policy {
            CachePolicy::Keep => RawCachePolicy::Flag(false),
            CachePolicy::ClearAll => RawCachePolicy::Flag(true),
            CachePolicy::Selective(selective) => RawCachePolicy::Selective { selective },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Items pulled per supplier category before that category stops.
    #[serde(default = "default_max_products_per_category")]
    pub max_products_per_category: usize,
    /// Global cap on items admitted to the analysis stage.
    #[serde(default = "default_max_analyzed_products")]
    pub max_analyzed_products: usize,
    /// Skip field extraction and emit raw item nodes marked as unparsed.
    #[serde(default)]
    pub bypass_specialized_parsing: bool,
    #[serde(default, rename = "clear_cache", alias = "clear_cache_before_run")]
    pub cache_policy: CachePolicy,
    #[serde(default = "default_true")]
    pub enable_currency_conversion: bool,
    /// Upper bound on supplier items processed concurrently.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Re-query the catalog for already-linked products and upgrade the
    /// linking-map entry when a strictly more confident match turns up.
    #[serde(default)]
    pub rematch_existing: bool,
}

fn default_max_products_per_category() -> usize {
    50
}

fn default_max_analyzed_products() -> usize {
    100
}

fn default_max_in_flight() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_products_per_category: default_max_products_per_category(),
            max_analyzed_products: default_max_analyzed_products(),
            bypass_specialized_parsing: false,
            cache_policy: CachePolicy::Keep,
            enable_currency_conversion: true,
            max_in_flight: default_max_in_flight(),
            rematch_existing: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SystemFile {
    system: RunConfig,
}

/// Load and validate the `system:` section of a system config file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_run_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let file: SystemFile = crate::read_yaml(path)?;
    file.system.validate()?;
    Ok(file.system)
}

impl RunConfig {
    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_products_per_category == 0 {
            return Err(ConfigError::Validation(
                "max_products_per_category must be at least 1".to_string(),
            ));
        }
        if self.max_analyzed_products == 0 {
            return Err(ConfigError::Validation(
                "max_analyzed_products must be at least 1".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Validation(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        if let CachePolicy::Selective(namespaces) = &self.cache_policy {
            for ns in namespaces {
                if ns.trim().is_empty() || ns.contains(['/', '\\']) || ns.contains("..") {
                    return Err(ConfigError::Validation(format!(
                        "invalid cache namespace '{ns}'"
                    )));
                }
            }
        }
        Ok(())
    }
}
