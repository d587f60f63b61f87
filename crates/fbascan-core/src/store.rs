//! One immutable bundle of every configuration source a run reads.

use std::path::PathBuf;

use crate::{
    load_run_config, load_suppliers, AppConfig, ConfigError, FeeSchedule, RunConfig,
    SupplierConfig, SuppliersFile,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourcePaths {
    system: PathBuf,
    suppliers: PathBuf,
    fee_schedule: Option<PathBuf>,
}

/// Run settings, supplier extraction configs and the fee schedule, loaded
/// together at startup. Components borrow it; nothing mutates it. Call
/// [`ConfigStore::reload`] to obtain a fresh store from the same files.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    paths: SourcePaths,
    pub run: RunConfig,
    pub suppliers: SuppliersFile,
    pub fees: FeeSchedule,
}

impl ConfigStore {
    /// Load every source named by `app`. The built-in fee schedule is used
    /// when `app.fee_schedule_path` is unset.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] raised by any source.
    pub fn load(app: &AppConfig) -> Result<Self, ConfigError> {
        Self::load_paths(SourcePaths {
            system: app.system_config_path.clone(),
            suppliers: app.suppliers_path.clone(),
            fee_schedule: app.fee_schedule_path.clone(),
        })
    }

    fn load_paths(paths: SourcePaths) -> Result<Self, ConfigError> {
        let run = load_run_config(&paths.system)?;
        let suppliers = load_suppliers(&paths.suppliers)?;
        let fees = match &paths.fee_schedule {
            Some(path) => FeeSchedule::load(path)?,
            None => FeeSchedule::default(),
        };

        tracing::debug!(
            suppliers = suppliers.suppliers.len(),
            fee_currency = %fees.currency,
            "configuration loaded"
        );

        Ok(Self {
            paths,
            run,
            suppliers,
            fees,
        })
    }

    /// Re-read the files this store was loaded from. `self` is untouched, so
    /// a failed reload leaves the caller with its previous configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] raised by any source.
    pub fn reload(&self) -> Result<Self, ConfigError> {
        Self::load_paths(self.paths.clone())
    }

    /// Returns a copy of this store with `run` replaced, e.g. after applying
    /// command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when `run` is out of range.
    pub fn with_run_config(&self, run: RunConfig) -> Result<Self, ConfigError> {
        run.validate()?;
        Ok(Self {
            run,
            ..self.clone()
        })
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSupplier`] when no supplier has `id`.
    pub fn supplier(&self, id: &str) -> Result<&SupplierConfig, ConfigError> {
        self.suppliers
            .get(id)
            .ok_or_else(|| ConfigError::UnknownSupplier(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUPPLIERS: &str = r#"
suppliers:
  - id: poundwholesale
    fields:
      title: { type: text, required: true, rules: [".name"] }
      price: { type: price, required: true, rules: [".price"] }
"#;

    fn write_sources(dir: &std::path::Path, max_analyzed: usize) -> SourcePaths {
        let system = dir.join("system.yaml");
        let suppliers = dir.join("suppliers.yaml");
        std::fs::write(
            &system,
            format!("system:\n  max_analyzed_products: {max_analyzed}\n"),
        )
        .unwrap();
        std::fs::write(&suppliers, SUPPLIERS).unwrap();
        SourcePaths {
            system,
            suppliers,
            fee_schedule: None,
        }
    }

    #[test]
    fn load_bundles_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load_paths(write_sources(dir.path(), 9)).unwrap();
        assert_eq!(store.run.max_analyzed_products, 9);
        assert_eq!(store.fees, FeeSchedule::default());
        assert_eq!(store.supplier("poundwholesale").unwrap().currency, "GBP");
    }

    #[test]
    fn unknown_supplier_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load_paths(write_sources(dir.path(), 9)).unwrap();
        let err = store.supplier("nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSupplier(ref id) if id == "nope"));
    }

    #[test]
    fn reload_picks_up_file_changes_without_mutating_original() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load_paths(write_sources(dir.path(), 9)).unwrap();
        write_sources(dir.path(), 3);

        let reloaded = store.reload().unwrap();
        assert_eq!(reloaded.run.max_analyzed_products, 3);
        assert_eq!(store.run.max_analyzed_products, 9);
    }

    #[test]
    fn failed_reload_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_sources(dir.path(), 9);
        let store = ConfigStore::load_paths(paths.clone()).unwrap();
        std::fs::write(&paths.system, "system:\n  max_analyzed_products: 0\n").unwrap();
        assert!(store.reload().is_err());
    }

    #[test]
    fn with_run_config_validates_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load_paths(write_sources(dir.path(), 9)).unwrap();
        let bad = RunConfig {
            max_in_flight: 0,
            ..store.run.clone()
        };
        assert!(store.with_run_config(bad).is_err());
    }
}
