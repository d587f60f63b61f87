use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Where the linking map is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkingBackend {
    /// A single JSON array file under the data directory.
    Json,
    /// The `linking_map` table in Postgres.
    Postgres,
}

impl std::fmt::Display for LinkingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkingBackend::Json => write!(f, "json"),
            LinkingBackend::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub system_config_path: PathBuf,
    pub suppliers_path: PathBuf,
    pub fee_schedule_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub linking_backend: LinkingBackend,
    /// Only required when `linking_backend` is [`LinkingBackend::Postgres`].
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub fetch_max_attempts: u32,
    pub fetch_backoff_base_ms: u64,
    pub fetch_backoff_cap_ms: u64,
    pub rates_url: String,
    pub rates_refresh_secs: u64,
    pub snapshot_max_age_secs: u64,
}

impl AppConfig {
    /// Path of the JSON linking-map file used by the `json` backend.
    #[must_use]
    pub fn linking_map_path(&self) -> PathBuf {
        self.data_dir.join("linking_map").join("linking_map.json")
    }

    /// Directory of exported catalog records read by `SnapshotCatalog`.
    #[must_use]
    pub fn catalog_dir(&self) -> PathBuf {
        self.data_dir.join("catalog")
    }

    /// Root directory for cached supplier and catalog snapshots.
    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("system_config_path", &self.system_config_path)
            .field("suppliers_path", &self.suppliers_path)
            .field("fee_schedule_path", &self.fee_schedule_path)
            .field("data_dir", &self.data_dir)
            .field("linking_backend", &self.linking_backend)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("fetch_max_attempts", &self.fetch_max_attempts)
            .field("fetch_backoff_base_ms", &self.fetch_backoff_base_ms)
            .field("fetch_backoff_cap_ms", &self.fetch_backoff_cap_ms)
            .field("rates_url", &self.rates_url)
            .field("rates_refresh_secs", &self.rates_refresh_secs)
            .field("snapshot_max_age_secs", &self.snapshot_max_age_secs)
            .finish()
    }
}
