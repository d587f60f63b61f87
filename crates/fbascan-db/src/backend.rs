//! Runtime choice between the linking-map stores.

use fbascan_core::{AppConfig, LinkingBackend};

use crate::json_store::JsonFileStore;
use crate::linking_map::{LinkingMapEntry, LinkingMapError, LinkingStore};
use crate::pg_store::PgLinkingStore;
use crate::{connect_pool_from_config, run_migrations, DbError};

/// The store selected by `FBASCAN_LINKING_BACKEND`.
#[derive(Debug)]
pub enum BackendStore {
    Json(JsonFileStore),
    Postgres(PgLinkingStore),
}

impl BackendStore {
    /// Opens the configured store. The Postgres backend connects and
    /// applies pending migrations first.
    ///
    /// # Errors
    ///
    /// Returns [`LinkingMapError`] if the JSON file is unreadable, or if the
    /// database is unreachable or its migrations fail.
    pub async fn open(config: &AppConfig) -> Result<Self, LinkingMapError> {
        match config.linking_backend {
            LinkingBackend::Json => {
                let path = config.linking_map_path();
                tracing::debug!(path = %path.display(), "opening JSON linking map");
                Ok(Self::Json(JsonFileStore::open(path).await?))
            }
            LinkingBackend::Postgres => {
                let pool = connect_pool_from_config(config).await?;
                let applied = run_migrations(&pool).await.map_err(DbError::from)?;
                tracing::debug!(applied, "linking map migrations applied");
                Ok(Self::Postgres(PgLinkingStore::new(pool)))
            }
        }
    }
}

impl LinkingStore for BackendStore {
    async fn load_all(&self) -> Result<Vec<LinkingMapEntry>, LinkingMapError> {
        match self {
            Self::Json(store) => store.load_all().await,
            Self::Postgres(store) => store.load_all().await,
        }
    }

    async fn insert(&self, entry: &LinkingMapEntry) -> Result<bool, LinkingMapError> {
        match self {
            Self::Json(store) => store.insert(entry).await,
            Self::Postgres(store) => store.insert(entry).await,
        }
    }

    async fn replace(&self, entry: &LinkingMapEntry) -> Result<(), LinkingMapError> {
        match self {
            Self::Json(store) => store.replace(entry).await,
            Self::Postgres(store) => store.replace(entry).await,
        }
    }
}
