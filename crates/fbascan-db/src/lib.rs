use thiserror::Error;

pub mod backend;
mod fs_util;
pub mod json_store;
pub mod linking_map;
pub mod pg_store;
pub mod pool;
pub mod snapshot;

pub use backend::BackendStore;
pub use json_store::JsonFileStore;
pub use linking_map::{
    LinkingMap, LinkingMapEntry, LinkingMapError, LinkingStats, LinkingStore, RegisterOutcome,
    UpgradeOutcome,
};
pub use pg_store::PgLinkingStore;
pub use pool::{connect_pool, connect_pool_from_config, run_migrations, PoolConfig};
pub use snapshot::{Snapshot, SnapshotCache, SnapshotError, CATALOG_NAMESPACE, SUPPLIER_NAMESPACE};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}
