//! The reference-catalog seam.
//!
//! [`SnapshotCatalog`] serves records exported to disk as JSON.
//! [`CachedCatalog`] puts the snapshot cache in front of any other source so
//! fresh lookups are reused across runs.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use fbascan_core::{CatalogProduct, CatalogRecord, ProductKey, SupplierProduct};
use fbascan_db::{SnapshotCache, CATALOG_NAMESPACE};

use crate::error::CatalogError;

pub trait CatalogSource: Send + Sync {
    /// The record for a known catalog identifier.
    fn by_identifier(
        &self,
        catalog_id: &str,
    ) -> impl Future<Output = Result<Option<CatalogProduct>, CatalogError>> + Send;

    /// The best catalog candidate for a supplier product, if any.
    fn find_match(
        &self,
        product: &SupplierProduct,
    ) -> impl Future<Output = Result<Option<CatalogProduct>, CatalogError>> + Send;
}

/// In-memory catalog indexed by identifier and EAN. Matches by EAN only.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCatalog {
    by_asin: HashMap<String, CatalogProduct>,
    asin_by_ean: HashMap<String, String>,
}

impl SnapshotCatalog {
    /// Later products with the same identifier replace earlier ones.
    #[must_use]
    pub fn from_products(products: impl IntoIterator<Item = CatalogProduct>) -> Self {
        let mut catalog = Self::default();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    /// Loads every `*.json` file in `dir`. Each file holds one catalog
    /// record or an array of them. A missing directory is an empty catalog.
    /// Records that do not fit the catalog shape are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the directory or a file cannot be read
    /// or a file is not valid JSON.
    pub async fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let io_err = |source| CatalogError::Io {
            path: dir.display().to_string(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir.display(), "catalog directory missing, catalog is empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(io_err(e)),
        };

        let mut catalog = Self::default();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|source| CatalogError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            let value: serde_json::Value =
                serde_json::from_slice(&bytes).map_err(|source| CatalogError::Corrupt {
                    path: path.display().to_string(),
                    source,
                })?;
            let values = match value {
                serde_json::Value::Array(values) => values,
                other => vec![other],
            };
            for (position, value) in values.into_iter().enumerate() {
                match serde_json::from_value::<CatalogRecord>(value) {
                    Ok(record) => catalog.insert(record.into_product()),
                    Err(error) => tracing::warn!(
                        path = %path.display(),
                        position,
                        error = %error,
                        "skipping unreadable catalog record"
                    ),
                }
            }
        }

        tracing::debug!(dir = %dir.display(), records = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    pub fn insert(&mut self, product: CatalogProduct) {
        if let Some(ean) = product.ean.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            self.asin_by_ean.insert(ean.to_owned(), product.asin.clone());
        }
        self.by_asin.insert(product.asin.clone(), product);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_asin.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_asin.is_empty()
    }
}

impl CatalogSource for SnapshotCatalog {
    async fn by_identifier(&self, catalog_id: &str) -> Result<Option<CatalogProduct>, CatalogError> {
        Ok(self.by_asin.get(catalog_id).cloned())
    }

    async fn find_match(
        &self,
        product: &SupplierProduct,
    ) -> Result<Option<CatalogProduct>, CatalogError> {
        let Some(ean) = product.ean.as_deref() else {
            return Ok(None);
        };
        Ok(self
            .asin_by_ean
            .get(ean.trim())
            .and_then(|asin| self.by_asin.get(asin))
            .cloned())
    }
}

/// Serves fresh snapshots from disk and falls through to `inner` on a
/// miss, storing what it returns. Misses on `inner` are not cached.
#[derive(Debug)]
pub struct CachedCatalog<C> {
    inner: C,
    snapshots: SnapshotCache,
}

impl<C: CatalogSource> CachedCatalog<C> {
    #[must_use]
    pub fn new(inner: C, snapshots: SnapshotCache) -> Self {
        Self { inner, snapshots }
    }

    async fn cached(&self, key: &str) -> Option<CatalogProduct> {
        match self.snapshots.get::<CatalogProduct>(CATALOG_NAMESPACE, key).await {
            Ok(hit) => hit.map(|snapshot| snapshot.data),
            Err(e) => {
                tracing::warn!(key, error = %e, "catalog snapshot lookup failed");
                None
            }
        }
    }

    async fn store(&self, key: &str, product: &CatalogProduct) {
        if let Err(e) = self.snapshots.put(CATALOG_NAMESPACE, key, product).await {
            tracing::warn!(key, error = %e, "failed to cache catalog record");
        }
    }
}

impl<C: CatalogSource> CatalogSource for CachedCatalog<C> {
    async fn by_identifier(&self, catalog_id: &str) -> Result<Option<CatalogProduct>, CatalogError> {
        if let Some(hit) = self.cached(catalog_id).await {
            return Ok(Some(hit));
        }
        let found = self.inner.by_identifier(catalog_id).await?;
        if let Some(product) = &found {
            self.store(catalog_id, product).await;
        }
        Ok(found)
    }

    async fn find_match(
        &self,
        product: &SupplierProduct,
    ) -> Result<Option<CatalogProduct>, CatalogError> {
        let key = ProductKey::derive(product);
        if let Some(key) = &key {
            if let Some(hit) = self.cached(key.as_str()).await {
                return Ok(Some(hit));
            }
        }
        let found = self.inner.find_match(product).await?;
        if let (Some(key), Some(found)) = (&key, &found) {
            self.store(key.as_str(), found).await;
            self.store(&found.asin, found).await;
        }
        Ok(found)
    }
}
