//! Persistent, deduplicated supplier-product → catalog-entry map.
//!
//! The map holds at most one entry per [`ProductKey`]. The first
//! registration wins; later registrations for the same key are ignored.
//! The only way to change an entry is [`LinkingMap::upgrade`], which
//! replaces it when the new match is strictly more confident and records
//! the catalog id it replaced.
//!
//! Every write reaches the durable [`LinkingStore`] before the in-memory
//! index changes, so a reported success survives a crash. Writes for one
//! key are serialized by a per-key lock; different keys proceed in
//! parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use fbascan_core::ProductKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::DbError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkingMapEntry {
    pub supplier_product_identifier: ProductKey,
    #[serde(rename = "chosen_amazon_asin", alias = "chosen_catalog_identifier")]
    pub chosen_catalog_identifier: String,
    /// Confidence score of the match when it was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_at: Option<DateTime<Utc>>,
    /// Catalog id this entry pointed at before its last upgrade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_catalog_identifier: Option<String>,
    /// Keys written by other tools, carried through rewrites untouched.
    #[serde(flatten, default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Error)]
pub enum LinkingMapError {
    #[error("linking map I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("linking map {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The store refused an insert as a duplicate but has no entry for the key.
    #[error("linking store refused {key} as a duplicate but holds no entry for it")]
    Inconsistent { key: String },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for LinkingMapError {
    fn from(e: sqlx::Error) -> Self {
        LinkingMapError::Db(DbError::Sqlx(e))
    }
}

/// Durable backing store for a [`LinkingMap`].
pub trait LinkingStore: Send + Sync {
    /// Every persisted entry, in insertion order.
    fn load_all(&self) -> impl Future<Output = Result<Vec<LinkingMapEntry>, LinkingMapError>> + Send;

    /// Persists `entry` unless its key already exists. Returns `false` when
    /// the key was already present. Durable once it returns `Ok`.
    fn insert(
        &self,
        entry: &LinkingMapEntry,
    ) -> impl Future<Output = Result<bool, LinkingMapError>> + Send;

    /// Overwrites the entry with the same key. Durable once it returns `Ok`.
    fn replace(
        &self,
        entry: &LinkingMapEntry,
    ) -> impl Future<Output = Result<(), LinkingMapError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// The key was already linked; the existing catalog id is kept.
    AlreadyLinked { chosen_catalog_identifier: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Upgraded { previous_catalog_identifier: String },
    /// Not strictly more confident, or the same catalog id.
    NotBetter,
    /// No entry exists for the key.
    Missing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkingStats {
    pub total: usize,
    pub ean_keyed: usize,
    pub url_keyed: usize,
}

pub struct LinkingMap<S> {
    store: S,
    index: RwLock<HashMap<ProductKey, LinkingMapEntry>>,
    key_locks: Mutex<HashMap<ProductKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S> std::fmt::Debug for LinkingMap<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkingMap")
            .field("len", &self.read_index().len())
            .finish_non_exhaustive()
    }
}

impl<S: LinkingStore> LinkingMap<S> {
    /// Loads every entry from `store`. If the store holds duplicate keys the
    /// first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns [`LinkingMapError`] if the store cannot be read.
    pub async fn open(store: S) -> Result<Self, LinkingMapError> {
        let mut index = HashMap::new();
        for entry in store.load_all().await? {
            let key = entry.supplier_product_identifier.clone();
            if index.contains_key(&key) {
                tracing::warn!(key = %key, "duplicate linking map key in store, keeping first");
                continue;
            }
            index.insert(key, entry);
        }
        tracing::debug!(entries = index.len(), "linking map loaded");

        Ok(Self {
            store,
            index: RwLock::new(index),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    /// The catalog id linked to `key`, if any.
    #[must_use]
    pub fn resolve(&self, key: &ProductKey) -> Option<String> {
        self.read_index()
            .get(key)
            .map(|e| e.chosen_catalog_identifier.clone())
    }

    #[must_use]
    pub fn entry(&self, key: &ProductKey) -> Option<LinkingMapEntry> {
        self.read_index().get(key).cloned()
    }

    /// Links `key` to `catalog_id` unless `key` is already linked, in which
    /// case nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`LinkingMapError`] if the store write fails, or
    /// [`LinkingMapError::Inconsistent`] if the store refuses the key without
    /// holding it. The map is then unchanged.
    pub async fn register(
        &self,
        key: &ProductKey,
        catalog_id: &str,
        confidence: Option<f64>,
    ) -> Result<RegisterOutcome, LinkingMapError> {
        let lock = self.key_lock(key);
        let outcome = {
            let _guard = lock.lock().await;
            self.register_locked(key, catalog_id, confidence).await
        };
        self.release_key_lock(key, lock);
        outcome
    }

    async fn register_locked(
        &self,
        key: &ProductKey,
        catalog_id: &str,
        confidence: Option<f64>,
    ) -> Result<RegisterOutcome, LinkingMapError> {
        if let Some(existing) = self.resolve(key) {
            return Ok(RegisterOutcome::AlreadyLinked {
                chosen_catalog_identifier: existing,
            });
        }

        let entry = LinkingMapEntry {
            supplier_product_identifier: key.clone(),
            chosen_catalog_identifier: catalog_id.to_owned(),
            confidence,
            linked_at: Some(Utc::now()),
            previous_catalog_identifier: None,
            extra: serde_json::Map::new(),
        };

        if !self.store.insert(&entry).await? {
            // Another process linked this key since we loaded; adopt its
            // entry so we stay consistent with the store.
            let stored = self
                .store
                .load_all()
                .await?
                .into_iter()
                .find(|e| &e.supplier_product_identifier == key);
            if let Some(stored) = stored {
                let chosen = stored.chosen_catalog_identifier.clone();
                self.write_index().insert(key.clone(), stored);
                return Ok(RegisterOutcome::AlreadyLinked {
                    chosen_catalog_identifier: chosen,
                });
            }
            tracing::error!(key = %key, "linking store refused insert but has no entry for the key");
            return Err(LinkingMapError::Inconsistent {
                key: key.to_string(),
            });
        }

        tracing::debug!(key = %key, catalog_id, "linking map entry registered");
        self.write_index().insert(key.clone(), entry);
        Ok(RegisterOutcome::Registered)
    }

    /// Replaces the link for `key` when `confidence` strictly exceeds the
    /// stored confidence (a missing stored confidence counts as zero).
    ///
    /// # Errors
    ///
    /// Returns [`LinkingMapError`] if the store write fails; the map is then
    /// unchanged.
    pub async fn upgrade(
        &self,
        key: &ProductKey,
        catalog_id: &str,
        confidence: f64,
    ) -> Result<UpgradeOutcome, LinkingMapError> {
        let lock = self.key_lock(key);
        let outcome = {
            let _guard = lock.lock().await;
            self.upgrade_locked(key, catalog_id, confidence).await
        };
        self.release_key_lock(key, lock);
        outcome
    }

    async fn upgrade_locked(
        &self,
        key: &ProductKey,
        catalog_id: &str,
        confidence: f64,
    ) -> Result<UpgradeOutcome, LinkingMapError> {
        let Some(current) = self.entry(key) else {
            return Ok(UpgradeOutcome::Missing);
        };
        let current_confidence = current.confidence.unwrap_or(0.0);
        if current.chosen_catalog_identifier == catalog_id || confidence <= current_confidence {
            return Ok(UpgradeOutcome::NotBetter);
        }

        let previous = current.chosen_catalog_identifier;
        let entry = LinkingMapEntry {
            supplier_product_identifier: key.clone(),
            chosen_catalog_identifier: catalog_id.to_owned(),
            confidence: Some(confidence),
            linked_at: Some(Utc::now()),
            previous_catalog_identifier: Some(previous.clone()),
            extra: current.extra,
        };
        self.store.replace(&entry).await?;

        tracing::info!(
            key = %key,
            previous_catalog_id = %previous,
            new_catalog_id = catalog_id,
            previous_confidence = current_confidence,
            new_confidence = confidence,
            "linking map entry upgraded"
        );
        self.write_index().insert(key.clone(), entry);
        Ok(UpgradeOutcome::Upgraded {
            previous_catalog_identifier: previous,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_index().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries sorted by key.
    #[must_use]
    pub fn entries(&self) -> Vec<LinkingMapEntry> {
        let mut entries: Vec<_> = self.read_index().values().cloned().collect();
        entries.sort_by(|a, b| a.supplier_product_identifier.cmp(&b.supplier_product_identifier));
        entries
    }

    #[must_use]
    pub fn stats(&self) -> LinkingStats {
        let index = self.read_index();
        let ean_keyed = index.keys().filter(|k| k.is_ean_keyed()).count();
        let url_keyed = index.keys().filter(|k| k.is_url_keyed()).count();
        LinkingStats {
            total: index.len(),
            ean_keyed,
            url_keyed,
        }
    }

    fn key_lock(&self, key: &ProductKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Drops the caller's handle and forgets the lock once nobody else
    /// holds or waits on it, so the table only tracks keys in flight.
    fn release_key_lock(&self, key: &ProductKey, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

impl<S> LinkingMap<S> {
    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ProductKey, LinkingMapEntry>> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ProductKey, LinkingMapEntry>> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "linking_map_test.rs"]
mod tests;
