//! On-disk JSON snapshots of supplier pages and catalog records.
//!
//! Layout: `<root>/<namespace>/<sha256(key)>.json`, each file an envelope
//! holding the original key, the time it was fetched and the payload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fbascan_core::CachePolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::fs_util::write_atomic;

pub const SUPPLIER_NAMESPACE: &str = "supplier";
pub const CATALOG_NAMESPACE: &str = "catalog";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode snapshot for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid snapshot namespace '{0}'")]
    InvalidNamespace(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub key: String,
    pub fetched_at: DateTime<Utc>,
    pub data: T,
}

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    root: PathBuf,
    max_age: Duration,
}

impl SnapshotCache {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            root: root.into(),
            max_age,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The snapshot for `key`, or `None` when it is missing, stale, or
    /// unreadable. Unreadable files are logged and treated as misses.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::InvalidNamespace`] for a namespace that is
    /// not a single path component.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Snapshot<T>>, SnapshotError> {
        self.get_at(namespace, key, Utc::now()).await
    }

    async fn get_at<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Snapshot<T>>, SnapshotError> {
        let path = self.entry_path(namespace, key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "snapshot unreadable");
                return Ok(None);
            }
        };

        let snapshot: Snapshot<T> = match serde_json::from_slice(&bytes) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "snapshot corrupt, ignoring");
                return Ok(None);
            }
        };

        if self.is_stale(snapshot.fetched_at, now) {
            tracing::debug!(namespace, key, fetched_at = %snapshot.fetched_at, "snapshot stale");
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Stores `data` under `key`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if encoding or the atomic write fails.
    pub async fn put<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        data: &T,
    ) -> Result<(), SnapshotError> {
        self.put_with_timestamp(namespace, key, data, Utc::now()).await
    }

    /// Stores `data` with an explicit `fetched_at`, e.g. when importing
    /// records fetched elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if encoding or the atomic write fails.
    pub async fn put_with_timestamp<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        data: &T,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), SnapshotError> {
        let path = self.entry_path(namespace, key)?;
        let envelope = Snapshot {
            key: key.to_owned(),
            fetched_at,
            data,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|source| SnapshotError::Encode {
            key: key.to_owned(),
            source,
        })?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.display().to_string(),
                source,
            })
    }

    /// Removes every namespace. Returns how many namespace directories
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if a directory cannot be removed.
    pub async fn clear_all(&self) -> Result<usize, SnapshotError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(io_err(&self.root, source)),
        };

        let mut removed = 0;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|source| io_err(&self.root, source))?
        {
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map_err(|source| io_err(&path, source))?
                .is_dir();
            if is_dir {
                tokio::fs::remove_dir_all(&path)
                    .await
                    .map_err(|source| io_err(&path, source))?;
                removed += 1;
            }
        }
        tracing::info!(root = %self.root.display(), removed, "snapshot cache cleared");
        Ok(removed)
    }

    /// Removes only the listed namespaces. Returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] for an invalid namespace or a failed removal.
    pub async fn clear_namespaces(&self, namespaces: &[String]) -> Result<usize, SnapshotError> {
        let mut removed = 0;
        for namespace in namespaces {
            let dir = self.namespace_dir(namespace)?;
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(io_err(&dir, source)),
            }
        }
        tracing::info!(?namespaces, removed, "snapshot namespaces cleared");
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError`] if clearing fails.
    pub async fn apply_policy(&self, policy: &CachePolicy) -> Result<(), SnapshotError> {
        match policy {
            CachePolicy::Keep => Ok(()),
            CachePolicy::ClearAll => self.clear_all().await.map(|_| ()),
            CachePolicy::Selective(namespaces) => {
                self.clear_namespaces(namespaces).await.map(|_| ())
            }
        }
    }

    fn is_stale(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(fetched_at);
        age.to_std().is_ok_and(|age| age > self.max_age)
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, SnapshotError> {
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SnapshotError::InvalidNamespace(namespace.to_owned()));
        }
        Ok(self.root.join(namespace))
    }

    fn entry_path(&self, namespace: &str, key: &str) -> Result<PathBuf, SnapshotError> {
        let digest = Sha256::digest(key.as_bytes());
        Ok(self.namespace_dir(namespace)?.join(format!("{digest:x}.json")))
    }

}

fn io_err(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(dir: &Path) -> SnapshotCache {
        SnapshotCache::new(dir.join("cache"), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn put_then_get_returns_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache
            .put(CATALOG_NAMESPACE, "EAN_5012345678900", &vec![1, 2, 3])
            .await
            .unwrap();

        let got: Snapshot<Vec<i32>> = cache
            .get(CATALOG_NAMESPACE, "EAN_5012345678900")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.data, vec![1, 2, 3]);
        assert_eq!(got.key, "EAN_5012345678900");
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let got: Option<Snapshot<String>> = cache(dir.path())
            .get(SUPPLIER_NAMESPACE, "nope")
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn stale_snapshot_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let old = Utc::now() - chrono::Duration::hours(2);
        cache
            .put_with_timestamp(SUPPLIER_NAMESPACE, "k", &"page", old)
            .await
            .unwrap();

        let got: Option<Snapshot<String>> = cache.get(SUPPLIER_NAMESPACE, "k").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn freshness_is_relative_to_now() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let fetched = Utc::now();
        cache
            .put_with_timestamp(SUPPLIER_NAMESPACE, "k", &"page", fetched)
            .await
            .unwrap();

        let later = fetched + chrono::Duration::minutes(30);
        let got: Option<Snapshot<String>> =
            cache.get_at(SUPPLIER_NAMESPACE, "k", later).await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        let path = cache.entry_path(CATALOG_NAMESPACE, "k").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "garbage").unwrap();

        let got: Option<Snapshot<String>> = cache.get(CATALOG_NAMESPACE, "k").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn selective_clear_keeps_other_namespaces() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.put(SUPPLIER_NAMESPACE, "a", &1).await.unwrap();
        cache.put(CATALOG_NAMESPACE, "b", &2).await.unwrap();

        cache
            .apply_policy(&CachePolicy::Selective(vec![SUPPLIER_NAMESPACE.to_owned()]))
            .await
            .unwrap();

        let a: Option<Snapshot<i32>> = cache.get(SUPPLIER_NAMESPACE, "a").await.unwrap();
        let b: Option<Snapshot<i32>> = cache.get(CATALOG_NAMESPACE, "b").await.unwrap();
        assert!(a.is_none());
        assert!(b.is_some());
    }

    #[tokio::test]
    async fn clear_all_removes_every_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache(dir.path());
        cache.put(SUPPLIER_NAMESPACE, "a", &1).await.unwrap();
        cache.put(CATALOG_NAMESPACE, "b", &2).await.unwrap();

        assert_eq!(cache.clear_all().await.unwrap(), 2);
        let b: Option<Snapshot<i32>> = cache.get(CATALOG_NAMESPACE, "b").await.unwrap();
        assert!(b.is_none());
    }

    #[tokio::test]
    async fn clear_all_on_missing_root_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cache(dir.path()).clear_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn path_traversal_namespace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = cache(dir.path())
            .put("../escape", "k", &1)
            .await
            .unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidNamespace(_)));
    }
}
