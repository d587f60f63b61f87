//! Linking-map persistence as one JSON array file.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::fs_util::write_atomic;
use crate::linking_map::{LinkingMapEntry, LinkingMapError, LinkingStore};

/// Keeps the whole array in memory and rewrites the file atomically on
/// every change. A missing file is an empty map.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<Vec<LinkingMapEntry>>,
}

impl JsonFileStore {
    /// # Errors
    ///
    /// Returns [`LinkingMapError::Io`] if the file exists but cannot be read,
    /// or [`LinkingMapError::Corrupt`] if it is not a JSON array of entries.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LinkingMapError> {
        let path = path.into();
        let entries = read_entries(&path).await?;
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &[LinkingMapEntry]) -> Result<(), LinkingMapError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| LinkingMapError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })?;
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|source| LinkingMapError::Io {
                path: self.path.display().to_string(),
                source,
            })
    }
}

async fn read_entries(path: &Path) -> Result<Vec<LinkingMapEntry>, LinkingMapError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LinkingMapError::Io {
                path: path.display().to_string(),
                source,
            })
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| LinkingMapError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

impl LinkingStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<LinkingMapEntry>, LinkingMapError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn insert(&self, entry: &LinkingMapEntry) -> Result<bool, LinkingMapError> {
        let mut entries = self.entries.lock().await;
        if entries
            .iter()
            .any(|e| e.supplier_product_identifier == entry.supplier_product_identifier)
        {
            return Ok(false);
        }
        entries.push(entry.clone());
        if let Err(e) = self.flush(&entries).await {
            entries.pop();
            return Err(e);
        }
        Ok(true)
    }

    async fn replace(&self, entry: &LinkingMapEntry) -> Result<(), LinkingMapError> {
        let mut entries = self.entries.lock().await;
        let mut next = entries.clone();
        match next
            .iter_mut()
            .find(|e| e.supplier_product_identifier == entry.supplier_product_identifier)
        {
            Some(slot) => *slot = entry.clone(),
            None => next.push(entry.clone()),
        }
        self.flush(&next).await?;
        *entries = next;
        Ok(())
    }
}
