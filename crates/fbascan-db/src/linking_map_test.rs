use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory store that counts writes and can be told to fail.
#[derive(Default)]
struct MemoryStore {
    entries: tokio::sync::Mutex<Vec<LinkingMapEntry>>,
    inserts: AtomicUsize,
    fail_writes: std::sync::atomic::AtomicBool,
    refuse_inserts: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    fn with(entries: Vec<LinkingMapEntry>) -> Self {
        Self {
            entries: tokio::sync::Mutex::new(entries),
            ..Self::default()
        }
    }

    fn io_failure() -> LinkingMapError {
        LinkingMapError::Io {
            path: "memory".to_owned(),
            source: std::io::Error::other("disk full"),
        }
    }
}

impl LinkingStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<LinkingMapEntry>, LinkingMapError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn insert(&self, entry: &LinkingMapEntry) -> Result<bool, LinkingMapError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::io_failure());
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_inserts.load(Ordering::SeqCst) {
            return Ok(false);
        }
        tokio::task::yield_now().await;
        let mut entries = self.entries.lock().await;
        if entries
            .iter()
            .any(|e| e.supplier_product_identifier == entry.supplier_product_identifier)
        {
            return Ok(false);
        }
        entries.push(entry.clone());
        Ok(true)
    }

    async fn replace(&self, entry: &LinkingMapEntry) -> Result<(), LinkingMapError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::io_failure());
        }
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.supplier_product_identifier != entry.supplier_product_identifier);
        entries.push(entry.clone());
        Ok(())
    }
}

fn key(raw: &str) -> ProductKey {
    ProductKey::from_raw(raw)
}

fn stored(k: &str, asin: &str, confidence: Option<f64>) -> LinkingMapEntry {
    LinkingMapEntry {
        supplier_product_identifier: key(k),
        chosen_catalog_identifier: asin.to_owned(),
        confidence,
        linked_at: None,
        previous_catalog_identifier: None,
        extra: serde_json::Map::new(),
    }
}

#[tokio::test]
async fn second_register_is_ignored() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();

    let first = map.register(&key("EAN_123"), "ASIN_A", None).await.unwrap();
    let second = map.register(&key("EAN_123"), "ASIN_B", None).await.unwrap();

    assert_eq!(first, RegisterOutcome::Registered);
    assert_eq!(
        second,
        RegisterOutcome::AlreadyLinked {
            chosen_catalog_identifier: "ASIN_A".to_owned()
        }
    );
    assert_eq!(map.resolve(&key("EAN_123")).as_deref(), Some("ASIN_A"));
    assert_eq!(map.len(), 1);
}

#[tokio::test]
async fn resolve_unknown_key_is_none() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();
    assert_eq!(map.resolve(&key("EAN_999")), None);
    assert!(map.is_empty());
}

#[tokio::test]
async fn open_keeps_first_of_duplicate_keys() {
    let store = MemoryStore::with(vec![
        stored("EAN_1", "B_FIRST", None),
        stored("EAN_1", "B_SECOND", None),
    ]);
    let map = LinkingMap::open(store).await.unwrap();
    assert_eq!(map.resolve(&key("EAN_1")).as_deref(), Some("B_FIRST"));
    assert_eq!(map.len(), 1);
}

#[tokio::test]
async fn failed_write_leaves_map_unchanged() {
    let store = MemoryStore::default();
    store.fail_writes.store(true, Ordering::SeqCst);
    let map = LinkingMap::open(store).await.unwrap();

    assert!(map.register(&key("EAN_1"), "B1", None).await.is_err());
    assert_eq!(map.resolve(&key("EAN_1")), None);
}

#[tokio::test]
async fn refused_insert_without_stored_entry_is_an_error() {
    let store = MemoryStore::default();
    store.refuse_inserts.store(true, Ordering::SeqCst);
    let map = LinkingMap::open(store).await.unwrap();

    let err = map.register(&key("EAN_1"), "B1", None).await.unwrap_err();

    assert!(matches!(err, LinkingMapError::Inconsistent { ref key } if key == "EAN_1"));
    assert_eq!(map.resolve(&key("EAN_1")), None);
    assert!(map.is_empty());
}

#[tokio::test]
async fn refused_insert_adopts_the_stored_entry() {
    let store = MemoryStore::with(Vec::new());
    store.refuse_inserts.store(true, Ordering::SeqCst);
    let map = LinkingMap::open(store).await.unwrap();
    // Written by another process after the map loaded.
    map.store.entries.lock().await.push(stored("EAN_1", "B_OTHER", None));

    assert_eq!(
        map.register(&key("EAN_1"), "B1", None).await.unwrap(),
        RegisterOutcome::AlreadyLinked {
            chosen_catalog_identifier: "B_OTHER".to_owned()
        }
    );
    assert_eq!(map.resolve(&key("EAN_1")).as_deref(), Some("B_OTHER"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registers_for_one_key_write_once() {
    let map = Arc::new(LinkingMap::open(MemoryStore::default()).await.unwrap());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let map = Arc::clone(&map);
            tokio::spawn(async move {
                map.register(&key("EAN_42"), &format!("ASIN_{i}"), None)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut registered = 0;
    for handle in handles {
        if handle.await.unwrap() == RegisterOutcome::Registered {
            registered += 1;
        }
    }

    assert_eq!(registered, 1);
    assert_eq!(map.len(), 1);
    assert_eq!(map.store.inserts.load(Ordering::SeqCst), 1);
    assert_eq!(map.store.load_all().await.unwrap().len(), 1);
    assert!(map.key_locks.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registers_for_distinct_keys_all_land() {
    let map = Arc::new(LinkingMap::open(MemoryStore::default()).await.unwrap());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let map = Arc::clone(&map);
            tokio::spawn(async move {
                map.register(&key(&format!("EAN_{i}")), "ASIN", None)
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), RegisterOutcome::Registered);
    }
    assert_eq!(map.len(), 20);
    assert!(map.key_locks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn key_locks_are_released_after_each_write() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();
    for i in 0..50 {
        map.register(&key(&format!("EAN_{i}")), "B1", Some(0.1)).await.unwrap();
        map.upgrade(&key(&format!("EAN_{i}")), "B2", 0.9).await.unwrap();
    }
    map.store.fail_writes.store(true, Ordering::SeqCst);
    assert!(map.register(&key("EAN_FAIL"), "B1", None).await.is_err());

    assert_eq!(map.len(), 50);
    assert!(map.key_locks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upgrade_requires_strictly_higher_confidence() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();
    map.register(&key("EAN_1"), "B_OLD", Some(0.6)).await.unwrap();

    assert_eq!(
        map.upgrade(&key("EAN_1"), "B_NEW", 0.6).await.unwrap(),
        UpgradeOutcome::NotBetter
    );
    assert_eq!(map.resolve(&key("EAN_1")).as_deref(), Some("B_OLD"));

    assert_eq!(
        map.upgrade(&key("EAN_1"), "B_NEW", 0.9).await.unwrap(),
        UpgradeOutcome::Upgraded {
            previous_catalog_identifier: "B_OLD".to_owned()
        }
    );
    let entry = map.entry(&key("EAN_1")).unwrap();
    assert_eq!(entry.chosen_catalog_identifier, "B_NEW");
    assert_eq!(entry.previous_catalog_identifier.as_deref(), Some("B_OLD"));
    assert_eq!(entry.confidence, Some(0.9));
    assert_eq!(map.len(), 1);
}

#[tokio::test]
async fn upgrade_is_persisted() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();
    map.register(&key("EAN_1"), "B_OLD", Some(0.2)).await.unwrap();
    map.upgrade(&key("EAN_1"), "B_NEW", 0.8).await.unwrap();

    let persisted = map.store.load_all().await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].chosen_catalog_identifier, "B_NEW");
}

#[tokio::test]
async fn upgrade_to_same_catalog_id_is_not_better() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();
    map.register(&key("EAN_1"), "B1", Some(0.2)).await.unwrap();
    assert_eq!(
        map.upgrade(&key("EAN_1"), "B1", 0.9).await.unwrap(),
        UpgradeOutcome::NotBetter
    );
}

#[tokio::test]
async fn upgrade_of_unknown_key_is_missing() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();
    assert_eq!(
        map.upgrade(&key("EAN_1"), "B1", 0.9).await.unwrap(),
        UpgradeOutcome::Missing
    );
    assert!(map.is_empty());
}

#[tokio::test]
async fn stats_split_by_key_kind() {
    let map = LinkingMap::open(MemoryStore::default()).await.unwrap();
    map.register(&ProductKey::from_ean("123"), "B1", None).await.unwrap();
    map.register(&ProductKey::from_ean("456"), "B2", None).await.unwrap();
    map.register(&ProductKey::from_url("https://s.test/p"), "B3", None)
        .await
        .unwrap();

    assert_eq!(
        map.stats(),
        LinkingStats {
            total: 3,
            ean_keyed: 2,
            url_keyed: 1
        }
    );
    let keys: Vec<_> = map
        .entries()
        .into_iter()
        .map(|e| e.supplier_product_identifier.to_string())
        .collect();
    assert_eq!(keys, vec!["EAN_123", "EAN_456", "URL_https://s.test/p"]);
}

#[tokio::test]
async fn upgrade_keeps_unknown_fields() {
    let mut legacy = stored("EAN_1", "B_OLD", Some(0.2));
    legacy
        .extra
        .insert("supplier_title".to_owned(), serde_json::json!("Mop"));
    let map = LinkingMap::open(MemoryStore::with(vec![legacy])).await.unwrap();

    map.upgrade(&key("EAN_1"), "B_NEW", 0.9).await.unwrap();

    let persisted = map.store.load_all().await.unwrap();
    assert_eq!(persisted[0].chosen_catalog_identifier, "B_NEW");
    assert_eq!(persisted[0].extra["supplier_title"], "Mop");
}

#[test]
fn entry_serializes_in_legacy_shape() {
    let json = serde_json::to_value(stored("EAN_1", "B1", None)).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"supplier_product_identifier": "EAN_1", "chosen_amazon_asin": "B1"})
    );
}
