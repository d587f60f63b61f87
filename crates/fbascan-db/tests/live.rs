//! Live tests for the Postgres linking store using `#[sqlx::test]`.
//!
//! Each test gets a fresh, migrated database from the sqlx test harness;
//! they need `DATABASE_URL` and are ignored by default.

use fbascan_core::ProductKey;
use fbascan_db::{LinkingMap, LinkingStore, PgLinkingStore, RegisterOutcome, UpgradeOutcome};

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn insert_conflict_is_refused(pool: sqlx::PgPool) {
    let store = PgLinkingStore::new(pool);
    let map = LinkingMap::open(store.clone()).await.unwrap();
    let key = ProductKey::from_ean("5012345678900");

    assert_eq!(
        map.register(&key, "B_A", Some(0.5)).await.unwrap(),
        RegisterOutcome::Registered
    );
    assert!(matches!(
        map.register(&key, "B_B", None).await.unwrap(),
        RegisterOutcome::AlreadyLinked { .. }
    ));
    assert_eq!(store.load_all().await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn second_process_sees_first_process_entry(pool: sqlx::PgPool) {
    let key = ProductKey::from_url("https://supplier.test/p/1");
    let first = LinkingMap::open(PgLinkingStore::new(pool.clone()))
        .await
        .unwrap();
    // Opened before the first map writes: its index does not know the key.
    let second = LinkingMap::open(PgLinkingStore::new(pool)).await.unwrap();

    first.register(&key, "B_FIRST", None).await.unwrap();
    assert_eq!(
        second.register(&key, "B_SECOND", None).await.unwrap(),
        RegisterOutcome::AlreadyLinked {
            chosen_catalog_identifier: "B_FIRST".to_owned()
        }
    );
    assert_eq!(second.resolve(&key).as_deref(), Some("B_FIRST"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn upgrade_records_previous_identifier(pool: sqlx::PgPool) {
    let store = PgLinkingStore::new(pool);
    let map = LinkingMap::open(store.clone()).await.unwrap();
    let key = ProductKey::from_ean("12345678");

    map.register(&key, "B_OLD", Some(0.4)).await.unwrap();
    assert!(matches!(
        map.upgrade(&key, "B_NEW", 0.9).await.unwrap(),
        UpgradeOutcome::Upgraded { .. }
    ));

    let rows = store.load_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].chosen_catalog_identifier, "B_NEW");
    assert_eq!(rows[0].previous_catalog_identifier.as_deref(), Some("B_OLD"));
}
