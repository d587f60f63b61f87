//! Linking-map persistence in the Postgres `linking_map` table.

use chrono::{DateTime, Utc};
use fbascan_core::ProductKey;
use sqlx::PgPool;

use crate::linking_map::{LinkingMapEntry, LinkingMapError, LinkingStore};

/// A row from the `linking_map` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkingMapRow {
    pub supplier_product_identifier: String,
    pub chosen_catalog_identifier: String,
    pub confidence: Option<f64>,
    pub linked_at: DateTime<Utc>,
    pub previous_catalog_identifier: Option<String>,
}

impl From<LinkingMapRow> for LinkingMapEntry {
    fn from(row: LinkingMapRow) -> Self {
        Self {
            supplier_product_identifier: ProductKey::from_raw(row.supplier_product_identifier),
            chosen_catalog_identifier: row.chosen_catalog_identifier,
            confidence: row.confidence,
            linked_at: Some(row.linked_at),
            previous_catalog_identifier: row.previous_catalog_identifier,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgLinkingStore {
    pool: PgPool,
}

impl PgLinkingStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl LinkingStore for PgLinkingStore {
    async fn load_all(&self) -> Result<Vec<LinkingMapEntry>, LinkingMapError> {
        let rows = sqlx::query_as::<_, LinkingMapRow>(
            "SELECT supplier_product_identifier, chosen_catalog_identifier, confidence, \
                    linked_at, previous_catalog_identifier \
             FROM linking_map \
             ORDER BY linked_at, supplier_product_identifier",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LinkingMapEntry::from).collect())
    }

    /// Single-statement insert; a concurrent writer for the same key loses
    /// to whoever committed first.
    async fn insert(&self, entry: &LinkingMapEntry) -> Result<bool, LinkingMapError> {
        let result = sqlx::query(
            "INSERT INTO linking_map \
                 (supplier_product_identifier, chosen_catalog_identifier, confidence, linked_at) \
             VALUES ($1, $2, $3, COALESCE($4, NOW())) \
             ON CONFLICT (supplier_product_identifier) DO NOTHING",
        )
        .bind(entry.supplier_product_identifier.as_str())
        .bind(&entry.chosen_catalog_identifier)
        .bind(entry.confidence)
        .bind(entry.linked_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace(&self, entry: &LinkingMapEntry) -> Result<(), LinkingMapError> {
        sqlx::query(
            "INSERT INTO linking_map \
                 (supplier_product_identifier, chosen_catalog_identifier, confidence, linked_at, \
                  previous_catalog_identifier) \
             VALUES ($1, $2, $3, COALESCE($4, NOW()), $5) \
             ON CONFLICT (supplier_product_identifier) DO UPDATE SET \
                 chosen_catalog_identifier = EXCLUDED.chosen_catalog_identifier, \
                 confidence = EXCLUDED.confidence, \
                 linked_at = EXCLUDED.linked_at, \
                 previous_catalog_identifier = EXCLUDED.previous_catalog_identifier",
        )
        .bind(entry.supplier_product_identifier.as_str())
        .bind(&entry.chosen_catalog_identifier)
        .bind(entry.confidence)
        .bind(entry.linked_at)
        .bind(&entry.previous_catalog_identifier)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
