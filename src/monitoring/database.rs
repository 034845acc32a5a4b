use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::api::{FetchedRow, ListingType};
use crate::core::{PriceWatchError, Result};

const MEMORY_LOCATION: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: String,
    pub listing_type: ListingType,
    pub dynamic_display_price: f64,
    /// Fixed at insert, never rewritten.
    pub base_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceRecord {
    pub fn from_row(row: &FetchedRow, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: row.id.clone(),
            listing_type: row.listing_type,
            dynamic_display_price: row.dynamic_display_price,
            base_price: row.base_price,
            timestamp,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PriceRow {
    id: String,
    #[sqlx(rename = "type")]
    listing_type: String,
    dynamic_display_price: f64,
    base_price: f64,
    timestamp: i64,
}

impl TryFrom<PriceRow> for PriceRecord {
    type Error = PriceWatchError;

    fn try_from(row: PriceRow) -> Result<Self> {
        let timestamp = Utc.timestamp_micros(row.timestamp).single().ok_or_else(|| {
            PriceWatchError::StorageUnavailable(format!(
                "corrupt timestamp {} for {}",
                row.timestamp, row.id
            ))
        })?;

        Ok(PriceRecord {
            listing_type: row.listing_type.parse().map_err(|e: String| {
                PriceWatchError::StorageUnavailable(format!("corrupt row {}: {}", row.id, e))
            })?,
            id: row.id,
            dynamic_display_price: row.dynamic_display_price,
            base_price: row.base_price,
            timestamp,
        })
    }
}

/// Result of a recency-guarded update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub applied: bool,
}

/// Durable table of the latest price per listing.
pub struct PriceStore {
    pool: SqlitePool,
    location: String,
}

impl PriceStore {
    /// Opens the store and ensures the schema exists.
    pub async fn open(location: &str) -> Result<Self> {
        let store = Self::connect(location).await?;
        store.initialize().await?;
        Ok(store)
    }

    pub async fn connect(location: &str) -> Result<Self> {
        let pool = if location == MEMORY_LOCATION || location.starts_with("sqlite::memory:") {
            // Every in-memory connection is its own database, so keep exactly one alive.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            if let Some(parent) = Path::new(location).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        PriceWatchError::StorageUnavailable(format!(
                            "cannot create {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }

            let connection_string = if location.starts_with("sqlite:") {
                location.to_string()
            } else {
                format!("sqlite://{}?mode=rwc", location)
            };

            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&connection_string)
                .await?
        };

        Ok(Self {
            pool,
            location: location.to_string(),
        })
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prices (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                dynamic_display_price REAL NOT NULL,
                base_price REAL NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("✅ Price store schema initialized at {}", self.location);

        Ok(())
    }

    pub async fn list_known_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM prices")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    pub async fn insert(&self, record: &PriceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO prices (id, type, dynamic_display_price, base_price, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.listing_type.as_str())
        .bind(record.dynamic_display_price)
        .bind(record.base_price)
        .bind(record.timestamp.timestamp_micros())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return PriceWatchError::DuplicateKey(record.id.clone());
                }
            }
            PriceWatchError::from(e)
        })?;

        Ok(())
    }

    /// Writes the new price only when it differs from the stored one and the
    /// stored timestamp is strictly older. A stale or redundant write is a no-op.
    pub async fn conditional_update(
        &self,
        id: &str,
        new_price: f64,
        new_timestamp: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let micros = new_timestamp.timestamp_micros();

        let result = sqlx::query(
            r#"
            UPDATE prices
            SET dynamic_display_price = ?, timestamp = ?
            WHERE id = ? AND dynamic_display_price != ? AND timestamp < ?
            "#,
        )
        .bind(new_price)
        .bind(micros)
        .bind(id)
        .bind(new_price)
        .bind(micros)
        .execute(&self.pool)
        .await?;

        Ok(UpdateOutcome {
            applied: result.rows_affected() > 0,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<PriceRecord>> {
        let row = sqlx::query_as::<_, PriceRow>("SELECT * FROM prices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PriceRecord::try_from).transpose()
    }

    pub async fn dump_all(&self) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query_as::<_, PriceRow>("SELECT * FROM prices ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PriceRecord::try_from).collect()
    }

    pub async fn count(&self) -> Result<usize> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM prices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as usize)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("🔒 Price store closed");
    }
}
