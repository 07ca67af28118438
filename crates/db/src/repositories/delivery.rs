use sqlx::{sqlite::SqliteRow, Row};

use super::{parse_timestamp, parse_u32, DeliveryLogRepository, DeliveryRecord, RepositoryError};
use crate::DbPool;

pub struct SqlDeliveryLogRepository {
    pool: DbPool,
}

impl SqlDeliveryLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeliveryLogRepository for SqlDeliveryLogRepository {
    async fn find(&self, dedupe_key: &str) -> Result<Option<DeliveryRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT dedupe_key, recipient_id, attempts, delivered_at
             FROM delivery_log
             WHERE dedupe_key = ?",
        )
        .bind(dedupe_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(delivery_from_row).transpose()
    }

    async fn record_delivered(&self, record: DeliveryRecord) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO delivery_log (dedupe_key, recipient_id, attempts, delivered_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(dedupe_key) DO NOTHING",
        )
        .bind(&record.dedupe_key)
        .bind(&record.recipient_id)
        .bind(i64::from(record.attempts))
        .bind(record.delivered_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn delivery_from_row(row: SqliteRow) -> Result<DeliveryRecord, RepositoryError> {
    Ok(DeliveryRecord {
        dedupe_key: row.try_get("dedupe_key")?,
        recipient_id: row.try_get("recipient_id")?,
        attempts: parse_u32("attempts", row.try_get("attempts")?)?,
        delivered_at: parse_timestamp("delivered_at", row.try_get("delivered_at")?)?,
    })
}
