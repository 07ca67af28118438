use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use innkeep_core::domain::booking::{BookingId, BookingRecord, BookingStatus, PaymentStatus};
use innkeep_core::domain::conversation::{ConversationKey, DateRange};
use innkeep_core::domain::property::PropertyId;

use super::{
    is_unique_violation, parse_optional_timestamp, parse_timestamp, parse_u32, BookingRepository,
    RepositoryError,
};
use crate::DbPool;

const BOOKING_COLUMNS: &str = "id,
                guest_id,
                property_id,
                approver_id,
                check_in,
                check_out,
                total_price,
                currency,
                payment_status,
                booking_status,
                screenshot_ref,
                payer_name,
                payer_bank,
                attempt,
                decided_by,
                rejection_reason,
                created_at,
                decided_at";

pub struct SqlBookingRepository {
    pool: DbPool,
}

impl SqlBookingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BookingRepository for SqlBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<BookingRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {BOOKING_COLUMNS} FROM booking_record WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(booking_from_row).transpose()
    }

    async fn find_pending_for_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<BookingRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS}
             FROM booking_record
             WHERE guest_id = ? AND property_id = ? AND payment_status = 'pending'"
        ))
        .bind(&key.guest_id.0)
        .bind(&key.property_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(booking_from_row).transpose()
    }

    async fn latest_pending_for_approver(
        &self,
        approver_id: &str,
    ) -> Result<Option<BookingRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS}
             FROM booking_record
             WHERE approver_id = ? AND payment_status = 'pending'
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(approver_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(booking_from_row).transpose()
    }

    async fn list_confirmed_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<BookingRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {BOOKING_COLUMNS}
             FROM booking_record
             WHERE property_id = ? AND booking_status = 'confirmed'
             ORDER BY check_in ASC"
        ))
        .bind(&property_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(booking_from_row).collect()
    }

    async fn insert_pending(&self, record: BookingRecord) -> Result<(), RepositoryError> {
        let sql = format!(
            "INSERT INTO booking_record ({BOOKING_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        let result = bind_record(sqlx::query(&sql), &record).execute(&self.pool).await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if is_unique_violation(&error) => Err(RepositoryError::Conflict(format!(
                "conversation `{}` already has a pending booking",
                record.key
            ))),
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, record: BookingRecord) -> Result<(), RepositoryError> {
        let sql = format!(
            "INSERT INTO booking_record ({BOOKING_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                approver_id = excluded.approver_id,
                check_in = excluded.check_in,
                check_out = excluded.check_out,
                total_price = excluded.total_price,
                currency = excluded.currency,
                payment_status = excluded.payment_status,
                booking_status = excluded.booking_status,
                screenshot_ref = excluded.screenshot_ref,
                payer_name = excluded.payer_name,
                payer_bank = excluded.payer_bank,
                attempt = excluded.attempt,
                decided_by = excluded.decided_by,
                rejection_reason = excluded.rejection_reason,
                decided_at = excluded.decided_at"
        );
        bind_record(sqlx::query(&sql), &record).execute(&self.pool).await?;
        Ok(())
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_record<'q>(query: SqliteQuery<'q>, record: &BookingRecord) -> SqliteQuery<'q> {
    query
        .bind(record.id.0.clone())
        .bind(record.key.guest_id.0.clone())
        .bind(record.key.property_id.0.clone())
        .bind(record.approver_id.clone())
        .bind(record.dates.check_in.to_string())
        .bind(record.dates.check_out.to_string())
        .bind(record.total_price.to_string())
        .bind(record.currency.clone())
        .bind(record.payment_status.as_str())
        .bind(record.booking_status.as_str())
        .bind(record.screenshot_ref.clone())
        .bind(record.payer_name.clone())
        .bind(record.payer_bank.clone())
        .bind(i64::from(record.attempt))
        .bind(record.decided_by.clone())
        .bind(record.rejection_reason.clone())
        .bind(record.created_at.to_rfc3339())
        .bind(record.decided_at.map(|value| value.to_rfc3339()))
}

fn booking_from_row(row: SqliteRow) -> Result<BookingRecord, RepositoryError> {
    let payment_raw = row.try_get::<String, _>("payment_status")?;
    let payment_status = PaymentStatus::parse(&payment_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown payment status `{payment_raw}`"))
    })?;
    let booking_raw = row.try_get::<String, _>("booking_status")?;
    let booking_status = BookingStatus::parse(&booking_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown booking status `{booking_raw}`"))
    })?;

    let check_in = parse_date("check_in", row.try_get("check_in")?)?;
    let check_out = parse_date("check_out", row.try_get("check_out")?)?;
    let dates = DateRange::new(check_in, check_out)
        .map_err(|error| RepositoryError::Decode(format!("invalid booking dates: {error}")))?;

    let total_raw = row.try_get::<String, _>("total_price")?;
    let total_price = Decimal::from_str(&total_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid total_price `{total_raw}`: {error}"))
    })?;

    Ok(BookingRecord {
        id: BookingId(row.try_get("id")?),
        key: ConversationKey::new(
            row.try_get::<String, _>("guest_id")?,
            row.try_get::<String, _>("property_id")?,
        ),
        approver_id: row.try_get("approver_id")?,
        dates,
        total_price,
        currency: row.try_get("currency")?,
        payment_status,
        booking_status,
        screenshot_ref: row.try_get("screenshot_ref")?,
        payer_name: row.try_get("payer_name")?,
        payer_bank: row.try_get("payer_bank")?,
        attempt: parse_u32("attempt", row.try_get("attempt")?)?,
        decided_by: row.try_get("decided_by")?,
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        decided_at: parse_optional_timestamp("decided_at", row.try_get("decided_at")?)?,
    })
}

fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}
