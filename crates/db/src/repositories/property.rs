use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use innkeep_core::domain::property::{PaymentMethod, Property, PropertyId};

use super::{parse_u32, PropertyRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPropertyRepository {
    pool: DbPool,
}

impl SqlPropertyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PropertyRepository for SqlPropertyRepository {
    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                name,
                location,
                nightly_rate,
                currency,
                max_guests,
                check_in_time,
                check_out_time,
                amenities_json,
                approver_id,
                payment_methods_json
             FROM property
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(property_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<Property>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                name,
                location,
                nightly_rate,
                currency,
                max_guests,
                check_in_time,
                check_out_time,
                amenities_json,
                approver_id,
                payment_methods_json
             FROM property
             ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(property_from_row).collect()
    }

    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        let amenities_json = serde_json::to_string(&property.amenities)
            .map_err(|error| RepositoryError::Decode(format!("could not encode amenities: {error}")))?;
        let payment_methods_json =
            serde_json::to_string(&property.payment_methods).map_err(|error| {
                RepositoryError::Decode(format!("could not encode payment methods: {error}"))
            })?;

        sqlx::query(
            "INSERT INTO property (
                id,
                name,
                location,
                nightly_rate,
                currency,
                max_guests,
                check_in_time,
                check_out_time,
                amenities_json,
                approver_id,
                payment_methods_json,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                location = excluded.location,
                nightly_rate = excluded.nightly_rate,
                currency = excluded.currency,
                max_guests = excluded.max_guests,
                check_in_time = excluded.check_in_time,
                check_out_time = excluded.check_out_time,
                amenities_json = excluded.amenities_json,
                approver_id = excluded.approver_id,
                payment_methods_json = excluded.payment_methods_json,
                updated_at = excluded.updated_at",
        )
        .bind(&property.id.0)
        .bind(&property.name)
        .bind(&property.location)
        .bind(property.nightly_rate.to_string())
        .bind(&property.currency)
        .bind(i64::from(property.max_guests))
        .bind(&property.check_in_time)
        .bind(&property.check_out_time)
        .bind(amenities_json)
        .bind(&property.approver_id)
        .bind(payment_methods_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn property_from_row(row: SqliteRow) -> Result<Property, RepositoryError> {
    let id: String = row.try_get("id")?;
    let rate_raw = row.try_get::<String, _>("nightly_rate")?;
    let nightly_rate = Decimal::from_str(&rate_raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid nightly_rate `{rate_raw}` for `{id}`: {error}"))
    })?;
    let amenities = serde_json::from_str::<Vec<String>>(&row.try_get::<String, _>("amenities_json")?)
        .map_err(|error| RepositoryError::Decode(format!("invalid amenities for `{id}`: {error}")))?;
    let payment_methods = serde_json::from_str::<Vec<PaymentMethod>>(
        &row.try_get::<String, _>("payment_methods_json")?,
    )
    .map_err(|error| {
        RepositoryError::Decode(format!("invalid payment methods for `{id}`: {error}"))
    })?;

    Ok(Property {
        name: row.try_get("name")?,
        location: row.try_get("location")?,
        nightly_rate,
        currency: row.try_get("currency")?,
        max_guests: parse_u32("max_guests", row.try_get("max_guests")?)?,
        check_in_time: row.try_get("check_in_time")?,
        check_out_time: row.try_get("check_out_time")?,
        amenities,
        approver_id: row.try_get("approver_id")?,
        payment_methods,
        id: PropertyId(id),
    })
}
