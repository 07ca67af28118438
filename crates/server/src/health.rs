use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use innkeep_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    delivery_mode: &'static str,
}

impl HealthState {
    pub fn new(db_pool: DbPool, delivery_mode: &'static str) -> Self {
        Self { db_pool, delivery_mode }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: "ready", detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: "degraded", detail: detail.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub listings: HealthCheck,
    pub delivery: HealthCheck,
    pub checked_at: String,
}

/// Readiness probe. The service is ready when the event log is writable and at least one
/// listing exists for guests to talk about.
pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, listings) = match listing_count(&state.db_pool).await {
        Ok(count) => (
            HealthCheck::ready("database query succeeded"),
            if count > 0 {
                HealthCheck::ready(format!("{count} listing(s) configured"))
            } else {
                HealthCheck::degraded("no listings configured; run `innkeep seed`")
            },
        ),
        Err(error) => (
            HealthCheck::degraded(format!("database query failed: {error}")),
            HealthCheck::degraded("listings unknown while the database is unreachable"),
        ),
    };
    let ready = database.status == "ready" && listings.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        listings,
        delivery: HealthCheck::ready(state.delivery_mode),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn listing_count(pool: &DbPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM property").fetch_one(pool).await
}
