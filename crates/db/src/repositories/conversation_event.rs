use sqlx::{sqlite::SqliteRow, Row};

use innkeep_core::domain::conversation::ConversationKey;
use innkeep_core::domain::event::{Actor, ConversationEvent, EventId, EventKind};

use super::{parse_timestamp, AppendOutcome, ConversationEventRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationEventRepository {
    pool: DbPool,
}

impl SqlConversationEventRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationEventRepository for SqlConversationEventRepository {
    async fn append(
        &self,
        key: &ConversationKey,
        expected_count: u64,
        events: &[ConversationEvent],
    ) -> Result<AppendOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let prior_count = sqlx::query(
            "SELECT COUNT(*) AS count
             FROM conversation_event
             WHERE guest_id = ? AND property_id = ?",
        )
        .bind(&key.guest_id.0)
        .bind(&key.property_id.0)
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("count")?;
        let prior_count = u64::try_from(prior_count).map_err(|_| {
            RepositoryError::Decode(format!("negative event count for `{key}`: {prior_count}"))
        })?;

        let mut appended = 0;
        for event in events {
            let payload_json = serde_json::to_string(&event.kind).map_err(|error| {
                RepositoryError::Decode(format!("could not encode event `{}`: {error}", event.id.0))
            })?;

            // Position is assigned in the same statement so concurrent writers cannot collide.
            let result = sqlx::query(
                "INSERT INTO conversation_event (
                    id,
                    guest_id,
                    property_id,
                    position,
                    message_id,
                    actor,
                    event_type,
                    payload_json,
                    occurred_at
                 )
                 SELECT ?, ?, ?, COALESCE(MAX(position) + 1, 0), ?, ?, ?, ?, ?
                 FROM conversation_event
                 WHERE guest_id = ? AND property_id = ?
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(&event.id.0)
            .bind(&key.guest_id.0)
            .bind(&key.property_id.0)
            .bind(&event.message_id)
            .bind(event.actor.as_str())
            .bind(event.kind.name())
            .bind(payload_json)
            .bind(event.occurred_at.to_rfc3339())
            .bind(&key.guest_id.0)
            .bind(&key.property_id.0)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                appended += 1;
            }
        }

        tx.commit().await?;

        Ok(AppendOutcome { appended, prior_count, conflicted: prior_count != expected_count })
    }

    async fn list_for_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<ConversationEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                guest_id,
                property_id,
                message_id,
                actor,
                payload_json,
                occurred_at
             FROM conversation_event
             WHERE guest_id = ? AND property_id = ?
             ORDER BY position ASC",
        )
        .bind(&key.guest_id.0)
        .bind(&key.property_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn contains_message(
        &self,
        key: &ConversationKey,
        message_id: &str,
    ) -> Result<bool, RepositoryError> {
        let present = sqlx::query(
            "SELECT EXISTS(
                SELECT 1 FROM conversation_event
                WHERE guest_id = ? AND property_id = ? AND message_id = ?
             ) AS present",
        )
        .bind(&key.guest_id.0)
        .bind(&key.property_id.0)
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?
        .try_get::<i64, _>("present")?;

        Ok(present != 0)
    }
}

fn event_from_row(row: SqliteRow) -> Result<ConversationEvent, RepositoryError> {
    let id: String = row.try_get("id")?;
    let actor_raw = row.try_get::<String, _>("actor")?;
    let actor = Actor::parse(&actor_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown event actor `{actor_raw}`")))?;
    let payload_json = row.try_get::<String, _>("payload_json")?;
    let kind = serde_json::from_str::<EventKind>(&payload_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid payload for event `{id}`: {error}"))
    })?;

    Ok(ConversationEvent {
        key: ConversationKey::new(
            row.try_get::<String, _>("guest_id")?,
            row.try_get::<String, _>("property_id")?,
        ),
        message_id: row.try_get("message_id")?,
        actor,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
        kind,
        id: EventId(id),
    })
}
