//! Conversation context store: the event log is the only thing persisted, and every snapshot
//! is a fold over the full log for its key.

use std::sync::Arc;

use innkeep_core::domain::conversation::{ConversationContext, ConversationKey};
use innkeep_core::domain::event::ConversationEvent;
use innkeep_core::errors::ApplicationError;

use crate::repositories::{ConversationEventRepository, RepositoryError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredTurn {
    pub context: ConversationContext,
    pub appended: usize,
    pub conflicted: bool,
}

#[derive(Clone)]
pub struct ConversationStore {
    events: Arc<dyn ConversationEventRepository>,
}

impl ConversationStore {
    pub fn new(events: Arc<dyn ConversationEventRepository>) -> Self {
        Self { events }
    }

    pub async fn snapshot(
        &self,
        key: &ConversationKey,
    ) -> Result<ConversationContext, ApplicationError> {
        let events = self.events(key).await?;
        Ok(ConversationContext::fold(key.clone(), &events))
    }

    pub async fn events(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<ConversationEvent>, ApplicationError> {
        self.events.list_for_key(key).await.map_err(storage_unavailable)
    }

    pub async fn contains_message(
        &self,
        key: &ConversationKey,
        message_id: &str,
    ) -> Result<bool, ApplicationError> {
        self.events.contains_message(key, message_id).await.map_err(storage_unavailable)
    }

    /// Durably appends a turn's events on top of `snapshot`. When the log moved underneath
    /// the caller the append still lands and the returned context is refolded from storage.
    pub async fn append(
        &self,
        snapshot: &ConversationContext,
        events: Vec<ConversationEvent>,
    ) -> Result<StoredTurn, ApplicationError> {
        if events.is_empty() {
            return Ok(StoredTurn { context: snapshot.clone(), appended: 0, conflicted: false });
        }

        let key = &snapshot.key;
        let outcome = self
            .events
            .append(key, snapshot.event_count, &events)
            .await
            .map_err(storage_unavailable)?;

        if outcome.conflicted {
            tracing::warn!(
                event_name = "conversation.append.conflict",
                guest_id = %key.guest_id.0,
                property_id = %key.property_id.0,
                expected_count = snapshot.event_count,
                actual_count = outcome.prior_count,
                "conversation log advanced concurrently; last committed write wins"
            );
        }

        let context = if outcome.conflicted || outcome.appended != events.len() {
            self.snapshot(key).await?
        } else {
            let mut context = snapshot.clone();
            for event in &events {
                context.apply(event);
            }
            context
        };

        tracing::debug!(
            event_name = "conversation.events.appended",
            guest_id = %key.guest_id.0,
            property_id = %key.property_id.0,
            appended = outcome.appended,
            event_count = context.event_count,
            "conversation events appended"
        );

        Ok(StoredTurn { context, appended: outcome.appended, conflicted: outcome.conflicted })
    }
}

fn storage_unavailable(error: RepositoryError) -> ApplicationError {
    ApplicationError::StorageUnavailable(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};

    use innkeep_core::domain::conversation::{ConversationKey, DateRange};
    use innkeep_core::domain::event::{Actor, EventBatch, EventKind};

    use super::ConversationStore;
    use crate::repositories::InMemoryConversationEventRepository;

    fn range(from: u32, to: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 11, from).expect("valid date"),
            NaiveDate::from_ymd_opt(2025, 11, to).expect("valid date"),
        )
        .expect("valid range")
    }

    #[tokio::test]
    async fn snapshot_is_a_fold_of_everything_appended() {
        let store = ConversationStore::new(Arc::new(InMemoryConversationEventRepository::default()));
        let key = ConversationKey::new("guest-1", "prop-1");

        let empty = store.snapshot(&key).await.expect("empty snapshot");
        let mut batch = EventBatch::new(key.clone(), "m-1", Actor::Guest, Utc::now());
        batch.push(EventKind::DatesExtracted { range: range(24, 30) });
        let stored = store.append(&empty, batch.into_events()).await.expect("append");

        assert_eq!(stored.appended, 1);
        assert!(!stored.conflicted);
        assert_eq!(stored.context, store.snapshot(&key).await.expect("reloaded"));
        assert_eq!(stored.context.nights_count(), Some(6));
    }

    #[tokio::test]
    async fn stale_snapshot_append_is_flagged_and_refolded() {
        let store = ConversationStore::new(Arc::new(InMemoryConversationEventRepository::default()));
        let key = ConversationKey::new("guest-1", "prop-1");
        let stale = store.snapshot(&key).await.expect("snapshot");

        let mut first = EventBatch::new(key.clone(), "m-1", Actor::Guest, Utc::now());
        first.push(EventKind::DatesExtracted { range: range(24, 30) });
        store.append(&stale, first.into_events()).await.expect("first append");

        let mut second = EventBatch::new(key.clone(), "m-2", Actor::Guest, Utc::now());
        second.push(EventKind::DatesExtracted { range: range(24, 26) });
        let stored = store.append(&stale, second.into_events()).await.expect("second append");

        assert!(stored.conflicted);
        assert_eq!(stored.context.event_count, 2);
        assert_eq!(stored.context.nights_count(), Some(2));
    }
}
