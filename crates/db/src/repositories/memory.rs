use std::collections::HashMap;

use tokio::sync::RwLock;

use innkeep_core::domain::booking::{BookingId, BookingRecord, BookingStatus};
use innkeep_core::domain::conversation::ConversationKey;
use innkeep_core::domain::event::ConversationEvent;
use innkeep_core::domain::property::{Property, PropertyId};

use super::{
    AppendOutcome, BookingRepository, ConversationEventRepository, DeliveryLogRepository,
    DeliveryRecord, PropertyRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryConversationEventRepository {
    logs: RwLock<HashMap<ConversationKey, Vec<ConversationEvent>>>,
}

#[async_trait::async_trait]
impl ConversationEventRepository for InMemoryConversationEventRepository {
    async fn append(
        &self,
        key: &ConversationKey,
        expected_count: u64,
        events: &[ConversationEvent],
    ) -> Result<AppendOutcome, RepositoryError> {
        let mut logs = self.logs.write().await;
        let log = logs.entry(key.clone()).or_default();
        let prior_count = log.len() as u64;

        let mut appended = 0;
        for event in events {
            if log.iter().any(|existing| existing.id == event.id) {
                continue;
            }
            log.push(event.clone());
            appended += 1;
        }

        Ok(AppendOutcome { appended, prior_count, conflicted: prior_count != expected_count })
    }

    async fn list_for_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<ConversationEvent>, RepositoryError> {
        let logs = self.logs.read().await;
        Ok(logs.get(key).cloned().unwrap_or_default())
    }

    async fn contains_message(
        &self,
        key: &ConversationKey,
        message_id: &str,
    ) -> Result<bool, RepositoryError> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(key)
            .map(|log| log.iter().any(|event| event.message_id == message_id))
            .unwrap_or(false))
    }
}

#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<String, BookingRecord>>,
}

#[async_trait::async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<BookingRecord>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.get(&id.0).cloned())
    }

    async fn find_pending_for_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<BookingRecord>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(bookings.values().find(|record| &record.key == key && record.is_pending()).cloned())
    }

    async fn latest_pending_for_approver(
        &self,
        approver_id: &str,
    ) -> Result<Option<BookingRecord>, RepositoryError> {
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .filter(|record| record.approver_id == approver_id && record.is_pending())
            .max_by(|left, right| {
                left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
            })
            .cloned())
    }

    async fn list_confirmed_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<BookingRecord>, RepositoryError> {
        let bookings = self.bookings.read().await;
        let mut confirmed: Vec<BookingRecord> = bookings
            .values()
            .filter(|record| {
                &record.key.property_id == property_id
                    && record.booking_status == BookingStatus::Confirmed
            })
            .cloned()
            .collect();
        confirmed.sort_by_key(|record| record.dates.check_in);
        Ok(confirmed)
    }

    async fn insert_pending(&self, record: BookingRecord) -> Result<(), RepositoryError> {
        let mut bookings = self.bookings.write().await;
        let occupied = bookings
            .values()
            .any(|existing| existing.key == record.key && existing.is_pending());
        if occupied || bookings.contains_key(&record.id.0) {
            return Err(RepositoryError::Conflict(format!(
                "conversation `{}` already has a pending booking",
                record.key
            )));
        }
        bookings.insert(record.id.0.clone(), record);
        Ok(())
    }

    async fn save(&self, record: BookingRecord) -> Result<(), RepositoryError> {
        let mut bookings = self.bookings.write().await;
        bookings.insert(record.id.0.clone(), record);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPropertyRepository {
    properties: RwLock<HashMap<String, Property>>,
}

#[async_trait::async_trait]
impl PropertyRepository for InMemoryPropertyRepository {
    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError> {
        let properties = self.properties.read().await;
        Ok(properties.get(&id.0).cloned())
    }

    async fn list(&self) -> Result<Vec<Property>, RepositoryError> {
        let properties = self.properties.read().await;
        let mut all: Vec<Property> = properties.values().cloned().collect();
        all.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(all)
    }

    async fn save(&self, property: Property) -> Result<(), RepositoryError> {
        let mut properties = self.properties.write().await;
        properties.insert(property.id.0.clone(), property);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDeliveryLogRepository {
    deliveries: RwLock<HashMap<String, DeliveryRecord>>,
}

#[async_trait::async_trait]
impl DeliveryLogRepository for InMemoryDeliveryLogRepository {
    async fn find(&self, dedupe_key: &str) -> Result<Option<DeliveryRecord>, RepositoryError> {
        let deliveries = self.deliveries.read().await;
        Ok(deliveries.get(dedupe_key).cloned())
    }

    async fn record_delivered(&self, record: DeliveryRecord) -> Result<bool, RepositoryError> {
        let mut deliveries = self.deliveries.write().await;
        if deliveries.contains_key(&record.dedupe_key) {
            return Ok(false);
        }
        deliveries.insert(record.dedupe_key.clone(), record);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use innkeep_core::domain::conversation::ConversationKey;
    use innkeep_core::domain::event::{Actor, EventBatch, EventKind};

    use crate::repositories::{
        ConversationEventRepository, DeliveryLogRepository, DeliveryRecord,
        InMemoryConversationEventRepository, InMemoryDeliveryLogRepository,
    };

    #[tokio::test]
    async fn in_memory_event_log_skips_replayed_ids() {
        let repo = InMemoryConversationEventRepository::default();
        let key = ConversationKey::new("guest-1", "prop-1");
        let mut batch = EventBatch::new(key.clone(), "m-1", Actor::Guest, Utc::now());
        batch.push(EventKind::PaymentPromptAsked);

        let first = repo.append(&key, 0, batch.events()).await.expect("first append");
        let replay = repo.append(&key, 1, batch.events()).await.expect("replayed append");

        assert_eq!(first.appended, 1);
        assert_eq!(replay.appended, 0);
        assert!(!replay.conflicted);
        assert_eq!(repo.list_for_key(&key).await.expect("list").len(), 1);
        assert!(repo.contains_message(&key, "m-1").await.expect("lookup"));
        assert!(!repo.contains_message(&key, "m-2").await.expect("lookup"));
    }

    #[tokio::test]
    async fn in_memory_delivery_log_records_each_key_once() {
        let repo = InMemoryDeliveryLogRepository::default();
        let record = DeliveryRecord {
            dedupe_key: "m-1:0".to_string(),
            recipient_id: "guest-1".to_string(),
            attempts: 1,
            delivered_at: Utc::now(),
        };

        assert!(repo.record_delivered(record.clone()).await.expect("first record"));
        assert!(!repo.record_delivered(record.clone()).await.expect("second record"));
        assert_eq!(repo.find("m-1:0").await.expect("find"), Some(record));
    }
}
