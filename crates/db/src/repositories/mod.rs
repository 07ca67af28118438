use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use innkeep_core::domain::booking::{BookingId, BookingRecord};
use innkeep_core::domain::conversation::ConversationKey;
use innkeep_core::domain::event::ConversationEvent;
use innkeep_core::domain::property::{Property, PropertyId};

pub mod booking;
pub mod conversation_event;
pub mod delivery;
pub mod memory;
pub mod property;

pub use booking::SqlBookingRepository;
pub use conversation_event::SqlConversationEventRepository;
pub use delivery::SqlDeliveryLogRepository;
pub use memory::{
    InMemoryBookingRepository, InMemoryConversationEventRepository,
    InMemoryDeliveryLogRepository, InMemoryPropertyRepository,
};
pub use property::SqlPropertyRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Result of appending a turn's events to a conversation log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Events actually written; ids already in the log are skipped.
    pub appended: usize,
    /// Log length before this append.
    pub prior_count: u64,
    /// The log had grown past what the caller last read.
    pub conflicted: bool,
}

#[async_trait]
pub trait ConversationEventRepository: Send + Sync {
    /// Appends in order. `expected_count` is the log length the caller folded its snapshot
    /// from; a mismatch is reported, not refused.
    async fn append(
        &self,
        key: &ConversationKey,
        expected_count: u64,
        events: &[ConversationEvent],
    ) -> Result<AppendOutcome, RepositoryError>;

    async fn list_for_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<ConversationEvent>, RepositoryError>;

    async fn contains_message(
        &self,
        key: &ConversationKey,
        message_id: &str,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_by_id(&self, id: &BookingId) -> Result<Option<BookingRecord>, RepositoryError>;

    async fn find_pending_for_key(
        &self,
        key: &ConversationKey,
    ) -> Result<Option<BookingRecord>, RepositoryError>;

    /// Most recently created pending booking routed to this approver.
    async fn latest_pending_for_approver(
        &self,
        approver_id: &str,
    ) -> Result<Option<BookingRecord>, RepositoryError>;

    async fn list_confirmed_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<BookingRecord>, RepositoryError>;

    /// Inserts a new pending record. Fails with `Conflict` if the key already has one.
    async fn insert_pending(&self, record: BookingRecord) -> Result<(), RepositoryError>;

    async fn save(&self, record: BookingRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<Property>, RepositoryError>;
    async fn list(&self) -> Result<Vec<Property>, RepositoryError>;
    async fn save(&self, property: Property) -> Result<(), RepositoryError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub dedupe_key: String,
    pub recipient_id: String,
    pub attempts: u32,
    pub delivered_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeliveryLogRepository: Send + Sync {
    async fn find(&self, dedupe_key: &str) -> Result<Option<DeliveryRecord>, RepositoryError>;

    /// Records a completed delivery. Returns `false` if the key was already recorded.
    async fn record_delivered(&self, record: DeliveryRecord) -> Result<bool, RepositoryError>;
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    error.as_database_error().map(|database| database.is_unique_violation()).unwrap_or(false)
}
