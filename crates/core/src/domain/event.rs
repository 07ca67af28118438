use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::booking::BookingId;
use crate::domain::conversation::{ConversationKey, DateRange, DerivedPrice, Phase};
use crate::domain::message::MessageBody;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Content-addressed id: the same message replayed yields the same ids, so a duplicate
    /// append is rejected by the log instead of producing a second copy.
    pub fn derive(key: &ConversationKey, message_id: &str, sequence: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.guest_id.0.as_bytes());
        hasher.update([0x1f]);
        hasher.update(key.property_id.0.as_bytes());
        hasher.update([0x1f]);
        hasher.update(message_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(sequence.to_be_bytes());
        Self(format!("evt-{:x}", hasher.finalize()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Guest,
    Approver,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Approver => "approver",
            Self::System => "system",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "guest" => Some(Self::Guest),
            "approver" => Some(Self::Approver),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    MessageReceived {
        body: MessageBody,
    },
    DatesExtracted {
        range: DateRange,
    },
    PriceDerived {
        price: DerivedPrice,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    PaymentPromptAsked,
    PaymentInstructionsShown,
    IntakeFieldsMerged {
        screenshot_ref: Option<String>,
        payer_name: Option<String>,
        payer_bank: Option<String>,
    },
    IntakeCompleted,
    ApprovalRequested {
        booking_id: BookingId,
        approver_id: String,
    },
    BookingConfirmed {
        booking_id: BookingId,
    },
    BookingCancelled {
        booking_id: BookingId,
        reason: Option<String>,
    },
    /// A rejected attempt releases the slot; evidence and prompt guards start over.
    AttemptReset,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "message_received",
            Self::DatesExtracted { .. } => "dates_extracted",
            Self::PriceDerived { .. } => "price_derived",
            Self::PhaseChanged { .. } => "phase_changed",
            Self::PaymentPromptAsked => "payment_prompt_asked",
            Self::PaymentInstructionsShown => "payment_instructions_shown",
            Self::IntakeFieldsMerged { .. } => "intake_fields_merged",
            Self::IntakeCompleted => "intake_completed",
            Self::ApprovalRequested { .. } => "approval_requested",
            Self::BookingConfirmed { .. } => "booking_confirmed",
            Self::BookingCancelled { .. } => "booking_cancelled",
            Self::AttemptReset => "attempt_reset",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub id: EventId,
    pub key: ConversationKey,
    pub message_id: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    pub kind: EventKind,
}

/// Collects the events one turn produces so they share a message id and get stable,
/// sequential ids.
#[derive(Clone, Debug)]
pub struct EventBatch {
    key: ConversationKey,
    message_id: String,
    actor: Actor,
    occurred_at: DateTime<Utc>,
    events: Vec<ConversationEvent>,
}

impl EventBatch {
    pub fn new(
        key: ConversationKey,
        message_id: impl Into<String>,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self { key, message_id: message_id.into(), actor, occurred_at, events: Vec::new() }
    }

    pub fn push(&mut self, kind: EventKind) -> &ConversationEvent {
        let sequence = self.events.len();
        self.events.push(ConversationEvent {
            id: EventId::derive(&self.key, &self.message_id, sequence),
            key: self.key.clone(),
            message_id: self.message_id.clone(),
            actor: self.actor,
            occurred_at: self.occurred_at,
            kind,
        });
        &self.events[sequence]
    }

    pub fn events(&self) -> &[ConversationEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<ConversationEvent> {
        self.events
    }
}
