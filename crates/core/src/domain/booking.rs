use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::conversation::{ConversationKey, DateRange};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl BookingId {
    /// Same guest message and attempt always name the same booking, so a retried turn
    /// finds the record it created the first time.
    pub fn derive(key: &ConversationKey, message_id: &str, attempt: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.guest_id.0.as_bytes());
        hasher.update([0x1f]);
        hasher.update(key.property_id.0.as_bytes());
        hasher.update([0x1f]);
        hasher.update(message_id.as_bytes());
        hasher.update([0x1f]);
        hasher.update(attempt.to_be_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("BK-{}", digest[..10].to_ascii_uppercase()))
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    None,
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(Self::None),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Draft,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "draft" => Some(Self::Draft),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub id: BookingId,
    pub key: ConversationKey,
    pub approver_id: String,
    pub dates: DateRange,
    pub total_price: Decimal,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
    pub screenshot_ref: String,
    pub payer_name: String,
    pub payer_bank: String,
    pub attempt: u32,
    pub decided_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl BookingRecord {
    pub fn is_pending(&self) -> bool {
        self.payment_status == PaymentStatus::Pending
    }

    /// The outcome this record already carries, if an approver has decided it.
    pub fn decision(&self) -> Option<Decision> {
        match (self.payment_status, self.booking_status) {
            (PaymentStatus::Approved, BookingStatus::Confirmed) => Some(Decision::Approve),
            (PaymentStatus::Rejected, BookingStatus::Cancelled) => Some(Decision::Reject),
            _ => None,
        }
    }

    pub fn can_decide(&self) -> bool {
        self.is_pending() && self.booking_status == BookingStatus::Draft
    }

    pub fn apply_decision(
        &mut self,
        decision: Decision,
        approver_id: &str,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_decide() {
            return Err(DomainError::InvalidBookingTransition {
                from: self.booking_status,
                payment: self.payment_status,
                decision,
            });
        }

        match decision {
            Decision::Approve => {
                self.booking_status = BookingStatus::Confirmed;
                self.payment_status = PaymentStatus::Approved;
            }
            Decision::Reject => {
                self.booking_status = BookingStatus::Cancelled;
                self.payment_status = PaymentStatus::Rejected;
                self.rejection_reason = reason;
            }
        }
        self.decided_by = Some(approver_id.to_string());
        self.decided_at = Some(at);
        Ok(())
    }
}
