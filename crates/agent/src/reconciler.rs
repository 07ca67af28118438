use std::sync::{Arc, Mutex};

use serde::Serialize;

use innkeep_core::approvals::{
    parse_approver_reply, reconcile, ApprovalValidator, ApproverReply, ReconcileOutcome,
    CLARIFY_APPROVER_REPLY,
};
use innkeep_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use innkeep_core::domain::booking::{BookingId, BookingRecord, Decision};
use innkeep_core::domain::conversation::{ConversationKey, DateRange};
use innkeep_core::domain::event::{Actor, EventBatch, EventKind};
use innkeep_core::domain::message::OutboundMessage;
use innkeep_core::errors::{ApplicationError, DomainError};
use rust_decimal::Decimal;

use crate::runtime::AgentServices;
use crate::templates;

/// Downstream notification of a settled booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingLifecycleEvent {
    Confirmed {
        booking_id: BookingId,
        key: ConversationKey,
        dates: DateRange,
        total: Decimal,
        currency: String,
    },
    Cancelled {
        booking_id: BookingId,
        key: ConversationKey,
        reason: Option<String>,
    },
}

pub trait BookingEventSink: Send + Sync {
    fn publish(&self, event: BookingLifecycleEvent);
}

#[derive(Clone, Default)]
pub struct RecordingBookingEventSink {
    events: Arc<Mutex<Vec<BookingLifecycleEvent>>>,
}

impl RecordingBookingEventSink {
    pub fn events(&self) -> Vec<BookingLifecycleEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl BookingEventSink for RecordingBookingEventSink {
    fn publish(&self, event: BookingLifecycleEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingBookingEventSink;

impl BookingEventSink for TracingBookingEventSink {
    fn publish(&self, event: BookingLifecycleEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        tracing::info!(event_name = "booking.lifecycle.published", payload = %payload);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Applied,
    AlreadyDecided,
    AwaitingClarification,
    NoPendingBooking,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalReport {
    pub status: ApprovalStatus,
    pub decision: Option<Decision>,
    pub booking: Option<BookingRecord>,
    pub guest_notified: bool,
}

impl ApprovalReport {
    fn without_booking(status: ApprovalStatus) -> Self {
        Self { status, decision: None, booking: None, guest_notified: false }
    }
}

/// Applies approver decisions to bookings. Repeated decisions for the same booking return
/// the first outcome and never notify the guest twice.
pub struct ApprovalReconciler {
    services: AgentServices,
    validator: ApprovalValidator,
    sink: Arc<dyn BookingEventSink>,
}

impl ApprovalReconciler {
    pub fn new(services: AgentServices, sink: Arc<dyn BookingEventSink>) -> Self {
        Self { services, validator: ApprovalValidator, sink }
    }

    /// Free-text reply from an approver's chat. Resolves an explicit booking id in the text,
    /// otherwise the approver's most recent pending booking.
    pub async fn handle_approver_reply(
        &self,
        approver_id: &str,
        text: &str,
        message_id: &str,
    ) -> Result<ApprovalReport, ApplicationError> {
        let (decision, reason) = match parse_approver_reply(text) {
            ApproverReply::Approve => (Decision::Approve, None),
            ApproverReply::Reject { reason } => (Decision::Reject, reason),
            ApproverReply::Unclear => {
                tracing::info!(
                    event_name = "approval.reply.unclear",
                    approver_id,
                    message_id,
                    "approver reply needs clarification"
                );
                self.notify_approver(approver_id, CLARIFY_APPROVER_REPLY, message_id).await;
                return Ok(ApprovalReport::without_booking(ApprovalStatus::AwaitingClarification));
            }
        };

        let booking_id = match referenced_booking_id(text) {
            Some(booking_id) => Some(booking_id),
            None => self
                .services
                .bookings
                .latest_pending_for_approver(approver_id)
                .await
                .map_err(|error| ApplicationError::StorageUnavailable(error.to_string()))?
                .map(|record| record.id),
        };

        let Some(booking_id) = booking_id else {
            self.notify_approver(approver_id, &templates::no_pending_approvals(), message_id)
                .await;
            return Ok(ApprovalReport::without_booking(ApprovalStatus::NoPendingBooking));
        };

        let report =
            self.receive_decision(&booking_id, decision, approver_id, reason, message_id).await?;
        if let Some(record) = &report.booking {
            let applied = report.status == ApprovalStatus::Applied;
            self.notify_approver(approver_id, &templates::approver_ack(record, applied), message_id)
                .await;
        }
        Ok(report)
    }

    pub async fn receive_decision(
        &self,
        booking_id: &BookingId,
        decision: Decision,
        approver_id: &str,
        reason: Option<String>,
        message_id: &str,
    ) -> Result<ApprovalReport, ApplicationError> {
        let located = self.find(booking_id).await?;
        let _guard = self.services.locks.lock(&located.key).await;
        // Re-read under the lock; a guest turn may have been mid-flight.
        let record = self.find(booking_id).await?;

        let validation = self.validator.validate(&record, approver_id);
        let audit = AuditContext::new(
            Some(record.key.clone()),
            Some(record.id.clone()),
            message_id,
            format!("approver:{approver_id}"),
        );
        if !validation.allowed {
            self.services.audit.emit(
                AuditEvent::new(
                    &audit,
                    "approval.decision_rejected",
                    AuditCategory::Approval,
                    AuditOutcome::Rejected,
                )
                .with_metadata("reason", validation.reason.clone()),
            );
            return Err(DomainError::InvariantViolation(validation.reason).into());
        }

        let now = self.services.clock.now();
        let outcome = reconcile(record, decision, approver_id, reason, now)?;
        if let ReconcileOutcome::Applied { record, .. } = &outcome {
            self.services
                .bookings
                .save(record.clone())
                .await
                .map_err(|error| ApplicationError::StorageUnavailable(error.to_string()))?;
        }

        let record = outcome.record().clone();
        let settled = outcome.decision();
        let appended = self.record_decision_events(&record, settled, message_id).await?;

        let guest_notified = self.notify_guest(&record, settled).await;
        if appended {
            self.sink.publish(lifecycle_event(&record, settled));
        }

        let (event_type, status) = if outcome.is_applied() {
            ("approval.decision_applied", ApprovalStatus::Applied)
        } else {
            ("approval.decision_repeated", ApprovalStatus::AlreadyDecided)
        };
        self.services.audit.emit(
            AuditEvent::new(&audit, event_type, AuditCategory::Approval, AuditOutcome::Success)
                .with_metadata("decision", settled.as_str()),
        );
        tracing::info!(
            event_name = event_type,
            booking_id = %record.id,
            guest_id = %record.key.guest_id.0,
            property_id = %record.key.property_id.0,
            decision = settled.as_str(),
            guest_notified,
            "approver decision reconciled"
        );

        Ok(ApprovalReport {
            status,
            decision: Some(settled),
            booking: Some(record),
            guest_notified,
        })
    }

    async fn find(&self, booking_id: &BookingId) -> Result<BookingRecord, ApplicationError> {
        self.services
            .bookings
            .find_by_id(booking_id)
            .await
            .map_err(|error| ApplicationError::StorageUnavailable(error.to_string()))?
            .ok_or_else(|| ApplicationError::NotFound(format!("booking `{booking_id}`")))
    }

    /// Appends the decision to the guest's log unless an earlier call already did.
    async fn record_decision_events(
        &self,
        record: &BookingRecord,
        decision: Decision,
        message_id: &str,
    ) -> Result<bool, ApplicationError> {
        let store = &self.services.store;
        let events = store.events(&record.key).await?;
        let already_logged = events.iter().any(|event| match &event.kind {
            EventKind::BookingConfirmed { booking_id }
            | EventKind::BookingCancelled { booking_id, .. } => booking_id == &record.id,
            _ => false,
        });
        if already_logged {
            return Ok(false);
        }

        let snapshot = store.snapshot(&record.key).await?;
        let mut batch = EventBatch::new(
            record.key.clone(),
            format!("decision:{message_id}"),
            Actor::Approver,
            self.services.clock.now(),
        );
        match decision {
            Decision::Approve => {
                batch.push(EventKind::BookingConfirmed { booking_id: record.id.clone() });
            }
            Decision::Reject => {
                batch.push(EventKind::BookingCancelled {
                    booking_id: record.id.clone(),
                    reason: record.rejection_reason.clone(),
                });
                batch.push(EventKind::AttemptReset);
            }
        }

        let stored = store.append(&snapshot, batch.into_events()).await?;
        Ok(stored.appended > 0)
    }

    async fn notify_guest(&self, record: &BookingRecord, decision: Decision) -> bool {
        let text = match decision {
            Decision::Approve => {
                let property = self
                    .services
                    .properties
                    .find_by_id(&record.key.property_id)
                    .await
                    .ok()
                    .flatten();
                match property {
                    Some(property) => templates::booking_confirmed(record, &property),
                    None => templates::already_confirmed(record),
                }
            }
            Decision::Reject => templates::booking_rejected(record),
        };

        let message = OutboundMessage::new(
            record.key.guest_id.0.clone(),
            text,
            format!("decision:{}", record.id),
        );
        self.services.dispatcher.deliver(&message).await.is_delivered()
    }

    async fn notify_approver(&self, approver_id: &str, text: &str, message_id: &str) {
        let message = OutboundMessage::new(approver_id, text, format!("{message_id}:0"));
        self.services.dispatcher.deliver(&message).await;
    }
}

fn lifecycle_event(record: &BookingRecord, decision: Decision) -> BookingLifecycleEvent {
    match decision {
        Decision::Approve => BookingLifecycleEvent::Confirmed {
            booking_id: record.id.clone(),
            key: record.key.clone(),
            dates: record.dates,
            total: record.total_price,
            currency: record.currency.clone(),
        },
        Decision::Reject => BookingLifecycleEvent::Cancelled {
            booking_id: record.id.clone(),
            key: record.key.clone(),
            reason: record.rejection_reason.clone(),
        },
    }
}

fn referenced_booking_id(text: &str) -> Option<BookingId> {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-'))
        .find(|word| {
            word.len() > 3 && word.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("bk-"))
        })
        .map(|word| BookingId(word.to_ascii_uppercase()))
}
