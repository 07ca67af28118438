use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use innkeep_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use innkeep_core::domain::booking::{BookingId, BookingRecord, Decision};
use innkeep_core::domain::conversation::{ConversationContext, ConversationKey, Phase};
use innkeep_core::domain::event::{Actor, EventKind};
use innkeep_core::domain::message::{InboundMessage, OutboundMessage};
use innkeep_core::errors::{ApplicationError, DomainError};
use innkeep_core::flows::{
    FlowAction, FlowContext, FlowEngine, FlowEvent, FlowTransitionError, PhaseRouterFlow,
    TransitionOutcome,
};
use innkeep_core::pricing::{NightlyRatePricingEngine, PricingEngine};
use innkeep_db::repositories::{
    BookingRepository, InMemoryBookingRepository, InMemoryConversationEventRepository,
    InMemoryDeliveryLogRepository, InMemoryPropertyRepository, PropertyRepository,
    RepositoryError,
};
use innkeep_db::store::ConversationStore;

use crate::attachments::{AttachmentStore, TransportHostedAttachments};
use crate::booking::BookingHandler;
use crate::conversation::{ExtractedSignals, IntentExtractor};
use crate::delivery::{DeliveryDispatcher, RetryPolicy, Transport};
use crate::guardrails::GuardrailPolicy;
use crate::inquiry::InquiryHandler;
use crate::llm::LlmClient;
use crate::locks::ConversationLocks;
use crate::reconciler::{ApprovalReconciler, ApprovalReport, BookingEventSink};
use crate::turn::{apply_dates, Clock, SystemClock, TurnDraft, TurnFacts};

/// Storage, delivery and coordination handles shared by guest turns and approver decisions.
#[derive(Clone)]
pub struct AgentServices {
    pub store: ConversationStore,
    pub properties: Arc<dyn PropertyRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub dispatcher: DeliveryDispatcher,
    pub attachments: Arc<dyn AttachmentStore>,
    pub locks: ConversationLocks,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

impl AgentServices {
    pub fn in_memory(transport: Arc<dyn Transport>) -> Self {
        Self {
            store: ConversationStore::new(Arc::new(InMemoryConversationEventRepository::default())),
            properties: Arc::new(InMemoryPropertyRepository::default()),
            bookings: Arc::new(InMemoryBookingRepository::default()),
            dispatcher: DeliveryDispatcher::new(
                transport,
                Arc::new(InMemoryDeliveryLogRepository::default()),
                RetryPolicy::default(),
            ),
            attachments: Arc::new(TransportHostedAttachments),
            locks: ConversationLocks::default(),
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_attachments(mut self, attachments: Arc<dyn AttachmentStore>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// What one inbound guest message did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    pub message_id: String,
    /// The message id had been processed before; nothing was recorded or sent.
    pub duplicate: bool,
    pub phase: Phase,
    pub replies: Vec<String>,
    pub approval_requested: Option<BookingId>,
    /// The log advanced while this turn ran; the stored context was refolded.
    pub conflicted: bool,
    /// Dedupe keys of messages that could not be delivered this turn.
    pub undelivered: Vec<String>,
    pub context: ConversationContext,
}

pub struct AgentRuntime {
    services: AgentServices,
    extractor: IntentExtractor,
    router: FlowEngine<PhaseRouterFlow>,
    pricing: Arc<dyn PricingEngine>,
    inquiry: InquiryHandler,
    booking: BookingHandler,
    reconciler: ApprovalReconciler,
}

impl AgentRuntime {
    pub fn new(
        services: AgentServices,
        llm: Arc<dyn LlmClient>,
        llm_timeout: Duration,
        sink: Arc<dyn BookingEventSink>,
    ) -> Self {
        let guardrails = GuardrailPolicy::default();
        Self {
            reconciler: ApprovalReconciler::new(services.clone(), sink),
            services,
            extractor: IntentExtractor::new(),
            router: FlowEngine::default(),
            pricing: Arc::new(NightlyRatePricingEngine),
            inquiry: InquiryHandler::new(llm, llm_timeout, guardrails.clone()),
            booking: BookingHandler::new(guardrails),
        }
    }

    pub fn services(&self) -> &AgentServices {
        &self.services
    }

    pub async fn snapshot(
        &self,
        key: &ConversationKey,
    ) -> Result<ConversationContext, ApplicationError> {
        self.services.store.snapshot(key).await
    }

    pub async fn handle_approver_reply(
        &self,
        approver_id: &str,
        text: &str,
        message_id: &str,
    ) -> Result<ApprovalReport, ApplicationError> {
        self.reconciler.handle_approver_reply(approver_id, text, message_id).await
    }

    pub async fn receive_decision(
        &self,
        booking_id: &BookingId,
        decision: Decision,
        approver_id: &str,
        reason: Option<String>,
        message_id: &str,
    ) -> Result<ApprovalReport, ApplicationError> {
        self.reconciler.receive_decision(booking_id, decision, approver_id, reason, message_id).await
    }

    pub async fn handle_message(
        &self,
        message: InboundMessage,
    ) -> Result<TurnReport, ApplicationError> {
        let key = message.key.clone();
        let _guard = self.services.locks.lock(&key).await;
        let store = &self.services.store;

        tracing::info!(
            event_name = "conversation.turn.received",
            correlation_id = %message.message_id,
            guest_id = %key.guest_id.0,
            property_id = %key.property_id.0,
            kind = message.body.kind(),
            "guest message received"
        );

        if store.contains_message(&key, &message.message_id).await? {
            let context = store.snapshot(&key).await?;
            tracing::info!(
                event_name = "conversation.turn.duplicate",
                correlation_id = %message.message_id,
                guest_id = %key.guest_id.0,
                property_id = %key.property_id.0,
                "message already processed"
            );
            return Ok(TurnReport {
                message_id: message.message_id,
                duplicate: true,
                phase: context.active_phase,
                replies: Vec::new(),
                approval_requested: None,
                conflicted: false,
                undelivered: Vec::new(),
                context,
            });
        }

        let snapshot = store.snapshot(&key).await?;
        let property = self
            .services
            .properties
            .find_by_id(&key.property_id)
            .await
            .map_err(storage_unavailable)?
            .ok_or_else(|| ApplicationError::NotFound(format!("property `{}`", key.property_id)))?;

        let now = self.services.clock.now();
        let today = self.services.clock.today();
        let mut signals = self.extractor.extract(&message.body, &snapshot, today);
        let attachment_failed = self.store_attachment(&mut signals, &message.message_id).await;

        let mut draft = TurnDraft::new(&snapshot, message.message_id.clone(), Actor::Guest, now);
        draft.record(EventKind::MessageReceived { body: message.body.clone() });

        let route = self.route(&snapshot, &signals, &message.message_id);
        if route.changed_phase() {
            draft.record(EventKind::PhaseChanged { from: route.from, to: route.to });
        }

        let confirmed = self
            .services
            .bookings
            .list_confirmed_for_property(&key.property_id)
            .await
            .map_err(storage_unavailable)?;
        let dates = apply_dates(
            &mut draft,
            &signals,
            &property,
            self.pricing.as_ref(),
            &confirmed,
            today,
        );

        let facts = TurnFacts {
            property: &property,
            signals: &signals,
            dates: &dates,
            text: message.body.text().unwrap_or_default(),
            attachment_failed,
        };
        if route.actions.contains(&FlowAction::HandleBooking) {
            let own_confirmed = draft
                .context()
                .confirmed_booking_id
                .as_ref()
                .and_then(|id| confirmed.iter().find(|record| &record.id == id));
            self.booking.respond(&mut draft, &facts, own_confirmed, now);
        } else {
            self.inquiry.respond(&mut draft, &facts).await;
        }

        let (events, replies, approval) = draft.into_parts();
        if let Some(approval) = &approval {
            self.insert_pending(approval.record.clone()).await?;
        }

        let stored = store.append(&snapshot, events).await?;

        let mut outgoing: Vec<OutboundMessage> = replies
            .iter()
            .enumerate()
            .map(|(index, text)| {
                OutboundMessage::new(
                    key.guest_id.0.clone(),
                    text.clone(),
                    format!("{}:{index}", message.message_id),
                )
            })
            .collect();
        let approval_requested = approval.as_ref().map(|approval| approval.record.id.clone());
        if let Some(approval) = approval {
            let audit = AuditContext::new(
                Some(key.clone()),
                Some(approval.record.id.clone()),
                message.message_id.clone(),
                "guest",
            );
            self.services.audit.emit(AuditEvent::new(
                &audit,
                "intake.approval_requested",
                AuditCategory::Intake,
                AuditOutcome::Success,
            ));
            outgoing.push(approval.message);
        }

        let outcomes = self.services.dispatcher.deliver_all(&outgoing).await;
        let undelivered: Vec<String> = outgoing
            .iter()
            .zip(outcomes)
            .filter(|(_, outcome)| !outcome.is_delivered())
            .map(|(message, _)| message.dedupe_key.clone())
            .collect();

        tracing::info!(
            event_name = "conversation.turn.completed",
            correlation_id = %message.message_id,
            guest_id = %key.guest_id.0,
            property_id = %key.property_id.0,
            phase = stored.context.active_phase.as_str(),
            appended = stored.appended,
            replies = replies.len(),
            undelivered = undelivered.len(),
            "guest turn completed"
        );

        Ok(TurnReport {
            message_id: message.message_id,
            duplicate: false,
            phase: stored.context.active_phase,
            replies,
            approval_requested,
            conflicted: stored.conflicted,
            undelivered,
            context: stored.context,
        })
    }

    fn route(
        &self,
        snapshot: &ConversationContext,
        signals: &ExtractedSignals,
        message_id: &str,
    ) -> TransitionOutcome {
        let event = FlowEvent::from_signals(&signals.router_signals(snapshot));
        let context = FlowContext { intake_in_progress: snapshot.intake_in_progress() };
        let audit = AuditContext::new(Some(snapshot.key.clone()), None, message_id, "guest");

        match self.router.apply_with_audit(
            &snapshot.active_phase,
            &event,
            &context,
            self.services.audit.as_ref(),
            &audit,
        ) {
            Ok(outcome) => outcome,
            Err(FlowTransitionError::IntakeInProgress { state, event }) => {
                tracing::debug!(
                    event_name = "routing.booking.retained",
                    correlation_id = %message_id,
                    "payment intake in progress; staying in booking"
                );
                TransitionOutcome {
                    from: state,
                    to: state,
                    event,
                    actions: vec![FlowAction::HandleBooking],
                }
            }
        }
    }

    /// Swaps the transport's attachment reference for a stored one. Returns true when the
    /// attachment could not be kept; the rest of the message is still processed.
    async fn store_attachment(&self, signals: &mut ExtractedSignals, message_id: &str) -> bool {
        let Some(reference) = signals.screenshot_ref.take() else {
            return false;
        };
        match self.services.attachments.persist(&reference).await {
            Ok(stored) => {
                signals.screenshot_ref = Some(stored);
                false
            }
            Err(error) => {
                let failure = ApplicationError::TransientIntakeFailure(error.to_string());
                tracing::warn!(
                    event_name = "intake.attachment.failed",
                    correlation_id = %message_id,
                    error = %failure,
                    "screenshot could not be stored; guest asked to resend"
                );
                true
            }
        }
    }

    /// A replayed turn derives the same booking id, so finding it already stored is success.
    async fn insert_pending(
        &self,
        record: BookingRecord,
    ) -> Result<(), ApplicationError> {
        let booking_id = record.id.clone();
        match self.services.bookings.insert_pending(record).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Conflict(detail)) => {
                let existing = self
                    .services
                    .bookings
                    .find_by_id(&booking_id)
                    .await
                    .map_err(storage_unavailable)?;
                if existing.is_some() {
                    tracing::info!(
                        event_name = "booking.insert.replayed",
                        booking_id = %booking_id,
                        "pending booking already stored"
                    );
                    Ok(())
                } else {
                    Err(DomainError::InvariantViolation(detail).into())
                }
            }
            Err(error) => Err(storage_unavailable(error)),
        }
    }
}

fn storage_unavailable(error: RepositoryError) -> ApplicationError {
    ApplicationError::StorageUnavailable(error.to_string())
}
