use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::conversation::Phase;
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> Phase;
    fn transition(
        &self,
        current: &Phase,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Two-state Inquiry/Booking router. Booking is sticky: it is only left for a generic
/// property question while no payment evidence is in flight.
#[derive(Clone, Debug, Default)]
pub struct PhaseRouterFlow;

impl FlowDefinition for PhaseRouterFlow {
    fn initial_state(&self) -> Phase {
        Phase::Inquiry
    }

    fn transition(
        &self,
        current: &Phase,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_phase(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> Phase {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &Phase,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &Phase,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) if outcome.changed_phase() => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "routing.transition_applied",
                        AuditCategory::Routing,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Ok(_) => {}
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "routing.transition_rejected",
                        AuditCategory::Routing,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<PhaseRouterFlow> {
    fn default() -> Self {
        Self::new(PhaseRouterFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot leave {state:?} on {event:?} while payment intake is in progress")]
    IntakeInProgress { state: Phase, event: FlowEvent },
}

fn transition_phase(
    current: &Phase,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{HandleBooking, HandleInquiry, RecordPhaseChange};
    use FlowEvent::{
        BookingIntentExpressed, NegotiationWithKnownDates, NoRoutingSignal, PaymentMentioned,
        PropertyQuestionAsked,
    };
    use Phase::{Booking, Inquiry};

    let (to, actions) = match (current, event) {
        (Inquiry, BookingIntentExpressed)
        | (Inquiry, PaymentMentioned)
        | (Inquiry, NegotiationWithKnownDates) => (Booking, vec![RecordPhaseChange, HandleBooking]),
        (Inquiry, PropertyQuestionAsked) | (Inquiry, NoRoutingSignal) => {
            (Inquiry, vec![HandleInquiry])
        }
        (Booking, PropertyQuestionAsked) => {
            if context.intake_in_progress {
                return Err(FlowTransitionError::IntakeInProgress {
                    state: *current,
                    event: *event,
                });
            }
            (Inquiry, vec![RecordPhaseChange, HandleInquiry])
        }
        (Booking, _) => (Booking, vec![HandleBooking]),
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::conversation::{ConversationKey, Phase};
    use crate::flows::engine::{FlowDefinition, FlowEngine, FlowTransitionError, PhaseRouterFlow};
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent};

    #[test]
    fn booking_intent_moves_inquiry_to_booking() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&Phase::Inquiry, &FlowEvent::BookingIntentExpressed, &FlowContext::default())
            .expect("inquiry -> booking");

        assert_eq!(outcome.to, Phase::Booking);
        assert!(outcome.changed_phase());
        assert_eq!(outcome.actions, vec![FlowAction::RecordPhaseChange, FlowAction::HandleBooking]);
    }

    #[test]
    fn booking_is_sticky_for_non_question_signals() {
        let engine = FlowEngine::new(PhaseRouterFlow);
        for event in [
            FlowEvent::BookingIntentExpressed,
            FlowEvent::PaymentMentioned,
            FlowEvent::NegotiationWithKnownDates,
            FlowEvent::NoRoutingSignal,
        ] {
            let outcome =
                engine.apply(&Phase::Booking, &event, &FlowContext::default()).expect("stay");
            assert_eq!(outcome.to, Phase::Booking);
            assert!(!outcome.changed_phase());
        }
    }

    #[test]
    fn property_question_returns_to_inquiry_without_intake() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&Phase::Booking, &FlowEvent::PropertyQuestionAsked, &FlowContext::default())
            .expect("booking -> inquiry");
        assert_eq!(outcome.to, Phase::Inquiry);
    }

    #[test]
    fn property_question_is_refused_while_intake_is_in_progress() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &Phase::Booking,
                &FlowEvent::PropertyQuestionAsked,
                &FlowContext { intake_in_progress: true },
            )
            .expect_err("must not regress during intake");

        assert!(matches!(error, FlowTransitionError::IntakeInProgress { .. }));
    }

    #[test]
    fn replay_is_deterministic_for_same_event_sequence() {
        let engine = FlowEngine::default();
        let events = [
            FlowEvent::PropertyQuestionAsked,
            FlowEvent::BookingIntentExpressed,
            FlowEvent::NoRoutingSignal,
            FlowEvent::PropertyQuestionAsked,
        ];

        let run = |engine: &FlowEngine<PhaseRouterFlow>| {
            let mut state = engine.initial_state();
            let mut trail = Vec::new();
            for event in &events {
                let outcome = engine
                    .apply(&state, event, &FlowContext::default())
                    .expect("deterministic run");
                trail.push(outcome.to);
                state = outcome.to;
            }
            trail
        };

        assert_eq!(run(&engine), run(&engine));
        assert_eq!(PhaseRouterFlow.initial_state(), Phase::Inquiry);
    }

    #[test]
    fn only_phase_changes_emit_audit_events() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(
            Some(ConversationKey::new("guest-1", "prop-1")),
            None,
            "msg-42",
            "phase-router",
        );

        engine
            .apply_with_audit(
                &Phase::Inquiry,
                &FlowEvent::NoRoutingSignal,
                &FlowContext::default(),
                &sink,
                &audit,
            )
            .expect("stay in inquiry");
        engine
            .apply_with_audit(
                &Phase::Inquiry,
                &FlowEvent::PaymentMentioned,
                &FlowContext::default(),
                &sink,
                &audit,
            )
            .expect("inquiry -> booking");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "msg-42");
        assert_eq!(events[0].event_type, "routing.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("booking"));
    }
}
