use serde::{Deserialize, Serialize};

use crate::domain::conversation::Phase;

/// Structured per-turn signals the router decides on. Produced by intent extraction;
/// the router never looks at raw text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSignals {
    pub booking_intent: bool,
    pub negotiation_mention: bool,
    pub payment_mention: bool,
    pub property_question: bool,
    /// Booking, payment or price vocabulary in the same message as a property question.
    pub commercial_keywords: bool,
    pub dates_known: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    BookingIntentExpressed,
    PaymentMentioned,
    NegotiationWithKnownDates,
    PropertyQuestionAsked,
    NoRoutingSignal,
}

impl FlowEvent {
    pub fn from_signals(signals: &RouterSignals) -> Self {
        if signals.booking_intent {
            Self::BookingIntentExpressed
        } else if signals.payment_mention {
            Self::PaymentMentioned
        } else if signals.negotiation_mention && signals.dates_known {
            Self::NegotiationWithKnownDates
        } else if signals.property_question && !signals.commercial_keywords {
            Self::PropertyQuestionAsked
        } else {
            Self::NoRoutingSignal
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub intake_in_progress: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    RecordPhaseChange,
    HandleInquiry,
    HandleBooking,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: Phase,
    pub to: Phase,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

impl TransitionOutcome {
    pub fn changed_phase(&self) -> bool {
        self.from != self.to
    }
}
