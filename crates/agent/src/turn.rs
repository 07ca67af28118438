//! Per-turn working state shared by the inquiry and booking handlers.

use chrono::{DateTime, NaiveDate, Utc};

use innkeep_core::domain::booking::BookingRecord;
use innkeep_core::domain::conversation::{ConversationContext, DateRange, DerivedPrice};
use innkeep_core::domain::event::{Actor, ConversationEvent, EventBatch, EventKind};
use innkeep_core::domain::message::OutboundMessage;
use innkeep_core::domain::property::Property;
use innkeep_core::pricing::PricingEngine;

use crate::conversation::ExtractedSignals;
use crate::templates;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, for tests and transcript replays.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn on(date: NaiveDate) -> Self {
        Self(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A booking record created this turn, with the message that asks the approver to decide it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingApproval {
    pub record: BookingRecord,
    pub message: OutboundMessage,
}

/// Everything a handler produces for one inbound message. Events are applied to the working
/// context as they are recorded, so later steps see earlier ones.
#[derive(Clone, Debug)]
pub struct TurnDraft {
    context: ConversationContext,
    message_id: String,
    batch: EventBatch,
    replies: Vec<String>,
    approval: Option<PendingApproval>,
}

impl TurnDraft {
    pub fn new(
        snapshot: &ConversationContext,
        message_id: impl Into<String>,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Self {
        let message_id = message_id.into();
        Self {
            context: snapshot.clone(),
            batch: EventBatch::new(snapshot.key.clone(), message_id.clone(), actor, at),
            message_id,
            replies: Vec::new(),
            approval: None,
        }
    }

    pub fn record(&mut self, kind: EventKind) {
        let event = self.batch.push(kind).clone();
        self.context.apply(&event);
    }

    pub fn reply(&mut self, text: impl Into<String>) {
        self.replies.push(text.into());
    }

    pub fn request_approval(&mut self, approval: PendingApproval) {
        self.approval = Some(approval);
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn replies(&self) -> &[String] {
        &self.replies
    }

    pub fn has_replies(&self) -> bool {
        !self.replies.is_empty()
    }

    pub fn into_parts(self) -> (Vec<ConversationEvent>, Vec<String>, Option<PendingApproval>) {
        (self.batch.into_events(), self.replies, self.approval)
    }
}

/// Read-only inputs a phase handler works from.
#[derive(Clone, Copy, Debug)]
pub struct TurnFacts<'a> {
    pub property: &'a Property,
    pub signals: &'a ExtractedSignals,
    pub dates: &'a DateUpdate,
    pub text: &'a str,
    /// The attachment in this message could not be stored; the guest has to resend it.
    pub attachment_failed: bool,
}

/// What the dates in this message did to the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DateUpdate {
    /// No complete range in the message; prior dates stay authoritative.
    Absent,
    Unchanged,
    New(DerivedPrice),
    Changed { previous: DerivedPrice, current: DerivedPrice },
    Past(DateRange),
    Unavailable(DateRange),
    /// A booking request or confirmed stay already holds these dates.
    Locked(DateRange),
}

impl DateUpdate {
    /// Shared wording for every outcome except a fresh price, which each phase phrases
    /// differently.
    pub fn notice(&self, property: &Property) -> Option<String> {
        match self {
            Self::Changed { previous, current } => Some(templates::price_changed(previous, current)),
            Self::Past(range) => Some(templates::check_in_in_past(range)),
            Self::Unavailable(range) => Some(templates::unavailable(property, range)),
            Self::Locked(range) => Some(templates::dates_locked(range)),
            Self::Absent | Self::Unchanged | Self::New(_) => None,
        }
    }

    pub fn priced(&self) -> Option<&DerivedPrice> {
        match self {
            Self::New(current) | Self::Changed { current, .. } => Some(current),
            _ => None,
        }
    }
}

/// Records a newly supplied range and its price. Rejected ranges leave the context untouched.
pub fn apply_dates(
    draft: &mut TurnDraft,
    signals: &ExtractedSignals,
    property: &Property,
    pricing: &dyn PricingEngine,
    confirmed: &[BookingRecord],
    today: NaiveDate,
) -> DateUpdate {
    let Some(range) = signals.dates else {
        return DateUpdate::Absent;
    };

    let context = draft.context();
    if context.extracted_dates == Some(range) && context.current_price().is_some() {
        return DateUpdate::Unchanged;
    }

    let locked = context.pending_booking_id.is_some()
        || context.payment_intake.completed
        || context.confirmed_booking_id.is_some();
    if locked {
        return DateUpdate::Locked(context.extracted_dates.unwrap_or(range));
    }

    if range.check_in < today {
        return DateUpdate::Past(range);
    }

    if confirmed.iter().any(|booking| booking.key != context.key && booking.dates.overlaps(&range))
    {
        return DateUpdate::Unavailable(range);
    }

    let previous = context.current_price().cloned();
    let result = pricing.price(property, &range);
    tracing::debug!(
        event_name = "pricing.derived",
        property_id = %property.id,
        nights = result.price.nights,
        total = %result.price.total,
        steps = result.trace.steps.len(),
        "price derived from nightly rate"
    );

    draft.record(EventKind::DatesExtracted { range });
    draft.record(EventKind::PriceDerived { price: result.price.clone() });

    match previous {
        Some(previous) => DateUpdate::Changed { previous, current: result.price },
        None => DateUpdate::New(result.price),
    }
}
