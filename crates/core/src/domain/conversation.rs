use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::booking::BookingId;
use crate::domain::event::{ConversationEvent, EventKind};
use crate::domain::property::PropertyId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuestId(pub String);

/// One negotiation thread: a single guest talking about a single property.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationKey {
    pub guest_id: GuestId,
    pub property_id: PropertyId,
}

impl ConversationKey {
    pub fn new(guest_id: impl Into<String>, property_id: impl Into<String>) -> Self {
        Self { guest_id: GuestId(guest_id.into()), property_id: PropertyId(property_id.into()) }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.guest_id.0, self.property_id.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Inquiry,
    Booking,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inquiry => "inquiry",
            Self::Booking => "booking",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "inquiry" => Some(Self::Inquiry),
            "booking" => Some(Self::Booking),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, DomainError> {
        if check_out <= check_in {
            return Err(DomainError::InvariantViolation(format!(
                "check-out {check_out} must be after check-in {check_in}"
            )));
        }
        Ok(Self { check_in, check_out })
    }

    pub fn nights(&self) -> u32 {
        let days = (self.check_out - self.check_in).num_days();
        u32::try_from(days).unwrap_or(0)
    }

    /// Half-open overlap: a check-out day may be another stay's check-in day.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            self.check_in.format("%B %-d, %Y"),
            self.check_out.format("%B %-d, %Y")
        )
    }
}

/// A price is only meaningful for the range it was computed against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedPrice {
    pub range: DateRange,
    pub nightly_rate: Decimal,
    pub nights: u32,
    pub total: Decimal,
    pub currency: String,
}

impl DerivedPrice {
    pub fn applies_to(&self, range: &DateRange) -> bool {
        &self.range == range
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntake {
    pub screenshot_ref: Option<String>,
    pub payer_name: Option<String>,
    pub payer_bank: Option<String>,
    pub completed: bool,
}

impl PaymentIntake {
    pub fn is_empty(&self) -> bool {
        self.screenshot_ref.is_none() && self.payer_name.is_none() && self.payer_bank.is_none()
    }

    pub fn has_all_fields(&self) -> bool {
        self.screenshot_ref.is_some() && self.payer_name.is_some() && self.payer_bank.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    pub message_id: String,
    pub at: DateTime<Utc>,
}

/// Snapshot of one conversation, derived from its event log and never stored on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub key: ConversationKey,
    pub active_phase: Phase,
    pub extracted_dates: Option<DateRange>,
    pub derived_price: Option<DerivedPrice>,
    /// The price that was superseded by the latest date change, kept to explain the change.
    pub previous_price: Option<DerivedPrice>,
    pub payment_intake: PaymentIntake,
    pub payment_prompt_asked: bool,
    pub instructions_shown: u32,
    pub booking_attempt: u32,
    pub pending_booking_id: Option<BookingId>,
    pub confirmed_booking_id: Option<BookingId>,
    pub transition_history: Vec<PhaseTransition>,
    pub event_count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ConversationContext {
    pub fn new(key: ConversationKey) -> Self {
        Self {
            key,
            active_phase: Phase::Inquiry,
            extracted_dates: None,
            derived_price: None,
            previous_price: None,
            payment_intake: PaymentIntake::default(),
            payment_prompt_asked: false,
            instructions_shown: 0,
            booking_attempt: 1,
            pending_booking_id: None,
            confirmed_booking_id: None,
            transition_history: Vec::new(),
            event_count: 0,
            last_updated: None,
        }
    }

    pub fn fold<'a, I>(key: ConversationKey, events: I) -> Self
    where
        I: IntoIterator<Item = &'a ConversationEvent>,
    {
        let mut context = Self::new(key);
        for event in events {
            context.apply(event);
        }
        context
    }

    pub fn nights_count(&self) -> Option<u32> {
        self.extracted_dates.as_ref().map(DateRange::nights)
    }

    /// Current price, but only if it still matches the current dates.
    pub fn current_price(&self) -> Option<&DerivedPrice> {
        match (&self.extracted_dates, &self.derived_price) {
            (Some(range), Some(price)) if price.applies_to(range) => Some(price),
            _ => None,
        }
    }

    pub fn intake_in_progress(&self) -> bool {
        !self.payment_intake.is_empty() || self.pending_booking_id.is_some()
    }

    pub fn apply(&mut self, event: &ConversationEvent) {
        match &event.kind {
            EventKind::MessageReceived { .. } => {}
            EventKind::DatesExtracted { range } => {
                if self.extracted_dates.as_ref() != Some(range) {
                    if let Some(price) = self.derived_price.take() {
                        if !price.applies_to(range) {
                            self.previous_price = Some(price);
                        } else {
                            self.derived_price = Some(price);
                        }
                    }
                    self.extracted_dates = Some(*range);
                }
            }
            EventKind::PriceDerived { price } => {
                self.derived_price = Some(price.clone());
            }
            EventKind::PhaseChanged { from, to } => {
                self.active_phase = *to;
                self.transition_history.push(PhaseTransition {
                    from: *from,
                    to: *to,
                    message_id: event.message_id.clone(),
                    at: event.occurred_at,
                });
            }
            EventKind::PaymentPromptAsked => self.payment_prompt_asked = true,
            EventKind::PaymentInstructionsShown => self.instructions_shown += 1,
            EventKind::IntakeFieldsMerged { screenshot_ref, payer_name, payer_bank } => {
                if !self.payment_intake.completed {
                    if let Some(value) = screenshot_ref {
                        self.payment_intake.screenshot_ref = Some(value.clone());
                    }
                    if let Some(value) = payer_name {
                        self.payment_intake.payer_name = Some(value.clone());
                    }
                    if let Some(value) = payer_bank {
                        self.payment_intake.payer_bank = Some(value.clone());
                    }
                }
            }
            EventKind::IntakeCompleted => self.payment_intake.completed = true,
            EventKind::ApprovalRequested { booking_id, .. } => {
                self.pending_booking_id = Some(booking_id.clone());
            }
            EventKind::BookingConfirmed { booking_id } => {
                if self.pending_booking_id.as_ref() == Some(booking_id) {
                    self.pending_booking_id = None;
                }
                self.confirmed_booking_id = Some(booking_id.clone());
            }
            EventKind::BookingCancelled { booking_id, .. } => {
                if self.pending_booking_id.as_ref() == Some(booking_id) {
                    self.pending_booking_id = None;
                }
            }
            EventKind::AttemptReset => {
                self.payment_intake = PaymentIntake::default();
                self.payment_prompt_asked = false;
                self.instructions_shown = 0;
                self.booking_attempt += 1;
            }
        }

        self.event_count += 1;
        self.last_updated = Some(event.occurred_at);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{ConversationContext, ConversationKey, DateRange, DerivedPrice, Phase};
    use crate::domain::booking::BookingId;
    use crate::domain::event::{Actor, EventBatch, EventKind};
    use crate::domain::message::MessageBody;

    fn range(from: u32, to: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 11, from).expect("valid date"),
            NaiveDate::from_ymd_opt(2025, 11, to).expect("valid date"),
        )
        .expect("valid range")
    }

    fn price_for(range: DateRange) -> DerivedPrice {
        let nightly_rate = Decimal::new(100, 0);
        DerivedPrice {
            range,
            nightly_rate,
            nights: range.nights(),
            total: nightly_rate * Decimal::from(range.nights()),
            currency: "USD".to_string(),
        }
    }

    fn text(body: &str) -> EventKind {
        EventKind::MessageReceived { body: MessageBody::Text { text: body.to_string() } }
    }

    #[test]
    fn date_range_rejects_inverted_or_empty_ranges() {
        let day = NaiveDate::from_ymd_opt(2025, 11, 24).expect("valid date");
        assert!(DateRange::new(day, day).is_err());
        assert_eq!(range(24, 30).nights(), 6);
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(range(24, 30).overlaps(&range(29, 30)));
        assert!(!range(24, 26).overlaps(&range(26, 28)));
    }

    #[test]
    fn dates_persist_across_turns_without_date_content() {
        let key = ConversationKey::new("guest-1", "prop-1");
        let mut events = Vec::new();

        let mut first = EventBatch::new(key.clone(), "m-1", Actor::Guest, Utc::now());
        first.push(text("2025-11-24 to 2025-11-30"));
        first.push(EventKind::DatesExtracted { range: range(24, 30) });
        first.push(EventKind::PriceDerived { price: price_for(range(24, 30)) });
        events.extend(first.into_events());

        for turn in 2..40 {
            let mut batch =
                EventBatch::new(key.clone(), format!("m-{turn}"), Actor::Guest, Utc::now());
            batch.push(text("tell me about the wifi"));
            events.extend(batch.into_events());
        }

        let context = ConversationContext::fold(key, &events);
        assert_eq!(context.extracted_dates, Some(range(24, 30)));
        assert_eq!(context.nights_count(), Some(6));
        assert_eq!(context.current_price().map(|price| price.total), Some(Decimal::new(600, 0)));
    }

    #[test]
    fn changing_dates_invalidates_price_and_keeps_previous_for_explanation() {
        let key = ConversationKey::new("guest-1", "prop-1");
        let mut batch = EventBatch::new(key.clone(), "m-1", Actor::Guest, Utc::now());
        batch.push(EventKind::DatesExtracted { range: range(24, 30) });
        batch.push(EventKind::PriceDerived { price: price_for(range(24, 30)) });
        batch.push(EventKind::DatesExtracted { range: range(24, 26) });

        let context = ConversationContext::fold(key, batch.events());
        assert!(context.current_price().is_none());
        assert_eq!(context.previous_price.as_ref().map(|price| price.nights), Some(6));
        assert_eq!(context.nights_count(), Some(2));
    }

    #[test]
    fn intake_merges_are_ignored_once_completed() {
        let key = ConversationKey::new("guest-1", "prop-1");
        let mut batch = EventBatch::new(key.clone(), "m-1", Actor::Guest, Utc::now());
        batch.push(EventKind::IntakeFieldsMerged {
            screenshot_ref: Some("file://a.jpg".to_string()),
            payer_name: Some("Ali Khan".to_string()),
            payer_bank: Some("JazzCash".to_string()),
        });
        batch.push(EventKind::IntakeCompleted);
        batch.push(EventKind::IntakeFieldsMerged {
            screenshot_ref: None,
            payer_name: Some("Someone Else".to_string()),
            payer_bank: None,
        });

        let context = ConversationContext::fold(key, batch.events());
        assert!(context.payment_intake.completed);
        assert_eq!(context.payment_intake.payer_name.as_deref(), Some("Ali Khan"));
    }

    #[test]
    fn rejection_reset_frees_the_slot_but_keeps_dates() {
        let key = ConversationKey::new("guest-1", "prop-1");
        let booking_id = BookingId("BK-1".to_string());
        let mut batch = EventBatch::new(key.clone(), "m-1", Actor::Guest, Utc::now());
        batch.push(EventKind::DatesExtracted { range: range(24, 30) });
        batch.push(EventKind::PhaseChanged { from: Phase::Inquiry, to: Phase::Booking });
        batch.push(EventKind::PaymentPromptAsked);
        batch.push(EventKind::IntakeCompleted);
        batch.push(EventKind::ApprovalRequested {
            booking_id: booking_id.clone(),
            approver_id: "host-1".to_string(),
        });
        batch.push(EventKind::BookingCancelled { booking_id, reason: None });
        batch.push(EventKind::AttemptReset);

        let context = ConversationContext::fold(key, batch.events());
        assert!(context.pending_booking_id.is_none());
        assert!(!context.payment_intake.completed);
        assert!(!context.payment_prompt_asked);
        assert_eq!(context.booking_attempt, 2);
        assert_eq!(context.active_phase, Phase::Booking);
        assert_eq!(context.extracted_dates, Some(range(24, 30)));
        assert_eq!(context.transition_history.len(), 1);
    }
}
