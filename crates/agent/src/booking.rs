use chrono::{DateTime, Utc};

use innkeep_core::domain::booking::{BookingId, BookingRecord, BookingStatus, PaymentStatus};
use innkeep_core::domain::event::EventKind;
use innkeep_core::domain::message::OutboundMessage;
use innkeep_core::flows::intake::{merge_intake, missing_fields, IntakeInput};
use innkeep_core::pricing::format_amount;

use crate::guardrails::{GuardrailIntent, GuardrailPolicy};
use crate::inquiry::topic_answers;
use crate::templates;
use crate::turn::{DateUpdate, PendingApproval, TurnDraft, TurnFacts};

/// Drives a guest from known dates through payment instructions and evidence intake to an
/// approval request.
#[derive(Clone, Debug, Default)]
pub struct BookingHandler {
    guardrails: GuardrailPolicy,
}

impl BookingHandler {
    pub fn new(guardrails: GuardrailPolicy) -> Self {
        Self { guardrails }
    }

    pub fn respond(
        &self,
        draft: &mut TurnDraft,
        facts: &TurnFacts<'_>,
        confirmed: Option<&BookingRecord>,
        now: DateTime<Utc>,
    ) {
        let signals = facts.signals;
        let property = facts.property;

        if let Some(record) = confirmed.filter(|_| draft.context().confirmed_booking_id.is_some())
        {
            let answers = topic_answers(property, signals, draft.context(), false);
            if answers.is_empty() {
                draft.reply(templates::already_confirmed(record));
            }
            for answer in answers {
                draft.reply(answer);
            }
            return;
        }

        if draft.context().pending_booking_id.is_some() {
            if let Some(notice) = facts.dates.notice(property) {
                draft.reply(notice);
            }
            for answer in topic_answers(property, signals, draft.context(), false) {
                draft.reply(answer);
            }
            draft.reply(templates::awaiting_approval());
            return;
        }

        let input = IntakeInput {
            screenshot_ref: signals.screenshot_ref.clone(),
            payer_name: signals.payer_name.clone(),
            payer_bank: signals.payer_bank.clone(),
        };
        let merged = merge_intake(&draft.context().payment_intake, &input);
        if !merged.applied.is_empty() {
            draft.record(EventKind::IntakeFieldsMerged {
                screenshot_ref: merged.applied.screenshot_ref.clone(),
                payer_name: merged.applied.payer_name.clone(),
                payer_bank: merged.applied.payer_bank.clone(),
            });
            tracing::info!(
                event_name = "intake.fields.merged",
                message_id = %draft.message_id(),
                state = ?merged.state,
                "payment evidence merged"
            );
        }

        if facts.attachment_failed {
            draft.reply(templates::attachment_retry());
        }

        if signals.dates.is_none() {
            if let Some(ambiguity) = &signals.date_ambiguity {
                draft.reply(ambiguity.clarifying_question());
                if draft.context().payment_intake.is_empty() {
                    return;
                }
            }
        }

        match facts.dates {
            DateUpdate::New(price) => draft.reply(templates::price_summary(price)),
            other => {
                if let Some(notice) = other.notice(property) {
                    draft.reply(notice);
                }
            }
        }

        let intake_started = !draft.context().payment_intake.is_empty();
        if intake_started {
            for answer in topic_answers(property, signals, draft.context(), false) {
                draft.reply(answer);
            }
            self.continue_intake(draft, facts, now);
            return;
        }

        let Some(price) = draft.context().current_price().cloned() else {
            if !matches!(facts.dates, DateUpdate::Past(_) | DateUpdate::Unavailable(_)) {
                draft.reply(templates::ask_for_dates());
            }
            return;
        };

        if signals.negotiation_mention {
            let decision = self.guardrails.evaluate(&GuardrailIntent::NegotiationRequest {
                nights: price.nights,
                total: format_amount(price.total, &price.currency),
            });
            tracing::info!(
                event_name = "guardrail.negotiation.denied",
                message_id = %draft.message_id(),
                nights = price.nights,
                "fixed-rate policy applied"
            );
            let mut text = decision.user_message().unwrap_or_default().to_string();
            if !draft.context().payment_prompt_asked {
                draft.record(EventKind::PaymentPromptAsked);
                text.push(' ');
                text.push_str(&templates::continue_to_payment_prompt());
            }
            draft.reply(text);
            return;
        }

        let wants_to_pay = signals.booking_intent
            || signals.affirmation
            || signals.payment_mention
            || facts.dates.priced().is_some();
        if wants_to_pay {
            let repeat = draft.context().instructions_shown > 0;
            draft.record(EventKind::PaymentInstructionsShown);
            draft.reply(templates::payment_instructions(property, &price, repeat));
            return;
        }

        let answers = topic_answers(property, signals, draft.context(), false);
        if answers.is_empty() && !draft.has_replies() {
            draft.reply(templates::payment_reminder());
        }
        for answer in answers {
            draft.reply(answer);
        }
    }

    fn continue_intake(&self, draft: &mut TurnDraft, facts: &TurnFacts<'_>, now: DateTime<Utc>) {
        let context = draft.context();
        let missing = missing_fields(&context.payment_intake);
        if !missing.is_empty() {
            draft.reply(templates::missing_intake_fields(&missing));
            return;
        }

        let Some(price) = context.current_price().cloned() else {
            draft.reply(templates::intake_awaiting_dates());
            return;
        };

        let intake = context.payment_intake.clone();
        let (Some(screenshot_ref), Some(payer_name), Some(payer_bank)) =
            (intake.screenshot_ref, intake.payer_name, intake.payer_bank)
        else {
            return;
        };

        let key = context.key.clone();
        let attempt = context.booking_attempt;
        let booking_id = BookingId::derive(&key, draft.message_id(), attempt);
        let approver_id = facts.property.approver_id.clone();

        let record = BookingRecord {
            id: booking_id.clone(),
            key,
            approver_id: approver_id.clone(),
            dates: price.range,
            total_price: price.total,
            currency: price.currency.clone(),
            payment_status: PaymentStatus::Pending,
            booking_status: BookingStatus::Draft,
            screenshot_ref: screenshot_ref.clone(),
            payer_name,
            payer_bank,
            attempt,
            decided_by: None,
            rejection_reason: None,
            created_at: now,
            decided_at: None,
        };
        let message = OutboundMessage::new(
            approver_id.clone(),
            templates::approval_request(&record, facts.property),
            format!("approval-request:{booking_id}"),
        )
        .with_attachment(Some(screenshot_ref));

        draft.record(EventKind::IntakeCompleted);
        draft.record(EventKind::ApprovalRequested { booking_id: booking_id.clone(), approver_id });
        tracing::info!(
            event_name = "booking.approval.requested",
            booking_id = %booking_id,
            message_id = %draft.message_id(),
            attempt,
            "payment evidence complete; approval requested"
        );

        draft.request_approval(PendingApproval { record, message });
        draft.reply(templates::intake_submitted());
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use innkeep_core::domain::conversation::{ConversationContext, ConversationKey, DateRange};
    use innkeep_core::domain::event::{Actor, EventKind};
    use innkeep_core::pricing::NightlyRatePricingEngine;
    use innkeep_db::fixtures::demo_property;

    use super::BookingHandler;
    use crate::conversation::{DateAmbiguity, ExtractedSignals};
    use crate::turn::{apply_dates, DateUpdate, TurnDraft, TurnFacts};

    fn priced_snapshot() -> ConversationContext {
        let snapshot = ConversationContext::new(ConversationKey::new("guest-1", "prop-lakeview"));
        let mut draft = TurnDraft::new(&snapshot, "m-0", Actor::Guest, Utc::now());
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 11, 24).expect("valid date"),
            NaiveDate::from_ymd_opt(2025, 11, 30).expect("valid date"),
        )
        .expect("valid range");
        let signals = ExtractedSignals { dates: Some(range), ..ExtractedSignals::default() };
        apply_dates(
            &mut draft,
            &signals,
            &demo_property(),
            &NightlyRatePricingEngine,
            &[],
            NaiveDate::from_ymd_opt(2025, 10, 18).expect("valid date"),
        );
        draft.context().clone()
    }

    fn run(snapshot: &ConversationContext, message_id: &str, signals: ExtractedSignals) -> TurnDraft {
        let property = demo_property();
        let mut draft = TurnDraft::new(snapshot, message_id, Actor::Guest, Utc::now());
        let facts = TurnFacts {
            property: &property,
            signals: &signals,
            dates: &DateUpdate::Absent,
            text: "",
            attachment_failed: false,
        };
        BookingHandler::default().respond(&mut draft, &facts, None, Utc::now());
        draft
    }

    #[test]
    fn negotiation_prompt_is_asked_once_per_attempt() {
        let negotiate =
            ExtractedSignals { negotiation_mention: true, ..ExtractedSignals::default() };

        let first = run(&priced_snapshot(), "m-1", negotiate.clone());
        assert!(first.replies()[0].contains("6 nights"));
        assert!(first.replies()[0].contains("continue to payment"));

        let second = run(first.context(), "m-2", negotiate);
        assert!(second.replies()[0].contains("USD 600.00"));
        assert!(!second.replies()[0].contains("continue to payment"));
    }

    #[test]
    fn complete_evidence_requests_approval_exactly_once() {
        let evidence = ExtractedSignals {
            screenshot_ref: Some("file://receipt.jpg".to_string()),
            payer_name: Some("Ali Khan".to_string()),
            payer_bank: Some("JazzCash".to_string()),
            payment_mention: true,
            ..ExtractedSignals::default()
        };

        let first = run(&priced_snapshot(), "m-1", evidence.clone());
        let approval = first.clone().into_parts().2.expect("approval requested");
        assert_eq!(approval.record.payer_name, "Ali Khan");
        assert_eq!(approval.message.recipient_id, "host-lakeview");
        assert_eq!(approval.message.attachment_ref.as_deref(), Some("file://receipt.jpg"));

        let second = run(first.context(), "m-2", evidence);
        let (events, _, approval) = second.into_parts();
        assert!(approval.is_none());
        assert!(!events
            .iter()
            .any(|event| matches!(event.kind, EventKind::ApprovalRequested { .. })));
    }

    #[test]
    fn date_clarification_does_not_hold_back_started_intake() {
        let partial = ExtractedSignals {
            screenshot_ref: Some("file://receipt.jpg".to_string()),
            payer_name: Some("Ali Khan".to_string()),
            payment_mention: true,
            ..ExtractedSignals::default()
        };
        let first = run(&priced_snapshot(), "m-1", partial);
        assert!(first.clone().into_parts().2.is_none());

        let bank_with_stray_date = ExtractedSignals {
            payer_bank: Some("JazzCash".to_string()),
            date_ambiguity: Some(DateAmbiguity::SingleDate),
            payment_mention: true,
            ..ExtractedSignals::default()
        };
        let second = run(first.context(), "m-2", bank_with_stray_date);
        assert!(second.replies()[0].contains("check-in and check-out dates"));
        let (_, _, approval) = second.into_parts();
        assert_eq!(approval.expect("approval requested").record.payer_bank, "JazzCash");
    }
}
