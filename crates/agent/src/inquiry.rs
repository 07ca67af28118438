use std::sync::Arc;
use std::time::Duration;

use innkeep_core::domain::conversation::ConversationContext;
use innkeep_core::domain::property::Property;

use crate::conversation::{ExtractedSignals, PropertyTopic};
use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy, CANNED_CLARIFICATION};
use crate::llm::{generate_with_timeout, LlmClient};
use crate::templates;
use crate::turn::{DateUpdate, TurnDraft, TurnFacts};

/// Answers questions about the property and its availability. Facts come from the property
/// record; generated text is only used for questions the record cannot answer directly.
pub struct InquiryHandler {
    llm: Arc<dyn LlmClient>,
    llm_timeout: Duration,
    guardrails: GuardrailPolicy,
}

impl InquiryHandler {
    pub fn new(llm: Arc<dyn LlmClient>, llm_timeout: Duration, guardrails: GuardrailPolicy) -> Self {
        Self { llm, llm_timeout, guardrails }
    }

    pub async fn respond(&self, draft: &mut TurnDraft, facts: &TurnFacts<'_>) {
        let signals = facts.signals;
        let property = facts.property;

        if signals.dates.is_none() {
            if let Some(ambiguity) = &signals.date_ambiguity {
                draft.reply(ambiguity.clarifying_question());
                return;
            }
        }

        match facts.dates {
            DateUpdate::New(price) => draft.reply(templates::available(property, price)),
            DateUpdate::Changed { current, .. } => {
                let mut text = templates::available(property, current);
                if let Some(notice) = facts.dates.notice(property) {
                    text.push_str("\n\n");
                    text.push_str(&notice);
                }
                draft.reply(text);
            }
            other => {
                if let Some(notice) = other.notice(property) {
                    draft.reply(notice);
                }
            }
        }

        if let Some(requested) = signals.guest_count {
            if !property.accepts_guest_count(requested) {
                draft.reply(templates::guest_limit(property, requested));
            }
        }

        let answered_dates = facts.dates.priced().is_some();
        for answer in topic_answers(property, signals, draft.context(), answered_dates) {
            draft.reply(answer);
        }
        if draft.has_replies() {
            return;
        }

        if signals.greeting && !signals.property_question {
            draft.reply(templates::welcome(property));
            return;
        }

        if !signals.is_on_topic() {
            let decision = self
                .guardrails
                .evaluate(&GuardrailIntent::OffTopic { raw_text: facts.text.to_string() });
            if let Some(message) = decision.user_message() {
                tracing::info!(
                    event_name = "guardrail.off_topic",
                    message_id = %draft.message_id(),
                    "off-topic message redirected"
                );
                draft.reply(message);
                return;
            }
        }

        let known_price = draft.context().current_price().cloned();
        if signals.negotiation_mention || signals.price_mention {
            let mut text = templates::nightly_rate(property, known_price.as_ref());
            if signals.negotiation_mention {
                text = format!("Our rates are fixed. {text}");
            }
            if known_price.is_none() {
                text.push(' ');
                text.push_str(&templates::ask_for_dates());
            }
            draft.reply(text);
            return;
        }

        if signals.property_question {
            let answer = self.generated_answer(property, draft.context(), facts.text).await;
            draft.reply(answer);
            return;
        }

        match known_price {
            Some(price) => draft.reply(format!(
                "{} Would you like to book?",
                templates::price_summary(&price)
            )),
            None => draft.reply(templates::ask_for_dates()),
        }
    }

    async fn generated_answer(
        &self,
        property: &Property,
        context: &ConversationContext,
        question: &str,
    ) -> String {
        let prompt = property_prompt(property, context, question);
        let generated =
            match generate_with_timeout(self.llm.as_ref(), &prompt, self.llm_timeout).await {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(
                        event_name = "llm.generation.degraded",
                        guest_id = %context.key.guest_id.0,
                        property_id = %context.key.property_id.0,
                        error = %error,
                        "falling back to canned clarification"
                    );
                    return CANNED_CLARIFICATION.to_string();
                }
            };

        match self.guardrails.evaluate(&GuardrailIntent::GeneratedReply { text: generated.clone() })
        {
            GuardrailDecision::Allow => generated,
            decision => {
                tracing::warn!(
                    event_name = "guardrail.generated_reply.replaced",
                    guest_id = %context.key.guest_id.0,
                    decision = ?decision,
                    "generated reply replaced"
                );
                decision.user_message().unwrap_or(CANNED_CLARIFICATION).to_string()
            }
        }
    }
}

/// Direct answers for the topics the property record covers.
pub(crate) fn topic_answers(
    property: &Property,
    signals: &ExtractedSignals,
    context: &ConversationContext,
    dates_answered: bool,
) -> Vec<String> {
    let mut answers = Vec::new();
    for topic in &signals.property_topics {
        let answer = match topic {
            PropertyTopic::Location => templates::location(property),
            PropertyTopic::CheckInOut => templates::check_in_out(property),
            PropertyTopic::Capacity => templates::capacity(property),
            PropertyTopic::Amenities => templates::amenities(property),
            PropertyTopic::Rate if dates_answered => continue,
            PropertyTopic::Rate => templates::nightly_rate(property, context.current_price()),
            PropertyTopic::Availability if dates_answered || signals.dates.is_some() => continue,
            PropertyTopic::Availability => match context.current_price() {
                Some(price) => templates::available(property, price),
                None => templates::ask_for_dates(),
            },
        };
        answers.push(answer);
    }
    answers
}

fn property_prompt(property: &Property, context: &ConversationContext, question: &str) -> String {
    let dates = context
        .extracted_dates
        .map(|range| range.to_string())
        .unwrap_or_else(|| "not given yet".to_string());
    format!(
        "You answer guest questions for the holiday rental \"{name}\" in {location}.\n\
         Facts: up to {guests} guests; check-in from {check_in}, check-out by {check_out}; \
         amenities: {amenities}.\n\
         The guest's dates: {dates}.\n\
         Never mention prices, discounts or availability; those are handled separately. \
         Answer in at most three sentences. If the question is not about this property or a \
         stay there, say you can only help with the property.\n\n\
         Guest: {question}",
        name = property.name,
        location = property.location,
        guests = property.max_guests,
        check_in = property.check_in_time,
        check_out = property.check_out_time,
        amenities = property.amenities.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};

    use innkeep_core::domain::conversation::{ConversationContext, ConversationKey};
    use innkeep_core::domain::event::Actor;
    use innkeep_db::fixtures::demo_property;

    use super::InquiryHandler;
    use crate::conversation::IntentExtractor;
    use crate::guardrails::{GuardrailPolicy, CANNED_CLARIFICATION, OFF_TOPIC_REDIRECT};
    use crate::llm::{LlmClient, LlmError};
    use crate::turn::{DateUpdate, TurnDraft, TurnFacts};

    struct CannedLlm(&'static str);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }
    }

    async fn answer(handler: &InquiryHandler, text: &str) -> Vec<String> {
        let property = demo_property();
        let snapshot = ConversationContext::new(ConversationKey::new("guest-1", "prop-lakeview"));
        let today = NaiveDate::from_ymd_opt(2025, 10, 18).expect("valid date");
        let signals = IntentExtractor::new().extract_text(text, &snapshot, today);
        let mut draft = TurnDraft::new(&snapshot, "m-1", Actor::Guest, Utc::now());
        let facts = TurnFacts {
            property: &property,
            signals: &signals,
            dates: &DateUpdate::Absent,
            text,
            attachment_failed: false,
        };
        handler.respond(&mut draft, &facts).await;
        draft.replies().to_vec()
    }

    fn handler(llm: &'static str) -> InquiryHandler {
        InquiryHandler::new(
            Arc::new(CannedLlm(llm)),
            Duration::from_secs(1),
            GuardrailPolicy::default(),
        )
    }

    #[tokio::test]
    async fn property_facts_come_from_the_record() {
        let replies = answer(&handler("unused"), "Where is the cottage located? Is there wifi?").await;
        assert!(replies.iter().any(|reply| reply.contains("Mall Road, Murree")));
        assert!(replies.iter().any(|reply| reply.contains("wifi")));
    }

    #[tokio::test]
    async fn off_topic_messages_are_redirected() {
        let replies = answer(&handler("unused"), "who won the cricket match").await;
        assert_eq!(replies, vec![OFF_TOPIC_REDIRECT.to_string()]);
    }

    #[tokio::test]
    async fn generated_discount_offers_never_reach_the_guest() {
        let replies =
            answer(&handler("We can give you 20% off as a special rate!"), "Is the lake safe for kids?")
                .await;
        assert_eq!(replies, vec![CANNED_CLARIFICATION.to_string()]);
    }

    #[tokio::test]
    async fn missing_dates_are_requested_when_asking_about_price() {
        let replies = answer(&handler("unused"), "how much does it cost").await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("USD 100.00"));
        assert!(replies[0].contains("check-in and check-out dates"));
    }
}
