pub const OFF_TOPIC_REDIRECT: &str = "I can only help with property bookings and inquiries. \
     Please ask me about the property, availability, pricing, or booking process.";

/// Fallback used whenever generated text cannot be trusted for this turn.
pub const CANNED_CLARIFICATION: &str = "Sorry, I didn't quite catch that. Could you tell me \
     which dates you're interested in, or what you'd like to know about the property?";

const PRICE_CLAIM_MARKERS: &[&str] = &[
    "discount",
    "% off",
    "special price",
    "special rate",
    "reduced",
    "lower rate",
    "cheaper",
    "waive",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    OffTopic { raw_text: String },
    NegotiationRequest { nights: u32, total: String },
    GeneratedReply { text: String },
}

impl GuardrailIntent {
    pub fn action_key(&self) -> &'static str {
        match self {
            Self::OffTopic { .. } => "topic.off_topic",
            Self::NegotiationRequest { .. } => "policy.negotiation_request",
            Self::GeneratedReply { .. } => "llm.generated_reply",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn user_message(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { user_message, .. } | Self::Degrade { user_message, .. } => {
                Some(user_message)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub llm_can_set_prices: bool,
    pub topic_guard_enabled: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { llm_can_set_prices: false, topic_guard_enabled: true }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::OffTopic { .. } if !self.topic_guard_enabled => {
                GuardrailDecision::Allow
            }
            GuardrailIntent::OffTopic { .. } => GuardrailDecision::Deny {
                reason_code: "off_topic",
                user_message: OFF_TOPIC_REDIRECT.to_string(),
                fallback_path: "property_inquiry",
            },
            GuardrailIntent::NegotiationRequest { nights, total } => GuardrailDecision::Deny {
                reason_code: if self.llm_can_set_prices {
                    "discount_policy_conflict"
                } else {
                    "discount_disallowed"
                },
                user_message: format!(
                    "Our prices are fixed, so I'm not able to offer a discount. For your {nights} \
                     night{} the total is {total}, based on the nightly rate.",
                    if *nights == 1 { "" } else { "s" }
                ),
                fallback_path: "fixed_rate_policy",
            },
            GuardrailIntent::GeneratedReply { text } => {
                let normalized = text.to_ascii_lowercase();
                if PRICE_CLAIM_MARKERS.iter().any(|marker| normalized.contains(marker)) {
                    GuardrailDecision::Degrade {
                        reason_code: "generated_price_claim",
                        user_message: CANNED_CLARIFICATION.to_string(),
                        fallback_path: "canned_reply",
                    }
                } else if normalized.trim().is_empty() {
                    GuardrailDecision::Degrade {
                        reason_code: "generated_reply_empty",
                        user_message: CANNED_CLARIFICATION.to_string(),
                        fallback_path: "canned_reply",
                    }
                } else {
                    GuardrailDecision::Allow
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{GuardrailDecision, GuardrailIntent, GuardrailPolicy, OFF_TOPIC_REDIRECT};

    #[test]
    fn off_topic_is_redirected() {
        let policy = GuardrailPolicy::default();
        let decision = policy
            .evaluate(&GuardrailIntent::OffTopic { raw_text: "who won the match".to_string() });

        let (reason_code, user_message, fallback_path) = match decision {
            GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
                (reason_code, user_message, fallback_path)
            }
            _ => ("", String::new(), ""),
        };

        assert_eq!(reason_code, "off_topic");
        assert_eq!(user_message, OFF_TOPIC_REDIRECT);
        assert_eq!(fallback_path, "property_inquiry");
    }

    #[test]
    fn topic_guard_can_be_switched_off() {
        let policy = GuardrailPolicy { topic_guard_enabled: false, ..GuardrailPolicy::default() };
        let decision =
            policy.evaluate(&GuardrailIntent::OffTopic { raw_text: "weather?".to_string() });
        assert_eq!(decision, GuardrailDecision::Allow);
    }

    #[test]
    fn negotiation_is_denied_with_nights_and_total() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&GuardrailIntent::NegotiationRequest {
            nights: 6,
            total: "USD 600.00".to_string(),
        });

        let message = decision.user_message().unwrap_or_default().to_string();
        assert!(matches!(decision, GuardrailDecision::Deny { reason_code: "discount_disallowed", .. }));
        assert!(message.contains("6 nights"));
        assert!(message.contains("USD 600.00"));
        assert!(message.contains("not able to offer a discount"));
    }

    #[test]
    fn generated_discount_claims_degrade_to_canned_reply() {
        let policy = GuardrailPolicy::default();
        let decision = policy.evaluate(&GuardrailIntent::GeneratedReply {
            text: "Sure, I can give you a 10% discount!".to_string(),
        });
        assert!(matches!(
            decision,
            GuardrailDecision::Degrade { reason_code: "generated_price_claim", .. }
        ));

        let plain = policy.evaluate(&GuardrailIntent::GeneratedReply {
            text: "Yes, the cottage has a fireplace.".to_string(),
        });
        assert_eq!(plain, GuardrailDecision::Allow);
    }
}
