//! Approver-side rules: reading free-text replies, checking who may decide a booking,
//! and applying a decision so that repeats are harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::booking::{BookingRecord, Decision};
use crate::errors::DomainError;

const APPROVE_WORDS: &[&str] =
    &["yes", "y", "yep", "approve", "approved", "confirm", "confirmed", "received", "ok"];
const REJECT_WORDS: &[&str] = &["no", "n", "nope", "reject", "rejected", "decline", "declined"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApproverReply {
    Approve,
    Reject { reason: Option<String> },
    Unclear,
}

/// Only the first word decides; anything after a rejection word is kept as the reason.
pub fn parse_approver_reply(text: &str) -> ApproverReply {
    let trimmed = text.trim();
    let mut split = trimmed.splitn(2, |character: char| {
        character.is_whitespace() || matches!(character, ',' | '.' | '!' | '-' | ':')
    });
    let head = split.next().unwrap_or_default().to_ascii_lowercase();
    let rest = split
        .next()
        .map(|rest| rest.trim_matches(|c: char| c.is_whitespace() || c == ',' || c == '-'))
        .filter(|rest| !rest.is_empty())
        .map(str::to_string);

    if APPROVE_WORDS.contains(&head.as_str()) {
        return ApproverReply::Approve;
    }
    if REJECT_WORDS.contains(&head.as_str()) {
        return ApproverReply::Reject { reason: rest };
    }
    ApproverReply::Unclear
}

pub const CLARIFY_APPROVER_REPLY: &str =
    "Please reply 'yes' if the payment was received or 'no' if it was not found.";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalValidationFailure {
    NotBookingApprover { approver_id: String, expected_approver_id: String },
    BookingNotPending { booking_id: String },
}

impl ApprovalValidationFailure {
    fn reason(&self) -> String {
        match self {
            Self::NotBookingApprover { approver_id, expected_approver_id } => format!(
                "approver `{approver_id}` cannot decide a booking owned by `{expected_approver_id}`"
            ),
            Self::BookingNotPending { booking_id } => {
                format!("booking `{booking_id}` has no payment awaiting a decision")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalValidationResult {
    pub allowed: bool,
    pub reason: String,
    pub failure: Option<ApprovalValidationFailure>,
}

impl ApprovalValidationResult {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), failure: None }
    }

    fn deny(failure: ApprovalValidationFailure) -> Self {
        Self { allowed: false, reason: failure.reason(), failure: Some(failure) }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ApprovalValidator;

impl ApprovalValidator {
    /// Authority check only. A decided booking is still allowed through so the caller can
    /// answer with the prior outcome.
    pub fn validate(&self, record: &BookingRecord, approver_id: &str) -> ApprovalValidationResult {
        if normalize_key(&record.approver_id) != normalize_key(approver_id) {
            return ApprovalValidationResult::deny(ApprovalValidationFailure::NotBookingApprover {
                approver_id: approver_id.to_string(),
                expected_approver_id: record.approver_id.clone(),
            });
        }

        if !record.is_pending() && record.decision().is_none() {
            return ApprovalValidationResult::deny(ApprovalValidationFailure::BookingNotPending {
                booking_id: record.id.0.clone(),
            });
        }

        ApprovalValidationResult::allow(format!(
            "approver `{approver_id}` owns booking `{}`",
            record.id.0
        ))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied { decision: Decision, record: BookingRecord },
    AlreadyDecided { prior: Decision, record: BookingRecord },
}

impl ReconcileOutcome {
    pub fn record(&self) -> &BookingRecord {
        match self {
            Self::Applied { record, .. } | Self::AlreadyDecided { record, .. } => record,
        }
    }

    pub fn decision(&self) -> Decision {
        match self {
            Self::Applied { decision, .. } => *decision,
            Self::AlreadyDecided { prior, .. } => *prior,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Apply `decision` to a pending booking. A booking that already carries a decision is
/// returned untouched with that prior decision, whatever was asked for this time.
pub fn reconcile(
    mut record: BookingRecord,
    decision: Decision,
    approver_id: &str,
    reason: Option<String>,
    at: DateTime<Utc>,
) -> Result<ReconcileOutcome, DomainError> {
    if let Some(prior) = record.decision() {
        return Ok(ReconcileOutcome::AlreadyDecided { prior, record });
    }

    record.apply_decision(decision, approver_id, reason, at)?;
    Ok(ReconcileOutcome::Applied { decision, record })
}

fn normalize_key(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{
        parse_approver_reply, reconcile, ApprovalValidationFailure, ApprovalValidator,
        ApproverReply, ReconcileOutcome,
    };
    use crate::domain::booking::{
        BookingId, BookingRecord, BookingStatus, Decision, PaymentStatus,
    };
    use crate::domain::conversation::{ConversationKey, DateRange};

    fn pending() -> BookingRecord {
        BookingRecord {
            id: BookingId("BK-7".to_string()),
            key: ConversationKey::new("guest-1", "prop-1"),
            approver_id: "host-1".to_string(),
            dates: DateRange::new(
                NaiveDate::from_ymd_opt(2025, 11, 24).expect("valid date"),
                NaiveDate::from_ymd_opt(2025, 11, 30).expect("valid date"),
            )
            .expect("valid range"),
            total_price: Decimal::new(600, 0),
            currency: "USD".to_string(),
            payment_status: PaymentStatus::Pending,
            booking_status: BookingStatus::Draft,
            screenshot_ref: "file://r.jpg".to_string(),
            payer_name: "Ali Khan".to_string(),
            payer_bank: "JazzCash".to_string(),
            attempt: 1,
            decided_by: None,
            rejection_reason: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    #[test]
    fn parses_explicit_yes_and_no_words() {
        assert_eq!(parse_approver_reply("yes"), ApproverReply::Approve);
        assert_eq!(parse_approver_reply("  Y "), ApproverReply::Approve);
        assert_eq!(parse_approver_reply("Approve"), ApproverReply::Approve);
        assert_eq!(parse_approver_reply("no"), ApproverReply::Reject { reason: None });
        assert_eq!(
            parse_approver_reply("no, payment not found"),
            ApproverReply::Reject { reason: Some("payment not found".to_string()) }
        );
        assert_eq!(parse_approver_reply("decline"), ApproverReply::Reject { reason: None });
    }

    #[test]
    fn anything_else_is_unclear() {
        assert_eq!(parse_approver_reply("let me check"), ApproverReply::Unclear);
        assert_eq!(parse_approver_reply(""), ApproverReply::Unclear);
        assert_eq!(parse_approver_reply("yesterday"), ApproverReply::Unclear);
    }

    #[test]
    fn validator_rejects_foreign_approver() {
        let result = ApprovalValidator.validate(&pending(), "host-2");
        assert!(!result.allowed);
        assert!(matches!(
            result.failure,
            Some(ApprovalValidationFailure::NotBookingApprover { .. })
        ));
        assert!(ApprovalValidator.validate(&pending(), "HOST-1").allowed);
    }

    #[test]
    fn second_approve_is_a_no_op_returning_prior_outcome() {
        let first = reconcile(pending(), Decision::Approve, "host-1", None, Utc::now())
            .expect("first decision applies");
        assert!(first.is_applied());

        let second = reconcile(first.record().clone(), Decision::Approve, "host-1", None, Utc::now())
            .expect("repeat is not an error");
        assert!(matches!(second, ReconcileOutcome::AlreadyDecided { prior: Decision::Approve, .. }));
        assert_eq!(second.record(), first.record());
    }

    #[test]
    fn late_reject_after_approve_reports_the_approval() {
        let approved = reconcile(pending(), Decision::Approve, "host-1", None, Utc::now())
            .expect("approve")
            .record()
            .clone();
        let late = reconcile(approved, Decision::Reject, "host-1", None, Utc::now())
            .expect("late reject is absorbed");
        assert_eq!(late.decision(), Decision::Approve);
        assert_eq!(late.record().booking_status, BookingStatus::Confirmed);
    }
}
