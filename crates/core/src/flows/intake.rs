use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::conversation::PaymentIntake;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeField {
    Screenshot,
    PayerName,
    PayerBank,
}

impl IntakeField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Screenshot => "payment screenshot",
            Self::PayerName => "full name on the sending account",
            Self::PayerBank => "bank or wallet you sent from",
        }
    }
}

/// Payment evidence progress. `AwaitingFields` with an empty set means every piece of
/// evidence is present but the booking facts (dates, price) are not settled yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntakeState {
    Empty,
    AwaitingFields(BTreeSet<IntakeField>),
    Complete,
}

impl IntakeState {
    pub fn of(intake: &PaymentIntake) -> Self {
        if intake.completed {
            return Self::Complete;
        }
        if intake.is_empty() {
            return Self::Empty;
        }
        Self::AwaitingFields(missing_fields(intake))
    }
}

pub fn missing_fields(intake: &PaymentIntake) -> BTreeSet<IntakeField> {
    let mut missing = BTreeSet::new();
    if intake.screenshot_ref.is_none() {
        missing.insert(IntakeField::Screenshot);
    }
    if intake.payer_name.is_none() {
        missing.insert(IntakeField::PayerName);
    }
    if intake.payer_bank.is_none() {
        missing.insert(IntakeField::PayerBank);
    }
    missing
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeInput {
    pub screenshot_ref: Option<String>,
    pub payer_name: Option<String>,
    pub payer_bank: Option<String>,
}

impl IntakeInput {
    pub fn is_empty(&self) -> bool {
        self.screenshot_ref.is_none() && self.payer_name.is_none() && self.payer_bank.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntakeOutcome {
    pub merged: PaymentIntake,
    /// Only the fields that actually changed the record; empty means nothing to persist.
    pub applied: IntakeInput,
    pub state: IntakeState,
    /// All evidence is present and the record has not been completed before.
    pub ready_to_complete: bool,
}

/// Merge newly supplied evidence into the partial record. Previously supplied fields are
/// never dropped and a completed record is never touched again.
pub fn merge_intake(current: &PaymentIntake, input: &IntakeInput) -> IntakeOutcome {
    if current.completed {
        return IntakeOutcome {
            merged: current.clone(),
            applied: IntakeInput::default(),
            state: IntakeState::Complete,
            ready_to_complete: false,
        };
    }

    let mut merged = current.clone();
    let mut applied = IntakeInput::default();

    if let Some(value) = clean(&input.screenshot_ref) {
        if merged.screenshot_ref.as_deref() != Some(value.as_str()) {
            merged.screenshot_ref = Some(value.clone());
            applied.screenshot_ref = Some(value);
        }
    }
    if let Some(value) = clean(&input.payer_name) {
        if merged.payer_name.as_deref() != Some(value.as_str()) {
            merged.payer_name = Some(value.clone());
            applied.payer_name = Some(value);
        }
    }
    if let Some(value) = clean(&input.payer_bank) {
        if merged.payer_bank.as_deref() != Some(value.as_str()) {
            merged.payer_bank = Some(value.clone());
            applied.payer_bank = Some(value);
        }
    }

    let ready_to_complete = merged.has_all_fields();
    IntakeOutcome { state: IntakeState::of(&merged), merged, applied, ready_to_complete }
}

fn clean(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
