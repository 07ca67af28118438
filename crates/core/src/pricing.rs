use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::{DateRange, DerivedPrice};
use crate::domain::property::{Property, PropertyId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub property_id: PropertyId,
    pub currency: String,
    pub steps: Vec<PricingTraceStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub price: DerivedPrice,
    pub trace: PricingTrace,
}

pub trait PricingEngine: Send + Sync {
    fn price(&self, property: &Property, range: &DateRange) -> PricingResult;
}

/// Nightly rate times nights. No discounts, no history: the same inputs always price the same.
#[derive(Clone, Copy, Debug, Default)]
pub struct NightlyRatePricingEngine;

impl PricingEngine for NightlyRatePricingEngine {
    fn price(&self, property: &Property, range: &DateRange) -> PricingResult {
        compute_price_with_trace(property, range)
    }
}

pub fn compute_price(nightly_rate: Decimal, nights: u32) -> Decimal {
    nightly_rate * Decimal::from(nights)
}

pub fn compute_price_with_trace(property: &Property, range: &DateRange) -> PricingResult {
    let nights = range.nights();
    let total = compute_price(property.nightly_rate, nights);

    PricingResult {
        price: DerivedPrice {
            range: *range,
            nightly_rate: property.nightly_rate,
            nights,
            total,
            currency: property.currency.clone(),
        },
        trace: PricingTrace {
            property_id: property.id.clone(),
            currency: property.currency.clone(),
            steps: vec![
                PricingTraceStep {
                    stage: "nightly_rate".to_string(),
                    detail: "property base price per night".to_string(),
                    amount: property.nightly_rate,
                },
                PricingTraceStep {
                    stage: "total".to_string(),
                    detail: format!("nightly_rate * {nights} nights"),
                    amount: total,
                },
            ],
        },
    }
}

pub fn format_amount(amount: Decimal, currency: &str) -> String {
    format!("{currency} {amount:.2}")
}
