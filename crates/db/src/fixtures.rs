use rust_decimal::Decimal;
use serde::Serialize;

use innkeep_core::domain::property::{PaymentMethod, Property, PropertyId};

use crate::repositories::{PropertyRepository, RepositoryError};

pub const DEMO_PROPERTY_ID: &str = "prop-lakeview";
pub const DEMO_APPROVER_ID: &str = "host-lakeview";

/// Demo listing used by `innkeep seed` and the transcript simulator.
pub fn demo_property() -> Property {
    Property {
        id: PropertyId(DEMO_PROPERTY_ID.to_string()),
        name: "Lakeview Cottage".to_string(),
        location: "Mall Road, Murree".to_string(),
        nightly_rate: Decimal::new(100, 0),
        currency: "USD".to_string(),
        max_guests: 4,
        check_in_time: "14:00".to_string(),
        check_out_time: "11:00".to_string(),
        amenities: vec![
            "wifi".to_string(),
            "parking".to_string(),
            "fireplace".to_string(),
            "lake view terrace".to_string(),
        ],
        approver_id: DEMO_APPROVER_ID.to_string(),
        payment_methods: vec![
            PaymentMethod {
                bank_name: "JazzCash".to_string(),
                account_name: "Lakeview Stays".to_string(),
                account_number: "0300-1234567".to_string(),
                instructions: Some("Use your booking dates as the payment note.".to_string()),
            },
            PaymentMethod {
                bank_name: "Meezan Bank".to_string(),
                account_name: "Lakeview Stays".to_string(),
                account_number: "PK36MEZN0001234567890".to_string(),
                instructions: None,
            },
        ],
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub property_ids: Vec<String>,
    pub payment_method_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub issues: Vec<String>,
}

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Idempotent: saving the same listing again only refreshes it.
    pub async fn load(
        properties: &dyn PropertyRepository,
    ) -> Result<SeedResult, RepositoryError> {
        let property = demo_property();
        let result = SeedResult {
            property_ids: vec![property.id.0.clone()],
            payment_method_count: property.payment_methods.len(),
        };
        properties.save(property).await?;
        Ok(result)
    }

    pub async fn verify(
        properties: &dyn PropertyRepository,
    ) -> Result<VerificationResult, RepositoryError> {
        let expected = demo_property();
        let mut issues = Vec::new();

        match properties.find_by_id(&expected.id).await? {
            None => issues.push(format!("property `{}` is missing", expected.id)),
            Some(stored) => {
                if stored.payment_methods.is_empty() {
                    issues.push(format!("property `{}` has no payment methods", stored.id));
                }
                if stored.approver_id.trim().is_empty() {
                    issues.push(format!("property `{}` has no approver", stored.id));
                }
                if stored.nightly_rate <= Decimal::ZERO {
                    issues.push(format!("property `{}` has a non-positive rate", stored.id));
                }
            }
        }

        Ok(VerificationResult { passed: issues.is_empty(), issues })
    }
}
