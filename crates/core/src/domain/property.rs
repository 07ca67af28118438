use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId(pub String);

impl std::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A host-side account the guest can transfer the booking amount into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    pub instructions: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub location: String,
    pub nightly_rate: Decimal,
    pub currency: String,
    pub max_guests: u32,
    pub check_in_time: String,
    pub check_out_time: String,
    pub amenities: Vec<String>,
    pub approver_id: String,
    pub payment_methods: Vec<PaymentMethod>,
}

impl Property {
    pub fn accepts_guest_count(&self, guests: u32) -> bool {
        guests > 0 && guests <= self.max_guests
    }
}
