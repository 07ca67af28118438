//! Guest- and host-facing message texts. Every number shown here comes from the pricing
//! engine or the booking record, never from generated text.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use innkeep_core::domain::booking::{BookingRecord, Decision};
use innkeep_core::domain::conversation::{DateRange, DerivedPrice};
use innkeep_core::domain::property::Property;
use innkeep_core::flows::intake::IntakeField;
use innkeep_core::pricing::format_amount;

pub const PAYER_DETAILS_FORMAT: &str = "Name: John Doe\nBank: JazzCash";

fn long_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

fn nights_label(nights: u32) -> String {
    if nights == 1 {
        "1 night".to_string()
    } else {
        format!("{nights} nights")
    }
}

pub fn welcome(property: &Property) -> String {
    format!(
        "Hello! Welcome to {} in {}. I can answer questions about the property, check \
         availability for your dates, or help you book.",
        property.name, property.location
    )
}

pub fn ask_for_dates() -> String {
    "Which dates are you interested in? Please share your check-in and check-out dates, for \
     example: 24 Nov to 30 Nov 2025."
        .to_string()
}

pub fn available(property: &Property, price: &DerivedPrice) -> String {
    format!(
        "Good news! {} is available from {} to {} ({}). The total comes to {} ({} per night). \
         Would you like to book?",
        property.name,
        long_date(price.range.check_in),
        long_date(price.range.check_out),
        nights_label(price.nights),
        format_amount(price.total, &price.currency),
        format_amount(price.nightly_rate, &price.currency)
    )
}

pub fn unavailable(property: &Property, range: &DateRange) -> String {
    format!(
        "Sorry, {} is already booked for part of {}. Could you try different dates?",
        property.name, range
    )
}

pub fn check_in_in_past(range: &DateRange) -> String {
    format!(
        "The check-in date {} has already passed. Could you share upcoming dates?",
        long_date(range.check_in)
    )
}

pub fn dates_locked(range: &DateRange) -> String {
    format!(
        "Your booking request for {range} is already with the host, so I can't change the dates \
         right now. You'll hear back here as soon as the host replies."
    )
}

pub fn price_changed(previous: &DerivedPrice, current: &DerivedPrice) -> String {
    format!(
        "I've updated your dates to {} ({}). The new total is {}. The previous total of {} \
         applied to your earlier dates ({}, {}).",
        current.range,
        nights_label(current.nights),
        format_amount(current.total, &current.currency),
        format_amount(previous.total, &previous.currency),
        previous.range,
        nights_label(previous.nights)
    )
}

pub fn price_summary(price: &DerivedPrice) -> String {
    format!(
        "For {} ({}), the total is {}.",
        price.range,
        nights_label(price.nights),
        format_amount(price.total, &price.currency)
    )
}

pub fn continue_to_payment_prompt() -> String {
    "Would you like to continue to payment?".to_string()
}

pub fn guest_limit(property: &Property, requested: u32) -> String {
    format!(
        "Please note that {} accommodates up to {} guests, and you mentioned {requested}.",
        property.name, property.max_guests
    )
}

pub fn location(property: &Property) -> String {
    format!("{} is located at {}.", property.name, property.location)
}

pub fn check_in_out(property: &Property) -> String {
    format!(
        "Check-in is from {} and check-out is by {}.",
        property.check_in_time, property.check_out_time
    )
}

pub fn capacity(property: &Property) -> String {
    format!("{} accommodates up to {} guests.", property.name, property.max_guests)
}

pub fn amenities(property: &Property) -> String {
    if property.amenities.is_empty() {
        return format!("{} doesn't list any amenities yet.", property.name);
    }
    format!("Amenities at {}: {}.", property.name, property.amenities.join(", "))
}

pub fn nightly_rate(property: &Property, price: Option<&DerivedPrice>) -> String {
    let rate = format!(
        "The nightly rate is {}.",
        format_amount(property.nightly_rate, &property.currency)
    );
    match price {
        Some(price) => format!("{rate} {}", price_summary(price)),
        None => rate,
    }
}

pub fn payment_instructions(property: &Property, price: &DerivedPrice, repeat: bool) -> String {
    let mut message = if repeat {
        String::from("Here are the payment details again.\n\n")
    } else {
        String::from("Great, let's get you booked!\n\n")
    };

    message.push_str(&format!(
        "💰 Amount: {}\n📅 Dates: {} to {} ({})\n\n",
        format_amount(price.total, &price.currency),
        long_date(price.range.check_in),
        long_date(price.range.check_out),
        nights_label(price.nights)
    ));

    if property.payment_methods.is_empty() {
        message.push_str("The host will share payment details with you shortly.\n");
    } else {
        message.push_str("Please transfer the amount to one of these accounts:\n");
        for method in &property.payment_methods {
            message.push_str(&format!(
                "• {}: {} ({})\n",
                method.bank_name, method.account_number, method.account_name
            ));
            if let Some(instructions) = &method.instructions {
                message.push_str(&format!("  {instructions}\n"));
            }
        }
    }

    message.push_str(&format!(
        "\nOnce you've paid, send a screenshot of the transfer along with:\n{PAYER_DETAILS_FORMAT}"
    ));
    message
}

pub fn payment_reminder() -> String {
    format!(
        "Whenever you're ready, send the payment screenshot along with:\n{PAYER_DETAILS_FORMAT}"
    )
}

pub fn missing_intake_fields(missing: &BTreeSet<IntakeField>) -> String {
    let labels = missing.iter().map(IntakeField::label).collect::<Vec<_>>();
    let mut message = format!(
        "Thanks! I still need the following before sending your payment for verification:\n- {}",
        labels.join("\n- ")
    );
    if missing.contains(&IntakeField::PayerName) || missing.contains(&IntakeField::PayerBank) {
        message.push_str(&format!("\n\nPlease send them in the format:\n{PAYER_DETAILS_FORMAT}"));
    }
    message
}

pub fn intake_submitted() -> String {
    "Thank you! I've sent your payment details to the host for verification. You'll receive a \
     confirmation here as soon as it's approved."
        .to_string()
}

pub fn intake_awaiting_dates() -> String {
    format!("Thanks, I have your payment details. {}", ask_for_dates())
}

pub fn awaiting_approval() -> String {
    "Your payment is with the host for verification. You'll receive a confirmation here as soon \
     as they reply."
        .to_string()
}

pub fn already_confirmed(record: &BookingRecord) -> String {
    format!(
        "Your booking {} for {} is confirmed. Check-in instructions will be sent to you before \
         your arrival.",
        record.id, record.dates
    )
}

pub fn attachment_retry() -> String {
    "Sorry, I couldn't save that screenshot. Please send it again; I've kept the other details \
     you shared."
        .to_string()
}

pub fn approval_request(record: &BookingRecord, property: &Property) -> String {
    format!(
        "💰 Payment Verification Request\n\n\
         Booking ID: {}\n\
         Guest: {}\n\
         Property: {}\n\
         Amount: {}\n\
         Dates: {} to {}\n\n\
         📋 Customer Payment Details:\n\
         • Customer Name: {}\n\
         • Bank Sent From: {}\n\n\
         ⚠️ Please check your {} account for the payment.\n\n\
         After verifying, reply:\n\
         ✅ 'yes' if payment received\n\
         ❌ 'no' if payment not found",
        record.id,
        record.payer_name,
        property.name,
        format_amount(record.total_price, &record.currency),
        record.dates.check_in,
        record.dates.check_out,
        record.payer_name,
        record.payer_bank,
        record.payer_bank
    )
}

pub fn booking_confirmed(record: &BookingRecord, property: &Property) -> String {
    format!(
        "✅ Booking Confirmed!\n\n\
         Your booking has been confirmed:\n\
         Property: {}\n\
         Check-in: {}\n\
         Check-out: {}\n\
         Total: {}\n\
         Booking ID: {}\n\n\
         Check-in instructions will be sent to you before your arrival.",
        property.name,
        long_date(record.dates.check_in),
        long_date(record.dates.check_out),
        format_amount(record.total_price, &record.currency),
        record.id
    )
}

pub fn booking_rejected(record: &BookingRecord) -> String {
    let reason = record
        .rejection_reason
        .clone()
        .unwrap_or_else(|| "Please contact support if you believe this is an error.".to_string());
    format!(
        "❌ Payment Verification Failed\n\n\
         Unfortunately, we were unable to verify your payment.\n\
         {reason}\n\n\
         Your dates are still saved. If you'd like to try again, send a new payment screenshot \
         with your name and bank."
    )
}

pub fn approver_ack(record: &BookingRecord, applied: bool) -> String {
    let verdict = match record.decision() {
        Some(Decision::Approve) => "confirmed",
        Some(Decision::Reject) => "cancelled",
        None => "pending",
    };
    if applied {
        format!("Booking {} is now {verdict}. The guest has been notified.", record.id)
    } else {
        format!("Booking {} was already {verdict}; nothing changed.", record.id)
    }
}

pub fn no_pending_approvals() -> String {
    "There are no bookings waiting for your decision right now.".to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use innkeep_core::domain::booking::{BookingId, BookingRecord, BookingStatus, PaymentStatus};
    use innkeep_core::domain::conversation::{ConversationKey, DateRange};
    use innkeep_core::flows::intake::IntakeField;
    use innkeep_db::fixtures::demo_property;

    use super::{
        approval_request, ask_for_dates, booking_confirmed, intake_awaiting_dates,
        missing_intake_fields,
    };

    fn record() -> BookingRecord {
        BookingRecord {
            id: BookingId("BK-1".to_string()),
            key: ConversationKey::new("guest-1", "prop-lakeview"),
            approver_id: "host-lakeview".to_string(),
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
    fn approval_request_carries_everything_the_host_checks() {
        let text = approval_request(&record(), &demo_property());
        for expected in ["BK-1", "Ali Khan", "JazzCash", "USD 600.00", "2025-11-24", "'yes'"] {
            assert!(text.contains(expected), "missing {expected}");
        }
    }

    #[test]
    fn confirmation_uses_long_dates() {
        let text = booking_confirmed(&record(), &demo_property());
        assert!(text.contains("November 24, 2025"));
        assert!(text.contains("Check-in instructions will be sent"));
    }

    #[test]
    fn missing_fields_only_lists_what_is_missing() {
        let text = missing_intake_fields(&BTreeSet::from([IntakeField::PayerBank]));
        assert!(text.contains("bank or wallet"));
        assert!(!text.contains("full name"));
        assert!(!text.contains("screenshot"));
        assert!(text.contains("Name: John Doe"));
    }

    #[test]
    fn evidence_without_dates_acknowledges_then_asks_for_dates() {
        let text = intake_awaiting_dates();
        assert!(text.starts_with("Thanks, I have your payment details."));
        assert!(text.ends_with(&ask_for_dates()));
    }
}
