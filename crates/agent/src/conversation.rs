use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use innkeep_core::domain::conversation::{ConversationContext, DateRange, Phase};
use innkeep_core::domain::message::MessageBody;
use innkeep_core::flows::RouterSignals;

const BOOKING_PHRASES: &[&str] = &[
    "book",
    "booked",
    "booking",
    "reserve",
    "reservation",
    "proceed",
    "go ahead",
    "let's do it",
    "lets do it",
    "confirm",
];

const AFFIRMATIONS: &[&str] =
    &["yes", "yeah", "yep", "yup", "ok", "okay", "sure", "alright", "done", "great"];

const NEGOTIATION_PHRASES: &[&str] = &[
    "negotiate",
    "negotiable",
    "discount",
    "cheaper",
    "lower price",
    "better price",
    "best price",
    "deal",
    "reduce",
];

const PAYMENT_PHRASES: &[&str] = &[
    "pay",
    "paid",
    "paying",
    "payment",
    "transfer",
    "transferred",
    "bank",
    "screenshot",
    "receipt",
    "sent",
];

const PRICE_PHRASES: &[&str] =
    &["price", "cost", "how much", "rate", "total", "charge", "per night", "usd", "pkr", "rs"];

const FOLLOW_UP_PHRASES: &[&str] = &[
    "we agreed",
    "earlier",
    "didn't",
    "didnt",
    "before",
    "remember",
    "you said",
    "you told",
    "as discussed",
    "last time",
];

const GREETINGS: &[&str] =
    &["hi", "hello", "hey", "salam", "assalam", "assalamualaikum", "good morning", "good evening"];

const KNOWN_BANKS: &[(&str, &str)] = &[
    ("jazzcash", "JazzCash"),
    ("jazz cash", "JazzCash"),
    ("easypaisa", "EasyPaisa"),
    ("easy paisa", "EasyPaisa"),
    ("sadapay", "SadaPay"),
    ("nayapay", "NayaPay"),
    ("meezan", "Meezan Bank"),
    ("hbl", "HBL"),
    ("ubl", "UBL"),
];

const NAME_LABELS: &[&str] = &["full name:", "name:"];
const INTRODUCTION_LABELS: &[&str] = &["my name is"];
const BANK_LABELS: &[&str] =
    &["bank name:", "bank:", "sent from:", "sent from", "paid from", "transferred from"];

const RELATIVE_DATE_WORDS: &[&str] =
    &["today", "tonight", "tomorrow", "weekend", "next week", "next month"];

const DATE_CHANGE_PHRASES: &[&str] = &[
    "change",
    "instead",
    "actually",
    "move",
    "shift",
    "reschedule",
    "extend",
    "different dates",
    "new dates",
    "other dates",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyTopic {
    Location,
    CheckInOut,
    Capacity,
    Amenities,
    Rate,
    Availability,
}

/// Date text was present but could not be turned into a range without guessing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateAmbiguity {
    SingleDate,
    DayMonthOrder { raw: String },
    InvalidDate,
    CheckOutNotAfterCheckIn,
    Relative,
}

impl DateAmbiguity {
    pub fn clarifying_question(&self) -> String {
        match self {
            Self::SingleDate => "Could you share both your check-in and check-out dates? \
                                 For example: 24 Nov to 30 Nov 2025."
                .to_string(),
            Self::DayMonthOrder { raw } => format!(
                "I couldn't tell the day from the month in \"{raw}\". Could you write the month \
                 as a word, for example 5 Nov to 9 Nov?"
            ),
            Self::InvalidDate => "One of those dates doesn't exist on the calendar. Could you \
                                  double-check your check-in and check-out dates?"
                .to_string(),
            Self::CheckOutNotAfterCheckIn => {
                "Check-out has to be after check-in. Could you confirm both dates?".to_string()
            }
            Self::Relative => "Which exact dates do you have in mind? Please share check-in and \
                               check-out, for example 24 Nov to 30 Nov."
                .to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSignals {
    pub dates: Option<DateRange>,
    pub date_ambiguity: Option<DateAmbiguity>,
    pub price_mention: bool,
    pub booking_intent: bool,
    /// An explicit booking word, as opposed to a bare affirmation counted as intent.
    pub booking_keyword: bool,
    pub affirmation: bool,
    pub follow_up_reference: bool,
    pub negotiation_mention: bool,
    pub payment_mention: bool,
    pub property_question: bool,
    pub property_topics: Vec<PropertyTopic>,
    pub greeting: bool,
    pub guest_count: Option<u32>,
    pub screenshot_ref: Option<String>,
    pub payer_name: Option<String>,
    pub payer_bank: Option<String>,
}

impl ExtractedSignals {
    pub fn router_signals(&self, snapshot: &ConversationContext) -> RouterSignals {
        RouterSignals {
            booking_intent: self.booking_intent,
            negotiation_mention: self.negotiation_mention,
            payment_mention: self.payment_mention
                || self.screenshot_ref.is_some()
                || self.payer_bank.is_some()
                || (self.payer_name.is_some()
                    && (snapshot.active_phase == Phase::Booking
                        || expects_payer_details(snapshot))),
            property_question: self.property_question,
            commercial_keywords: self.booking_keyword
                || self.payment_mention
                || self.price_mention
                || self.negotiation_mention,
            dates_known: self.dates.is_some() || snapshot.extracted_dates.is_some(),
        }
    }

    pub fn has_payer_details(&self) -> bool {
        self.screenshot_ref.is_some() || self.payer_name.is_some() || self.payer_bank.is_some()
    }

    /// Anything the assistant is meant to talk about. Follow-up markers count so that a
    /// continuation of an earlier negotiation is never treated as off-topic.
    pub fn is_on_topic(&self) -> bool {
        self.dates.is_some()
            || self.date_ambiguity.is_some()
            || self.price_mention
            || self.booking_intent
            || self.affirmation
            || self.follow_up_reference
            || self.negotiation_mention
            || self.payment_mention
            || self.property_question
            || self.greeting
            || self.guest_count.is_some()
            || self.has_payer_details()
    }
}

#[derive(Clone, Debug, Default)]
pub struct IntentExtractor;

impl IntentExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(
        &self,
        body: &MessageBody,
        snapshot: &ConversationContext,
        today: NaiveDate,
    ) -> ExtractedSignals {
        let mut signals = self.extract_text(body.text().unwrap_or_default(), snapshot, today);
        if let Some(reference) = body.attachment_ref() {
            signals.screenshot_ref = Some(reference.to_string());
            signals.payment_mention = true;
        }
        signals
    }

    pub fn extract_text(
        &self,
        text: &str,
        snapshot: &ConversationContext,
        today: NaiveDate,
    ) -> ExtractedSignals {
        let lower = text.to_ascii_lowercase();
        let words = normalize_text(&lower);
        let tokens = tokenize(&words);

        let (dates, date_ambiguity) = extract_dates(&lower, &words, today);
        // "sent it today" after the stay is settled is not a request for new dates.
        let date_ambiguity = date_ambiguity.filter(|ambiguity| {
            snapshot.extracted_dates.is_none()
                || !matches!(ambiguity, DateAmbiguity::Relative | DateAmbiguity::SingleDate)
                || contains_any(&words, DATE_CHANGE_PHRASES)
        });
        let dates_known = dates.is_some() || snapshot.extracted_dates.is_some();

        let booking_keyword = contains_any(&words, BOOKING_PHRASES);
        let affirmation = is_affirmation(&tokens);
        let property_topics = extract_property_topics(&words);
        let price_mention = contains_any(&words, PRICE_PHRASES) || lower.contains('$');
        let is_question = lower.contains('?');

        let property_question = !property_topics.is_empty()
            || contains_any(&words, &["what is", "tell me about", "where", "how many", "is there"])
            || (is_question && !booking_keyword && !affirmation);

        let payer_name = labeled_value(text, &lower, NAME_LABELS, &["bank", "account"])
            .or_else(|| {
                expects_payer_details(snapshot)
                    .then(|| labeled_value(text, &lower, INTRODUCTION_LABELS, &[]))
                    .flatten()
            })
            .map(|value| first_words(&value, 5));
        let payer_bank = labeled_value(text, &lower, BANK_LABELS, &[])
            .map(|value| canonical_bank(&value).unwrap_or_else(|| first_words(&value, 4)))
            .or_else(|| if is_question { None } else { canonical_bank(&lower) });

        ExtractedSignals {
            dates,
            date_ambiguity,
            price_mention,
            booking_intent: booking_keyword || (affirmation && dates_known),
            booking_keyword,
            affirmation,
            follow_up_reference: contains_any(&words, FOLLOW_UP_PHRASES),
            negotiation_mention: contains_any(&words, NEGOTIATION_PHRASES),
            payment_mention: contains_any(&words, PAYMENT_PHRASES)
                || canonical_bank(&lower).is_some(),
            property_question,
            property_topics,
            greeting: tokens.first().is_some_and(|first| contains_any(first, GREETINGS))
                || contains_any(&words, &["good morning", "good evening"]),
            guest_count: extract_guest_count(&tokens),
            screenshot_ref: None,
            payer_name,
            payer_bank,
        }
    }
}

/// An unlabeled name only reads as payer evidence once payment has come up.
fn expects_payer_details(snapshot: &ConversationContext) -> bool {
    snapshot.instructions_shown > 0 || snapshot.intake_in_progress()
}

/// Lowercased text with punctuation other than apostrophes replaced by spaces.
fn normalize_text(lower: &str) -> String {
    let mut normalized = String::with_capacity(lower.len());
    for character in lower.chars() {
        if character.is_alphanumeric() || character == '\'' {
            normalized.push(character);
        } else {
            normalized.push(' ');
        }
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tokenize(words: &str) -> Vec<String> {
    words.split_whitespace().map(str::to_string).collect()
}

fn contains_phrase(words: &str, phrase: &str) -> bool {
    let padded = format!(" {words} ");
    padded.contains(&format!(" {phrase} "))
}

fn contains_any(words: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(words, phrase))
}

/// A short reply that opens with a yes-word.
fn is_affirmation(tokens: &[String]) -> bool {
    tokens.len() <= 4
        && tokens.first().is_some_and(|first| AFFIRMATIONS.contains(&first.as_str()))
}

fn extract_property_topics(words: &str) -> Vec<PropertyTopic> {
    let table: &[(PropertyTopic, &[&str])] = &[
        (PropertyTopic::Location, &["location", "address", "where", "located", "directions"]),
        (
            PropertyTopic::CheckInOut,
            &["check in time", "check out time", "checkin time", "checkout time", "what time"],
        ),
        (PropertyTopic::Capacity, &["max guests", "how many guests", "how many people", "capacity"]),
        (
            PropertyTopic::Amenities,
            &["amenities", "amenity", "wifi", "wi fi", "parking", "facilities", "kitchen"],
        ),
        (PropertyTopic::Rate, &["rate", "price per night", "per night", "nightly"]),
        (PropertyTopic::Availability, &["available", "availability", "free on", "vacant"]),
    ];

    table
        .iter()
        .filter(|(_, phrases)| contains_any(words, phrases))
        .map(|(topic, _)| *topic)
        .collect()
}

fn extract_guest_count(tokens: &[String]) -> Option<u32> {
    for window in tokens.windows(2) {
        if let [value, unit] = window {
            if !matches!(
                unit.as_str(),
                "guest" | "guests" | "people" | "persons" | "person" | "adults" | "pax"
            ) {
                continue;
            }
            if let Ok(count) = value.parse::<u32>() {
                return Some(count);
            }
        }
    }
    None
}

/// Value following a label, up to the end of the line, a field separator or the next label.
/// `lower` must be the ASCII-lowercased `original`, so byte offsets line up.
fn labeled_value(
    original: &str,
    lower: &str,
    labels: &[&str],
    excluded_prefixes: &[&str],
) -> Option<String> {
    for label in labels {
        let mut search_from = 0;
        while let Some(found) = lower[search_from..].find(label) {
            let start = search_from + found;
            search_from = start + label.len();

            if !at_word_start(lower, start) || preceded_by_word(lower, start, excluded_prefixes) {
                continue;
            }

            let value_start = start + label.len();
            let rest = &lower[value_start..];
            let mut end = rest
                .find(|character: char| matches!(character, '\n' | '/' | ',' | ';' | '|'))
                .unwrap_or(rest.len());
            for other in NAME_LABELS.iter().chain(INTRODUCTION_LABELS).chain(BANK_LABELS) {
                if let Some(next) = rest[..end].find(other) {
                    if next > 0 && at_word_start(rest, next) {
                        end = end.min(next);
                    }
                }
            }

            let value = original[value_start..value_start + end]
                .trim()
                .trim_end_matches(|character: char| matches!(character, '.' | '!' | ':'))
                .trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn at_word_start(text: &str, index: usize) -> bool {
    index == 0
        || text[..index].chars().next_back().is_some_and(|character| !character.is_alphanumeric())
}

fn preceded_by_word(text: &str, index: usize, words: &[&str]) -> bool {
    let previous = text[..index].split_whitespace().next_back().unwrap_or_default();
    words.contains(&previous)
}

fn first_words(value: &str, limit: usize) -> String {
    value.split_whitespace().take(limit).collect::<Vec<_>>().join(" ")
}

fn canonical_bank(text: &str) -> Option<String> {
    let words = normalize_text(&text.to_ascii_lowercase());
    KNOWN_BANKS
        .iter()
        .find(|(alias, _)| contains_phrase(&words, alias))
        .map(|(_, canonical)| (*canonical).to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct DateSlot {
    day: u32,
    month: Option<u32>,
    year: Option<i32>,
    first_token: usize,
    last_token: usize,
}

#[derive(Default)]
struct DateScan {
    slots: Vec<DateSlot>,
    day_month_order: Option<String>,
    partial: bool,
}

fn extract_dates(
    lower: &str,
    words: &str,
    today: NaiveDate,
) -> (Option<DateRange>, Option<DateAmbiguity>) {
    let tokens = date_tokens(lower);
    let scan = scan_dates(&tokens);

    if let Some(raw) = scan.day_month_order {
        return (None, Some(DateAmbiguity::DayMonthOrder { raw }));
    }

    let slots = resolve_bare_days(scan.slots);
    match slots.as_slice() {
        [] => {
            let relative = contains_any(words, RELATIVE_DATE_WORDS);
            if scan.partial || relative {
                (None, Some(DateAmbiguity::Relative))
            } else {
                (None, None)
            }
        }
        [_] => (None, Some(DateAmbiguity::SingleDate)),
        [check_in, check_out, ..] => match build_range(check_in, check_out, today) {
            Ok(range) => (Some(range), None),
            Err(ambiguity) => (None, Some(ambiguity)),
        },
    }
}

/// Tokens for date scanning. Numeric shapes keep their separators; word-joined ranges such
/// as `24th-30th` are split around the dash.
fn date_tokens(lower: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in lower.split(|character: char| {
        character.is_whitespace() || matches!(character, ',' | '(' | ')' | '!' | '?' | ';' | '"')
    }) {
        let raw = raw.trim_matches(|character: char| matches!(character, '.' | ':'));
        if raw.is_empty() {
            continue;
        }
        let raw = raw.replace(['–', '—'], "-");

        let numeric = raw.chars().all(|c| c.is_ascii_digit() || c == '-' || c == '/')
            && raw.chars().any(|c| c.is_ascii_digit());
        if numeric {
            tokens.push(raw);
            continue;
        }

        for (index, part) in raw.split('-').enumerate() {
            if index > 0 {
                tokens.push("-".to_string());
            }
            if !part.is_empty() {
                tokens.push(part.to_string());
            }
        }
    }
    tokens
}

fn scan_dates(tokens: &[String]) -> DateScan {
    let mut scan = DateScan::default();
    let mut index = 0;

    while index < tokens.len() {
        let token = tokens[index].as_str();

        if let Some((year, month, day)) = parse_iso(token) {
            scan.slots.push(DateSlot {
                day,
                month: Some(month),
                year: Some(year),
                first_token: index,
                last_token: index,
            });
            index += 1;
            continue;
        }

        if let Some(parts) = parse_numeric(token) {
            index = scan_numeric(&mut scan, tokens, index, parts);
            continue;
        }

        if let Some(day) = parse_day(token) {
            let mut cursor = index + 1;
            if tokens.get(cursor).map(String::as_str) == Some("of") {
                cursor += 1;
            }
            if let Some(month) = tokens.get(cursor).and_then(|next| parse_month(next)) {
                let (year, last_token) = trailing_year(tokens, cursor);
                scan.slots.push(DateSlot {
                    day,
                    month: Some(month),
                    year,
                    first_token: index,
                    last_token,
                });
                index = last_token + 1;
            } else {
                scan.slots.push(DateSlot {
                    day,
                    month: None,
                    year: None,
                    first_token: index,
                    last_token: index,
                });
                index += 1;
            }
            continue;
        }

        if let Some(month) = parse_month(token) {
            if let Some(day) = tokens.get(index + 1).and_then(|next| parse_day(next)) {
                let (year, last_token) = trailing_year(tokens, index + 1);
                scan.slots.push(DateSlot {
                    day,
                    month: Some(month),
                    year,
                    first_token: index,
                    last_token,
                });
                index = last_token + 1;
            } else {
                // "may" and "march" are usually verbs when no day follows
                if !matches!(token, "may" | "march") {
                    scan.partial = true;
                }
                index += 1;
            }
            continue;
        }

        index += 1;
    }

    scan
}

/// `24-30 nov` names two days of one month; `24/11` and `24-11-2025` are day-first dates.
fn scan_numeric(
    scan: &mut DateScan,
    tokens: &[String],
    index: usize,
    parts: (u32, u32, Option<i32>),
) -> usize {
    let (first, second, year) = parts;

    if year.is_none() {
        if let Some(month) = tokens.get(index + 1).and_then(|next| parse_month(next)) {
            if (1..=31).contains(&first) && (1..=31).contains(&second) {
                let (year, last_token) = trailing_year(tokens, index + 1);
                for day in [first, second] {
                    scan.slots.push(DateSlot {
                        day,
                        month: Some(month),
                        year,
                        first_token: index,
                        last_token,
                    });
                }
                return last_token + 1;
            }
        }
    }

    if first <= 12 && first != second {
        scan.day_month_order.get_or_insert_with(|| tokens[index].clone());
        return index + 1;
    }
    if !(1..=12).contains(&second) {
        scan.partial = true;
        return index + 1;
    }

    scan.slots.push(DateSlot {
        day: first,
        month: Some(second),
        year,
        first_token: index,
        last_token: index,
    });
    index + 1
}

/// A bare day borrows the month of an adjacent dated slot, at most one separator word away
/// (`24th - 30th Nov`, `Dec 3 to 5`); bare numbers elsewhere are not dates.
fn resolve_bare_days(slots: Vec<DateSlot>) -> Vec<DateSlot> {
    let mut resolved: Vec<DateSlot> = Vec::with_capacity(slots.len());

    for (position, slot) in slots.iter().enumerate() {
        if slot.month.is_some() {
            resolved.push(slot.clone());
            continue;
        }

        let next = slots
            .get(position + 1)
            .filter(|next| next.month.is_some() && next.first_token <= slot.last_token + 2);
        let previous = position
            .checked_sub(1)
            .and_then(|index| slots.get(index))
            .filter(|previous| {
                previous.month.is_some() && slot.first_token <= previous.last_token + 2
            });

        if let Some(neighbour) = next.or(previous) {
            resolved.push(DateSlot {
                month: neighbour.month,
                year: neighbour.year,
                ..slot.clone()
            });
        }
    }

    resolved
}

fn build_range(
    check_in: &DateSlot,
    check_out: &DateSlot,
    today: NaiveDate,
) -> Result<DateRange, DateAmbiguity> {
    let in_month = check_in.month.ok_or(DateAmbiguity::SingleDate)?;
    let out_month = check_out.month.ok_or(DateAmbiguity::SingleDate)?;
    let date = |year: i32, month: u32, day: u32| {
        NaiveDate::from_ymd_opt(year, month, day).ok_or(DateAmbiguity::InvalidDate)
    };

    let (start, end) = match (check_in.year, check_out.year) {
        (Some(in_year), Some(out_year)) => {
            (date(in_year, in_month, check_in.day)?, date(out_year, out_month, check_out.day)?)
        }
        (None, Some(out_year)) => {
            let end = date(out_year, out_month, check_out.day)?;
            let mut start = date(out_year, in_month, check_in.day)?;
            if start >= end {
                start = date(out_year - 1, in_month, check_in.day)?;
            }
            (start, end)
        }
        (Some(in_year), None) => {
            let start = date(in_year, in_month, check_in.day)?;
            let mut end = date(in_year, out_month, check_out.day)?;
            if end <= start {
                end = date(in_year + 1, out_month, check_out.day)?;
            }
            (start, end)
        }
        (None, None) => {
            let mut year = today.year();
            let mut start = date(year, in_month, check_in.day)?;
            if start < today {
                year += 1;
                start = date(year, in_month, check_in.day)?;
            }
            let mut end = date(year, out_month, check_out.day)?;
            if end <= start {
                end = date(year + 1, out_month, check_out.day)?;
            }
            (start, end)
        }
    };

    DateRange::new(start, end).map_err(|_| DateAmbiguity::CheckOutNotAfterCheckIn)
}

fn trailing_year(tokens: &[String], last: usize) -> (Option<i32>, usize) {
    match tokens.get(last + 1).and_then(|next| parse_year(next)) {
        Some(year) => (Some(year), last + 1),
        None => (None, last),
    }
}

fn parse_iso(token: &str) -> Option<(i32, u32, u32)> {
    let parts = token.split(['-', '/']).collect::<Vec<_>>();
    match parts.as_slice() {
        [year, month, day] if year.len() == 4 => {
            Some((year.parse().ok()?, month.parse().ok()?, day.parse().ok()?))
        }
        _ => None,
    }
}

fn parse_numeric(token: &str) -> Option<(u32, u32, Option<i32>)> {
    let parts = token.split(['-', '/']).collect::<Vec<_>>();
    let short = |part: &&str| (1..=2).contains(&part.len());
    match parts.as_slice() {
        [first, second] if short(first) && short(second) => {
            Some((first.parse().ok()?, second.parse().ok()?, None))
        }
        [first, second, year] if short(first) && short(second) => {
            let year = match year.len() {
                2 => 2000 + year.parse::<i32>().ok()?,
                4 => year.parse().ok()?,
                _ => return None,
            };
            Some((first.parse().ok()?, second.parse().ok()?, Some(year)))
        }
        _ => None,
    }
}

fn parse_day(token: &str) -> Option<u32> {
    let digits = token.trim_end_matches(|character: char| character.is_ascii_alphabetic());
    let suffix = &token[digits.len()..];
    if digits.is_empty() || digits.len() > 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !matches!(suffix, "" | "st" | "nd" | "rd" | "th") {
        return None;
    }
    let day = digits.parse::<u32>().ok()?;
    (1..=31).contains(&day).then_some(day)
}

fn parse_month(token: &str) -> Option<u32> {
    let month = match token {
        "jan" | "january" => 1,
        "feb" | "february" => 2,
        "mar" | "march" => 3,
        "apr" | "april" => 4,
        "may" => 5,
        "jun" | "june" => 6,
        "jul" | "july" => 7,
        "aug" | "august" => 8,
        "sep" | "sept" | "september" => 9,
        "oct" | "october" => 10,
        "nov" | "november" => 11,
        "dec" | "december" => 12,
        _ => return None,
    };
    Some(month)
}

fn parse_year(token: &str) -> Option<i32> {
    if token.len() != 4 || !token.chars().all(|character| character.is_ascii_digit()) {
        return None;
    }
    let year = token.parse::<i32>().ok()?;
    (2000..=2100).contains(&year).then_some(year)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use innkeep_core::domain::conversation::{
        ConversationContext, ConversationKey, DateRange, Phase,
    };
    use innkeep_core::domain::message::MessageBody;

    use super::{DateAmbiguity, IntentExtractor, PropertyTopic};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 18).expect("valid date")
    }

    fn empty() -> ConversationContext {
        ConversationContext::new(ConversationKey::new("guest-1", "prop-lakeview"))
    }

    fn range(year: i32, month: u32, from: u32, to_month: u32, to: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(year, month, from).expect("valid date"),
            NaiveDate::from_ymd_opt(year, to_month, to).expect("valid date"),
        )
        .expect("valid range")
    }

    #[test]
    fn recognizes_common_date_range_shapes() {
        struct Case {
            text: &'static str,
            expected: DateRange,
        }

        let cases = vec![
            Case { text: "2025-11-24 to 2025-11-30", expected: range(2025, 11, 24, 11, 30) },
            Case { text: "24th Nov - 30th Nov 2025", expected: range(2025, 11, 24, 11, 30) },
            Case { text: "from 24 November to 30 November", expected: range(2025, 11, 24, 11, 30) },
            Case {
                text: "December 1, 2025 until December 4, 2025",
                expected: range(2025, 12, 1, 12, 4),
            },
            Case { text: "24/11 - 28/11", expected: range(2025, 11, 24, 11, 28) },
            Case { text: "24th-30th Nov please", expected: range(2025, 11, 24, 11, 30) },
            Case { text: "Dec 3 to 5 for 2 guests", expected: range(2025, 12, 3, 12, 5) },
            Case { text: "staying 24-30 nov", expected: range(2025, 11, 24, 11, 30) },
        ];

        let extractor = IntentExtractor::new();
        for case in cases {
            let signals = extractor.extract_text(case.text, &empty(), today());
            assert_eq!(signals.dates, Some(case.expected), "case: {}", case.text);
            assert!(signals.date_ambiguity.is_none(), "case: {}", case.text);
        }
    }

    #[test]
    fn missing_year_rolls_forward_when_check_in_has_passed() {
        let signals =
            IntentExtractor::new().extract_text("3rd Feb to 6th Feb", &empty(), today());
        assert_eq!(signals.dates, Some(range(2026, 2, 3, 2, 6)));
    }

    #[test]
    fn range_across_new_year_moves_check_out_into_next_year() {
        let signals = IntentExtractor::new().extract_text("Dec 28 - Jan 2", &empty(), today());
        let expected = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 12, 28).expect("valid date"),
            NaiveDate::from_ymd_opt(2026, 1, 2).expect("valid date"),
        )
        .expect("valid range");
        assert_eq!(signals.dates, Some(expected));
    }

    #[test]
    fn ambiguous_or_partial_dates_never_produce_a_guess() {
        let extractor = IntentExtractor::new();

        let single = extractor.extract_text("arriving 24th Nov", &empty(), today());
        assert_eq!(single.dates, None);
        assert_eq!(single.date_ambiguity, Some(DateAmbiguity::SingleDate));

        let numeric = extractor.extract_text("05/11 to 09/11", &empty(), today());
        assert_eq!(numeric.dates, None);
        assert!(matches!(numeric.date_ambiguity, Some(DateAmbiguity::DayMonthOrder { .. })));

        let relative = extractor.extract_text("can I come next week?", &empty(), today());
        assert_eq!(relative.date_ambiguity, Some(DateAmbiguity::Relative));

        let impossible = extractor.extract_text("30 Feb to 3 Mar 2026", &empty(), today());
        assert_eq!(impossible.date_ambiguity, Some(DateAmbiguity::InvalidDate));
    }

    #[test]
    fn known_dates_silence_incidental_date_words_but_not_changes() {
        let extractor = IntentExtractor::new();
        let mut snapshot = empty();
        snapshot.extracted_dates = Some(range(2025, 11, 24, 11, 30));

        let receipt = extractor.extract_text("Bank: JazzCash, I sent it today", &snapshot, today());
        assert_eq!(receipt.date_ambiguity, None);
        assert_eq!(receipt.payer_bank.as_deref(), Some("JazzCash"));

        let arrival = extractor.extract_text("we land on 24th Nov", &snapshot, today());
        assert_eq!(arrival.date_ambiguity, None);

        let change = extractor.extract_text("can we change to next week?", &snapshot, today());
        assert_eq!(change.date_ambiguity, Some(DateAmbiguity::Relative));

        let moved = extractor.extract_text("actually arriving 26th Nov", &snapshot, today());
        assert_eq!(moved.date_ambiguity, Some(DateAmbiguity::SingleDate));
    }

    #[test]
    fn plain_numbers_are_not_dates() {
        let signals =
            IntentExtractor::new().extract_text("we are 2 people for 6 nights", &empty(), today());
        assert_eq!(signals.dates, None);
        assert_eq!(signals.date_ambiguity, None);
        assert_eq!(signals.guest_count, Some(2));
    }

    #[test]
    fn bare_affirmation_is_booking_intent_only_with_known_dates() {
        let extractor = IntentExtractor::new();
        let without_dates = extractor.extract_text("yes", &empty(), today());
        assert!(without_dates.affirmation);
        assert!(!without_dates.booking_intent);

        let mut snapshot = empty();
        snapshot.extracted_dates = Some(range(2025, 11, 24, 11, 30));
        let with_dates = extractor.extract_text("Yes!", &snapshot, today());
        assert!(with_dates.booking_intent);
        assert!(!with_dates.booking_keyword);
    }

    #[test]
    fn detects_negotiation_payment_and_follow_up_vocabulary() {
        let extractor = IntentExtractor::new();

        let negotiation = extractor.extract_text("can we negotiate?", &empty(), today());
        assert!(negotiation.negotiation_mention);

        let follow_up =
            extractor.extract_text("you said it was cheaper before", &empty(), today());
        assert!(follow_up.follow_up_reference);
        assert!(follow_up.negotiation_mention);

        let payment = extractor.extract_text("I sent the payment", &empty(), today());
        assert!(payment.payment_mention);
    }

    #[test]
    fn property_questions_carry_topics_and_commercial_flag() {
        let extractor = IntentExtractor::new();
        let question = extractor.extract_text("Is there wifi and parking?", &empty(), today());
        assert!(question.property_question);
        assert_eq!(question.property_topics, vec![PropertyTopic::Amenities]);
        assert!(!question.router_signals(&empty()).commercial_keywords);

        let priced = extractor.extract_text("what is the price per night?", &empty(), today());
        assert!(priced.property_question);
        assert!(priced.router_signals(&empty()).commercial_keywords);
    }

    #[test]
    fn labeled_payer_details_are_extracted_with_original_casing() {
        let extractor = IntentExtractor::new();
        let signals =
            extractor.extract_text("Name: Ali Khan / Bank: JazzCash", &empty(), today());
        assert_eq!(signals.payer_name.as_deref(), Some("Ali Khan"));
        assert_eq!(signals.payer_bank.as_deref(), Some("JazzCash"));

        let inline = extractor.extract_text("Full name: Sara Malik Bank: hbl", &empty(), today());
        assert_eq!(inline.payer_name.as_deref(), Some("Sara Malik"));
        assert_eq!(inline.payer_bank.as_deref(), Some("HBL"));
    }

    #[test]
    fn introductions_count_as_payer_name_only_once_payment_is_underway() {
        let extractor = IntentExtractor::new();
        let text = "Hi, my name is Sara, is the flat available?";

        let greeting = extractor.extract_text(text, &empty(), today());
        assert_eq!(greeting.payer_name, None);
        assert!(!greeting.router_signals(&empty()).payment_mention);

        let mut instructed = empty();
        instructed.instructions_shown = 1;
        let evidence = extractor.extract_text("My name is Sara Ahmed", &instructed, today());
        assert_eq!(evidence.payer_name.as_deref(), Some("Sara Ahmed"));
    }

    #[test]
    fn labeled_name_alone_moves_to_payment_only_from_booking() {
        let extractor = IntentExtractor::new();
        let signals = extractor.extract_text("Name: Ali Khan", &empty(), today());
        assert_eq!(signals.payer_name.as_deref(), Some("Ali Khan"));
        assert!(!signals.router_signals(&empty()).payment_mention);

        let mut booking = empty();
        booking.active_phase = Phase::Booking;
        assert!(signals.router_signals(&booking).payment_mention);
    }

    #[test]
    fn bank_heuristic_ignores_questions_and_bank_name_labels() {
        let extractor = IntentExtractor::new();
        let statement = extractor.extract_text("paid through easypaisa", &empty(), today());
        assert_eq!(statement.payer_bank.as_deref(), Some("EasyPaisa"));

        let question = extractor.extract_text("do you accept jazzcash?", &empty(), today());
        assert_eq!(question.payer_bank, None);

        let host_label = extractor.extract_text("Bank name: Meezan", &empty(), today());
        assert_eq!(host_label.payer_name, None);
        assert_eq!(host_label.payer_bank.as_deref(), Some("Meezan Bank"));
    }

    #[test]
    fn attachment_counts_as_payment_evidence() {
        let body = MessageBody::Attachment {
            reference: "file://receipts/1.jpg".to_string(),
            caption: None,
        };
        let signals = IntentExtractor::new().extract(&body, &empty(), today());
        assert_eq!(signals.screenshot_ref.as_deref(), Some("file://receipts/1.jpg"));
        assert!(signals.router_signals(&empty()).payment_mention);
    }

    #[test]
    fn small_talk_is_off_topic_but_greetings_are_not() {
        let extractor = IntentExtractor::new();
        assert!(!extractor.extract_text("who won the cricket match", &empty(), today()).is_on_topic());
        assert!(extractor.extract_text("Hello there", &empty(), today()).is_on_topic());
        assert!(extractor
            .extract_text("but we agreed on this earlier", &empty(), today())
            .is_on_topic());
    }
}
