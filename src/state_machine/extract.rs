//! Slot extractors
//!
//! Every extractor takes lowercased text and returns the value it found with
//! the byte range it matched, so the caller can consume that span.

use crate::money::{format_usd, round2};
use crate::studio::ShootId;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::LazyLock;

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());

static US_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap());

static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:%|percent\b)").unwrap());

static FLAT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\s*(\d+(?:\.\d{1,2})?)\b").unwrap());

static BARE_AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+(?:\.\d{1,2})?)\b").unwrap());

static SHOOT_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:#\s*|\b(?:shoot|booking)\s+#?)(\d+)\b").unwrap());

static INVOICE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\binv-\d{8}-\d+\b").unwrap());

// House number, one to three street words, a street suffix, then optionally
// ", City, ST 12345".
static STREET_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b\d{1,6}\s+(?:[a-z0-9.'-]+\s+){1,3}?(?:street|st|avenue|ave|road|rd|drive|dr|boulevard|blvd|lane|ln|court|ct|way|place|pl|terrace|ter|parkway|pkwy|circle|cir|highway|hwy|trail|trl)\b\.?(?:\s*,\s*[a-z][a-z .'-]*?\s*,\s*[a-z]{2}\b(?:\s+\d{5})?)?",
    )
    .unwrap()
});

// ============================================================================
// Phrases
// ============================================================================

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// First word-bounded occurrence of `phrase`
pub fn find_phrase(text: &str, phrase: &str) -> Option<Range<usize>> {
    let mut from = 0;
    while let Some(offset) = text.get(from..)?.find(phrase) {
        let start = from + offset;
        let end = start + phrase.len();
        let before = text.get(..start).and_then(|s| s.chars().next_back());
        let after = text.get(end..).and_then(|s| s.chars().next());
        if !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char) {
            return Some(start..end);
        }
        from = start + phrase.chars().next().map_or(1, char::len_utf8);
    }
    None
}

/// First phrase of the table, in table order, found in `text`
pub fn find_any(text: &str, phrases: &[&'static str]) -> Option<(&'static str, Range<usize>)> {
    phrases
        .iter()
        .find_map(|p| find_phrase(text, p).map(|range| (*p, range)))
}

const AFFIRMATIVE: &[&str] = &[
    "yes", "yeah", "yep", "yup", "sure", "ok", "okay", "confirm", "proceed", "go ahead",
    "do it",
];

const NEGATIVE: &[&str] = &["no", "nope", "nah", "keep", "don't", "dont", "not now"];

pub fn is_affirmative(text: &str) -> bool {
    find_any(text, AFFIRMATIVE).is_some()
}

pub fn is_negative(text: &str) -> bool {
    find_any(text, NEGATIVE).is_some()
}

// ============================================================================
// Dates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDay {
    Today,
    Tomorrow,
    /// Strictly after today
    Next(Weekday),
    InDays(i64),
    /// The Monday after the week that starts a week from today
    MondayAfterNext,
}

impl RelativeDay {
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            RelativeDay::Today => today,
            RelativeDay::Tomorrow => today + Duration::days(1),
            RelativeDay::Next(weekday) => next_weekday(today, weekday),
            RelativeDay::InDays(days) => today + Duration::days(days),
            RelativeDay::MondayAfterNext => {
                next_weekday(today + Duration::days(7), Weekday::Mon)
            }
        }
    }
}

fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (i64::from(weekday.num_days_from_monday())
        - i64::from(from.weekday().num_days_from_monday()))
    .rem_euclid(7);
    from + Duration::days(if ahead == 0 { 7 } else { ahead })
}

/// A date word and the day it stands for
pub struct DatePhrase {
    pub phrase: &'static str,
    pub day: RelativeDay,
}

const fn phrase(phrase: &'static str, day: RelativeDay) -> DatePhrase {
    DatePhrase { phrase, day }
}

/// New bookings
pub const BOOKING_DATES: &[DatePhrase] = &[
    phrase("today", RelativeDay::Today),
    phrase("tomorrow", RelativeDay::Tomorrow),
    phrase("this weekend", RelativeDay::Next(Weekday::Sat)),
    phrase("next week", RelativeDay::InDays(7)),
];

/// Moving an existing booking
pub const RESCHEDULE_DATES: &[DatePhrase] = &[
    phrase("today", RelativeDay::Today),
    phrase("tomorrow", RelativeDay::Tomorrow),
    phrase("this weekend", RelativeDay::Next(Weekday::Sat)),
    phrase("weekend", RelativeDay::Next(Weekday::Sat)),
    phrase("saturday", RelativeDay::Next(Weekday::Sat)),
    phrase("sunday", RelativeDay::Next(Weekday::Sun)),
    phrase("this week", RelativeDay::InDays(2)),
    phrase("next week", RelativeDay::InDays(7)),
];

/// Looking up open slots
pub const AVAILABILITY_DATES: &[DatePhrase] = &[
    phrase("today", RelativeDay::Today),
    phrase("tomorrow", RelativeDay::Tomorrow),
    phrase("this week", RelativeDay::Next(Weekday::Mon)),
    phrase("next week", RelativeDay::MondayAfterNext),
];

/// Blocking a photographer's day
pub const BLOCK_DATES: &[DatePhrase] = &[
    phrase("today", RelativeDay::Today),
    phrase("tomorrow", RelativeDay::Tomorrow),
    phrase("this weekend", RelativeDay::Next(Weekday::Sat)),
    phrase("saturday", RelativeDay::Next(Weekday::Sat)),
    phrase("next week", RelativeDay::InDays(7)),
];

/// ISO or US date, then the vocabulary's words
pub fn date(text: &str, today: NaiveDate, vocab: &[DatePhrase]) -> Option<(NaiveDate, Range<usize>)> {
    explicit_date(text).or_else(|| {
        vocab
            .iter()
            .find_map(|p| find_phrase(text, p.phrase).map(|range| (p.day.resolve(today), range)))
    })
}

fn explicit_date(text: &str) -> Option<(NaiveDate, Range<usize>)> {
    let field = |caps: &regex::Captures<'_>, i: usize| -> Option<u32> {
        caps.get(i).and_then(|m| m.as_str().parse().ok())
    };
    if let Some(caps) = ISO_DATE_RE.captures(text) {
        let year = caps.get(1).and_then(|m| m.as_str().parse().ok())?;
        let date = NaiveDate::from_ymd_opt(year, field(&caps, 2)?, field(&caps, 3)?)?;
        return Some((date, caps.get(0)?.range()));
    }
    let caps = US_DATE_RE.captures(text)?;
    let year = caps.get(3).and_then(|m| m.as_str().parse().ok())?;
    let date = NaiveDate::from_ymd_opt(year, field(&caps, 1)?, field(&caps, 2)?)?;
    Some((date, caps.get(0)?.range()))
}

/// "Tuesday, June 17, 2025"
pub fn format_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// "Jun 17"
pub fn format_short_date(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

// ============================================================================
// Times
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeOfDay {
    pub label: String,
    pub time: NaiveTime,
}

const TIME_WINDOWS: &[(&str, &str, u32)] = &[
    ("golden hour", "Golden hour", 17),
    ("morning", "Morning", 10),
    ("afternoon", "Afternoon", 14),
    ("evening", "Evening", 17),
    ("noon", "Noon", 12),
];

const FALLBACK_HOUR: u32 = 12;

fn hour(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Clock time like "2:30 pm", else a named window like "morning"
pub fn time_of_day(text: &str) -> Option<(TimeOfDay, Range<usize>)> {
    if let Some(caps) = CLOCK_RE.captures(text) {
        let h: u32 = caps.get(1)?.as_str().parse().ok()?;
        let m: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        let pm = caps.get(3)?.as_str() == "pm";
        if (1..=12).contains(&h) {
            let h24 = h % 12 + if pm { 12 } else { 0 };
            let time = NaiveTime::from_hms_opt(h24, m, 0)?;
            let label = time.format("%-I:%M %p").to_string();
            return Some((TimeOfDay { label, time }, caps.get(0)?.range()));
        }
    }
    TIME_WINDOWS.iter().find_map(|(word, label, h)| {
        find_phrase(text, word).map(|range| {
            (
                TimeOfDay {
                    label: (*label).to_string(),
                    time: hour(*h),
                },
                range,
            )
        })
    })
}

/// Start time for a free-text window label; unknown labels start at noon
pub fn window_start(label: &str) -> NaiveTime {
    let lower = label.to_ascii_lowercase();
    time_of_day(&lower).map_or_else(|| hour(FALLBACK_HOUR), |(t, _)| t.time)
}

// ============================================================================
// Money
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    Percent(f64),
    Flat(f64),
}

impl Discount {
    pub fn amount_off(self, original: f64) -> f64 {
        match self {
            Discount::Percent(pct) => round2(original * pct.clamp(0.0, 100.0) / 100.0),
            Discount::Flat(amount) => round2(amount),
        }
    }

    /// New total, never below zero
    pub fn apply(self, original: f64) -> f64 {
        round2((original - self.amount_off(original)).max(0.0))
    }

    pub fn label(self) -> String {
        match self {
            Discount::Percent(pct) => format!("{pct}%"),
            Discount::Flat(amount) => format_usd(amount),
        }
    }
}

/// Percent beats flat dollars; a bare number counts as dollars only if allowed
pub fn discount(text: &str, allow_bare: bool) -> Option<(Discount, Range<usize>)> {
    let amount = |re: &Regex| -> Option<(f64, Range<usize>)> {
        let caps = re.captures(text)?;
        let value = caps.get(1)?.as_str().parse().ok()?;
        Some((value, caps.get(0)?.range()))
    };
    if let Some((pct, range)) = amount(&PERCENT_RE) {
        return Some((Discount::Percent(pct), range));
    }
    if let Some((flat, range)) = amount(&FLAT_RE) {
        return Some((Discount::Flat(flat), range));
    }
    if allow_bare {
        return amount(&BARE_AMOUNT_RE).map(|(flat, range)| (Discount::Flat(flat), range));
    }
    None
}

// ============================================================================
// References and addresses
// ============================================================================

/// "#104", "shoot 104", "booking #104"
pub fn shoot_ref(text: &str) -> Option<(ShootId, Range<usize>)> {
    let caps = SHOOT_REF_RE.captures(text)?;
    let id = caps.get(1)?.as_str().parse().ok()?;
    Some((id, caps.get(0)?.range()))
}

/// "INV-20250616-0104", uppercased
pub fn invoice_number(text: &str) -> Option<(String, Range<usize>)> {
    let m = INVOICE_NUMBER_RE.find(text)?;
    Some((m.as_str().to_ascii_uppercase(), m.range()))
}

/// A street address with a house number and a street suffix
pub fn street_address(text: &str) -> Option<((), Range<usize>)> {
    STREET_ADDRESS_RE.find(text).map(|m| ((), m.range()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParts {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl AddressParts {
    /// "address, city, state" without the empty parts
    pub fn label(&self) -> String {
        [&self.address, &self.city, &self.state]
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Split "123 Main St, Austin, TX 78701" into its parts
pub fn split_address(label: &str) -> AddressParts {
    let mut parts = label
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from);
    let address = parts.next().unwrap_or_default();
    let city = parts.next().unwrap_or_default();
    let mut state = String::new();
    let mut zip = String::new();
    if let Some(tail) = parts.next() {
        for token in tail.split_whitespace() {
            if token.chars().all(|c| c.is_ascii_digit()) {
                zip = token.to_string();
            } else if state.is_empty() {
                state = token.to_string();
            }
        }
    }
    if let Some(extra) = parts.next() {
        if zip.is_empty() && extra.chars().all(|c| c.is_ascii_digit()) {
            zip = extra;
        }
    }
    AddressParts {
        address,
        city,
        state,
        zip,
    }
}
