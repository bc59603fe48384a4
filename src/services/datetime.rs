//! Rule-based date/time extraction.
//!
//! Each rule is a pure function `(text, now) -> Option<NaiveDateTime>`;
//! `extract_datetime` tries them in a fixed order and the first match
//! wins. Text is expected pre-normalized (lowercase, no diacritics).
//! All times are naive process-local clock times; cross-timezone
//! participants are not modeled.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

/// Hour used when a date is given without a time.
const DEFAULT_HOUR: u32 = 9;

type Rule = fn(&str, NaiveDateTime) -> Option<NaiveDateTime>;

const RULES: &[Rule] = &[
    explicit_day_month,
    relative_day,
    weekday_name,
    bare_time,
];

pub fn extract_datetime(normalized: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    RULES.iter().find_map(|rule| rule(normalized, now))
}

// ── Rule 1: explicit dd/mm with optional time ──

static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:\s*(?:at)?\s*(\d{1,2})(?::(\d{2}))?\s*(am|pm|h)?)?\b")
        .expect("day/month regex")
});

fn explicit_day_month(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let caps = DAY_MONTH.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;

    let (hour, minute) = match caps.get(3) {
        Some(h) => adjust_meridiem(
            h.as_str().parse().ok()?,
            caps.get(4).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
            caps.get(5).map(|s| s.as_str()),
        )?,
        None => (DEFAULT_HOUR, 0),
    };

    NaiveDate::from_ymd_opt(now.year(), month, day)?.and_hms_opt(hour, minute, 0)
}

// ── Rule 2: today / tomorrow / day after tomorrow ──

fn relative_day(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let offset = if text.contains("day after tomorrow") {
        2
    } else if text.contains("tomorrow") {
        1
    } else if contains_word(text, "today") {
        0
    } else {
        return None;
    };

    let (hour, minute) = find_time(text).unwrap_or((DEFAULT_HOUR, 0));
    (now.date() + Duration::days(offset)).and_hms_opt(hour, minute, 0)
}

// ── Rule 3: weekday name + time, always the next occurrence ──

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

fn weekday_name(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let (_, target) = WEEKDAYS
        .iter()
        .find(|(name, _)| contains_word(text, name))?;

    // Without a time the rule does not fire; the caller re-prompts.
    let (hour, minute) = find_time(text)?;

    let today = now.weekday().num_days_from_monday() as i64;
    let wanted = target.num_days_from_monday() as i64;
    let mut diff = wanted - today;
    if diff <= 0 {
        // Same weekday rolls a full week, never same-day.
        diff += 7;
    }

    (now.date() + Duration::days(diff)).and_hms_opt(hour, minute, 0)
}

// ── Rule 4: bare time, today or tomorrow if already past ──

static BARE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm|h|hours)?\s*$")
        .expect("bare time regex")
});

fn bare_time(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let caps = BARE_TIME.captures(text)?;
    let (hour, minute) = adjust_meridiem(
        caps[1].parse().ok()?,
        caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0),
        caps.get(3).map(|s| s.as_str()),
    )?;

    let candidate = now.date().and_hms_opt(hour, minute, 0)?;
    if candidate < now {
        (now.date() + Duration::days(1)).and_hms_opt(hour, minute, 0)
    } else {
        Some(candidate)
    }
}

// ── Shared helpers ──

/// Time mention with an explicit marker: "at 15", "15:30", "3pm", "8h".
/// The marker requirement keeps ordinary numerals ("order 33") out.
static TIME_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b(at)\s+)?\b(\d{1,2})(?::(\d{2}))?\s*(am|pm|h|hours)?\b")
        .expect("time mention regex")
});

fn find_time(text: &str) -> Option<(u32, u32)> {
    for caps in TIME_MENTION.captures_iter(text) {
        let has_marker =
            caps.get(1).is_some() || caps.get(3).is_some() || caps.get(4).is_some();
        if !has_marker {
            continue;
        }
        let hour: u32 = caps[2].parse().ok()?;
        let minute: u32 = caps.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        if let Some(adjusted) = adjust_meridiem(hour, minute, caps.get(4).map(|s| s.as_str())) {
            return Some(adjusted);
        }
    }
    None
}

fn adjust_meridiem(hour: u32, minute: u32, suffix: Option<&str>) -> Option<(u32, u32)> {
    let hour = match suffix {
        Some("pm") if hour < 12 => hour + 12,
        Some("am") if hour == 12 => 0,
        _ => hour,
    };
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}
