use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical appointment categories, tested in this priority order.
/// First hit wins so "a meeting about the maintenance quote" stays a
/// Meeting.
const CATEGORIES: &[(&str, &str)] = &[
    (r"\b(visit|inspection|site\ survey)\b", "Visit"),
    (r"\bmeeting\b", "Meeting"),
    (r"\bconsult(ation)?\b", "Consultation"),
    (r"\b(assessment|evaluation)\b", "Assessment"),
    (r"\b(quote|estimate|quotation)\b", "Quote"),
    (r"\b(maintenance|servicing)\b", "Maintenance"),
    (r"\bsupport\b", "Support"),
    (r"\b(demo|demonstration)\b", "Demo"),
];

static CATEGORY_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    CATEGORIES
        .iter()
        .map(|(pat, label)| {
            (
                Regex::new(&format!("(?x){pat}")).expect("category regex"),
                *label,
            )
        })
        .collect()
});

/// Phrase following a connector word, e.g. "a slot *for* fixing my AC".
static CONNECTOR_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:for|to|about|pick up|drop off|get|buy)\s+(.{3,60}?)(?:[.,!?]|$)")
        .expect("connector phrase regex")
});

const TITLE_PHRASE_MAX: usize = 40;
const TITLE_MESSAGE_MAX: usize = 80;
pub const GENERIC_TITLE: &str = "Service";

/// Maps normalized text to a canonical category, if one is mentioned.
pub fn extract_category(normalized: &str) -> Option<&'static str> {
    CATEGORY_RULES
        .iter()
        .find(|(rx, _)| rx.is_match(normalized))
        .map(|(_, label)| *label)
}

/// Category, else a short connector-derived phrase, else the message
/// itself when short enough, else a generic label. Deterministic.
pub fn extract_title(normalized: &str) -> String {
    if let Some(category) = extract_category(normalized) {
        return category.to_string();
    }

    if let Some(caps) = CONNECTOR_PHRASE.captures(normalized) {
        let phrase = caps[1].trim();
        if !phrase.is_empty() && phrase.chars().count() <= TITLE_PHRASE_MAX {
            return capitalize(phrase);
        }
    }

    if normalized.chars().count() < TITLE_MESSAGE_MAX && !normalized.is_empty() {
        return capitalize(normalized);
    }

    GENERIC_TITLE.to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
    }
}
