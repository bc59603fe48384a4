use once_cell::sync::Lazy;
use regex::Regex;

/// Scheduling vocabulary. Intentionally broad: false positives only cost
/// one clarifying turn, false negatives drop the user into plain chat.
static SCHEDULING_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \b(
            book(ing)? | schedul\w* | appointment | reserve | reservation
          | visit | meeting | consultation | assessment
          | quote | estimate | maintenance
          | availab\w* | (time\ )?slot | calendar | agenda
        )\b",
    )
    .expect("scheduling intent regex")
});

/// Cheap gate deciding whether a message enters the booking dialogue.
/// Expects normalized text. No side effects.
pub fn is_scheduling_intent(normalized: &str) -> bool {
    SCHEDULING_TERMS.is_match(normalized)
}
