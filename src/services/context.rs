//! Bounded prompt assembly for the fallback chat path.
//!
//! Pure function of (tenant config, turn history, current message):
//! persona system segment, as much verbatim history as fits a fixed
//! character budget, one digest segment for whatever overflows, a
//! topic guard when the subject shifts, and finally the current
//! message.

use crate::models::{ConversationTurn, Tenant};
use crate::services::ai::PromptSegment;
use crate::services::text::normalize;

/// Character budget for verbatim history (~6k tokens at ~4 chars/token).
pub const CONTEXT_CHAR_BUDGET: usize = 24_000;
/// Overflow compaction caps: most-recent pairs kept, digest length.
const DIGEST_MAX_PAIRS: usize = 50;
const DIGEST_MAX_CHARS: usize = 4_000;

/// Product/category vocabulary used for primary-subject tracking.
const SUBJECT_TERMS: &[&str] = &[
    "phone",
    "smartphone",
    "iphone",
    "laptop",
    "notebook",
    "computer",
    "fridge",
    "refrigerator",
    "freezer",
    "air conditioner",
    "tv",
    "television",
    "stove",
    "oven",
    "microwave",
    "washing machine",
    "dryer",
    "mattress",
    "bed",
];

pub fn assemble(tenant: &Tenant, history: &[ConversationTurn], current: &str) -> Vec<PromptSegment> {
    let mut segments = vec![PromptSegment::system(persona_prompt(tenant))];

    if !tenant.retain_context {
        segments.push(PromptSegment::user(current));
        return segments;
    }

    // Primary subject: first known product term anywhere in history.
    let primary_subject = history.iter().find_map(|turn| {
        let norm = normalize(&turn.user_message);
        SUBJECT_TERMS.iter().find(|t| norm.contains(*t)).copied()
    });

    if let Some(subject) = primary_subject {
        let current_norm = normalize(current);
        if let Some(switched) = SUBJECT_TERMS
            .iter()
            .find(|t| current_norm.contains(*t) && **t != subject)
        {
            segments.push(PromptSegment::system(format!(
                "NOTE: the customer mentioned a possible new subject \"{switched}\" but the \
                 conversation so far was about \"{subject}\". Confirm with the customer before \
                 switching topics."
            )));
        }
    }

    // Greedy oldest-first inclusion under the budget; everything past
    // the cutoff is compacted into one digest segment.
    let mut used = 0usize;
    let mut verbatim: Vec<PromptSegment> = vec![];
    let mut overflow: Vec<String> = vec![];

    for turn in history {
        let pair_chars = turn.user_message.len() + turn.assistant_reply.len();
        if used + pair_chars <= CONTEXT_CHAR_BUDGET {
            verbatim.push(PromptSegment::user(&turn.user_message));
            if !turn.assistant_reply.is_empty() {
                verbatim.push(PromptSegment::assistant(&turn.assistant_reply));
            }
            used += pair_chars;
        } else {
            overflow.push(format!("U:{} A:{}", turn.user_message, turn.assistant_reply));
        }
    }

    if !overflow.is_empty() {
        let start = overflow.len().saturating_sub(DIGEST_MAX_PAIRS);
        let digest = truncate_chars(&overflow[start..].join(" | "), DIGEST_MAX_CHARS);
        segments.push(PromptSegment::system(format!(
            "Compact summary of older parts of the conversation (keep coherence, do not repeat \
             questions already asked): {digest}"
        )));
    }

    if let Some(subject) = primary_subject {
        segments.push(PromptSegment::system(format!(
            "Primary subject identified so far: {subject}. Stay consistent; only switch after \
             the customer explicitly confirms."
        )));
    }

    segments.extend(verbatim);
    segments.push(PromptSegment::user(current));
    segments
}

fn persona_prompt(tenant: &Tenant) -> String {
    let intro = match tenant.assistant_name.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(name) => format!("You are {name}, virtual assistant of \"{}\".", tenant.name),
        None => format!("You are the virtual assistant of \"{}\".", tenant.name),
    };

    let mut prompt = match tenant.ai_instructions.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(instructions) => format!("{intro}\n\n{}", instructions.trim()),
        None => {
            let mut p = intro;
            if let Some(info) = tenant.business_info.as_deref().filter(|s| !s.trim().is_empty()) {
                p.push_str(&format!("\n\nBusiness information: {}", info.trim()));
            }
            p
        }
    };

    prompt.push_str(
        "\n\nIMPORTANT RULES:\n\
         - NEVER mention that you are an AI or a language model\n\
         - ALWAYS act as real staff of the business\n\
         - If you don't know something specific, be honest and offer contact alternatives\n\
         - Keep the focus on the business's products and services",
    );
    prompt
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::Role;
    use chrono::Utc;

    fn tenant() -> Tenant {
        let mut t = Tenant::new(1, "Acme Appliances");
        t.business_info = Some("We sell and repair home appliances.".to_string());
        t
    }

    fn turn(user: &str, reply: &str) -> ConversationTurn {
        ConversationTurn {
            id: 0,
            tenant_id: 1,
            participant: "+15551110000".to_string(),
            user_message: user.to_string(),
            assistant_reply: reply.to_string(),
            engine: "gpt".to_string(),
            success: true,
            created_at: Utc::now().naive_utc(),
        }
    }

    fn history_chars(segments: &[PromptSegment]) -> usize {
        segments
            .iter()
            .filter(|s| matches!(s.role, Role::User | Role::Assistant))
            .map(|s| s.content.len())
            .sum::<usize>()
    }

    #[test]
    fn persona_uses_assistant_name_when_set() {
        let mut t = tenant();
        t.assistant_name = Some("Ana".to_string());
        let segments = assemble(&t, &[], "hello");
        assert!(segments[0].content.starts_with("You are Ana, virtual assistant"));
        assert!(segments[0].content.contains("NEVER mention that you are an AI"));
    }

    #[test]
    fn custom_instructions_replace_business_info() {
        let mut t = tenant();
        t.ai_instructions = Some("Answer in haiku.".to_string());
        let segments = assemble(&t, &[], "hello");
        assert!(segments[0].content.contains("Answer in haiku."));
        assert!(!segments[0].content.contains("home appliances"));
    }

    #[test]
    fn context_disabled_sends_only_current_message() {
        let mut t = tenant();
        t.retain_context = false;
        let history = vec![turn("earlier question", "earlier answer")];
        let segments = assemble(&t, &history, "what about delivery?");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].role, Role::User);
        assert_eq!(segments[1].content, "what about delivery?");
    }

    #[test]
    fn short_history_is_included_verbatim() {
        let t = tenant();
        let history = vec![turn("first", "reply one"), turn("second", "reply two")];
        let segments = assemble(&t, &history, "third");
        let texts: Vec<_> = segments.iter().map(|s| s.content.as_str()).collect();
        assert!(texts.contains(&"first"));
        assert!(texts.contains(&"reply two"));
        assert_eq!(segments.last().unwrap().content, "third");
    }

    #[test]
    fn budget_is_never_exceeded_and_overflow_is_one_digest() {
        let t = tenant();
        let big = "m".repeat(3_000);
        let history: Vec<_> = (0..20).map(|_| turn(&big, &big)).collect();

        let segments = assemble(&t, &history, "current");
        assert!(history_chars(&segments) <= CONTEXT_CHAR_BUDGET + "current".len());

        let digests: Vec<_> = segments
            .iter()
            .filter(|s| s.content.starts_with("Compact summary"))
            .collect();
        assert_eq!(digests.len(), 1);
        assert!(digests[0].content.len() <= DIGEST_MAX_CHARS + 120);
    }

    #[test]
    fn no_digest_when_everything_fits() {
        let t = tenant();
        let history = vec![turn("hi", "hello")];
        let segments = assemble(&t, &history, "current");
        assert!(!segments.iter().any(|s| s.content.starts_with("Compact summary")));
    }

    #[test]
    fn topic_switch_injects_guard() {
        let t = tenant();
        let history = vec![turn("my fridge is broken", "sorry to hear!")];
        let segments = assemble(&t, &history, "actually, how much is a laptop?");
        assert!(segments
            .iter()
            .any(|s| s.content.contains("Confirm with the customer before switching")));
        assert!(segments
            .iter()
            .any(|s| s.content.contains("Primary subject identified so far: fridge")));
    }

    #[test]
    fn same_subject_has_no_guard() {
        let t = tenant();
        let history = vec![turn("my fridge is broken", "sorry to hear!")];
        let segments = assemble(&t, &history, "can you repair the fridge tomorrow?");
        assert!(!segments
            .iter()
            .any(|s| s.content.contains("before switching")));
    }
}
