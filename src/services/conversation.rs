//! Engine entry point: routes one inbound message either into the
//! booking dialogue or the fallback chat path. Owns no business logic
//! itself.

use std::sync::Arc;

use crate::db::queries;
use crate::services::context;
use crate::services::dialogue::{self, EngineErrorKind, StepStatus};
use crate::services::intent;
use crate::services::session::SessionKey;
use crate::services::text::normalize;
use crate::state::AppState;

/// What produced a reply, recorded on the conversation turn.
pub const ENGINE_DIALOGUE: &str = "dialogue";

#[derive(Debug)]
pub struct EngineReply {
    pub reply: String,
    pub engine: String,
    pub success: bool,
    pub error: Option<EngineErrorKind>,
}

pub async fn process_message(
    state: &Arc<AppState>,
    tenant_id: i64,
    participant: &str,
    raw: &str,
) -> anyhow::Result<EngineReply> {
    let key = SessionKey::new(tenant_id, participant);

    // All messages of one (tenant, participant) run one at a time;
    // session mutation is not safe under concurrent access.
    let key_lock = state.sessions.lock_for(&key);
    let _guard = key_lock.lock().await;

    let tenant = {
        let db = state.db.lock().unwrap();
        queries::get_tenant(&db, tenant_id)?
    }
    .ok_or_else(|| anyhow::anyhow!("unknown tenant: {tenant_id}"))?;

    let now = chrono::Local::now().naive_local();
    let normalized = normalize(raw);

    // An open session always consumes the message, scheduling words or not.
    if let Some(session) = state.sessions.get(&key) {
        let outcome = {
            let db = state.db.lock().unwrap();
            dialogue::step(&db, tenant_id, participant, session, &normalized, now)?
        };
        return Ok(settle_dialogue(state, &key, outcome, now));
    }

    if intent::is_scheduling_intent(&normalized) {
        let outcome = {
            let db = state.db.lock().unwrap();
            dialogue::open_session(&db, tenant_id, raw, &normalized, now)?
        };
        tracing::info!(tenant_id, participant, "opened booking dialogue");
        return Ok(settle_dialogue(state, &key, outcome, now));
    }

    // Fallback chat path.
    let history = if tenant.retain_context {
        let db = state.db.lock().unwrap();
        queries::list_turns_ordered(&db, tenant_id, participant)?
    } else {
        vec![]
    };

    let segments = context::assemble(&tenant, &history, raw);

    match tokio::time::timeout(state.config.llm_timeout, state.llm.chat(&segments)).await {
        Ok(Ok(completion)) => Ok(EngineReply {
            reply: completion.text,
            engine: state.llm.label().to_string(),
            success: true,
            error: None,
        }),
        Ok(Err(e)) => {
            tracing::error!(error = %e, tenant_id, "chat completion failed");
            Ok(degraded_reply(state))
        }
        Err(_) => {
            tracing::error!(tenant_id, "chat completion timed out");
            Ok(degraded_reply(state))
        }
    }
}

fn settle_dialogue(
    state: &Arc<AppState>,
    key: &SessionKey,
    outcome: dialogue::StepOutcome,
    now: chrono::NaiveDateTime,
) -> EngineReply {
    let (success, error) = match outcome.error {
        Some(EngineErrorKind::Persistence) => (false, outcome.error),
        other => (true, other),
    };

    match outcome.status {
        StepStatus::InProgress(session) => {
            state.sessions.put(key.clone(), session, now);
        }
        StepStatus::Booked(booking) => {
            state.sessions.remove(key);
            tracing::info!(
                tenant_id = key.tenant_id,
                participant = %key.participant,
                booking_id = %booking.id,
                starts_at = %booking.starts_at,
                "booking created"
            );
        }
        StepStatus::Cancelled => {
            state.sessions.remove(key);
            tracing::info!(
                tenant_id = key.tenant_id,
                participant = %key.participant,
                "booking dialogue cancelled"
            );
        }
    }

    EngineReply {
        reply: outcome.reply,
        engine: ENGINE_DIALOGUE.to_string(),
        success,
        error,
    }
}

fn degraded_reply(state: &Arc<AppState>) -> EngineReply {
    EngineReply {
        reply: "Sorry, I'm having trouble right now. Please try again in a moment.".to_string(),
        engine: state.llm.label().to_string(),
        success: false,
        error: Some(EngineErrorKind::Provider),
    }
}
