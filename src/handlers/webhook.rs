use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;

use crate::db::queries;
use crate::models::ConversationTurn;
use crate::services::conversation;
use crate::state::AppState;

/// Inbound message as delivered by the messaging gateway.
#[derive(Deserialize)]
pub struct GatewayMessage {
    pub tenant_id: i64,
    pub from: String,
    pub body: String,
}

#[derive(Serialize)]
pub struct GatewayReply {
    pub reply: String,
    pub engine: String,
    pub success: bool,
}

/// base64(HMAC-SHA1(secret, raw request body)), same construction the
/// gateway signs with.
fn validate_signature(secret: &str, signature: &str, raw_body: &str) -> bool {
    let mut mac = match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(raw_body.as_bytes());
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    expected == signature
}

pub async fn message_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    raw_body: String,
) -> Response {
    // Signature check is skipped when no secret is configured (dev mode).
    if !state.config.webhook_secret.is_empty() {
        let signature = headers
            .get("x-gateway-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty()
            || !validate_signature(&state.config.webhook_secret, signature, &raw_body)
        {
            tracing::warn!("missing or invalid gateway signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let message: GatewayMessage = match serde_json::from_str(&raw_body) {
        Ok(m) => m,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, format!("invalid payload: {e}")).into_response();
        }
    };

    let from = message.from.trim().to_string();
    let body = message.body.trim().to_string();
    tracing::info!(tenant_id = message.tenant_id, from = %from, "incoming message");

    match conversation::process_message(&state, message.tenant_id, &from, &body).await {
        Ok(engine_reply) => {
            let turn = ConversationTurn {
                id: 0,
                tenant_id: message.tenant_id,
                participant: from.clone(),
                user_message: body,
                assistant_reply: engine_reply.reply.clone(),
                engine: engine_reply.engine.clone(),
                success: engine_reply.success,
                created_at: Utc::now().naive_utc(),
            };
            {
                let db = state.db.lock().unwrap();
                if let Err(e) = queries::append_turn(&db, &turn) {
                    tracing::error!(error = %e, "failed to record conversation turn");
                }
            }

            Json(GatewayReply {
                reply: engine_reply.reply,
                engine: engine_reply.engine,
                success: engine_reply.success,
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, from = %from, "message processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
