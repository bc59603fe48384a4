use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One inbound/outbound exchange, persisted append-only. Turns are only
/// ever read back (ascending by time) to assemble chat context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: i64,
    pub tenant_id: i64,
    pub participant: String,
    pub user_message: String,
    pub assistant_reply: String,
    /// What produced the reply: "dialogue", the model name, or "demo".
    pub engine: String,
    pub success: bool,
    pub created_at: NaiveDateTime,
}
