use serde::{Deserialize, Serialize};

/// Per-tenant assistant configuration. Every recognized option is an
/// explicit field with an explicit default; absent columns fall back
/// rather than being probed at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    /// Display name the assistant introduces itself with. `None` means
    /// the generic "virtual assistant of <name>" framing.
    pub assistant_name: Option<String>,
    /// Custom system-prompt body. When set it replaces the generic
    /// business framing (the persona header is still prepended).
    pub ai_instructions: Option<String>,
    /// Free-text business description used by the generic prompt.
    pub business_info: Option<String>,
    /// When false the fallback chat call sees only the current message,
    /// no history. Default true.
    pub retain_context: bool,
}

impl Tenant {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            assistant_name: None,
            ai_instructions: None,
            business_info: None,
            retain_context: true,
        }
    }
}
