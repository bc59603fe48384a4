pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSegment {
    pub role: Role,
    pub content: String,
}

impl PromptSegment {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// External chat-completion backend. Implementations must apply their
/// own request timeout; a returned error is always safe to degrade on.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, segments: &[PromptSegment]) -> anyhow::Result<ChatCompletion>;

    /// Label recorded on conversation turns ("gpt-4o-mini", "demo", ...).
    fn label(&self) -> &str;
}

/// Stand-in used when no API key is configured. Keeps the whole
/// pipeline exercisable in development without external calls.
pub struct DemoProvider;

#[async_trait]
impl LlmProvider for DemoProvider {
    async fn chat(&self, _segments: &[PromptSegment]) -> anyhow::Result<ChatCompletion> {
        Ok(ChatCompletion {
            text: "This is a demo reply. Configure an API key to enable real responses."
                .to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    fn label(&self) -> &str {
        "demo"
    }
}
