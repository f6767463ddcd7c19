// Chat completion clients

pub mod groq;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use groq::GroqClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    #[inline]
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    /// Absent when the provider does not report usage
    pub usage: Option<TokenUsage>,
}

pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Completion>;
}
