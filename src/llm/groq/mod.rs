#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ChatMessage, ChatModel, Completion, CompletionOptions, TokenUsage};
use crate::AutoRagError;
use crate::config::LlmConfig;
use crate::http;

/// Groq (or any OpenAI-compatible) chat completions client
#[derive(Debug, Clone)]
pub struct GroqClient {
    endpoint: String,
    api_key: String,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl GroqClient {
    #[inline]
    pub fn new(api_key: &str, config: &LlmConfig) -> Result<Self, AutoRagError> {
        if api_key.trim().is_empty() {
            return Err(AutoRagError::Config(
                "Groq API key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            agent: http::build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }
}

fn parse_completion(body: &str) -> Result<Completion> {
    let response: ChatResponse =
        serde_json::from_str(body).context("Failed to parse chat completion response")?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("Chat completion response contained no message"))?;

    Ok(Completion {
        content,
        usage: response.usage,
    })
}

impl ChatModel for GroqClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Completion> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        debug!(
            "Requesting completion from {} ({} messages)",
            self.model,
            messages.len()
        );

        let body = http::with_retry(&self.endpoint, self.retry_attempts, || {
            self.agent
                .post(&self.endpoint)
                .header("Authorization", &format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .send(&request_json)
                .map_err(http::AttemptError::from)
                .and_then(http::read_text)
        })
        .context("Chat completion request failed")?;

        let completion = parse_completion(&body)?;
        if let Some(usage) = completion.usage {
            debug!(
                "Completion used {} prompt + {} completion tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(completion)
    }
}
