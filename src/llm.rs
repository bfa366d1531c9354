//! OpenAI-compatible chat completions client used by `genterm serve`.
//!
//! # Message layout
//!
//! 1. System prompt.
//! 2. If there is context, one user message:
//!    `"Context information:\n\n[1] <ctx>\n\n[2] <ctx>\n\n"`.
//! 3. The session's prior messages.
//! 4. The new user turn: the query text, or the multimodal parts.
//!
//! # Retry
//!
//! HTTP 429, 5xx and network errors are retried with exponential backoff
//! (1s, 2s, 4s, ... capped at 32s) up to `llm.max_retries` times. Any other
//! 4xx fails immediately.

use anyhow::{bail, Result};
use serde::Serialize;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::gateway::ContentPart;
use crate::session::StoredMessage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl ChatMessage {
    pub fn new(role: &str, content: MessageContent) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }

    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self::new(role, MessageContent::Text(text.into()))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

/// The numbered context block, or `None` when there is no context.
pub fn context_message(context: &[String]) -> Option<String> {
    if context.is_empty() {
        return None;
    }
    let mut message = String::from("Context information:\n\n");
    for (i, ctx) in context.iter().enumerate() {
        message.push_str(&format!("[{}] {}\n\n", i + 1, ctx));
    }
    Some(message)
}

pub fn build_messages(
    system_prompt: &str,
    history: &[StoredMessage],
    context: &[String],
    user_turn: MessageContent,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::text("system", system_prompt)];
    if let Some(ctx) = context_message(context) {
        messages.push(ChatMessage::text("user", ctx));
    }
    messages.extend(
        history
            .iter()
            .map(|m| ChatMessage::text(&m.role, m.content.clone())),
    );
    messages.push(ChatMessage::new("user", user_turn));
    messages
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn system_prompt(&self) -> &str {
        &self.config.system_prompt
    }

    /// Sends `messages` and returns the first choice's content.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
        };

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, delay_secs = delay.as_secs(), "retrying completion");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&url).json(&body);
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!("API error {}: {}", status, body_text));
                        continue;
                    }

                    bail!("API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

/// Extracts `choices[0].message.content`. Non-string content is returned as
/// its JSON text.
pub fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let Some(choice) = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    else {
        bail!("no choices returned in response");
    };

    match choice.pointer("/message/content") {
        Some(serde_json::Value::String(text)) => Ok(text.clone()),
        Some(other) => Ok(serde_json::to_string(other)?),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ImageUrl;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn context_block_is_numbered() {
        assert_eq!(context_message(&[]), None);
        let ctx = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            context_message(&ctx).unwrap(),
            "Context information:\n\n[1] a\n\n[2] b\n\n"
        );
    }

    #[test]
    fn message_order() {
        let history = vec![StoredMessage {
            role: "assistant".into(),
            content: "earlier".into(),
            timestamp: Utc::now(),
        }];
        let messages = build_messages(
            "sys",
            &history,
            &["[File: a.txt]\nhello".into()],
            MessageContent::Text("q".into()),
        );
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user"]);
        assert_eq!(messages[3].content, MessageContent::Text("q".into()));
    }

    #[test]
    fn no_context_message_without_context() {
        let messages = build_messages("sys", &[], &[], MessageContent::Text("q".into()));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn multimodal_turn_serializes_as_array() {
        let msg = ChatMessage::new(
            "user",
            MessageContent::Parts(vec![
                ContentPart::Text { text: "what".into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "data:image/jpeg;base64,AA".into(),
                    },
                },
            ]),
        );
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"role": "user", "content": [
                {"type": "text", "text": "what"},
                {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,AA"}}
            ]})
        );
    }

    #[test]
    fn parses_string_and_structured_content() {
        let text = json!({"choices": [{"message": {"content": "4"}}]});
        assert_eq!(parse_completion(&text).unwrap(), "4");

        let structured = json!({"choices": [{"message": {"content": [{"type": "text"}]}}]});
        assert_eq!(parse_completion(&structured).unwrap(), r#"[{"type":"text"}]"#);

        let empty = json!({"choices": []});
        assert!(parse_completion(&empty).is_err());
    }
}
