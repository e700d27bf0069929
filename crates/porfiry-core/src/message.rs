//! Conversation messages and model request building

use crate::prompt::PromptVariant;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Stand-in user turn when there is no history at all
pub const EMPTY_DRAFT: &str = "(empty draft)";

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed instructions
    System,
    /// Analyst
    User,
    /// Model
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author
    pub role: Role,
    /// Text content
    pub content: String,
    /// Base64-encoded images attached to this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    /// Create a text-only message
    #[inline]
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Create system message
    #[inline]
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create user message
    #[inline]
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create assistant message
    #[inline]
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling options passed through to the model backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Context window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    /// Nucleus sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Repetition penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f32>,
    /// Window for the repetition penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_last_n: Option<u32>,
    /// Tail-free sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tfs_z: Option<f32>,
}

impl ModelOptions {
    /// Options for an executive summary run
    #[must_use]
    pub fn executive_summary() -> Self {
        Self {
            temperature: Some(0.2),
            top_p: Some(0.9),
            num_predict: Some(1024),
            ..Self::default()
        }
    }
}

/// Messages and options for one model call
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Full message list, system prompt first
    pub messages: Vec<ChatMessage>,
    /// Sampling options
    pub options: ModelOptions,
}

/// Build the model message list
///
/// The variant's system prompt comes first, then `history`. The newest user
/// turn carries every screenshot; an empty history becomes a single
/// `(empty draft)` user turn. When the history has no user turn at all the
/// same stand-in turn is appended so the images are never dropped.
#[must_use]
pub fn build_messages<I, B>(variant: PromptVariant, history: &[ChatMessage], images: I) -> Vec<ChatMessage>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let encoded: Vec<String> = images.into_iter().map(|bytes| BASE64.encode(bytes)).collect();

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(variant.system_prompt()));
    messages.extend(history.iter().cloned());

    if encoded.is_empty() && !history.is_empty() {
        return messages;
    }

    match messages.iter_mut().rev().find(|m| m.role == Role::User) {
        Some(newest) => newest.images = encoded,
        None => messages.push(ChatMessage {
            role: Role::User,
            content: EMPTY_DRAFT.to_string(),
            images: encoded,
        }),
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_user_turn_gets_the_images() {
        let history = vec![
            ChatMessage::user("# Title\n\ndraft"),
            ChatMessage::assistant("## Report"),
            ChatMessage::user("make it shorter"),
        ];
        let messages = build_messages(PromptVariant::Report, &history, &[b"png".to_vec()]);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].images.is_empty());
        assert_eq!(messages[3].images, vec![BASE64.encode(b"png")]);
    }

    #[test]
    fn empty_history_becomes_empty_draft() {
        let messages = build_messages(PromptVariant::KillChain, &[], Vec::<Vec<u8>>::new());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, EMPTY_DRAFT);
        assert!(messages[1].images.is_empty());
        assert_eq!(messages[0].content, PromptVariant::KillChain.system_prompt());
    }

    #[test]
    fn history_without_user_turn_still_carries_images() {
        let history = vec![ChatMessage::assistant("earlier answer")];
        let messages = build_messages(PromptVariant::Report, &history, &[vec![1, 2, 3]]);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::User);
        assert_eq!(messages[2].images.len(), 1);
    }

    #[test]
    fn serializes_like_ollama_expects() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));

        let options = serde_json::to_value(ModelOptions::executive_summary()).unwrap();
        assert_eq!(options["num_predict"], 1024);
        assert!(options.get("num_ctx").is_none());
    }
}
