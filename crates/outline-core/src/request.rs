//! Chat completion request bodies
//!
//! Requests follow the OpenAI chat-completions shape with streaming on and
//! a provider-specific thinking budget under `extra_body`.

use crate::config::OutlineConfig;
use outline_tree::{Message, Role};
use serde::Serialize;

/// Role of the system prompt on the wire
pub const SYSTEM_ROLE: &str = "system";

/// One message as transmitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    /// `system`, `user` or `assistant`
    pub role: &'static str,
    /// Message text
    pub content: String,
}

impl WireMessage {
    /// System prompt message
    #[inline]
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: SYSTEM_ROLE,
            content: content.into(),
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.normalized().as_str(),
            content: message.content.clone(),
        }
    }
}

/// Provider extension block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtraBody {
    /// Google-specific options
    pub google: GoogleOptions,
}

/// Google-specific request options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleOptions {
    /// Reasoning settings
    pub thinking_config: ThinkingConfig,
}

/// Reasoning token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Tokens the model may spend thinking before it answers
    pub thinking_budget: u32,
}

/// Streaming chat completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// Model name
    pub model: String,
    /// System prompt first, then the conversation
    pub messages: Vec<WireMessage>,
    /// Always true; responses are consumed as server-sent events
    pub stream: bool,
    /// Provider extensions
    pub extra_body: ExtraBody,
}

impl ChatRequest {
    /// Create empty streaming request
    #[must_use]
    pub fn new(model: impl Into<String>, thinking_budget: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            stream: true,
            extra_body: ExtraBody {
                google: GoogleOptions {
                    thinking_config: ThinkingConfig { thinking_budget },
                },
            },
        }
    }

    /// Prepend a system prompt if one is given
    #[must_use]
    pub fn with_system(mut self, prompt: Option<&str>) -> Self {
        if let Some(prompt) = prompt {
            self.messages.insert(0, WireMessage::system(prompt));
        }
        self
    }

    /// Append a message, normalizing its role
    #[must_use]
    pub fn with_message(mut self, message: &Message) -> Self {
        self.messages.push(WireMessage::from(message));
        self
    }

    /// Breakdown request for `topic`
    #[must_use]
    pub fn roadmap(config: &OutlineConfig, topic: &str) -> Self {
        Self::new(&config.model, config.roadmap_thinking_budget)
            .with_system(config.roadmap_system_prompt.as_deref())
            .with_message(&Message::user(sanitize_topic(topic)))
    }

    /// Chat request continuing `history`
    ///
    /// Assistant messages that are blank or still the placeholder are not
    /// sent, wherever they sit.
    #[must_use]
    pub fn chat(config: &OutlineConfig, history: &[Message]) -> Self {
        history
            .iter()
            .filter(|message| !(message.role == Role::Assistant && message.is_vacant(&config.placeholder)))
            .fold(
                Self::new(&config.model, config.chat_thinking_budget)
                    .with_system(config.chat_system_prompt.as_deref()),
                Self::with_message,
            )
    }

    /// Thinking budget carried by this request
    #[inline]
    #[must_use]
    pub fn thinking_budget(&self) -> u32 {
        self.extra_body.google.thinking_config.thinking_budget
    }
}

/// Reduce a topic to letters, digits and whitespace, `-` becoming a space
#[must_use]
pub fn sanitize_topic(topic: &str) -> String {
    topic
        .chars()
        .map(|c| if c == '-' { ' ' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect()
}
