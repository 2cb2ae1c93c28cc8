//! Wire types for the OpenAI-compatible chat-completions endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A chat-completions request carrying one image.
#[derive(Debug, Clone, Serialize)]
pub struct VisionRequest {
    /// Model name.
    pub model: String,
    /// System then user message.
    pub messages: Vec<Value>,
    /// Completion token cap.
    pub max_tokens: u32,
    /// `{"type": "json_object"}`.
    pub response_format: Value,
}

impl VisionRequest {
    /// Build the request for one image.
    #[must_use]
    pub fn new(model: &str, system: &str, user: &str, image_url: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                json!({ "role": "system", "content": system }),
                json!({
                    "role": "user",
                    "content": [
                        { "type": "text", "text": user },
                        { "type": "image_url", "image_url": { "url": image_url } },
                    ],
                }),
            ],
            max_tokens,
            response_format: json!({ "type": "json_object" }),
        }
    }
}

/// The parts of a chat-completions response this crate reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletion {
    /// Choices; only the first is used.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token usage, when reported.
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// One completion choice.
#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    /// The assistant message.
    pub message: ChoiceMessage,
}

/// Assistant message body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChoiceMessage {
    /// Text content; absent on refusals.
    #[serde(default)]
    pub content: Option<String>,
}

/// Token usage.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u32,
}

impl ChatCompletion {
    /// Content of the first choice, or the empty string.
    #[must_use]
    pub fn first_content(&self) -> &str {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default()
    }
}
