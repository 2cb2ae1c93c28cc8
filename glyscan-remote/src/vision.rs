//! Vision client: sends one food photo to an OpenAI-compatible
//! chat-completions endpoint and returns the reply text untouched.
//!
//! Retries belong to the caller. A failed call is classified by
//! `glyscan_core::taxonomy`, which decides whether retrying makes sense.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use glyscan_core::config::VisionConfig;
use glyscan_core::store::Recognizer;
use glyscan_core::TransportError;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::RemoteError;
use crate::prompt::{image_data_url, recognition_user_prompt, FOOD_RECOGNITION_SYSTEM};
use crate::types::{ChatCompletion, VisionRequest};

/// Provider backend for recognition.
#[derive(Debug, Clone)]
pub enum VisionProvider {
    /// OpenAI-compatible API.
    OpenAiCompatible {
        /// Base URL, without the `/chat/completions` suffix.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No key configured; every call fails with a credentials error.
    None,
}

/// Recognizer backed by a chat-completions vision model.
#[derive(Debug)]
pub struct VisionClient {
    provider: VisionProvider,
    http: Client,
    model: String,
    max_tokens: u32,
    timeout_ms: u64,
    key_env: String,
}

impl VisionClient {
    /// Create a client for `provider`.
    #[must_use]
    pub fn new(provider: VisionProvider, model: impl Into<String>, max_tokens: u32, timeout_ms: u64) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_tokens,
            timeout_ms,
            key_env: String::new(),
        }
    }

    /// Create a client from config, reading the key from
    /// `config.api_key_env`. A missing or blank key yields
    /// [`VisionProvider::None`].
    #[must_use]
    pub fn from_config(config: &VisionConfig) -> Self {
        let provider = match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => VisionProvider::OpenAiCompatible {
                base_url: config.base_url.clone(),
                api_key: key,
            },
            _ => {
                warn!(env = %config.api_key_env, "vision API key not set, recognition disabled");
                VisionProvider::None
            }
        };
        let mut client = Self::new(provider, config.model.clone(), config.max_tokens, config.timeout_ms);
        client.key_env.clone_from(&config.api_key_env);
        client
    }

    /// Whether a key is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        matches!(self.provider, VisionProvider::OpenAiCompatible { .. })
    }

    /// Send `image_base64` to the model and return the first choice's text.
    ///
    /// # Errors
    /// [`RemoteError::MissingApiKey`] without a key, [`RemoteError::Status`]
    /// for non-2xx answers, [`RemoteError::ParseError`] when the body is not
    /// a chat completion, plus transport failures.
    pub async fn describe(&self, image_base64: &str) -> Result<String, RemoteError> {
        let (base_url, api_key) = match &self.provider {
            VisionProvider::None => return Err(RemoteError::MissingApiKey(self.key_env.clone())),
            VisionProvider::OpenAiCompatible { base_url, api_key } => (base_url, api_key),
        };

        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        let body = VisionRequest::new(
            &self.model,
            FOOD_RECOGNITION_SYSTEM,
            &recognition_user_prompt(),
            &image_data_url(image_base64),
            self.max_tokens,
        );

        let start = Instant::now();
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| self.with_deadline(e.into()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), model = %self.model, "vision call rejected");
            return Err(RemoteError::status(status.as_u16(), &text));
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| RemoteError::ParseError(e.to_string()))?;
        let content = completion.first_content().to_string();

        debug!(
            model = %self.model,
            latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            completion_tokens = completion.usage.map_or(0, |u| u.completion_tokens),
            reply_chars = content.chars().count(),
            "vision reply"
        );
        Ok(content)
    }

    fn with_deadline(&self, err: RemoteError) -> RemoteError {
        match err {
            RemoteError::Timeout(_) => RemoteError::Timeout(self.timeout_ms),
            other => other,
        }
    }
}

#[async_trait]
impl Recognizer for VisionClient {
    async fn recognize(&self, image_base64: &str) -> Result<String, TransportError> {
        self.describe(image_base64).await.map_err(TransportError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_client_reports_credentials() {
        let config = VisionConfig {
            api_key_env: "GLYSCAN_TEST_VISION_KEY_THAT_IS_NEVER_SET".into(),
            ..VisionConfig::default()
        };
        let client = VisionClient::from_config(&config);
        assert!(!client.is_configured());
        assert_eq!(client.recognize("QUJD").await, Err(TransportError::Credentials));
    }

    #[test]
    fn timeout_carries_configured_deadline() {
        let client = VisionClient::new(VisionProvider::None, "gpt-4o", 500, 30_000);
        assert!(matches!(client.with_deadline(RemoteError::Timeout(0)), RemoteError::Timeout(30_000)));
    }
}
