//! HTTP nutrition store: `GET {base}/api/food/search?q=<query>`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use glyscan_core::config::FoodSearchConfig;
use glyscan_core::store::NutritionStore;
use glyscan_core::{NutritionRecord, TransportError};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::RemoteError;

/// Search path appended to the base URL.
pub const SEARCH_PATH: &str = "/api/food/search";

/// Either a bare array or an envelope around one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchBody {
    Bare(Vec<NutritionRecord>),
    Wrapped { data: Vec<NutritionRecord> },
}

impl SearchBody {
    fn into_records(self) -> Vec<NutritionRecord> {
        match self {
            Self::Bare(records) | Self::Wrapped { data: records } => records,
        }
    }
}

/// Nutrition store backed by the remote food database.
#[derive(Debug)]
pub struct HttpNutritionStore {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl HttpNutritionStore {
    /// Create a store against `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_ms: u64) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key,
            timeout_ms,
        }
    }

    /// Create a store from config, reading the token from
    /// `config.api_key_env`. Without one, requests go out unauthenticated.
    #[must_use]
    pub fn from_config(config: &FoodSearchConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            debug!(env = %config.api_key_env, "food search token not set");
        }
        Self::new(config.base_url.clone(), api_key, config.timeout_ms)
    }

    /// Full search URL for `query`, percent-encoded.
    ///
    /// # Errors
    /// [`RemoteError::ConfigError`] when the base URL does not parse.
    pub fn search_url(&self, query: &str) -> Result<Url, RemoteError> {
        let raw = format!("{}{SEARCH_PATH}", self.base_url.trim_end_matches('/'));
        Url::parse_with_params(&raw, &[("q", query)]).map_err(|e| RemoteError::ConfigError(format!("{raw}: {e}")))
    }

    /// Run one search.
    ///
    /// # Errors
    /// [`RemoteError::Status`] for non-2xx answers, [`RemoteError::ParseError`]
    /// for bodies that are not record lists, plus transport failures.
    pub async fn query(&self, query: &str) -> Result<Vec<NutritionRecord>, RemoteError> {
        let url = self.search_url(query)?;
        let mut req = self.http.get(url).timeout(Duration::from_millis(self.timeout_ms));
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let start = Instant::now();
        let resp = req.send().await.map_err(|e| match RemoteError::from(e) {
            RemoteError::Timeout(_) => RemoteError::Timeout(self.timeout_ms),
            other => other,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(query, status = status.as_u16(), "food search rejected");
            return Err(RemoteError::status(status.as_u16(), &text));
        }

        let body: SearchBody = resp
            .json()
            .await
            .map_err(|e| RemoteError::ParseError(e.to_string()))?;
        let records: Vec<NutritionRecord> = body
            .into_records()
            .into_iter()
            .map(NutritionRecord::with_computed_gl)
            .collect();

        debug!(
            query,
            results = records.len(),
            latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "food search"
        );
        Ok(records)
    }
}

#[async_trait]
impl NutritionStore for HttpNutritionStore {
    async fn search(&self, query: &str) -> Result<Vec<NutritionRecord>, TransportError> {
        self.query(query).await.map_err(TransportError::from)
    }
}
