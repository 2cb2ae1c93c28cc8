//! Configuration for the glyscan matching pipeline.
//!
//! Maps directly to `glyscan.toml`. Every field has a serde default, so an
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level glyscan configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlyscanConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Match cache TTL and capacity.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Recognition result parser tuning.
    #[serde(default)]
    pub parser: ParserConfig,
    /// Fallback suggestion engine defaults.
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Vision model endpoint.
    #[serde(default)]
    pub vision: VisionConfig,
    /// Nutrition store search endpoint.
    #[serde(default)]
    pub food_search: FoodSearchConfig,
    /// Durable cache backing store.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl GlyscanConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `GlyscanError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::GlyscanError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Match cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entries older than this are logically expired.
    #[serde(default = "default_24")]
    pub ttl_hours: u32,
    /// Search-cache entry bound.
    #[serde(default = "default_100")]
    pub search_capacity: usize,
    /// Record-cache entry bound. `None` keeps it unbounded (TTL only).
    #[serde(default)]
    pub record_capacity: Option<usize>,
}

impl CacheConfig {
    /// TTL as a `chrono` duration.
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.ttl_hours))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            search_capacity: 100,
            record_capacity: None,
        }
    }
}

/// Recognition result parser tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Confidence for structured entries that omit one.
    #[serde(default = "default_0_8")]
    pub structured_default_confidence: f32,
    /// Confidence assigned to text-fallback detections.
    #[serde(default = "default_0_7")]
    pub text_fallback_confidence: f32,
    /// Shortest accepted name, in characters.
    #[serde(default = "default_2")]
    pub min_name_chars: usize,
    /// Longest accepted name, in characters.
    #[serde(default = "default_50")]
    pub max_name_chars: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            structured_default_confidence: 0.8,
            text_fallback_confidence: 0.7,
            min_name_chars: 2,
            max_name_chars: 50,
        }
    }
}

/// Fallback suggestion engine defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Max similar foods offered.
    #[serde(default = "default_5")]
    pub similar_limit: usize,
    /// GI used when a category has no records.
    #[serde(default = "default_50_f64")]
    pub default_glycemic_index: f64,
    /// Carbs per 100 g used when a category has no records.
    #[serde(default = "default_20_f64")]
    pub default_carbs_per_100g: f64,
    /// Serving size of provisional records and templates.
    #[serde(default = "default_100_f64")]
    pub default_serving_grams: f64,
    /// Max low-GL foods offered as popular picks.
    #[serde(default = "default_10")]
    pub popular_limit: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            similar_limit: 5,
            default_glycemic_index: 50.0,
            default_carbs_per_100g: 20.0,
            default_serving_grams: 100.0,
            popular_limit: 10,
        }
    }
}

/// Vision model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_openai_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_vision_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    /// Hard timeout for one recognition call in milliseconds.
    #[serde(default = "default_30000")]
    pub timeout_ms: u64,
    /// Completion token cap.
    #[serde(default = "default_500")]
    pub max_tokens: u32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 30_000,
            max_tokens: 500,
        }
    }
}

/// Nutrition store search endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodSearchConfig {
    /// Base URL of the nutrition backend.
    #[serde(default = "default_food_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_food_key_env")]
    pub api_key_env: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_10000")]
    pub timeout_ms: u64,
}

impl Default for FoodSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com".to_string(),
            api_key_env: "GLYSCAN_API_KEY".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Durable cache store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect snapshot corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: "glyscan_cache.db".to_string(),
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_openai_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_vision_model() -> String { "gpt-4o".to_string() }
fn default_openai_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_food_url() -> String { "https://api.example.com".to_string() }
fn default_food_key_env() -> String { "GLYSCAN_API_KEY".to_string() }
fn default_db_path() -> String { "glyscan_cache.db".to_string() }
fn default_0_7() -> f32 { 0.7 }
fn default_0_8() -> f32 { 0.8 }
fn default_20_f64() -> f64 { 20.0 }
fn default_50_f64() -> f64 { 50.0 }
fn default_100_f64() -> f64 { 100.0 }
fn default_2() -> usize { 2 }
fn default_5() -> usize { 5 }
fn default_10() -> usize { 10 }
fn default_24() -> u32 { 24 }
fn default_50() -> usize { 50 }
fn default_100() -> usize { 100 }
fn default_500() -> u32 { 500 }
fn default_10000() -> u64 { 10_000 }
fn default_30000() -> u64 { 30_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = GlyscanConfig::from_toml("").expect("empty config");
        assert_eq!(config.cache.ttl_hours, 24);
        assert_eq!(config.cache.search_capacity, 100);
        assert!(config.cache.record_capacity.is_none());
        assert_eq!(config.vision.model, "gpt-4o");
        assert_eq!(config.vision.timeout_ms, 30_000);
        assert_eq!(config.parser.max_name_chars, 50);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = GlyscanConfig::from_toml(
            r#"
            [cache]
            search_capacity = 10
            record_capacity = 500

            [general]
            log_level = "debug"
            "#,
        )
        .expect("partial config");
        assert_eq!(config.cache.search_capacity, 10);
        assert_eq!(config.cache.record_capacity, Some(500));
        assert_eq!(config.cache.ttl_hours, 24);
        assert_eq!(config.general.log_level, "debug");
        assert!(!config.general.json_logs);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = GlyscanConfig::from_toml("[cache\nttl_hours = ").expect_err("must fail");
        assert!(matches!(err, crate::GlyscanError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("glyscan.toml");
        std::fs::write(&path, "[fallback]\nsimilar_limit = 3\npopular_limit = 4\n").expect("write");

        let config = GlyscanConfig::from_file(&path).expect("file config");
        assert_eq!(config.fallback.similar_limit, 3);
        assert_eq!(config.fallback.popular_limit, 4);
        assert_eq!(config.cache.search_capacity, 100);

        let missing = GlyscanConfig::from_file(&dir.path().join("absent.toml")).expect_err("missing");
        assert!(matches!(missing, crate::GlyscanError::Io(_)));
    }
}
