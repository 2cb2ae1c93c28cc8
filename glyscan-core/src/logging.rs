//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::GeneralConfig;
use crate::error::{GlyscanError, Result};

/// Build the filter: `RUST_LOG` if set, else `general.log_level`, with HTTP
/// client noise capped at `warn`.
#[must_use]
pub fn env_filter(config: &GeneralConfig) -> EnvFilter {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    ["hyper=warn", "reqwest=warn", "rustls=warn"]
        .into_iter()
        .filter_map(|d| d.parse().ok())
        .fold(base, EnvFilter::add_directive)
}

/// Install the global subscriber.
///
/// # Errors
/// Returns [`GlyscanError::Config`] if a global subscriber is already set.
pub fn init(config: &GeneralConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let installed = if config.json_logs {
        registry.with(fmt::layer().with_target(true).json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    installed.map_err(|e| GlyscanError::Config(format!("logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let config = GeneralConfig::default();
        let _ = init(&config);
        assert!(matches!(init(&config), Err(GlyscanError::Config(_))));
    }
}
