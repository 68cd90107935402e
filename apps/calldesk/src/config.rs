use std::env;
use std::path::PathBuf;
use std::time::Duration;

use call_store::{seed, CallRecord};
use thiserror::Error;
use url::Url;

use crate::connection::{ReconnectPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};
use crate::session::SessionOptions;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8000/ws/calls";
pub const DEFAULT_LOG_FILTER: &str = "info,calldesk=debug";
pub const DEFAULT_SEED: u64 = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("endpoint {0:?} must use ws:// or wss://")]
    UnsupportedScheme(String),
    #[error("reconnect base delay must be greater than zero")]
    ZeroBaseDelay,
}

/// Dashboard client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub seed: u64,
    /// Show fixture calls before the backend sends anything.
    pub seed_fixtures: bool,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            reconnect_base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            seed: DEFAULT_SEED,
            seed_fixtures: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let endpoint = env::var("CALLDESK_ENDPOINT")
            .map(|raw| normalize_endpoint(&raw))
            .unwrap_or(defaults.endpoint);
        let max_reconnect_attempts = env::var("CALLDESK_RECONNECT_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_reconnect_attempts);
        let reconnect_base_delay_ms = env::var("CALLDESK_RECONNECT_BASE_DELAY_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.reconnect_base_delay_ms);
        let seed = env::var("CALLDESK_SEED")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.seed);
        let seed_fixtures = env::var("CALLDESK_SEED_FIXTURES")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(defaults.seed_fixtures);
        let log_filter = env::var("RUST_LOG").unwrap_or(defaults.log_filter);
        let log_file = env::var("CALLDESK_LOG_FILE").ok().map(PathBuf::from);
        Self {
            endpoint,
            max_reconnect_attempts,
            reconnect_base_delay_ms,
            seed,
            seed_fixtures,
            log_filter,
            log_file,
        }
    }

    /// Fatal configuration faults; startup stops on any of them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint).map_err(|source| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::UnsupportedScheme(self.endpoint.clone()));
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err(ConfigError::ZeroBaseDelay);
        }
        Ok(())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
        }
    }

    pub fn seed_records(&self) -> Vec<CallRecord> {
        if self.seed_fixtures {
            seed::fixtures(self.seed)
        } else {
            Vec::new()
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            policy: self.reconnect_policy(),
            seed: self.seed_records(),
            ..SessionOptions::new(self.endpoint.clone())
        }
    }
}

/// Adds a scheme when missing and pins `localhost` to IPv4.
pub fn normalize_endpoint(raw: &str) -> String {
    let raw = raw.trim();
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else if raw.starts_with("localhost") || raw.starts_with("127.0.0.1") {
        format!("ws://{raw}")
    } else {
        format!("wss://{raw}")
    };
    with_scheme.replacen("://localhost", "://127.0.0.1", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    // Environment variable tests must not run in parallel.
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    const VARS: [&str; 6] = [
        "CALLDESK_ENDPOINT",
        "CALLDESK_RECONNECT_MAX_ATTEMPTS",
        "CALLDESK_RECONNECT_BASE_DELAY_MS",
        "CALLDESK_SEED",
        "CALLDESK_SEED_FIXTURES",
        "CALLDESK_LOG_FILE",
    ];

    fn clear_vars() {
        for var in VARS {
            unsafe {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn defaults_when_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_vars();

        let config = Config::from_env();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay_ms, 1000);
        assert_eq!(config.seed, 7);
        assert!(config.seed_fixtures);
        assert!(config.log_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_custom_values() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_vars();
        unsafe {
            env::set_var("CALLDESK_ENDPOINT", "localhost:9000/ws/calls");
            env::set_var("CALLDESK_RECONNECT_MAX_ATTEMPTS", "2");
            env::set_var("CALLDESK_RECONNECT_BASE_DELAY_MS", "250");
            env::set_var("CALLDESK_SEED_FIXTURES", "off");
        }

        let config = Config::from_env();
        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/ws/calls");
        assert_eq!(
            config.reconnect_policy(),
            ReconnectPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(250),
            }
        );
        assert!(config.seed_records().is_empty());

        clear_vars();
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_vars();
        unsafe {
            env::set_var("CALLDESK_RECONNECT_MAX_ATTEMPTS", "many");
            env::set_var("CALLDESK_SEED", "-3");
        }

        let config = Config::from_env();
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.seed, 7);

        clear_vars();
    }

    #[test]
    fn endpoint_normalization() {
        assert_eq!(
            normalize_endpoint("ws://localhost:8000/ws/calls"),
            "ws://127.0.0.1:8000/ws/calls"
        );
        assert_eq!(
            normalize_endpoint("calls.example.org/ws"),
            "wss://calls.example.org/ws"
        );
        assert_eq!(normalize_endpoint(" wss://x.org/ws "), "wss://x.org/ws");
    }

    #[test]
    fn validate_rejects_bad_endpoints_and_zero_delay() {
        let mut config = Config {
            endpoint: "http://127.0.0.1:8000/ws/calls".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedScheme(_))
        ));

        config.endpoint = "ws://".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        config.endpoint = DEFAULT_ENDPOINT.into();
        config.reconnect_base_delay_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBaseDelay)));
    }

    #[test]
    fn session_options_carry_seed_and_policy() {
        let config = Config::default();
        let options = config.session_options();
        assert_eq!(options.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(options.seed, seed::fixtures(DEFAULT_SEED));
        assert!(options.auto_connect);
    }
}
