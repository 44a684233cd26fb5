//! Tracing Subscriber Initialization
//!
//! Structured logging through `tracing-subscriber`, JSON in deployed
//! environments and human-readable output for local development.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "sictax_api=debug,tower_http=debug,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Emit JSON log lines instead of the pretty format
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "sictax-api".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            json_logs: true,
        }
    }
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `SICTAX_SERVICE_NAME` (default: sictax-api)
    /// - `SICTAX_ENVIRONMENT` (default: development)
    /// - `SICTAX_LOG_JSON`: "false" or "0" switches to the pretty format
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("SICTAX_SERVICE_NAME").unwrap_or(defaults.service_name),
            service_version: defaults.service_version,
            environment: std::env::var("SICTAX_ENVIRONMENT").unwrap_or(defaults.environment),
            json_logs: std::env::var("SICTAX_LOG_JSON")
                .map(|s| !(s == "false" || s == "0"))
                .unwrap_or(defaults.json_logs),
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at startup; a second call returns an error because the global
/// subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json_layer = config.json_logs.then(|| fmt::layer().json());
    let pretty_layer = (!config.json_logs).then(|| fmt::layer().pretty());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        environment = config.environment,
        "Telemetry initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_telemetry_config_default() {
        let _lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _name = EnvVarGuard::set("SICTAX_SERVICE_NAME", None);
        let _json = EnvVarGuard::set("SICTAX_LOG_JSON", None);

        let config = TelemetryConfig::from_env();
        assert_eq!(config.service_name, "sictax-api");
        assert!(config.json_logs);
    }

    #[test]
    fn test_pretty_logs_opt_in() {
        let _lock = ENV_MUTEX.lock().expect("env mutex should not be poisoned");
        let _json = EnvVarGuard::set("SICTAX_LOG_JSON", Some("false"));
        let _env = EnvVarGuard::set("SICTAX_ENVIRONMENT", Some("staging"));

        let config = TelemetryConfig::from_env();
        assert!(!config.json_logs);
        assert_eq!(config.environment, "staging");
    }
}
