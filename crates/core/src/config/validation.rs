//! Configuration validation rules.
//!
//! Runs after loading and reports the first offending field.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `listen_addr` is not a socket address
    /// - `remote_url` is not an http(s) URL
    /// - a health interval or timeout is under 100ms, or `retry_times` is 0
    /// - `health.path` does not start with `/`
    ///
    /// Returns `ConfigError::Missing` if only one of `tls.cert_file` and
    /// `tls.key_file` is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        let remote = url::Url::parse(&self.remote_url).map_err(|e| invalid("remote_url", e.to_string()))?;
        if !matches!(remote.scheme(), "http" | "https") {
            return Err(invalid("remote_url", format!("scheme must be http or https, got {}", remote.scheme())));
        }

        if self.health.interval_ms < 100 {
            return Err(invalid("health.interval_ms", "must be at least 100ms"));
        }
        if self.health.timeout_ms < 100 {
            return Err(invalid("health.timeout_ms", "must be at least 100ms"));
        }
        if self.health.retry_times == 0 {
            return Err(invalid("health.retry_times", "must be at least 1"));
        }
        if !self.health.path.starts_with('/') {
            return Err(invalid("health.path", "must start with '/'"));
        }

        match (&self.tls.cert_file, &self.tls.key_file) {
            (Some(_), None) => {
                return Err(ConfigError::Missing {
                    field: "tls.key_file".into(),
                    hint: "a client certificate needs its key; set LITEPROXY_TLS__KEY_FILE".into(),
                });
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing {
                    field: "tls.cert_file".into(),
                    hint: "a client key needs its certificate; set LITEPROXY_TLS__CERT_FILE".into(),
                });
            }
            _ => {}
        }

        if self.tls.insecure_skip_verify {
            tracing::warn!("tls.insecure_skip_verify is set; upstream certificates will not be verified");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthConfig, TlsConfig};
    use std::path::PathBuf;

    fn field_of(result: Result<(), ConfigError>) -> String {
        match result {
            Err(ConfigError::Invalid { field, .. } | ConfigError::Missing { field, .. }) => field,
            other => panic!("expected a field error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_listen_addr() {
        let config = AppConfig { listen_addr: "not-an-addr".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "listen_addr");
    }

    #[test]
    fn test_validate_remote_url() {
        let config = AppConfig { remote_url: "ftp://10.0.0.1".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "remote_url");

        let config = AppConfig { remote_url: "not a url".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()), "remote_url");

        let config = AppConfig { remote_url: "http://10.0.0.1:8080".into(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_health_bounds() {
        let config = AppConfig { health: HealthConfig { interval_ms: 50, ..Default::default() }, ..Default::default() };
        assert_eq!(field_of(config.validate()), "health.interval_ms");

        let config = AppConfig { health: HealthConfig { timeout_ms: 99, ..Default::default() }, ..Default::default() };
        assert_eq!(field_of(config.validate()), "health.timeout_ms");

        let config = AppConfig { health: HealthConfig { retry_times: 0, ..Default::default() }, ..Default::default() };
        assert_eq!(field_of(config.validate()), "health.retry_times");

        let config =
            AppConfig { health: HealthConfig { path: "healthz".into(), ..Default::default() }, ..Default::default() };
        assert_eq!(field_of(config.validate()), "health.path");
    }

    #[test]
    fn test_validate_health_minimums() {
        let health = HealthConfig { interval_ms: 100, timeout_ms: 100, retry_times: 1, ..Default::default() };
        let config = AppConfig { health, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_client_cert_pairing() {
        let config = AppConfig {
            tls: TlsConfig { cert_file: Some(PathBuf::from("client.crt")), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(field_of(config.validate()), "tls.key_file");

        let config = AppConfig {
            tls: TlsConfig { key_file: Some(PathBuf::from("client.key")), ..Default::default() },
            ..Default::default()
        };
        assert_eq!(field_of(config.validate()), "tls.cert_file");

        let config = AppConfig {
            tls: TlsConfig {
                cert_file: Some(PathBuf::from("client.crt")),
                key_file: Some(PathBuf::from("client.key")),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
