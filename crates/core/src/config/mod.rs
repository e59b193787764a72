//! Application configuration with layered loading.
//!
//! Values are read once at startup with figment and handed to each
//! component by reference:
//!
//! 1. Environment variables (LITEPROXY_*, nested keys split on `__`)
//! 2. TOML config file (if LITEPROXY_CONFIG_FILE set)
//! 3. Built-in defaults

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

pub const ENV_PREFIX: &str = "LITEPROXY_";
pub const CONFIG_FILE_ENV: &str = "LITEPROXY_CONFIG_FILE";

/// Proxy configuration.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LITEPROXY_*)
/// 2. TOML config file (if LITEPROXY_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the proxy listens on.
    ///
    /// Set via LITEPROXY_LISTEN_ADDR.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base URL of the upstream control plane.
    ///
    /// Set via LITEPROXY_REMOTE_URL.
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Ceiling for a local watch that did not ask for `timeoutSeconds`.
    #[serde(default = "default_watch_timeout_secs")]
    pub watch_timeout_secs: u64,

    /// Upstream connect timeout in milliseconds. Requests themselves have
    /// no overall timeout so watches can stay open.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Resources local `get` refuses to emulate.
    ///
    /// Set via LITEPROXY_RESTRICTED_RESOURCES (e.g. `[events]`).
    #[serde(default = "default_restricted_resources")]
    pub restricted_resources: Vec<String>,
}

/// Upstream liveness probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Per-attempt timeout.
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    /// Probe attempts per tick; any success marks the tick healthy.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    #[serde(default = "default_health_path")]
    pub path: String,
}

/// TLS material for the upstream connection. All paths are PEM files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Sqlite,
    Filesystem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// SQLite database file, used by the `sqlite` backend.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Root directory, used by the `filesystem` backend.
    #[serde(default = "default_fs_root")]
    pub fs_root: PathBuf,
}

fn default_listen_addr() -> String {
    "127.0.0.1:10550".into()
}

fn default_remote_url() -> String {
    "https://127.0.0.1:6443".into()
}

fn default_watch_timeout_secs() -> u64 {
    1800
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_restricted_resources() -> Vec<String> {
    vec!["events".into(), "events.events.k8s.io".into()]
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_retry_times() -> u32 {
    3
}

fn default_health_path() -> String {
    "/healthz".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./liteproxy-cache.sqlite")
}

fn default_fs_root() -> PathBuf {
    PathBuf::from("./liteproxy-cache")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            remote_url: default_remote_url(),
            health: HealthConfig::default(),
            tls: TlsConfig::default(),
            cache: CacheConfig::default(),
            watch_timeout_secs: default_watch_timeout_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            restricted_resources: default_restricted_resources(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_ms: default_probe_timeout_ms(),
            retry_times: default_retry_times(),
            path: default_health_path(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { backend: CacheBackend::default(), db_path: default_db_path(), fs_root: default_fs_root() }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn watch_timeout(&self) -> Duration {
        Duration::from_secs(self.watch_timeout_secs)
    }

    /// Parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `listen_addr` is not `host:port`.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr.parse().map_err(|e| ConfigError::Invalid {
            field: "listen_addr".into(),
            reason: format!("{e}"),
        })
    }

    pub fn is_restricted(&self, resource: &str) -> bool {
        self.restricted_resources.iter().any(|r| r == resource)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var(CONFIG_FILE_ENV) {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed(ENV_PREFIX)
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
