//! Transport configuration via `remtx.toml`
//!
//! The HTTP transport is configured from a small TOML file or built in code.
//! Only `url` is required; everything else falls back to the defaults below.

use remtx_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "remtx.toml";

/// Connection settings for the remote RPC service.
///
/// # Example
///
/// ```toml
/// url = "https://erp.example.com"
/// rpc_path = "/jsonrpc"
/// timeout_ms = 30000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Base URL of the remote service (scheme, host, optional port)
    pub url: String,
    /// Fixed endpoint path for procedure calls
    #[serde(default = "default_rpc_path")]
    pub rpc_path: String,
    /// Per-call deadline in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// TCP connect deadline in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Idle connections kept per host in the pool
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
    /// How long an idle pooled connection is kept, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_idle_timeout_ms: Option<u64>,
    /// Service used by the liveness probe
    #[serde(default = "default_health_service")]
    pub health_service: String,
    /// Method used by the liveness probe
    #[serde(default = "default_health_method")]
    pub health_method: String,
}

fn default_rpc_path() -> String {
    "/jsonrpc".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_pool_max_idle_per_host() -> usize {
    16
}

fn default_health_service() -> String {
    "common".to_string()
}

fn default_health_method() -> String {
    "version".to_string()
}

impl TransportConfig {
    /// Config for `url` with every other setting at its default
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rpc_path: default_rpc_path(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_ms: None,
            health_service: default_health_service(),
            health_method: default_health_method(),
        }
    }

    /// Set the RPC endpoint path
    pub fn with_rpc_path(mut self, rpc_path: impl Into<String>) -> Self {
        self.rpc_path = rpc_path.into();
        self
    }

    /// Set the per-call deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the connect deadline
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the pool's idle connection limit per host
    pub fn with_pool_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.pool_max_idle_per_host = max_idle;
        self
    }

    /// Per-call deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connect deadline
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Full URL of the RPC endpoint
    pub fn endpoint(&self) -> String {
        let base = self.url.trim_end_matches('/');
        if self.rpc_path.starts_with('/') {
            format!("{}{}", base, self.rpc_path)
        } else {
            format!("{}/{}", base, self.rpc_path)
        }
    }

    /// Check the values a transport cannot work without.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an empty URL or a zero deadline.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::config("url must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config("timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    /// Returns a config file template with comments.
    pub fn default_toml() -> &'static str {
        r#"# remtx transport configuration
#
# Base URL of the remote service (required)
url = "http://localhost:8069"

# Endpoint path for JSON-RPC calls
rpc_path = "/jsonrpc"

# Per-call deadline in milliseconds
timeout_ms = 30000

# TCP connect deadline in milliseconds
connect_timeout_ms = 10000

# Idle pooled connections kept per host
pool_max_idle_per_host = 16
# pool_idle_timeout_ms = 90000

# Liveness probe target
health_service = "common"
health_method = "version"
"#
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TransportConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse transport config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration { reason } => {
                Error::config(format!("{} ({})", reason, path.display()))
            }
            other => other,
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remtx_core::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = TransportConfig::from_toml_str("url = \"http://erp:8069\"").unwrap();
        assert_eq!(config.rpc_path, "/jsonrpc");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.pool_max_idle_per_host, 16);
        assert_eq!(config.health_method, "version");
        assert!(config.pool_idle_timeout_ms.is_none());
    }

    #[test]
    fn default_toml_parses_correctly() {
        let config = TransportConfig::from_toml_str(TransportConfig::default_toml()).unwrap();
        assert_eq!(config, TransportConfig::new("http://localhost:8069"));
    }

    #[test]
    fn missing_url_is_rejected() {
        let err = TransportConfig::from_toml_str("timeout_ms = 10").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = TransportConfig::from_toml_str("url = \"http://x\"\ntimeout_ms = 0").unwrap_err();
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn endpoint_joins_url_and_path() {
        assert_eq!(
            TransportConfig::new("http://erp:8069/").endpoint(),
            "http://erp:8069/jsonrpc"
        );
        assert_eq!(
            TransportConfig::new("http://erp:8069")
                .with_rpc_path("rpc")
                .endpoint(),
            "http://erp:8069/rpc"
        );
    }

    #[test]
    fn builder_setters() {
        let config = TransportConfig::new("http://erp")
            .with_timeout(Duration::from_millis(250))
            .with_connect_timeout(Duration::from_secs(1))
            .with_pool_max_idle_per_host(2);
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.connect_timeout_ms, 1000);
        assert_eq!(config.pool_max_idle_per_host, 2);
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = TransportConfig::new("https://erp.example.com")
            .with_timeout(Duration::from_secs(5));
        config.pool_idle_timeout_ms = Some(60_000);

        config.write_to_file(&path).unwrap();
        let loaded = TransportConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn unreadable_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let err = TransportConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("missing.toml"));
    }
}
