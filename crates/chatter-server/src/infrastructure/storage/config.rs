//! TOML-based configuration for the chat server.
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return
//! value of `some_fn()` when the field is absent from the TOML file, so the
//! server runs correctly on first start (before a config file exists) and
//! with partial files that only override one or two knobs.
//!
//! ```toml
//! [server]
//! listen_address = "127.0.0.1:8000"
//! log_level = "info"
//!
//! [limits]
//! idle_timeout_secs = 300
//! slow_reader_max_wait_ms = 2000
//! idle_scan_interval_ms = 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::application::broadcaster::Policy;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Listener and logging settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Timeout and backpressure settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Seconds a client may stay idle before being disconnected.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Milliseconds fan-out will wait for a slow reader before dropping a
    /// message for that recipient.
    #[serde(default = "default_slow_reader_max_wait_ms")]
    pub slow_reader_max_wait_ms: u64,
    /// Milliseconds between idle checks.
    #[serde(default = "default_idle_scan_interval_ms")]
    pub idle_scan_interval_ms: u64,
}

impl LimitsConfig {
    /// Converts the raw integer knobs into the runtime [`Policy`].
    pub fn policy(&self) -> Policy {
        Policy {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_wait: Duration::from_millis(self.slow_reader_max_wait_ms),
            scan_interval: Duration::from_millis(self.idle_scan_interval_ms),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_listen_address() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_idle_timeout_secs() -> u64 {
    300
}
fn default_slow_reader_max_wait_ms() -> u64 {
    2000
}
fn default_idle_scan_interval_ms() -> u64 {
    1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            slow_reader_max_wait_ms: default_slow_reader_max_wait_ms(),
            idle_scan_interval_ms: default_idle_scan_interval_ms(),
        }
    }
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not
/// found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.listen_address, "127.0.0.1:8000");
        assert_eq!(cfg.server.log_level, "info");
        assert_eq!(cfg.limits.idle_timeout_secs, 300);
        assert_eq!(cfg.limits.slow_reader_max_wait_ms, 2000);
        assert_eq!(cfg.limits.idle_scan_interval_ms, 1000);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("empty config must parse");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let cfg: AppConfig = toml::from_str(
            r#"
[limits]
idle_timeout_secs = 60
"#,
        )
        .expect("partial config must parse");
        assert_eq!(cfg.limits.idle_timeout_secs, 60);
        // Unspecified fields keep their defaults.
        assert_eq!(cfg.limits.slow_reader_max_wait_ms, 2000);
        assert_eq!(cfg.server.listen_address, "127.0.0.1:8000");
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_conversion_produces_durations() {
        let limits = LimitsConfig {
            idle_timeout_secs: 10,
            slow_reader_max_wait_ms: 250,
            idle_scan_interval_ms: 500,
        };
        let policy = limits.policy();
        assert_eq!(policy.idle_timeout, Duration::from_secs(10));
        assert_eq!(policy.max_wait, Duration::from_millis(250));
        assert_eq!(policy.scan_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = Path::new("/nonexistent/path/that/cannot/exist/chatter.toml");
        let cfg = load_config(path).expect("missing file must fall back to defaults");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_config_reads_a_real_file() {
        let dir = std::env::temp_dir().join(format!("chatter_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("chatter.toml");
        std::fs::write(&path, "[server]\nlisten_address = \"0.0.0.0:9000\"\n").unwrap();

        let cfg = load_config(&path).expect("config must load");
        assert_eq!(cfg.server.listen_address, "0.0.0.0:9000");
        assert_eq!(cfg.limits.idle_timeout_secs, 300);

        std::fs::remove_dir_all(&dir).ok();
    }
}
