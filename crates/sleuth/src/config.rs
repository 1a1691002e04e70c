//! Client configuration.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::error;

use sleuth_common::codes;

/// Default group identifier; doubles as the frame prefix.
pub const DEFAULT_GROUP: &str = "SLEUTH-v0";

/// Default UDP discovery port consumed by the fabric.
pub const DEFAULT_PORT: u16 = 5670;

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration for one sleuth client.
///
/// All fields have defaults, so `Config::default()` joins the default group
/// as a client-only member. A member that announces a service must set
/// `service`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logical group namespace. Every client with the same group discovers
    /// the others; the group string also prefixes every frame.
    pub group: String,
    /// Network adapter handed to the fabric; empty selects the fabric's
    /// default.
    pub interface: String,
    /// Discovery port used by the fabric.
    pub port: u16,
    /// Log level name recorded for the embedding application.
    pub log_level: String,
    /// Service name offered by this member; empty means client-only.
    pub service: String,
    /// Free-form service version announced to peers.
    pub version: String,
    /// How long an outstanding call waits before timing out.
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            interface: String::new(),
            port: DEFAULT_PORT,
            log_level: "info".to_string(),
            service: String::new(),
            version: String::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file, best-effort: a missing or
    /// malformed file yields the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let Ok(data) = fs::read(path.as_ref()) else {
            return Self::default();
        };
        serde_json::from_slice(&data).unwrap_or_else(|err| {
            error!(
                file = %path.as_ref().display(),
                %err,
                "config file is malformed, using defaults"
            );
            Self::default()
        })
    }

    /// The validated log level: an unrecognized name is coerced to
    /// `"debug"` and reported with code 923.
    pub fn validated_log_level(&self) -> &str {
        if LOG_LEVELS.contains(&self.log_level.as_str()) {
            self.log_level.as_str()
        } else {
            error!(
                log_level = %self.log_level,
                code = codes::ERR_LOG_LEVEL,
                "invalid log level, using \"debug\""
            );
            "debug"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.group, "SLEUTH-v0");
        assert_eq!(config.port, 5670);
        assert_eq!(config.timeout_ms, 500);
        assert!(config.service.is_empty());
    }

    #[test]
    fn test_from_file_missing_yields_defaults() {
        let config = Config::from_file("/nonexistent/sleuth.json");
        assert_eq!(config.group, DEFAULT_GROUP);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = std::env::temp_dir();
        let path = dir.join("sleuth-config-test.json");
        fs::write(&path, br#"{"service": "echo", "port": 5760}"#).unwrap();
        let config = Config::from_file(&path);
        fs::remove_file(&path).ok();

        assert_eq!(config.service, "echo");
        assert_eq!(config.port, 5760);
        // Unspecified fields keep their defaults.
        assert_eq!(config.group, DEFAULT_GROUP);
    }

    #[test]
    fn test_log_level_coercion() {
        let mut config = Config::default();
        config.log_level = "foo".to_string();
        assert_eq!(config.validated_log_level(), "debug");
        config.log_level = "warn".to_string();
        assert_eq!(config.validated_log_level(), "warn");
    }
}
