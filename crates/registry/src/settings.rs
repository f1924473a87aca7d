//! Registry settings via `recovery.toml`
//!
//! Settings cover reconnect backoff, connection health checks and the
//! properties stamped onto wrapped resources. Every key is optional; missing
//! keys take their defaults.

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use xa_recovery_core::{RecoveryError, RecoveryResult, WrapperProperties};

/// Settings file name
pub const SETTINGS_FILE_NAME: &str = "recovery.toml";

fn default_health_check_interval_ms() -> u64 {
    250
}

/// Recovery registry settings
///
/// # Example
///
/// ```toml
/// health_check_interval_ms = 250
///
/// [retry]
/// base_delay_ms = 100
/// max_delay_ms = 5000
///
/// [wrapper]
/// product_name = "ActiveMQ Artemis"
/// jndi_name = "java:/JmsXA"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// How often a connected session checks its connection is still alive
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Reconnect backoff
    #[serde(default)]
    pub retry: RetryConfig,
    /// Properties applied to every wrapped resource
    #[serde(default)]
    pub wrapper: WrapperProperties,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            health_check_interval_ms: default_health_check_interval_ms(),
            retry: RetryConfig::default(),
            wrapper: WrapperProperties::default(),
        }
    }
}

impl RegistrySettings {
    /// Health check interval as a `Duration`
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms.max(1))
    }

    /// Returns the default settings file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# XA recovery registry settings
#
# How often (ms) a connected discovery session verifies its connection.
health_check_interval_ms = 250

# Reconnect backoff for sessions that cannot reach their broker.
[retry]
base_delay_ms = 100
max_delay_ms = 5000
# max_attempts = 10    # default: retry forever

# Properties stamped on every XA resource handed to the transaction manager.
[wrapper]
product_name = "ActiveMQ Artemis"
# product_version = "2.x"
# jndi_name = "java:/JmsXA"
# override_rm_value = false
"#
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns `Config` if the text is not valid settings TOML.
    pub fn from_toml_str(content: &str) -> RecoveryResult<Self> {
        toml::from_str(content)
            .map_err(|e| RecoveryError::config(format!("Failed to parse settings: {}", e)))
    }

    /// Read and parse settings from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> RecoveryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecoveryError::config(format!(
                "Failed to read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            RecoveryError::config(format!(
                "Failed to parse settings file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default settings file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> RecoveryResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                RecoveryError::config(format!(
                    "Failed to write default settings file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize these settings to TOML and write them to the given path.
    pub fn write_to_file(&self, path: &Path) -> RecoveryResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RecoveryError::config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            RecoveryError::config(format!(
                "Failed to write settings file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
