//! Recovery configuration
//!
//! A `RecoveryConfig` describes one physical connection target: connector
//! class, connection parameters, optional credentials and discovery hints.
//! Equality and hashing are structural over all of these, which makes the
//! config the deduplication key of the recovery registry. Parameters are held
//! in a `BTreeMap`, so `"a=1,b=2"` and `"b=2,a=1"` describe the same target.

use crate::error::{RecoveryError, RecoveryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Connection parameters as key/value pairs
///
/// The string form is a list of `key=value` pairs separated by `,` or `;`,
/// e.g. `"server-id=1"` or `"host=localhost,port=61616"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionParams(BTreeMap<String, String>);

impl ConnectionParams {
    /// Create an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a parameter string
    ///
    /// Whitespace around keys and values is trimmed and empty segments are
    /// skipped. When a key repeats, the last value wins.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a segment without `=` or with an empty key.
    pub fn parse(input: &str) -> RecoveryResult<Self> {
        let mut params = BTreeMap::new();
        for segment in input.split([',', ';']) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                RecoveryError::invalid_config(format!(
                    "connection parameter '{}' is not of the form key=value",
                    segment
                ))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(RecoveryError::invalid_config(format!(
                    "connection parameter '{}' has an empty key",
                    segment
                )));
            }
            params.insert(key.to_string(), value.trim().to_string());
        }
        Ok(ConnectionParams(params))
    }

    /// Set a parameter, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a parameter
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Iterate parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no parameters
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for ConnectionParams {
    type Err = RecoveryError;

    fn from_str(s: &str) -> RecoveryResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

/// Username/password pair used by a connector
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Cluster discovery hints
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscoveryHints {
    /// Discovery group address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_address: Option<String>,
    /// Discovery group port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_port: Option<u16>,
    /// Whether the connection targets an HA pair
    #[serde(default)]
    pub ha: bool,
}

/// Identity of one recoverable connection target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecoveryConfig {
    connector_class: String,
    params: ConnectionParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials: Option<Credentials>,
    #[serde(default)]
    discovery: DiscoveryHints,
}

impl RecoveryConfig {
    /// Create a config for a connector class and parameters
    pub fn new(connector_class: impl Into<String>, params: ConnectionParams) -> Self {
        RecoveryConfig {
            connector_class: connector_class.into(),
            params,
            credentials: None,
            discovery: DiscoveryHints::default(),
        }
    }

    /// Create a config from a connector class and parameter string
    ///
    /// ```
    /// use xa_recovery_core::RecoveryConfig;
    ///
    /// let config = RecoveryConfig::parse("invm", "server-id=1").unwrap();
    /// assert_eq!(config.params().get("server-id"), Some("1"));
    /// ```
    pub fn parse(connector_class: impl Into<String>, params: &str) -> RecoveryResult<Self> {
        let config = Self::new(connector_class, ConnectionParams::parse(params)?);
        config.validate()?;
        Ok(config)
    }

    /// Attach credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Attach discovery hints
    pub fn with_discovery(mut self, discovery: DiscoveryHints) -> Self {
        self.discovery = discovery;
        self
    }

    /// Connector class name
    pub fn connector_class(&self) -> &str {
        &self.connector_class
    }

    /// Connection parameters
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Credentials, if any
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Discovery hints
    pub fn discovery(&self) -> &DiscoveryHints {
        &self.discovery
    }

    /// Check the config is usable as a registry key
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the connector class is blank.
    pub fn validate(&self) -> RecoveryResult<()> {
        if self.connector_class.trim().is_empty() {
            return Err(RecoveryError::invalid_config(
                "connector class name must not be empty",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RecoveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?{}", self.connector_class, self.params)?;
        if let Some(credentials) = &self.credentials {
            write!(f, " (user {})", credentials.username)?;
        }
        Ok(())
    }
}
