//! Connector seam between discovery sessions and broker transports
//!
//! A `ConnectorFactory` is registered under a connector class name. When a
//! recovery config is registered, the factory for its class builds a
//! `Connector`; the session's worker then calls `connect` repeatedly until it
//! obtains a `BrokerConnection` exposing the broker's raw XA resources.
//!
//! ```text
//! RecoveryConfig ──(class name)──► ConnectorFactory ──► Connector
//!                                                         │ connect(stop)
//!                                                         ▼
//!                                                  BrokerConnection ──► [XaResource]
//! ```

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use xa_recovery_core::{RecoveryConfig, RecoveryError, RecoveryResult, XaResource};

struct SignalInner {
    stopped: Mutex<bool>,
    cond: Condvar,
}

/// Cooperative cancellation shared between a session and its connector
///
/// Connectors that block while connecting must poll `is_stopped` or wait on
/// `wait_timeout` so that unregistering a config interrupts the attempt.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<SignalInner>,
}

impl StopSignal {
    /// Create an unsignalled stop signal
    pub fn new() -> Self {
        StopSignal {
            inner: Arc::new(SignalInner {
                stopped: Mutex::new(false),
                cond: Condvar::new(),
            }),
        }
    }

    /// Signal stop and wake every waiter
    pub fn stop(&self) {
        let mut stopped = self.inner.stopped.lock();
        *stopped = true;
        self.inner.cond.notify_all();
    }

    /// Whether stop has been signalled
    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.lock()
    }

    /// Sleep for up to `timeout`, returning early on stop
    ///
    /// Returns true if stop was signalled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.inner.stopped.lock();
        while !*stopped {
            if self.inner.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// A live connection to one broker endpoint
pub trait BrokerConnection: Send {
    /// Raw XA resources the broker exposes over this connection
    fn xa_resources(&self) -> Vec<Arc<dyn XaResource>>;

    /// Whether the connection is still usable
    fn is_alive(&self) -> bool;

    /// Release the connection
    fn close(&mut self);
}

/// Establishes connections for one recovery config
pub trait Connector: Send + Sync {
    /// Connect to the broker
    ///
    /// May block, but must return promptly once `stop` is signalled.
    fn connect(&self, stop: &StopSignal) -> RecoveryResult<Box<dyn BrokerConnection>>;
}

/// Builds connectors for configs of one connector class
pub trait ConnectorFactory: Send + Sync {
    /// Build a connector for `config`
    ///
    /// Must not perform I/O; invalid parameters are reported here.
    fn create(&self, config: &RecoveryConfig) -> RecoveryResult<Arc<dyn Connector>>;
}

/// Connector factories by connector class name
pub struct ConnectorRegistry {
    factories: RwLock<HashMap<String, Arc<dyn ConnectorFactory>>>,
}

impl ConnectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        ConnectorRegistry {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory, returning the one it replaced
    pub fn register(
        &self,
        class_name: impl Into<String>,
        factory: Arc<dyn ConnectorFactory>,
    ) -> Option<Arc<dyn ConnectorFactory>> {
        self.factories.write().insert(class_name.into(), factory)
    }

    /// Remove a factory
    pub fn unregister(&self, class_name: &str) -> Option<Arc<dyn ConnectorFactory>> {
        self.factories.write().remove(class_name)
    }

    /// Look up a factory
    pub fn get(&self, class_name: &str) -> Option<Arc<dyn ConnectorFactory>> {
        self.factories.read().get(class_name).cloned()
    }

    /// Build the connector for `config`
    ///
    /// # Errors
    ///
    /// `UnknownConnector` if no factory is registered for the config's class,
    /// or whatever the factory reports for invalid parameters.
    pub fn resolve(&self, config: &RecoveryConfig) -> RecoveryResult<Arc<dyn Connector>> {
        let factory = self
            .get(config.connector_class())
            .ok_or_else(|| RecoveryError::UnknownConnector(config.connector_class().to_string()))?;
        factory.create(config)
    }

    /// Registered class names, sorted
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered factories
    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("class_names", &self.class_names())
            .finish()
    }
}
