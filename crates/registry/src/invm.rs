//! In-VM connector
//!
//! Brokers embedded in the same process bind themselves into `InVmEndpoints`
//! under a numeric server id. A config with connector class
//! [`INVM_CONNECTOR_FACTORY`] and parameter `server-id=N` connects to the
//! broker bound under `N`. A config without `server-id` targets server 0.

use crate::connector::{BrokerConnection, Connector, ConnectorFactory, StopSignal};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use xa_recovery_core::{RecoveryConfig, RecoveryError, RecoveryResult, XaResource};

/// Connector class name of the in-VM connector
pub const INVM_CONNECTOR_FACTORY: &str =
    "org.apache.activemq.artemis.core.remoting.impl.invm.InVMConnectorFactory";

/// Connection parameter naming the target server
pub const SERVER_ID_PARAM: &str = "server-id";

/// A broker endpoint reachable in-process
pub struct InVmBroker {
    server_id: u32,
    running: AtomicBool,
    resources: RwLock<Vec<Arc<dyn XaResource>>>,
}

impl InVmBroker {
    /// Create a running broker with no resources
    pub fn new(server_id: u32) -> Arc<Self> {
        Arc::new(InVmBroker {
            server_id,
            running: AtomicBool::new(true),
            resources: RwLock::new(Vec::new()),
        })
    }

    /// Server id
    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    /// Expose another XA resource to new connections
    pub fn add_resource(&self, resource: Arc<dyn XaResource>) {
        self.resources.write().push(resource);
    }

    /// Resources currently exposed
    pub fn resources(&self) -> Vec<Arc<dyn XaResource>> {
        self.resources.read().clone()
    }

    /// Start accepting connections
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
    }

    /// Stop accepting connections; open connections report not alive
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the broker is accepting connections
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

static SHARED_ENDPOINTS: Lazy<Arc<InVmEndpoints>> = Lazy::new(|| Arc::new(InVmEndpoints::new()));

/// In-process brokers by server id
#[derive(Default)]
pub struct InVmEndpoints {
    brokers: DashMap<u32, Arc<InVmBroker>>,
}

impl InVmEndpoints {
    /// Create an empty endpoint table
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide endpoint table used by the default connector registry
    pub fn shared() -> Arc<InVmEndpoints> {
        Arc::clone(&SHARED_ENDPOINTS)
    }

    /// Bind a broker, returning any broker previously bound under its id
    pub fn bind(&self, broker: Arc<InVmBroker>) -> Option<Arc<InVmBroker>> {
        self.brokers.insert(broker.server_id(), broker)
    }

    /// Unbind a broker
    pub fn unbind(&self, server_id: u32) -> Option<Arc<InVmBroker>> {
        self.brokers.remove(&server_id).map(|(_, broker)| broker)
    }

    /// Look up a broker
    pub fn lookup(&self, server_id: u32) -> Option<Arc<InVmBroker>> {
        self.brokers.get(&server_id).map(|entry| Arc::clone(entry.value()))
    }
}

/// Factory for [`INVM_CONNECTOR_FACTORY`] configs
pub struct InVmConnectorFactory {
    endpoints: Arc<InVmEndpoints>,
}

impl InVmConnectorFactory {
    /// Create a factory resolving against `endpoints`
    pub fn new(endpoints: Arc<InVmEndpoints>) -> Self {
        InVmConnectorFactory { endpoints }
    }
}

impl ConnectorFactory for InVmConnectorFactory {
    fn create(&self, config: &RecoveryConfig) -> RecoveryResult<Arc<dyn Connector>> {
        let server_id = match config.params().get(SERVER_ID_PARAM) {
            Some(raw) => raw.parse::<u32>().map_err(|_| {
                RecoveryError::invalid_config(format!(
                    "{} must be a non-negative integer, got '{}'",
                    SERVER_ID_PARAM, raw
                ))
            })?,
            None => 0,
        };
        Ok(Arc::new(InVmConnector {
            endpoints: Arc::clone(&self.endpoints),
            server_id,
        }))
    }
}

struct InVmConnector {
    endpoints: Arc<InVmEndpoints>,
    server_id: u32,
}

impl Connector for InVmConnector {
    fn connect(&self, _stop: &StopSignal) -> RecoveryResult<Box<dyn BrokerConnection>> {
        let broker = self
            .endpoints
            .lookup(self.server_id)
            .filter(|broker| broker.is_running())
            .ok_or_else(|| {
                RecoveryError::connection(format!(
                    "no in-vm acceptor running for server-id {}",
                    self.server_id
                ))
            })?;
        debug!(target: "xa_recovery::session", server_id = self.server_id, "In-VM connection opened");
        Ok(Box::new(InVmConnection {
            broker,
            open: true,
        }))
    }
}

struct InVmConnection {
    broker: Arc<InVmBroker>,
    open: bool,
}

impl BrokerConnection for InVmConnection {
    fn xa_resources(&self) -> Vec<Arc<dyn XaResource>> {
        self.broker.resources()
    }

    fn is_alive(&self) -> bool {
        self.open && self.broker.is_running()
    }

    fn close(&mut self) {
        self.open = false;
    }
}
