//! Recovery registry for XA resources exposed by message brokers
//!
//! This crate keeps a catalogue of discovery sessions and hands their XA
//! resources to a transaction manager:
//! - RecoveryRegistry: register/unregister configs, snapshot resources
//! - DiscoverySession: per-config worker that connects, wraps and reconnects
//! - Connectors: pluggable transports resolved by connector class name
//! - RecoverySweep: drives `recover`/`commit`/`rollback`/`forget`
//! - RegistrySettings: `recovery.toml` configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connector;
pub mod invm;
pub mod registry;
pub mod retry;
pub mod session;
pub mod settings;
pub mod sweep;
pub mod tm;

pub use connector::{BrokerConnection, Connector, ConnectorFactory, ConnectorRegistry, StopSignal};
pub use invm::{
    InVmBroker, InVmConnectorFactory, InVmEndpoints, INVM_CONNECTOR_FACTORY, SERVER_ID_PARAM,
};
pub use registry::{RecoveryRegistry, RegistryBuilder};
pub use retry::RetryConfig;
pub use session::{DiscoverySession, SessionContext, SessionState};
pub use settings::{RegistrySettings, SETTINGS_FILE_NAME};
pub use sweep::{
    BranchOutcome, BranchResolver, PresumedAbort, RecoverySweep, SweepFailure, SweepReport,
};
pub use tm::{TransactionManager, XaResourceRecovery};
