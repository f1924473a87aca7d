//! XA recovery for message-broker resources
//!
//! A resource adapter registers the connector configs it uses; the registry
//! runs one discovery session per distinct config and exposes the wrapped XA
//! resources of every live session to the transaction manager's recovery
//! sweep.
//!
//! # Quick Start
//!
//! ```ignore
//! use xa_recovery::{RecoveryConfig, RecoveryRegistry, INVM_CONNECTOR_FACTORY};
//!
//! let config = RecoveryConfig::parse(INVM_CONNECTOR_FACTORY, "server-id=1")?;
//! RecoveryRegistry::global().register(config.clone())?;
//!
//! // Transaction manager recovery sweep
//! let resources = RecoveryRegistry::global().get_xa_resources();
//!
//! RecoveryRegistry::global().unregister(&config);
//! ```

pub use xa_recovery_core::*;
pub use xa_recovery_registry::*;
