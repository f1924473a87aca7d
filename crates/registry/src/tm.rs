//! Transaction manager integration
//!
//! The host transaction manager is injected as a handle instead of being
//! looked up by name. A registry built with a transaction manager registers
//! itself as an `XaResourceRecovery` source on construction and removes
//! itself on shutdown; the transaction manager then polls
//! `get_xa_resources` during its recovery sweeps.

use std::sync::Arc;
use xa_recovery_core::XaResourceHandle;

/// A source of XA resources for recovery sweeps
pub trait XaResourceRecovery: Send + Sync {
    /// Resources to scan, as a point-in-time snapshot
    ///
    /// Must not block on I/O.
    fn get_xa_resources(&self) -> Vec<XaResourceHandle>;
}

/// The host transaction manager's recovery registration surface
pub trait TransactionManager: Send + Sync {
    /// Add a recovery source to the transaction manager's sweeps
    fn add_resource_recovery(&self, recovery: Arc<dyn XaResourceRecovery>);

    /// Remove a previously added recovery source
    fn remove_resource_recovery(&self, recovery: &Arc<dyn XaResourceRecovery>);
}
