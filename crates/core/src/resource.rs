//! The XA resource capability
//!
//! `XaResource` is the vendor-neutral contract a transaction manager drives:
//! branch association (`start`/`end`), two-phase completion
//! (`prepare`/`commit`/`rollback`) and crash recovery (`recover`/`forget`).
//!
//! Methods take `&self` so a resource can be shared behind `Arc` between the
//! discovery session that owns the connection and the recovery sweep that
//! drives it. Implementations use interior mutability for branch state.

use crate::error::XaResult;
use crate::xid::{Vote, Xid};
use std::time::Duration;

/// A transactional resource participating in two-phase commit
pub trait XaResource: Send + Sync {
    /// Associate work with a branch (`TMNOFLAGS`, `TMJOIN` or `TMRESUME`)
    fn start(&self, xid: &Xid, flags: i32) -> XaResult<()>;

    /// End the association (`TMSUCCESS`, `TMFAIL` or `TMSUSPEND`)
    fn end(&self, xid: &Xid, flags: i32) -> XaResult<()>;

    /// Phase one: vote on the branch
    fn prepare(&self, xid: &Xid) -> XaResult<Vote>;

    /// Phase two: commit, optionally as a one-phase optimisation
    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()>;

    /// Roll back the branch
    fn rollback(&self, xid: &Xid) -> XaResult<()>;

    /// List prepared or heuristically completed branches
    ///
    /// `flags` is a combination of `TMSTARTRSCAN`, `TMENDRSCAN` or `TMNOFLAGS`.
    fn recover(&self, flags: i32) -> XaResult<Vec<Xid>>;

    /// Discard knowledge of a heuristically completed branch
    fn forget(&self, xid: &Xid) -> XaResult<()>;

    /// Current transaction timeout
    fn transaction_timeout(&self) -> XaResult<Duration>;

    /// Set the transaction timeout, returning false if unsupported
    fn set_transaction_timeout(&self, timeout: Duration) -> XaResult<bool>;

    /// Identity of the resource manager behind this resource
    fn resource_manager_id(&self) -> String;

    /// Whether `other` is backed by the same resource manager
    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        Ok(self.resource_manager_id() == other.resource_manager_id())
    }
}
