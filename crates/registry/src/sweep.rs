//! Recovery sweep
//!
//! Drives the prepared-transaction recovery protocol over a snapshot of XA
//! resources:
//!
//! ```text
//! for each handle (skipping handles whose resource manager was already scanned):
//!     recover(TMSTARTRSCAN | TMENDRSCAN)      -> in-doubt Xids
//!     for each Xid:
//!         resolver decides Commit / Rollback / Skip
//!         commit or rollback
//!         on heuristic outcome -> forget
//! ```
//!
//! A failing resource is recorded and the sweep moves to the next handle. An
//! optional deadline cancels the remaining work and marks the report as
//! timed out.

use crate::tm::XaResourceRecovery;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use xa_recovery_core::xid::{TMENDRSCAN, TMSTARTRSCAN};
use xa_recovery_core::{HandleId, XaError, XaResource, XaResourceHandle, XaResult, Xid};

/// What to do with an in-doubt branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    /// Commit the branch
    Commit,
    /// Roll the branch back
    Rollback,
    /// Leave the branch in doubt
    Skip,
}

/// Decides the outcome of in-doubt branches
///
/// Typically backed by the transaction manager's log.
pub trait BranchResolver {
    /// Outcome for `xid` found on `resource`
    fn resolve(&self, resource: &XaResourceHandle, xid: &Xid) -> BranchOutcome;
}

impl<F> BranchResolver for F
where
    F: Fn(&XaResourceHandle, &Xid) -> BranchOutcome,
{
    fn resolve(&self, resource: &XaResourceHandle, xid: &Xid) -> BranchOutcome {
        self(resource, xid)
    }
}

/// Presumed abort: with no commit record, every in-doubt branch rolls back
#[derive(Debug, Clone, Copy, Default)]
pub struct PresumedAbort;

impl BranchResolver for PresumedAbort {
    fn resolve(&self, _resource: &XaResourceHandle, _xid: &Xid) -> BranchOutcome {
        BranchOutcome::Rollback
    }
}

/// A resource call that failed during a sweep
#[derive(Debug, Clone)]
pub struct SweepFailure {
    /// Handle the call was made on
    pub handle: HandleId,
    /// Branch involved, if the failure was branch-specific
    pub xid: Option<Xid>,
    /// Error the resource returned
    pub error: XaError,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Handles scanned with `recover`
    pub resources_scanned: usize,
    /// Handles skipped because their resource manager was already scanned
    pub duplicates_skipped: usize,
    /// In-doubt branches found
    pub branches_found: usize,
    /// Branches committed
    pub committed: usize,
    /// Branches rolled back
    pub rolled_back: usize,
    /// Branches left in doubt by the resolver
    pub skipped: usize,
    /// Heuristically completed branches forgotten
    pub forgotten: usize,
    /// Failed resource calls
    pub failures: Vec<SweepFailure>,
    /// Whether the deadline cut the sweep short
    pub timed_out: bool,
}

impl SweepReport {
    /// True if every call succeeded and the sweep ran to completion
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.timed_out
    }
}

/// One recovery pass over a resource source
pub struct RecoverySweep<R> {
    resolver: R,
    deadline: Option<Duration>,
}

impl<R: BranchResolver> RecoverySweep<R> {
    /// Create a sweep with no deadline
    pub fn new(resolver: R) -> Self {
        RecoverySweep {
            resolver,
            deadline: None,
        }
    }

    /// Abandon remaining work once `deadline` has elapsed
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run the sweep over a snapshot of `source`
    pub fn run(&self, source: &dyn XaResourceRecovery) -> SweepReport {
        let started = Instant::now();
        let expired = || self.deadline.is_some_and(|d| started.elapsed() >= d);

        let mut report = SweepReport::default();
        let mut scanned: Vec<XaResourceHandle> = Vec::new();

        'handles: for handle in source.get_xa_resources() {
            if expired() {
                report.timed_out = true;
                break;
            }
            if self.already_scanned(&handle, &scanned) {
                report.duplicates_skipped += 1;
                continue;
            }

            let xids = match handle.recover(TMSTARTRSCAN | TMENDRSCAN) {
                Ok(xids) => xids,
                Err(error) => {
                    warn!(
                        target: "xa_recovery::sweep",
                        handle = %handle.id(),
                        error = %error,
                        "Recovery scan failed"
                    );
                    report.failures.push(SweepFailure {
                        handle: handle.id(),
                        xid: None,
                        error,
                    });
                    continue;
                }
            };
            report.resources_scanned += 1;
            report.branches_found += xids.len();

            for xid in xids {
                if expired() {
                    report.timed_out = true;
                    break 'handles;
                }
                match self.resolver.resolve(&handle, &xid) {
                    BranchOutcome::Commit => {
                        let result = handle.commit(&xid, false);
                        self.settle(&handle, xid, result, &mut report, |r| &mut r.committed);
                    }
                    BranchOutcome::Rollback => {
                        let result = handle.rollback(&xid);
                        self.settle(&handle, xid, result, &mut report, |r| &mut r.rolled_back);
                    }
                    BranchOutcome::Skip => report.skipped += 1,
                }
            }
            scanned.push(handle);
        }

        info!(
            target: "xa_recovery::sweep",
            scanned = report.resources_scanned,
            branches = report.branches_found,
            committed = report.committed,
            rolled_back = report.rolled_back,
            forgotten = report.forgotten,
            failures = report.failures.len(),
            timed_out = report.timed_out,
            "Recovery sweep complete"
        );
        report
    }

    fn already_scanned(&self, handle: &XaResourceHandle, scanned: &[XaResourceHandle]) -> bool {
        scanned
            .iter()
            .any(|seen| handle.is_same_rm(seen).unwrap_or(false))
    }

    fn settle(
        &self,
        handle: &XaResourceHandle,
        xid: Xid,
        result: XaResult<()>,
        report: &mut SweepReport,
        counter: impl Fn(&mut SweepReport) -> &mut usize,
    ) {
        match result {
            Ok(()) => *counter(report) += 1,
            Err(error) if error.is_heuristic() => match handle.forget(&xid) {
                Ok(()) => {
                    info!(
                        target: "xa_recovery::sweep",
                        handle = %handle.id(),
                        xid = %xid,
                        outcome = %error.code,
                        "Forgot heuristically completed branch"
                    );
                    report.forgotten += 1;
                }
                Err(forget_error) => report.failures.push(SweepFailure {
                    handle: handle.id(),
                    xid: Some(xid),
                    error: forget_error,
                }),
            },
            Err(error) => {
                warn!(
                    target: "xa_recovery::sweep",
                    handle = %handle.id(),
                    xid = %xid,
                    error = %error,
                    "Failed to complete in-doubt branch"
                );
                report.failures.push(SweepFailure {
                    handle: handle.id(),
                    xid: Some(xid),
                    error,
                });
            }
        }
    }
}
