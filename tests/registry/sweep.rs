//! Recovery Sweep Tests
//!
//! Sweeps driven over the registry's resource snapshot.

use crate::common::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use xa_recovery::{BranchOutcome, PresumedAbort, RecoverySweep, WrapperProperties};

fn connected_registry(broker: &Arc<ScriptedBroker>, configs: u32) -> Arc<RecoveryRegistry> {
    let registry = scripted_registry(broker);
    for server_id in 1..=configs {
        registry.register(scripted_config(server_id)).unwrap();
    }
    let expected = configs as usize * 2;
    assert!(wait_until(|| registry.get_xa_resources().len() == expected));
    registry
}

#[test]
fn test_presumed_abort_over_registry() {
    let broker = ScriptedBroker::new(2);
    let registry = connected_registry(&broker, 2);

    let mut xids = Vec::new();
    for server in ["1", "2"] {
        for resource in broker.resources_for(server) {
            let xid = Xid::generate();
            resource.add_in_doubt(xid.clone());
            xids.push((resource, xid));
        }
    }

    let report = RecoverySweep::new(PresumedAbort).run(&*registry);
    assert_eq!(report.resources_scanned, 4);
    assert_eq!(report.branches_found, 4);
    assert_eq!(report.rolled_back, 4);
    assert!(report.is_clean());

    for (resource, xid) in xids {
        assert!(resource.ops().contains(&XaOp::Rollback(xid)));
        assert!(resource.in_doubt().is_empty());
    }
}

#[test]
fn test_resolver_decides_per_branch() {
    let broker = ScriptedBroker::new(2);
    let registry = connected_registry(&broker, 1);
    let resource = broker.resources_for("1").remove(0);

    let commit = Xid::generate();
    let rollback = Xid::generate();
    let keep = Xid::generate();
    for xid in [&commit, &rollback, &keep] {
        resource.add_in_doubt(xid.clone());
    }

    let committed: HashSet<Xid> = [commit.clone()].into_iter().collect();
    let keep_id = keep.clone();
    let resolver = move |_: &XaResourceHandle, xid: &Xid| {
        if committed.contains(xid) {
            BranchOutcome::Commit
        } else if *xid == keep_id {
            BranchOutcome::Skip
        } else {
            BranchOutcome::Rollback
        }
    };

    let report = RecoverySweep::new(resolver).run(&*registry);
    assert_eq!(report.committed, 1);
    assert_eq!(report.rolled_back, 1);
    assert_eq!(report.skipped, 1);

    let ops = resource.ops();
    assert!(ops.contains(&XaOp::Commit(commit, false)));
    assert!(ops.contains(&XaOp::Rollback(rollback)));
    assert_eq!(resource.in_doubt(), vec![keep]);
}

#[test]
fn test_heuristic_outcome_is_forgotten() {
    let broker = ScriptedBroker::new(1);
    let registry = scripted_registry(&broker);
    registry.register(scripted_config(1)).unwrap();
    assert!(wait_until(|| registry.get_xa_resources().len() == 1));

    let resource = broker.resources_for("1").remove(0);
    let xid = Xid::generate();
    resource.add_in_doubt(xid.clone());
    resource.fail_completion_with(XaErrorCode::HeuristicRollback);

    let report = RecoverySweep::new(|_: &XaResourceHandle, _: &Xid| BranchOutcome::Commit)
        .run(&*registry);
    assert_eq!(report.forgotten, 1);
    assert!(report.is_clean());
    assert!(resource.ops().contains(&XaOp::Forget(xid)));
}

#[test]
fn test_failed_completion_is_reported() {
    let broker = ScriptedBroker::new(1);
    let registry = scripted_registry(&broker);
    registry.register(scripted_config(1)).unwrap();
    assert!(wait_until(|| registry.get_xa_resources().len() == 1));

    let resource = broker.resources_for("1").remove(0);
    let xid = Xid::generate();
    resource.add_in_doubt(xid.clone());
    resource.fail_completion_with(XaErrorCode::ResourceManagerFailure);

    let report = RecoverySweep::new(PresumedAbort).run(&*registry);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].xid, Some(xid.clone()));
    assert_eq!(
        report.failures[0].error.code,
        XaErrorCode::ResourceManagerFailure
    );
    assert_eq!(resource.in_doubt(), vec![xid]);
}

#[test]
fn test_override_rm_value_collapses_scans() {
    let broker = ScriptedBroker::new(2);
    let settings = RegistrySettings {
        wrapper: WrapperProperties {
            override_rm_value: Some(true),
            ..WrapperProperties::default()
        },
        ..fast_settings()
    };
    let registry = RecoveryRegistry::builder()
        .settings(settings)
        .connectors(scripted_connectors(&broker))
        .build();
    registry.register(scripted_config(1)).unwrap();
    assert!(wait_until(|| registry.get_xa_resources().len() == 2));

    let report = RecoverySweep::new(PresumedAbort).run(&*registry);
    assert_eq!(report.resources_scanned, 1);
    assert_eq!(report.duplicates_skipped, 1);
}

#[test]
fn test_sweep_through_transaction_manager_source() {
    let tm = RecordingTransactionManager::new();
    let broker = ScriptedBroker::new(1);
    let registry = RecoveryRegistry::builder()
        .settings(fast_settings())
        .connectors(scripted_connectors(&broker))
        .transaction_manager(tm.clone())
        .build();
    registry.register(scripted_config(1)).unwrap();
    assert!(wait_until(|| tm.scan().len() == 1));

    broker.resources_for("1")[0].add_in_doubt(Xid::generate());

    let report = RecoverySweep::new(PresumedAbort).run(&*registry.recovery_source());
    assert_eq!(report.rolled_back, 1);
}

#[test]
fn test_expired_deadline_stops_sweep() {
    let broker = ScriptedBroker::new(2);
    let registry = connected_registry(&broker, 1);

    let report = RecoverySweep::new(PresumedAbort)
        .with_deadline(Duration::ZERO)
        .run(&*registry);
    assert!(report.timed_out);
    assert!(!report.is_clean());
    assert_eq!(report.resources_scanned, 0);
}

#[test]
fn test_sweep_of_empty_registry() {
    let broker = ScriptedBroker::new(1);
    let registry = scripted_registry(&broker);

    let report = RecoverySweep::new(PresumedAbort).run(&*registry);
    assert_eq!(report.resources_scanned, 0);
    assert!(report.is_clean());
}
