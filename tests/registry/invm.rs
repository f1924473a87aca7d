//! In-VM Connector Tests
//!
//! End-to-end discovery against brokers bound in-process.

use crate::common::*;
use std::sync::Arc;
use xa_recovery::{InVmBroker, InVmConnectorFactory, InVmEndpoints, INVM_CONNECTOR_FACTORY};

fn invm_registry(endpoints: &Arc<InVmEndpoints>) -> Arc<RecoveryRegistry> {
    init_tracing();
    let connectors = ConnectorRegistry::new();
    connectors.register(
        INVM_CONNECTOR_FACTORY,
        Arc::new(InVmConnectorFactory::new(Arc::clone(endpoints))),
    );
    RecoveryRegistry::builder()
        .settings(fast_settings())
        .connectors(Arc::new(connectors))
        .build()
}

fn broker_with_resources(server_id: u32, count: usize) -> Arc<InVmBroker> {
    let broker = InVmBroker::new(server_id);
    for ordinal in 0..count {
        broker.add_resource(RecordingXaResource::new(format!(
            "invm-{}-{}",
            server_id, ordinal
        )));
    }
    broker
}

fn invm_config(server_id: u32) -> RecoveryConfig {
    RecoveryConfig::parse(INVM_CONNECTOR_FACTORY, &format!("server-id={}", server_id)).unwrap()
}

#[test]
fn test_invm_server_scenario() {
    let endpoints = Arc::new(InVmEndpoints::new());
    endpoints.bind(broker_with_resources(1, 2));
    let registry = invm_registry(&endpoints);

    registry.register(invm_config(1)).unwrap();
    assert_eq!(registry.session_count(), 1);
    assert!(wait_until(|| registry.get_xa_resources().len() == 2));

    registry.unregister(&invm_config(1));
    assert!(registry.get_xa_resources().is_empty());
}

#[test]
fn test_broker_started_after_registration() {
    let endpoints = Arc::new(InVmEndpoints::new());
    let registry = invm_registry(&endpoints);

    registry.register(invm_config(3)).unwrap();
    assert!(wait_until(
        || registry.session_state(&invm_config(3)) == Some(SessionState::Backoff)
    ));
    assert!(registry.get_xa_resources().is_empty());

    endpoints.bind(broker_with_resources(3, 1));
    assert!(wait_until(|| registry.get_xa_resources().len() == 1));
}

#[test]
fn test_broker_restart_withdraws_and_republishes() {
    let endpoints = Arc::new(InVmEndpoints::new());
    let broker = broker_with_resources(1, 2);
    endpoints.bind(Arc::clone(&broker));
    let registry = invm_registry(&endpoints);

    registry.register(invm_config(1)).unwrap();
    assert!(wait_until(|| registry.get_xa_resources().len() == 2));

    broker.stop();
    assert!(wait_until(|| registry.get_xa_resources().is_empty()));

    broker.start();
    assert!(wait_until(|| registry.get_xa_resources().len() == 2));
}

#[test]
fn test_invalid_server_id_rejected_at_register() {
    let endpoints = Arc::new(InVmEndpoints::new());
    let registry = invm_registry(&endpoints);

    let config = RecoveryConfig::parse(INVM_CONNECTOR_FACTORY, "server-id=-1").unwrap();
    assert!(matches!(
        registry.register(config),
        Err(RecoveryError::InvalidConfig(_))
    ));
    assert_eq!(registry.session_count(), 0);
}

#[test]
fn test_default_registry_uses_shared_endpoints() {
    const SERVER_ID: u32 = 40_417;

    InVmEndpoints::shared().bind(broker_with_resources(SERVER_ID, 2));
    let registry = RecoveryRegistry::builder().settings(fast_settings()).build();

    registry.register(invm_config(SERVER_ID)).unwrap();
    assert!(wait_until(|| registry.get_xa_resources().len() == 2));

    registry.shutdown();
    InVmEndpoints::shared().unbind(SERVER_ID);
}
