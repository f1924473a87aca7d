//! Shared test utilities for the integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};
pub use xa_recovery::{
    BrokerConnection, Connector, ConnectorFactory, ConnectorRegistry, RecoveryConfig,
    RecoveryError, RecoveryRegistry, RecoveryResult, RegistryBuilder, RegistrySettings,
    RetryConfig, SessionState, StopSignal, TransactionManager, Vote, XaError, XaErrorCode,
    XaResource, XaResourceHandle, XaResourceRecovery, XaResult, Xid,
};

/// Connector class served by [`ScriptedFactory`]
pub const SCRIPTED_CONNECTOR: &str = "test.ScriptedConnectorFactory";

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber once; filter with `RUST_LOG`.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Poll `condition` until it holds or 10 seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Settings with millisecond-scale health checks and backoff.
pub fn fast_settings() -> RegistrySettings {
    RegistrySettings {
        health_check_interval_ms: 2,
        retry: RetryConfig::new().with_base_delay_ms(1).with_max_delay_ms(5),
        ..RegistrySettings::default()
    }
}

/// Config for the scripted connector targeting `server-id`.
pub fn scripted_config(server_id: u32) -> RecoveryConfig {
    RecoveryConfig::parse(SCRIPTED_CONNECTOR, &format!("server-id={}", server_id))
        .expect("valid scripted config")
}

// ============================================================================
// RecordingXaResource
// ============================================================================

/// An XA call observed by a [`RecordingXaResource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XaOp {
    Start(Xid, i32),
    End(Xid, i32),
    Prepare(Xid),
    Commit(Xid, bool),
    Rollback(Xid),
    Recover(i32),
    Forget(Xid),
}

/// XA resource that records every call and holds scriptable in-doubt branches.
pub struct RecordingXaResource {
    rm_id: String,
    ops: Mutex<Vec<XaOp>>,
    in_doubt: Mutex<Vec<Xid>>,
    completion_error: Mutex<Option<XaErrorCode>>,
    timeout: Mutex<Duration>,
}

impl RecordingXaResource {
    pub fn new(rm_id: impl Into<String>) -> Arc<Self> {
        Arc::new(RecordingXaResource {
            rm_id: rm_id.into(),
            ops: Mutex::new(Vec::new()),
            in_doubt: Mutex::new(Vec::new()),
            completion_error: Mutex::new(None),
            timeout: Mutex::new(Duration::ZERO),
        })
    }

    /// Add an in-doubt branch to report from `recover`.
    pub fn add_in_doubt(&self, xid: Xid) {
        self.in_doubt.lock().push(xid);
    }

    /// Make `commit` and `rollback` fail with `code`.
    pub fn fail_completion_with(&self, code: XaErrorCode) {
        *self.completion_error.lock() = Some(code);
    }

    pub fn ops(&self) -> Vec<XaOp> {
        self.ops.lock().clone()
    }

    pub fn in_doubt(&self) -> Vec<Xid> {
        self.in_doubt.lock().clone()
    }

    fn record(&self, op: XaOp) {
        self.ops.lock().push(op);
    }

    fn complete(&self, xid: &Xid) -> XaResult<()> {
        if let Some(code) = *self.completion_error.lock() {
            return Err(XaError::new(code, "scripted completion failure"));
        }
        let mut in_doubt = self.in_doubt.lock();
        let before = in_doubt.len();
        in_doubt.retain(|x| x != xid);
        if in_doubt.len() == before {
            return Err(XaError::unknown_xid(xid.to_string()));
        }
        Ok(())
    }
}

impl XaResource for RecordingXaResource {
    fn start(&self, xid: &Xid, flags: i32) -> XaResult<()> {
        self.record(XaOp::Start(xid.clone(), flags));
        Ok(())
    }

    fn end(&self, xid: &Xid, flags: i32) -> XaResult<()> {
        self.record(XaOp::End(xid.clone(), flags));
        Ok(())
    }

    fn prepare(&self, xid: &Xid) -> XaResult<Vote> {
        self.record(XaOp::Prepare(xid.clone()));
        self.in_doubt.lock().push(xid.clone());
        Ok(Vote::Ok)
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.record(XaOp::Commit(xid.clone(), one_phase));
        self.complete(xid)
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.record(XaOp::Rollback(xid.clone()));
        self.complete(xid)
    }

    fn recover(&self, flags: i32) -> XaResult<Vec<Xid>> {
        self.record(XaOp::Recover(flags));
        Ok(self.in_doubt.lock().clone())
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        self.record(XaOp::Forget(xid.clone()));
        self.in_doubt.lock().retain(|x| x != xid);
        Ok(())
    }

    fn transaction_timeout(&self) -> XaResult<Duration> {
        Ok(*self.timeout.lock())
    }

    fn set_transaction_timeout(&self, timeout: Duration) -> XaResult<bool> {
        *self.timeout.lock() = timeout;
        Ok(true)
    }

    fn resource_manager_id(&self) -> String {
        self.rm_id.clone()
    }
}

// ============================================================================
// Scripted connector
// ============================================================================

/// Broker behaviour shared by every connector the [`ScriptedFactory`] builds.
///
/// Each `server-id` gets `resource_count` recording resources, created on
/// first connect and reused across reconnects.
pub struct ScriptedBroker {
    resource_count: usize,
    resources: Mutex<HashMap<String, Vec<Arc<RecordingXaResource>>>>,
    fail_next: AtomicUsize,
    block_connects: AtomicBool,
    epoch: Arc<AtomicU64>,
    creates: AtomicUsize,
    connect_attempts: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl ScriptedBroker {
    pub fn new(resource_count: usize) -> Arc<Self> {
        Arc::new(ScriptedBroker {
            resource_count,
            resources: Mutex::new(HashMap::new()),
            fail_next: AtomicUsize::new(0),
            block_connects: AtomicBool::new(false),
            epoch: Arc::new(AtomicU64::new(0)),
            creates: AtomicUsize::new(0),
            connect_attempts: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Make connection attempts block until the session is stopped.
    pub fn block_connects(&self, block: bool) {
        self.block_connects.store(block, Ordering::SeqCst);
    }

    /// Kill every open connection.
    pub fn drop_connections(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Resources exposed for `server_id`, creating them if needed.
    pub fn resources_for(&self, server_id: &str) -> Vec<Arc<RecordingXaResource>> {
        let mut resources = self.resources.lock();
        resources
            .entry(server_id.to_string())
            .or_insert_with(|| {
                (0..self.resource_count)
                    .map(|ordinal| {
                        RecordingXaResource::new(format!("scripted-{}-{}", server_id, ordinal))
                    })
                    .collect()
            })
            .clone()
    }

    /// Number of connectors the factory has built.
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Factory for [`SCRIPTED_CONNECTOR`] configs.
///
/// Rejects configs carrying a `reject` parameter.
pub struct ScriptedFactory {
    broker: Arc<ScriptedBroker>,
}

impl ScriptedFactory {
    pub fn new(broker: Arc<ScriptedBroker>) -> Self {
        ScriptedFactory { broker }
    }
}

impl ConnectorFactory for ScriptedFactory {
    fn create(&self, config: &RecoveryConfig) -> RecoveryResult<Arc<dyn Connector>> {
        if config.params().get("reject").is_some() {
            return Err(RecoveryError::invalid_config("rejected by scripted factory"));
        }
        self.broker.creates.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedConnector {
            broker: Arc::clone(&self.broker),
            server_id: config.params().get("server-id").unwrap_or("0").to_string(),
        }))
    }
}

struct ScriptedConnector {
    broker: Arc<ScriptedBroker>,
    server_id: String,
}

impl Connector for ScriptedConnector {
    fn connect(&self, stop: &StopSignal) -> RecoveryResult<Box<dyn BrokerConnection>> {
        self.broker.connect_attempts.fetch_add(1, Ordering::SeqCst);

        while self.broker.block_connects.load(Ordering::SeqCst) {
            if stop.wait_timeout(Duration::from_millis(5)) {
                return Err(RecoveryError::connection("connect interrupted"));
            }
        }

        let failed = self
            .broker
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(RecoveryError::connection("scripted connect failure"));
        }

        Ok(Box::new(ScriptedConnection {
            resources: self.broker.resources_for(&self.server_id),
            epoch: Arc::clone(&self.broker.epoch),
            opened_at: self.broker.epoch.load(Ordering::SeqCst),
            closes: Arc::clone(&self.broker.closes),
        }))
    }
}

struct ScriptedConnection {
    resources: Vec<Arc<RecordingXaResource>>,
    epoch: Arc<AtomicU64>,
    opened_at: u64,
    closes: Arc<AtomicUsize>,
}

impl BrokerConnection for ScriptedConnection {
    fn xa_resources(&self) -> Vec<Arc<dyn XaResource>> {
        self.resources
            .iter()
            .map(|r| Arc::clone(r) as Arc<dyn XaResource>)
            .collect()
    }

    fn is_alive(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.opened_at
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector registry serving only the scripted connector.
pub fn scripted_connectors(broker: &Arc<ScriptedBroker>) -> Arc<ConnectorRegistry> {
    let connectors = ConnectorRegistry::new();
    connectors.register(
        SCRIPTED_CONNECTOR,
        Arc::new(ScriptedFactory::new(Arc::clone(broker))),
    );
    Arc::new(connectors)
}

/// Registry wired to `broker` with fast settings.
pub fn scripted_registry(broker: &Arc<ScriptedBroker>) -> Arc<RecoveryRegistry> {
    init_tracing();
    RecoveryRegistry::builder()
        .settings(fast_settings())
        .connectors(scripted_connectors(broker))
        .build()
}

// ============================================================================
// RecordingTransactionManager
// ============================================================================

/// Transaction manager that keeps the recovery sources added to it.
#[derive(Default)]
pub struct RecordingTransactionManager {
    sources: Mutex<Vec<Arc<dyn XaResourceRecovery>>>,
    added: AtomicUsize,
    removed: AtomicUsize,
}

impl RecordingTransactionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn added(&self) -> usize {
        self.added.load(Ordering::SeqCst)
    }

    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn source_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Resources from every registered source, as a recovery sweep sees them.
    pub fn scan(&self) -> Vec<XaResourceHandle> {
        let sources = self.sources.lock().clone();
        sources.iter().flat_map(|s| s.get_xa_resources()).collect()
    }
}

fn same_source(a: &Arc<dyn XaResourceRecovery>, b: &Arc<dyn XaResourceRecovery>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl TransactionManager for RecordingTransactionManager {
    fn add_resource_recovery(&self, recovery: Arc<dyn XaResourceRecovery>) {
        self.added.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().push(recovery);
    }

    fn remove_resource_recovery(&self, recovery: &Arc<dyn XaResourceRecovery>) {
        self.removed.fetch_add(1, Ordering::SeqCst);
        self.sources.lock().retain(|s| !same_source(s, recovery));
    }
}
