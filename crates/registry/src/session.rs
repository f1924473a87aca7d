//! Discovery sessions
//!
//! A `DiscoverySession` owns one worker thread that keeps a connection to the
//! broker described by its `RecoveryConfig` and publishes the wrapped XA
//! resources of that connection.
//!
//! ## Worker Loop
//!
//! ```text
//! Connecting ──ok──► Connected ──connection lost──► Connecting
//!     │                                                 ▲
//!     └──error──► Backoff ──delay elapsed───────────────┘
//!                    │
//!                    └──attempt limit reached──► Failed
//!
//! stop() from any state ──► Stopped
//! ```
//!
//! Handles are published only while `Connected` and are withdrawn before the
//! connection is closed. Publish and stop are serialized by the session's
//! state lock, so a stopped session never republishes.

use crate::connector::{Connector, StopSignal};
use crate::retry::RetryConfig;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};
use xa_recovery_core::{
    HandleId, RecoveryConfig, RecoveryError, RecoveryResult, XaResourceHandle,
    XaResourceWrapperFactory,
};

/// Lifecycle state of a discovery session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Attempting to connect
    Connecting,
    /// Connected; handles are published
    Connected,
    /// Waiting before the next connection attempt
    Backoff,
    /// Gave up after the configured attempt limit
    Failed,
    /// Stopped by the registry
    Stopped,
}

/// Everything a session needs besides its config
#[derive(Clone)]
pub struct SessionContext {
    /// Connector built for the session's config
    pub connector: Arc<dyn Connector>,
    /// Wraps raw resources before publication
    pub wrapper: Arc<dyn XaResourceWrapperFactory>,
    /// Reconnect backoff
    pub retry: RetryConfig,
    /// Interval between connection liveness checks
    pub health_check_interval: Duration,
}

struct Published {
    state: SessionState,
    handles: Vec<XaResourceHandle>,
}

struct SessionShared {
    id: u64,
    config: RecoveryConfig,
    published: RwLock<Published>,
    stop: StopSignal,
    connections: AtomicU64,
    failures: AtomicU64,
}

impl SessionShared {
    /// Move to `state` unless the session is already stopped
    fn set_state(&self, state: SessionState) {
        let mut published = self.published.write();
        if published.state != SessionState::Stopped {
            published.state = state;
        }
    }

    /// Publish handles; false if the session was stopped meanwhile
    fn publish(&self, handles: Vec<XaResourceHandle>) -> bool {
        let mut published = self.published.write();
        if published.state == SessionState::Stopped {
            return false;
        }
        published.handles = handles;
        published.state = SessionState::Connected;
        true
    }

    fn withdraw(&self) {
        self.published.write().handles.clear();
    }

    fn mark_stopped(&self) {
        let mut published = self.published.write();
        published.handles.clear();
        published.state = SessionState::Stopped;
    }
}

/// One broker endpoint's contribution to the recovery registry
pub struct DiscoverySession {
    shared: Arc<SessionShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<Option<SessionContext>>,
}

impl DiscoverySession {
    /// Create a session without starting its worker
    ///
    /// The session stays in `Connecting` with no handles until `spawn`.
    pub fn new(id: u64, config: RecoveryConfig, ctx: SessionContext) -> Self {
        DiscoverySession {
            shared: Arc::new(SessionShared {
                id,
                config,
                published: RwLock::new(Published {
                    state: SessionState::Connecting,
                    handles: Vec::new(),
                }),
                stop: StopSignal::new(),
                connections: AtomicU64::new(0),
                failures: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
            pending: Mutex::new(Some(ctx)),
        }
    }

    /// Start a session and its worker thread
    ///
    /// Returns as soon as the worker is spawned; connecting happens on the
    /// worker.
    ///
    /// # Errors
    ///
    /// `SessionSpawn` if the worker thread cannot be created.
    pub fn start(id: u64, config: RecoveryConfig, ctx: SessionContext) -> RecoveryResult<Self> {
        let session = Self::new(id, config, ctx);
        session.spawn()?;
        Ok(session)
    }

    /// Spawn the worker thread
    ///
    /// No-op if the worker was already spawned or the session was stopped
    /// first.
    ///
    /// # Errors
    ///
    /// `SessionSpawn` if the worker thread cannot be created.
    pub fn spawn(&self) -> RecoveryResult<()> {
        // Held across the spawn so `stop` either prevents it or joins it
        let mut worker = self.worker.lock();
        if self.shared.stop.is_stopped() {
            return Ok(());
        }
        let ctx = match self.pending.lock().take() {
            Some(ctx) => ctx,
            None => return Ok(()),
        };

        let worker_shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(format!("xa-discovery-{}", self.shared.id))
            .spawn(move || run_worker(&worker_shared, &ctx))
            .map_err(|e| RecoveryError::SessionSpawn(e.to_string()))?;
        *worker = Some(handle);
        Ok(())
    }

    /// Session id, unique within the process
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Config this session serves
    pub fn config(&self) -> &RecoveryConfig {
        &self.shared.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.published.read().state
    }

    /// Handles published right now
    pub fn xa_resources(&self) -> Vec<XaResourceHandle> {
        self.shared.published.read().handles.clone()
    }

    /// Number of handles published right now
    pub fn handle_count(&self) -> usize {
        self.shared.published.read().handles.len()
    }

    /// Successful connections since start
    pub fn connection_count(&self) -> u64 {
        self.shared.connections.load(Ordering::Relaxed)
    }

    /// Failed connection attempts since start
    pub fn failure_count(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Whether `stop` has been called
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_stopped()
    }

    /// Stop the session
    ///
    /// Withdraws all handles before returning, interrupts backoff waits and
    /// connection attempts, and joins the worker. Idempotent.
    pub fn stop(&self) {
        self.shared.stop.stop();
        self.shared.mark_stopped();

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!(
                    target: "xa_recovery::session",
                    session_id = self.shared.id,
                    "Discovery worker exited by panic"
                );
            }
            info!(
                target: "xa_recovery::session",
                session_id = self.shared.id,
                config = %self.shared.config,
                "Discovery session stopped"
            );
        }
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for DiscoverySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoverySession")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .field("handles", &self.handle_count())
            .finish()
    }
}

fn run_worker(shared: &SessionShared, ctx: &SessionContext) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| worker_loop(shared, ctx)));
    if let Err(panic) = outcome {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "(non-string panic)".to_string());
        warn!(
            target: "xa_recovery::session",
            session_id = shared.id,
            config = %shared.config,
            panic = %message,
            "Discovery worker panicked"
        );
        shared.withdraw();
        shared.set_state(SessionState::Failed);
    }
}

fn worker_loop(shared: &SessionShared, ctx: &SessionContext) {
    let stop = &shared.stop;
    let mut failures: u32 = 0;

    while !stop.is_stopped() {
        shared.set_state(SessionState::Connecting);

        match ctx.connector.connect(stop) {
            Ok(mut conn) => {
                failures = 0;
                let handles: Vec<XaResourceHandle> = conn
                    .xa_resources()
                    .into_iter()
                    .enumerate()
                    .map(|(ordinal, resource)| {
                        ctx.wrapper.wrap(HandleId::new(shared.id, ordinal), resource)
                    })
                    .collect();
                let count = handles.len();

                if !shared.publish(handles) {
                    conn.close();
                    break;
                }
                shared.connections.fetch_add(1, Ordering::Relaxed);
                info!(
                    target: "xa_recovery::session",
                    session_id = shared.id,
                    config = %shared.config,
                    handles = count,
                    "Discovery session connected"
                );

                while conn.is_alive() {
                    if stop.wait_timeout(ctx.health_check_interval) {
                        break;
                    }
                }

                shared.withdraw();
                conn.close();

                if stop.is_stopped() {
                    break;
                }
                warn!(
                    target: "xa_recovery::session",
                    session_id = shared.id,
                    config = %shared.config,
                    "Connection lost, reconnecting"
                );
            }
            Err(e) => {
                if stop.is_stopped() {
                    break;
                }
                failures = failures.saturating_add(1);
                shared.failures.fetch_add(1, Ordering::Relaxed);

                if !ctx.retry.should_retry(failures) {
                    warn!(
                        target: "xa_recovery::session",
                        session_id = shared.id,
                        config = %shared.config,
                        attempt = failures,
                        error = %e,
                        "Giving up on discovery session"
                    );
                    shared.set_state(SessionState::Failed);
                    return;
                }

                let delay = ctx.retry.calculate_delay(failures - 1);
                shared.set_state(SessionState::Backoff);
                warn!(
                    target: "xa_recovery::session",
                    session_id = shared.id,
                    config = %shared.config,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection attempt failed"
                );
                if stop.wait_timeout(delay) {
                    break;
                }
            }
        }
    }

    shared.mark_stopped();
}
