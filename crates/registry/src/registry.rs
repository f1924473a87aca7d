//! XA recovery registry
//!
//! Catalogue of discovery sessions keyed by `RecoveryConfig`. Resource
//! adapters call `register`/`unregister` from their start and stop paths; the
//! transaction manager's recovery sweep calls `get_xa_resources`.
//!
//! ## Guarantees
//!
//! - At most one session per distinct config, even when many threads register
//!   an equal config at once (DashMap's entry API makes get-or-create atomic
//!   per key).
//! - `get_xa_resources` takes only per-shard read locks and each session's
//!   handle lock; it never waits for a connection attempt or for a
//!   registration in progress. Connector factories run, and workers are
//!   spawned, outside the map's locks.
//! - A session is removed from the map before it is stopped, and stopping
//!   withdraws its handles, so a snapshot never contains handles of a session
//!   unregistered before the snapshot began.
//!
//! ## Process-wide Instance
//!
//! ```ignore
//! use xa_recovery_registry::{RecoveryRegistry, RegistryBuilder};
//!
//! // Optional: explicit one-time initialization with a transaction manager
//! RecoveryRegistry::init_global(RegistryBuilder::new().transaction_manager(tm))?;
//!
//! // Anywhere else
//! RecoveryRegistry::global().register(config)?;
//! ```

use crate::connector::ConnectorRegistry;
use crate::invm::{InVmConnectorFactory, InVmEndpoints, INVM_CONNECTOR_FACTORY};
use crate::session::{DiscoverySession, SessionContext, SessionState};
use crate::settings::RegistrySettings;
use crate::tm::{TransactionManager, XaResourceRecovery};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use xa_recovery_core::{
    RecoveryConfig, RecoveryError, RecoveryResult, ServerXaResourceWrapperFactory,
    XaResourceHandle, XaResourceWrapperFactory,
};

/// Process-wide registry, initialized at most once
static GLOBAL_REGISTRY: OnceCell<Arc<RecoveryRegistry>> = OnceCell::new();

/// Session ids are unique across every registry in the process
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Builder for `RecoveryRegistry`
#[derive(Default)]
pub struct RegistryBuilder {
    settings: RegistrySettings,
    connectors: Option<Arc<ConnectorRegistry>>,
    wrapper: Option<Arc<dyn XaResourceWrapperFactory>>,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
}

impl RegistryBuilder {
    /// Start from default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given settings
    pub fn settings(mut self, settings: RegistrySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use the given connector factories
    ///
    /// Defaults to a registry holding only the in-VM connector bound to the
    /// process-wide endpoint table.
    pub fn connectors(mut self, connectors: Arc<ConnectorRegistry>) -> Self {
        self.connectors = Some(connectors);
        self
    }

    /// Use a custom resource wrapper factory
    ///
    /// Defaults to `ServerXaResourceWrapperFactory` with the settings'
    /// wrapper properties.
    pub fn wrapper_factory(mut self, wrapper: Arc<dyn XaResourceWrapperFactory>) -> Self {
        self.wrapper = Some(wrapper);
        self
    }

    /// Register the built registry with this transaction manager
    pub fn transaction_manager(mut self, tm: Arc<dyn TransactionManager>) -> Self {
        self.transaction_manager = Some(tm);
        self
    }

    /// Build the registry
    pub fn build(self) -> Arc<RecoveryRegistry> {
        let connectors = self.connectors.unwrap_or_else(|| {
            let connectors = ConnectorRegistry::new();
            connectors.register(
                INVM_CONNECTOR_FACTORY,
                Arc::new(InVmConnectorFactory::new(InVmEndpoints::shared())),
            );
            Arc::new(connectors)
        });
        let wrapper = self.wrapper.unwrap_or_else(|| {
            Arc::new(ServerXaResourceWrapperFactory::new(
                self.settings.wrapper.clone(),
            ))
        });

        let registry = Arc::new_cyclic(|weak| RecoveryRegistry {
            sessions: DashMap::new(),
            connectors,
            wrapper,
            settings: self.settings,
            transaction_manager: self.transaction_manager,
            recovery_source: Arc::new(RegistryRecoverySource {
                registry: Weak::clone(weak),
            }),
            shut_down: AtomicBool::new(false),
        });

        if let Some(tm) = &registry.transaction_manager {
            tm.add_resource_recovery(Arc::clone(&registry.recovery_source));
            info!(target: "xa_recovery::registry", "Registered with transaction manager");
        }
        registry
    }
}

/// Recovery source handed to the transaction manager
///
/// Holds the registry weakly so the transaction manager does not keep a
/// dropped registry alive.
struct RegistryRecoverySource {
    registry: Weak<RecoveryRegistry>,
}

impl XaResourceRecovery for RegistryRecoverySource {
    fn get_xa_resources(&self) -> Vec<XaResourceHandle> {
        match self.registry.upgrade() {
            Some(registry) => registry.get_xa_resources(),
            None => Vec::new(),
        }
    }
}

/// Thread-safe catalogue of discovery sessions
pub struct RecoveryRegistry {
    sessions: DashMap<RecoveryConfig, Arc<DiscoverySession>>,
    connectors: Arc<ConnectorRegistry>,
    wrapper: Arc<dyn XaResourceWrapperFactory>,
    settings: RegistrySettings,
    transaction_manager: Option<Arc<dyn TransactionManager>>,
    recovery_source: Arc<dyn XaResourceRecovery>,
    shut_down: AtomicBool,
}

impl RecoveryRegistry {
    /// Create a registry with default settings and no transaction manager
    pub fn new() -> Arc<Self> {
        RegistryBuilder::new().build()
    }

    /// Builder for a customised registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The process-wide registry
    ///
    /// Lazily created with defaults on first access unless `init_global` ran
    /// first. Always the same instance for the life of the process.
    pub fn global() -> &'static Arc<RecoveryRegistry> {
        GLOBAL_REGISTRY.get_or_init(RecoveryRegistry::new)
    }

    /// Initialize the process-wide registry explicitly
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if `global` or `init_global` already ran. The
    /// rejected registry is shut down so it leaves no transaction manager
    /// registration behind.
    pub fn init_global(builder: RegistryBuilder) -> RecoveryResult<&'static Arc<RecoveryRegistry>> {
        let registry = builder.build();
        if let Err(rejected) = GLOBAL_REGISTRY.set(registry) {
            rejected.shutdown();
            return Err(RecoveryError::AlreadyInitialized);
        }
        GLOBAL_REGISTRY
            .get()
            .ok_or(RecoveryError::AlreadyInitialized)
    }

    /// Start discovery for `config`
    ///
    /// Returns `Ok(true)` if a new session was created and `Ok(false)` if an
    /// equal config was already registered. Never waits for the connection;
    /// connecting happens on the session's worker. The connector factory runs
    /// and the worker is spawned outside the map's locks, so snapshots and
    /// other registrations proceed meanwhile.
    ///
    /// # Errors
    ///
    /// Invalid config, unknown connector class, connector factory errors,
    /// worker spawn failure, or `ShutDown`. A failed registration leaves no
    /// entry behind.
    pub fn register(&self, config: RecoveryConfig) -> RecoveryResult<bool> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(RecoveryError::ShutDown);
        }
        config.validate()?;

        if let Some(existing) = self.sessions.get(&config) {
            debug!(
                target: "xa_recovery::registry",
                session_id = existing.value().id(),
                config = %existing.key(),
                "Config already registered"
            );
            return Ok(false);
        }

        // Factory code runs before any shard lock is taken
        let connector = self.connectors.resolve(&config)?;
        let ctx = SessionContext {
            connector,
            wrapper: Arc::clone(&self.wrapper),
            retry: self.settings.retry.clone(),
            health_check_interval: self.settings.health_check_interval(),
        };

        let session = match self.sessions.entry(config) {
            Entry::Occupied(existing) => {
                debug!(
                    target: "xa_recovery::registry",
                    session_id = existing.get().id(),
                    config = %existing.key(),
                    "Config registered concurrently"
                );
                return Ok(false);
            }
            Entry::Vacant(vacant) => {
                let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
                let session = Arc::new(DiscoverySession::new(id, vacant.key().clone(), ctx));
                vacant.insert(Arc::clone(&session));
                session
            }
        };

        if let Err(e) = session.spawn() {
            self.sessions
                .remove_if(session.config(), |_, current| Arc::ptr_eq(current, &session));
            session.stop();
            return Err(e);
        }
        info!(
            target: "xa_recovery::registry",
            session_id = session.id(),
            config = %session.config(),
            "Registered recovery config"
        );

        // Lost a race with shutdown: undo so no session outlives the registry
        if self.shut_down.load(Ordering::Acquire) {
            self.stop_all();
            return Err(RecoveryError::ShutDown);
        }
        Ok(true)
    }

    /// Stop discovery for `config`
    ///
    /// Returns true if a session was removed. The session is stopped after
    /// it leaves the map, outside any registry lock.
    pub fn unregister(&self, config: &RecoveryConfig) -> bool {
        match self.sessions.remove(config) {
            Some((config, session)) => {
                session.stop();
                info!(
                    target: "xa_recovery::registry",
                    session_id = session.id(),
                    config = %config,
                    "Unregistered recovery config"
                );
                true
            }
            None => false,
        }
    }

    /// Handles of every live session, ordered by session
    ///
    /// Returns only handles already established; never fails and never
    /// blocks on I/O.
    pub fn get_xa_resources(&self) -> Vec<XaResourceHandle> {
        let mut sessions: Vec<Arc<DiscoverySession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sessions.sort_by_key(|session| session.id());

        let handles: Vec<XaResourceHandle> = sessions
            .iter()
            .flat_map(|session| session.xa_resources())
            .collect();
        debug!(
            target: "xa_recovery::registry",
            sessions = sessions.len(),
            handles = handles.len(),
            "XA resource snapshot"
        );
        handles
    }

    /// Configs with a live session
    pub fn registered_configs(&self) -> Vec<RecoveryConfig> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions serving `config` (0 or 1)
    pub fn session_count_for(&self, config: &RecoveryConfig) -> usize {
        usize::from(self.sessions.contains_key(config))
    }

    /// Whether `config` has a live session
    pub fn is_registered(&self, config: &RecoveryConfig) -> bool {
        self.sessions.contains_key(config)
    }

    /// State of the session serving `config`
    pub fn session_state(&self, config: &RecoveryConfig) -> Option<SessionState> {
        self.sessions.get(config).map(|entry| entry.value().state())
    }

    /// Id of the session serving `config`
    pub fn session_id(&self, config: &RecoveryConfig) -> Option<u64> {
        self.sessions.get(config).map(|entry| entry.value().id())
    }

    /// Settings this registry was built with
    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Connector factories used to resolve configs
    pub fn connectors(&self) -> &Arc<ConnectorRegistry> {
        &self.connectors
    }

    /// The recovery source registered with the transaction manager
    pub fn recovery_source(&self) -> Arc<dyn XaResourceRecovery> {
        Arc::clone(&self.recovery_source)
    }

    /// Stop and remove every session, keeping the registry usable
    pub fn reset(&self) {
        let stopped = self.stop_all();
        info!(target: "xa_recovery::registry", sessions = stopped, "Registry reset");
    }

    /// Stop every session and refuse further registrations
    ///
    /// Deregisters from the transaction manager. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let stopped = self.stop_all();
        if let Some(tm) = &self.transaction_manager {
            tm.remove_resource_recovery(&self.recovery_source);
        }
        info!(target: "xa_recovery::registry", sessions = stopped, "Registry shut down");
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn stop_all(&self) -> usize {
        let configs = self.registered_configs();
        configs
            .iter()
            .filter(|config| self.unregister(config))
            .count()
    }
}

impl fmt::Debug for RecoveryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryRegistry")
            .field("session_count", &self.sessions.len())
            .field("connectors", &self.connectors)
            .field("has_transaction_manager", &self.transaction_manager.is_some())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl XaResourceRecovery for RecoveryRegistry {
    fn get_xa_resources(&self) -> Vec<XaResourceHandle> {
        RecoveryRegistry::get_xa_resources(self)
    }
}
