//! Server-side wrapping of raw XA resources
//!
//! A discovery session never hands raw broker resources to the transaction
//! manager. Each one is wrapped in an `XaResourceHandle` that carries the
//! identity the transaction manager uses to correlate recovery results
//! (product name, product version, JNDI name) and an optional override for
//! `is_same_rm`.

use crate::error::XaResult;
use crate::resource::XaResource;
use crate::xid::{Vote, Xid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Product name reported by wrapped resources unless configured otherwise
pub const DEFAULT_PRODUCT_NAME: &str = "ActiveMQ Artemis";

/// Properties stamped onto every wrapped resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperProperties {
    /// Product name of the resource manager
    pub product_name: String,
    /// Product version of the resource manager
    pub product_version: String,
    /// JNDI name the resource is bound under, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jndi_name: Option<String>,
    /// Forced answer for `is_same_rm`; `None` delegates to the resource
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_rm_value: Option<bool>,
}

impl Default for WrapperProperties {
    fn default() -> Self {
        WrapperProperties {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
            jndi_name: None,
            override_rm_value: None,
        }
    }
}

/// Identity of a wrapped resource
///
/// `session_id` and `ordinal` locate the resource within the registry; the
/// uuid distinguishes handles across reconnects of the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    /// Discovery session that produced the handle
    pub session_id: u64,
    /// Position of the resource within its connection
    pub ordinal: usize,
    /// Unique per wrap
    pub uuid: Uuid,
}

impl HandleId {
    /// Create a fresh id for the given session and ordinal
    pub fn new(session_id: u64, ordinal: usize) -> Self {
        HandleId {
            session_id,
            ordinal,
            uuid: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}/{}#{}", self.session_id, self.ordinal, self.uuid)
    }
}

/// A raw resource wrapped for the transaction manager
///
/// Cloning is cheap: the resource and properties are shared.
#[derive(Clone)]
pub struct XaResourceHandle {
    id: HandleId,
    inner: Arc<dyn XaResource>,
    properties: Arc<WrapperProperties>,
}

impl XaResourceHandle {
    /// Wrap `inner` with the given identity and properties
    pub fn new(
        id: HandleId,
        inner: Arc<dyn XaResource>,
        properties: Arc<WrapperProperties>,
    ) -> Self {
        XaResourceHandle {
            id,
            inner,
            properties,
        }
    }

    /// Handle identity
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The wrapped resource
    pub fn inner(&self) -> &Arc<dyn XaResource> {
        &self.inner
    }

    /// Product name of the resource manager
    pub fn product_name(&self) -> &str {
        &self.properties.product_name
    }

    /// Product version of the resource manager
    pub fn product_version(&self) -> &str {
        &self.properties.product_version
    }

    /// JNDI name, if configured
    pub fn jndi_name(&self) -> Option<&str> {
        self.properties.jndi_name.as_deref()
    }
}

impl XaResource for XaResourceHandle {
    fn start(&self, xid: &Xid, flags: i32) -> XaResult<()> {
        self.inner.start(xid, flags)
    }

    fn end(&self, xid: &Xid, flags: i32) -> XaResult<()> {
        self.inner.end(xid, flags)
    }

    fn prepare(&self, xid: &Xid) -> XaResult<Vote> {
        self.inner.prepare(xid)
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        self.inner.commit(xid, one_phase)
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        self.inner.rollback(xid)
    }

    fn recover(&self, flags: i32) -> XaResult<Vec<Xid>> {
        self.inner.recover(flags)
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        self.inner.forget(xid)
    }

    fn transaction_timeout(&self) -> XaResult<Duration> {
        self.inner.transaction_timeout()
    }

    fn set_transaction_timeout(&self, timeout: Duration) -> XaResult<bool> {
        self.inner.set_transaction_timeout(timeout)
    }

    fn resource_manager_id(&self) -> String {
        self.inner.resource_manager_id()
    }

    fn is_same_rm(&self, other: &dyn XaResource) -> XaResult<bool> {
        match self.properties.override_rm_value {
            Some(value) => Ok(value),
            None => self.inner.is_same_rm(other),
        }
    }
}

impl fmt::Debug for XaResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XaResourceHandle")
            .field("id", &self.id)
            .field("resource_manager", &self.inner.resource_manager_id())
            .field("product_name", &self.properties.product_name)
            .field("jndi_name", &self.properties.jndi_name)
            .finish()
    }
}

/// Turns raw resources into handles
pub trait XaResourceWrapperFactory: Send + Sync {
    /// Wrap `resource` under the given identity
    fn wrap(&self, id: HandleId, resource: Arc<dyn XaResource>) -> XaResourceHandle;
}

/// Default factory: stamps every handle with one set of properties
#[derive(Debug, Clone, Default)]
pub struct ServerXaResourceWrapperFactory {
    properties: Arc<WrapperProperties>,
}

impl ServerXaResourceWrapperFactory {
    /// Create a factory for the given properties
    pub fn new(properties: WrapperProperties) -> Self {
        ServerXaResourceWrapperFactory {
            properties: Arc::new(properties),
        }
    }

    /// Properties applied to wrapped resources
    pub fn properties(&self) -> &WrapperProperties {
        &self.properties
    }
}

impl XaResourceWrapperFactory for ServerXaResourceWrapperFactory {
    fn wrap(&self, id: HandleId, resource: Arc<dyn XaResource>) -> XaResourceHandle {
        XaResourceHandle::new(id, resource, Arc::clone(&self.properties))
    }
}
