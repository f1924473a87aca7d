//! Core types and traits for XA recovery
//!
//! This crate defines the foundational types shared by the recovery registry
//! and its collaborators:
//! - Xid: X/Open transaction branch identifier, plus XA flags and vote values
//! - XaResource: the capability a transaction manager drives during recovery
//! - XaResourceHandle: server-side wrapper around a raw resource
//! - RecoveryConfig: connector identity used to deduplicate discovery sessions
//! - Error: `RecoveryError` and `XaError` hierarchies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod resource;
pub mod wrapper;
pub mod xid;

pub use config::{ConnectionParams, Credentials, DiscoveryHints, RecoveryConfig};
pub use error::{RecoveryError, RecoveryResult, XaError, XaErrorCode, XaResult};
pub use resource::XaResource;
pub use wrapper::{
    HandleId, ServerXaResourceWrapperFactory, WrapperProperties, XaResourceHandle,
    XaResourceWrapperFactory, DEFAULT_PRODUCT_NAME,
};
pub use xid::{Vote, Xid};
