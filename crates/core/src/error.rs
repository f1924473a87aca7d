//! Error types for XA recovery
//!
//! Two hierarchies live here:
//! - `XaError`: failures reported by a transactional resource, tagged with the
//!   X/Open error or heuristic code the resource returned
//! - `RecoveryError`: failures of the registry itself (configuration, connector
//!   lookup, session start-up, lifecycle)
//!
//! We use `thiserror` for `Display` and `Error` implementations.

use std::fmt;
use thiserror::Error;

/// Result type alias for registry operations
pub type RecoveryResult<T> = std::result::Result<T, RecoveryError>;

/// Result type alias for resource operations
pub type XaResult<T> = std::result::Result<T, XaError>;

/// X/Open XA return codes that signal a failed resource call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XaErrorCode {
    /// Routine returned with no effect and may be reissued (`XA_RETRY`)
    Retry,
    /// Branch was partially committed and partially rolled back (`XA_HEURMIX`)
    HeuristicMixed,
    /// Branch was heuristically rolled back (`XA_HEURRB`)
    HeuristicRollback,
    /// Branch was heuristically committed (`XA_HEURCOM`)
    HeuristicCommit,
    /// Branch may have been heuristically completed (`XA_HEURHAZ`)
    HeuristicHazard,
    /// Rollback for an unspecified reason (`XA_RBROLLBACK`)
    RollbackUnspecified,
    /// Rollback caused by a communication failure (`XA_RBCOMMFAIL`)
    RollbackCommFailure,
    /// Rollback because the branch took too long (`XA_RBTIMEOUT`)
    RollbackTimeout,
    /// Asynchronous operation already outstanding (`XAER_ASYNC`)
    Async,
    /// Resource manager error (`XAER_RMERR`)
    ResourceManagerError,
    /// The Xid is not known to the resource manager (`XAER_NOTA`)
    UnknownXid,
    /// Invalid arguments were given (`XAER_INVAL`)
    InvalidArguments,
    /// Routine invoked in an improper context (`XAER_PROTO`)
    Protocol,
    /// Resource manager unavailable (`XAER_RMFAIL`)
    ResourceManagerFailure,
    /// The Xid already exists (`XAER_DUPID`)
    DuplicateXid,
    /// Resource manager is doing work outside the global transaction (`XAER_OUTSIDE`)
    Outside,
}

impl XaErrorCode {
    /// Numeric code as defined by the X/Open XA specification
    pub fn code(&self) -> i32 {
        match self {
            XaErrorCode::Retry => 4,
            XaErrorCode::HeuristicMixed => 5,
            XaErrorCode::HeuristicRollback => 6,
            XaErrorCode::HeuristicCommit => 7,
            XaErrorCode::HeuristicHazard => 8,
            XaErrorCode::RollbackUnspecified => 100,
            XaErrorCode::RollbackCommFailure => 101,
            XaErrorCode::RollbackTimeout => 106,
            XaErrorCode::Async => -2,
            XaErrorCode::ResourceManagerError => -3,
            XaErrorCode::UnknownXid => -4,
            XaErrorCode::InvalidArguments => -5,
            XaErrorCode::Protocol => -6,
            XaErrorCode::ResourceManagerFailure => -7,
            XaErrorCode::DuplicateXid => -8,
            XaErrorCode::Outside => -9,
        }
    }

    /// Map a numeric XA code back to its variant
    pub fn from_code(code: i32) -> Option<Self> {
        let variant = match code {
            4 => XaErrorCode::Retry,
            5 => XaErrorCode::HeuristicMixed,
            6 => XaErrorCode::HeuristicRollback,
            7 => XaErrorCode::HeuristicCommit,
            8 => XaErrorCode::HeuristicHazard,
            100 => XaErrorCode::RollbackUnspecified,
            101 => XaErrorCode::RollbackCommFailure,
            106 => XaErrorCode::RollbackTimeout,
            -2 => XaErrorCode::Async,
            -3 => XaErrorCode::ResourceManagerError,
            -4 => XaErrorCode::UnknownXid,
            -5 => XaErrorCode::InvalidArguments,
            -6 => XaErrorCode::Protocol,
            -7 => XaErrorCode::ResourceManagerFailure,
            -8 => XaErrorCode::DuplicateXid,
            -9 => XaErrorCode::Outside,
            _ => return None,
        };
        Some(variant)
    }

    /// True for heuristic outcomes, which leave the branch to be forgotten
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            XaErrorCode::HeuristicMixed
                | XaErrorCode::HeuristicRollback
                | XaErrorCode::HeuristicCommit
                | XaErrorCode::HeuristicHazard
        )
    }

    /// True for the `XA_RB*` family
    pub fn is_rollback(&self) -> bool {
        (100..=107).contains(&self.code())
    }

    /// Symbolic X/Open name
    pub fn name(&self) -> &'static str {
        match self {
            XaErrorCode::Retry => "XA_RETRY",
            XaErrorCode::HeuristicMixed => "XA_HEURMIX",
            XaErrorCode::HeuristicRollback => "XA_HEURRB",
            XaErrorCode::HeuristicCommit => "XA_HEURCOM",
            XaErrorCode::HeuristicHazard => "XA_HEURHAZ",
            XaErrorCode::RollbackUnspecified => "XA_RBROLLBACK",
            XaErrorCode::RollbackCommFailure => "XA_RBCOMMFAIL",
            XaErrorCode::RollbackTimeout => "XA_RBTIMEOUT",
            XaErrorCode::Async => "XAER_ASYNC",
            XaErrorCode::ResourceManagerError => "XAER_RMERR",
            XaErrorCode::UnknownXid => "XAER_NOTA",
            XaErrorCode::InvalidArguments => "XAER_INVAL",
            XaErrorCode::Protocol => "XAER_PROTO",
            XaErrorCode::ResourceManagerFailure => "XAER_RMFAIL",
            XaErrorCode::DuplicateXid => "XAER_DUPID",
            XaErrorCode::Outside => "XAER_OUTSIDE",
        }
    }
}

impl fmt::Display for XaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// Failure reported by an XA resource
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct XaError {
    /// XA code returned by the resource
    pub code: XaErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl XaError {
    /// Create an error with the given code
    pub fn new(code: XaErrorCode, message: impl Into<String>) -> Self {
        XaError {
            code,
            message: message.into(),
        }
    }

    /// `XAER_NOTA`: the branch is not known to the resource manager
    pub fn unknown_xid(message: impl Into<String>) -> Self {
        Self::new(XaErrorCode::UnknownXid, message)
    }

    /// `XAER_INVAL`: invalid arguments
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(XaErrorCode::InvalidArguments, message)
    }

    /// `XAER_RMFAIL`: the resource manager is unavailable
    pub fn rm_failure(message: impl Into<String>) -> Self {
        Self::new(XaErrorCode::ResourceManagerFailure, message)
    }

    /// True if the resource reported a heuristic outcome
    pub fn is_heuristic(&self) -> bool {
        self.code.is_heuristic()
    }
}

/// Error types for the recovery registry
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No connector factory is registered under the config's class name
    #[error("Unknown connector class: {0}")]
    UnknownConnector(String),

    /// The recovery config or its connection parameters are malformed
    #[error("Invalid recovery config: {0}")]
    InvalidConfig(String),

    /// A connector could not reach its broker
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The discovery session could not be started
    #[error("Failed to start discovery session: {0}")]
    SessionSpawn(String),

    /// The registry no longer accepts registrations
    #[error("Recovery registry has been shut down")]
    ShutDown,

    /// The process-wide registry was already initialized
    #[error("Recovery registry is already initialized")]
    AlreadyInitialized,

    /// Registry settings could not be loaded or written
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecoveryError {
    /// Shorthand for `InvalidConfig`
    pub fn invalid_config(message: impl Into<String>) -> Self {
        RecoveryError::InvalidConfig(message.into())
    }

    /// Shorthand for `Connection`
    pub fn connection(message: impl Into<String>) -> Self {
        RecoveryError::Connection(message.into())
    }

    /// Shorthand for `Config`
    pub fn config(message: impl Into<String>) -> Self {
        RecoveryError::Config(message.into())
    }
}
