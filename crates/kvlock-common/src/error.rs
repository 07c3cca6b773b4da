//! Error types for kvlock
//!
//! This module defines:
//! - `StoreError`: failures of the external key-value store
//! - `LockError`: failures surfaced by lock operations

/// Failures reported by a key-value store adapter
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection or transport failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with a reply of the wrong shape
    #[error("unexpected store reply: {0}")]
    UnexpectedReply(String),

    /// The server-side script failed to run
    #[error("store script error: {0}")]
    Script(String),
}

impl StoreError {
    /// Whether the failure is a connectivity problem the next attempt may not see
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Errors returned by lock operations
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("lock acquisition interrupted")]
    Interrupted,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LockError::InvalidArgument(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type LockResult<T> = Result<T, LockError>;
