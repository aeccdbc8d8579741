//! Error types for strata.
//!
//! All failures are strongly typed with thiserror. Not-found is never an
//! error here: absence is expressed as `Option::None` or a missing result-set
//! entry. The two collaborator failure kinds (transport, local store) carry an
//! optional underlying cause.

use thiserror::Error;

/// Boxed underlying cause for a collaborator failure.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The remote origin was unreachable or returned an invalid response.
///
/// Retries, if any, are the transport collaborator's responsibility; the
/// provider surfaces this to the caller untouched.
#[derive(Debug, Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Cause>,
}

impl TransportError {
    /// Creates a transport error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error wrapping an underlying cause.
    #[must_use]
    pub fn with_cause(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            message: message.into(),
            source: Some(cause.into()),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The local durable store failed to read or persist.
///
/// Surfaced to the caller and aborts the in-progress operation.
#[derive(Debug, Error)]
#[error("local store failure: {message}")]
pub struct LocalStoreError {
    message: String,
    #[source]
    source: Option<Cause>,
}

impl LocalStoreError {
    /// Creates a local store error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a local store error wrapping an underlying cause.
    #[must_use]
    pub fn with_cause(message: impl Into<String>, cause: impl Into<Cause>) -> Self {
        Self {
            message: message.into(),
            source: Some(cause.into()),
        }
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Top-level error type for strata.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Remote origin unreachable or invalid response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Local persistence unavailable.
    #[error(transparent)]
    LocalStore(#[from] LocalStoreError),

    /// Positional access past the end of a result or id set.
    #[error("index {index} out of range for length {len}")]
    OutOfRange {
        /// The requested index.
        index: usize,
        /// The number of live entries.
        len: usize,
    },

    /// The worker queue rejected a task because it is at capacity.
    #[error("worker queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// The worker has quit and no longer accepts or reports work.
    #[error("worker is shut down")]
    Shutdown,
}

impl StrataError {
    /// Returns true if this is a transport failure.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this is a local store failure.
    #[must_use]
    pub const fn is_local_store(&self) -> bool {
        matches!(self, Self::LocalStore(_))
    }
}

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;
