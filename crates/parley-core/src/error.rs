//! Unified error types for the Parley core.
//!
//! This module provides standardized error types used across core components.
//! Listener-level errors (like `ListenerError`) are defined in parley-framework.

use thiserror::Error;

/// A boxed error that can be sent across threads.
///
/// Handlers, pool tasks and job actions all report failures through this type,
/// so any `std::error::Error` converts into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Client Errors
// =============================================================================

/// Errors returned by a [`ChatClient`](crate::ChatClient) implementation.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// The client is not logged in or the connection dropped.
    #[error("client is not connected")]
    NotConnected,

    /// The platform rejected the call because the bot lacks a permission.
    #[error("not enough permissions: {0}")]
    NotEnoughPermissions(String),

    /// The platform returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// Status code reported by the platform.
        status: u16,
        /// Error message reported by the platform.
        message: String,
    },

    /// Failed to serialize or deserialize a payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Normalization Errors
// =============================================================================

/// Errors raised while turning a raw transport payload into an event.
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The payload (or one of its nested JSON strings) is not valid JSON.
    #[error("malformed JSON in {field}: {source}")]
    Json {
        /// Which part of the payload failed to parse.
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A field required to build the event is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

impl NormalizeError {
    pub(crate) fn json(field: &'static str, source: serde_json::Error) -> Self {
        Self::Json { field, source }
    }
}

// =============================================================================
// Pool Errors
// =============================================================================

/// Errors raised by the [`WorkerPool`](crate::WorkerPool).
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// `start` was called on a pool that is already running.
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// The pool has been stopped and accepts no more tasks.
    #[error("worker pool is stopped")]
    Stopped,

    /// The task queue has been closed.
    #[error("worker pool queue is closed")]
    QueueClosed,

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),
}

// =============================================================================
// Job Errors
// =============================================================================

/// Failure of a one-time job, as reported to its watcher.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// The action returned an error.
    #[error("job action failed: {0}")]
    Failed(String),

    /// The action panicked inside its isolated executor.
    #[error("job action panicked: {0}")]
    Panicked(String),

    /// The child process could not be spawned or exited unsuccessfully.
    #[error("job process failed: {0}")]
    Process(String),

    /// The executor went away without reporting a result.
    #[error("job executor disconnected")]
    Disconnected,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for client calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for event normalization.
pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Result type for worker pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
