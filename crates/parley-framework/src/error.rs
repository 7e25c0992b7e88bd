//! Error types for the Parley framework.

use thiserror::Error;

pub use parley_core::BoxError;

/// The error type returned by listener handlers.
///
/// Any `std::error::Error + Send + Sync` converts into it with `?`.
pub type HandlerError = BoxError;

/// The result type returned by listener handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors raised while declaring or registering listeners.
#[derive(Debug, Clone, Error)]
pub enum ListenerError {
    /// The listener pattern is not a valid regular expression.
    #[error("invalid listener pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// The pattern as written by the plugin.
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A command listener pattern contains `$`.
    ///
    /// Command patterns name the command only; clap parses the arguments.
    #[error("command pattern `{0}` must not contain `$`")]
    CommandPattern(String),

    /// A plugin failed to register its listeners.
    #[error("plugin `{plugin}` failed to register listeners: {reason}")]
    Plugin {
        /// Name of the plugin.
        plugin: String,
        /// What went wrong.
        reason: String,
    },
}

/// Result type for listener registration.
pub type ListenerResult<T> = Result<T, ListenerError>;
