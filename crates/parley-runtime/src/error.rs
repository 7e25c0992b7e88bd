//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use parley_core::PoolError;
use parley_framework::ListenerError;
use parley_transport::GatewayError;

/// Errors that can occur while building or running a bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A plugin declared an invalid listener.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// The worker pool could not start.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The webhook gateway could not start.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// No chat client was given to the builder.
    #[error("A chat client is required to build a bot")]
    MissingClient,

    /// `run` was called on a bot that already ran.
    #[error("Bot has already been started")]
    AlreadyStarted,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
