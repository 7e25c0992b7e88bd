//! Parley Runtime - Orchestration layer for the Parley chat-bot framework.
//!
//! This crate provides:
//! - The bot orchestrator ([`ParleyBot`], [`ParleyBotBuilder`])
//! - Layered configuration ([`ConfigLoader`]: defaults, files, `PARLEY_*` env)
//! - Logging configuration ([`LoggingBuilder`])
//!
//! # Running a bot
//!
//! ```ignore
//! use parley_runtime::{ParleyBot, config::load_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = ParleyBot::builder()
//!         .config(load_config()?)
//!         .client(MyClient::connect().await?)
//!         .plugin(MyPlugin::default())
//!         .build()?;
//!
//!     // Hand raw platform events to the bot.
//!     let events = bot.event_sender().expect("bot not started");
//!     tokio::spawn(forward_platform_events(events));
//!
//!     // Run until Ctrl+C
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Lifecycle
//!
//! `run` starts the worker pool, submits the scheduler tick, binds the
//! webhook gateway when `webhook.enabled` is set and calls every plugin's
//! `on_start`. Shutdown runs the same steps in reverse.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LoggingConfig, ParleyConfig, Profile, load_config,
    load_config_from_file,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{ParleyBot, ParleyBotBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
