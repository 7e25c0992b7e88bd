//! # Parley
//!
//! A chat-bot framework for Mattermost-style platforms: plugins declare
//! regex listeners, a dispatcher matches incoming messages and webhooks
//! against them, and handlers run either inline on the async runtime or on
//! a bounded pool of worker threads. A scheduler fires deferred and
//! recurring jobs.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐ raw JSON ┌────────────┐ inline   ┌─────────────────────┐
//! │ Transport  │─────────▶│ Dispatcher │─────────▶│ tokio task          │──▶ ChatClient
//! └────────────┘          │            │ threaded ├─────────────────────┤
//! ┌────────────┐ webhook  │            │─────────▶│ WorkerPool thread   │──▶ ChatClient
//! │  Gateway   │─────────▶│            │          └─────────────────────┘
//! └────────────┘          └────────────┘     Scheduler ── tick on a pool worker
//! ```
//!
//! - **Runtime**: [`ParleyBot`](prelude::ParleyBot) owns the pool, the
//!   scheduler, the gateway and the plugin lifecycle
//! - **Plugins**: bundles of listeners with `on_start` / `on_stop` hooks
//! - **Listeners**: a pattern, flags, gates and one handler
//! - **Client**: the [`ChatClient`](prelude::ChatClient) the bot talks back through
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley::prelude::*;
//!
//! #[derive(Default)]
//! struct Ping;
//!
//! #[async_trait]
//! impl Plugin for Ping {
//!     fn listeners(self: Arc<Self>) -> PluginListeners {
//!         PluginListeners::new().with(
//!             listen_to("^ping$")
//!                 .needs_mention()
//!                 .description("Replies with pong.")
//!                 .inline(|ctx, msg, _| async move {
//!                     ctx.reply(&msg, "pong").await?;
//!                     Ok(())
//!                 }),
//!         )
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bot = ParleyBot::builder()
//!         .config(load_config()?)
//!         .client(MyClient::connect().await?)
//!         .plugin(Ping)
//!         .build()?;
//!
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `command`: clap-backed command listeners (default)
//! - `toml-config`: TOML config files (default)
//! - `yaml-config`: YAML config files
//! - `json-log`: JSON log output

pub use parley_core as core;
pub use parley_framework as framework;
pub use parley_runtime as runtime;
pub use parley_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    pub use async_trait::async_trait;

    // Runtime - main entry point
    pub use parley_runtime::config::load_config;
    pub use parley_runtime::{ConfigLoader, ParleyBot, ParleyConfig};

    // Plugins and listeners
    pub use parley_framework::{
        BotContext, HandlerResult, PatternFlags, Plugin, PluginListeners, listen_to,
        listen_webhook,
    };

    // Events and the client boundary
    pub use parley_core::{
        BotIdentity, ChatClient, ChatMessage, ClientResult, JobHandle, JobOutcome, Scheduler,
        WebhookEvent,
    };
}
