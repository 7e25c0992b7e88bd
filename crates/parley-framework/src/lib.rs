//! # Parley Framework
//!
//! Listeners, plugins and event dispatch for Parley bots.
//!
//! This layer provides:
//! - Regex listeners declared with [`listen_to`] / [`listen_webhook`], with
//!   mention, direct-message and user allow-list gates
//! - [`Plugin`]s that bundle listeners with start and stop hooks
//! - The [`PluginManager`] that registers plugins and the built-in help
//! - The [`Dispatcher`] that matches events and runs handlers inline on the
//!   async runtime or on the worker pool
//! - Clap-based command listeners (with `command` feature)
//!
//! It is built on the core types and engine in `parley-core` and knows
//! nothing about how events arrive; that is the transport's job.

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod help;
pub mod listener;
pub mod manager;
pub mod plugin;
pub mod registry;

#[cfg(feature = "command")]
pub mod command;

#[cfg(test)]
mod testing;

pub use context::BotContext;
pub use dispatcher::{DEFAULT_SHUTDOWN_GRACE, DispatchSettings, Dispatcher, PERMISSION_DENIED};
pub use error::{BoxError, HandlerError, HandlerResult, ListenerError, ListenerResult};
pub use help::{HelpIndex, HelpPlugin};
pub use listener::{
    ExecutionMode, GateDecision, Gates, Handler, InlineFn, ListenSpec, ListenerEntry,
    ListenerEvent, ListenerGroup, PatternFlags, ThreadedFn, listen_to, listen_webhook,
};
pub use manager::PluginManager;
pub use plugin::{BoxedPlugin, IntoPluginListeners, Plugin, PluginListeners, PluginRegistries};
pub use registry::ListenerRegistry;

#[cfg(feature = "command")]
pub use command::shell_split;
