//! The plugin trait.
//!
//! A plugin is a self-contained bundle of listeners plus optional start and
//! stop hooks. Listeners are declared, not discovered: the plugin returns them
//! from [`Plugin::listeners`], usually capturing an `Arc` of itself so the
//! handlers can reach plugin state.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Greeter { greeting: String }
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     fn name(&self) -> &str { "greeter" }
//!
//!     fn listeners(self: Arc<Self>) -> PluginListeners {
//!         PluginListeners::new().with(
//!             listen_to("^hello$").inline(move |ctx, msg, _| {
//!                 let this = Arc::clone(&self);
//!                 async move {
//!                     ctx.reply(&msg, &this.greeting).await?;
//!                     Ok(())
//!                 }
//!             }),
//!         )
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::context::BotContext;
use crate::error::{HandlerResult, ListenerResult};
use crate::listener::{ListenerEvent, ListenerGroup};
use crate::registry::ListenerRegistry;
use parley_core::{ChatMessage, WebhookEvent};

/// A bundle of listeners with lifecycle hooks.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Name used in logs and in the help text.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Declares the plugin's listeners. Called once, at registration.
    fn listeners(self: Arc<Self>) -> PluginListeners;

    /// Called when the bot starts, before events are dispatched.
    async fn on_start(&self, _ctx: &BotContext) -> HandlerResult {
        debug!(plugin = %self.name(), "Plugin started");
        Ok(())
    }

    /// Called when the bot shuts down.
    async fn on_stop(&self, _ctx: &BotContext) -> HandlerResult {
        debug!(plugin = %self.name(), "Plugin stopped");
        Ok(())
    }
}

/// A shared plugin trait object.
pub type BoxedPlugin = Arc<dyn Plugin>;

/// Routes a listener group to the matching list of [`PluginListeners`].
pub trait IntoPluginListeners {
    /// Adds `self` to `listeners`.
    fn add_to(self, listeners: &mut PluginListeners);
}

impl IntoPluginListeners for ListenerGroup<ChatMessage> {
    fn add_to(self, listeners: &mut PluginListeners) {
        listeners.messages.push(self);
    }
}

impl IntoPluginListeners for ListenerGroup<WebhookEvent> {
    fn add_to(self, listeners: &mut PluginListeners) {
        listeners.webhooks.push(self);
    }
}

/// The listeners declared by one plugin.
#[derive(Debug, Default)]
pub struct PluginListeners {
    messages: Vec<ListenerGroup<ChatMessage>>,
    webhooks: Vec<ListenerGroup<WebhookEvent>>,
}

impl PluginListeners {
    /// Creates an empty declaration list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message or webhook listener group.
    pub fn with(mut self, group: impl IntoPluginListeners) -> Self {
        group.add_to(&mut self);
        self
    }

    /// Compiles the declarations into the plugin's own registries.
    pub fn build(self) -> ListenerResult<PluginRegistries> {
        Ok(PluginRegistries {
            messages: build_registry(self.messages)?,
            webhooks: build_registry(self.webhooks)?,
        })
    }
}

fn build_registry<E: ListenerEvent>(
    groups: Vec<ListenerGroup<E>>,
) -> ListenerResult<ListenerRegistry<E>> {
    let mut registry = ListenerRegistry::new();
    for group in groups {
        registry.register(group)?;
    }
    Ok(registry)
}

/// Compiled listeners owned by one plugin.
#[derive(Debug, Default, Clone)]
pub struct PluginRegistries {
    /// Message listeners.
    pub messages: ListenerRegistry<ChatMessage>,
    /// Webhook listeners.
    pub webhooks: ListenerRegistry<WebhookEvent>,
}
