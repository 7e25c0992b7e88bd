//! Plugin registration and lifecycle.
//!
//! [`PluginManager`] owns every registered plugin. It:
//!
//! - Collects each plugin's declared listeners into per-plugin registries and
//!   merges them into the aggregate registries the dispatcher matches against.
//! - Keeps the [`HelpIndex`] used by the built-in [`HelpPlugin`] current.
//! - Drives `on_start` / `on_stop` in registration order (stop runs in
//!   reverse). A failing hook is logged and does not affect other plugins.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut manager = PluginManager::new();
//! manager.register(ExamplePlugin::default())?;
//! manager.register_help()?;
//!
//! manager.start_all(&ctx).await;
//! // …later…
//! manager.stop_all(&ctx).await;
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::context::BotContext;
use crate::error::{ListenerError, ListenerResult};
use crate::help::{HelpIndex, HelpPlugin};
use crate::plugin::{BoxedPlugin, Plugin, PluginRegistries};
use crate::registry::ListenerRegistry;
use parley_core::{ChatMessage, WebhookEvent};

/// Owner of all plugins and their listeners.
#[derive(Default)]
pub struct PluginManager {
    plugins: Vec<(BoxedPlugin, PluginRegistries)>,
    aggregate: PluginRegistries,
    help: Arc<RwLock<HelpIndex>>,
}

impl PluginManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin.
    pub fn register<P: Plugin>(&mut self, plugin: P) -> ListenerResult<()> {
        self.register_arc(Arc::new(plugin))
    }

    /// Registers a shared plugin.
    ///
    /// On error nothing from the plugin is registered.
    pub fn register_arc(&mut self, plugin: BoxedPlugin) -> ListenerResult<()> {
        let name = plugin.name().to_string();
        let registries = Arc::clone(&plugin)
            .listeners()
            .build()
            .map_err(|e| {
                error!(plugin = %name, error = %e, "Failed to register plugin");
                ListenerError::Plugin {
                    plugin: name.clone(),
                    reason: e.to_string(),
                }
            })?;

        info!(
            plugin = %name,
            message_listeners = registries.messages.len(),
            webhook_listeners = registries.webhooks.len(),
            "Registered plugin"
        );

        self.help.write().add_plugin(&name, registries.messages.iter());
        self.aggregate.messages.merge(registries.messages.clone());
        self.aggregate.webhooks.merge(registries.webhooks.clone());
        self.plugins.push((plugin, registries));
        Ok(())
    }

    /// Registers the built-in [`HelpPlugin`].
    ///
    /// Its listing covers plugins registered before and after this call.
    pub fn register_help(&mut self) -> ListenerResult<()> {
        self.register(HelpPlugin::new(Arc::clone(&self.help)))
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> impl Iterator<Item = &BoxedPlugin> {
        self.plugins.iter().map(|(plugin, _)| plugin)
    }

    /// Number of registered plugins.
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// The listeners one plugin declared, by plugin name.
    pub fn plugin_listeners(&self, name: &str) -> Option<&PluginRegistries> {
        self.plugins
            .iter()
            .find(|(plugin, _)| plugin.name() == name)
            .map(|(_, registries)| registries)
    }

    /// Message listeners of all plugins.
    pub fn message_listeners(&self) -> &ListenerRegistry<ChatMessage> {
        &self.aggregate.messages
    }

    /// Webhook listeners of all plugins.
    pub fn webhook_listeners(&self) -> &ListenerRegistry<WebhookEvent> {
        &self.aggregate.webhooks
    }

    /// The shared help index.
    pub fn help_index(&self) -> Arc<RwLock<HelpIndex>> {
        Arc::clone(&self.help)
    }

    /// Runs every plugin's `on_start` hook in registration order.
    pub async fn start_all(&self, ctx: &BotContext) {
        for (plugin, _) in &self.plugins {
            match plugin.on_start(ctx).await {
                Ok(()) => debug!(plugin = %plugin.name(), "on_start completed"),
                Err(e) => error!(plugin = %plugin.name(), error = %e, "on_start failed"),
            }
        }
    }

    /// Runs every plugin's `on_stop` hook in reverse registration order.
    pub async fn stop_all(&self, ctx: &BotContext) {
        for (plugin, _) in self.plugins.iter().rev() {
            match plugin.on_stop(ctx).await {
                Ok(()) => debug!(plugin = %plugin.name(), "on_stop completed"),
                Err(e) => error!(plugin = %plugin.name(), error = %e, "on_stop failed"),
            }
        }
    }
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field(
                "plugins",
                &self.plugins().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("message_listeners", &self.aggregate.messages.len())
            .field("webhook_listeners", &self.aggregate.webhooks.len())
            .finish()
    }
}
