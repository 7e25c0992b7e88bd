//! The bot orchestrator.
//!
//! [`ParleyBot`] wires the engine together and owns its lifecycle:
//!
//! 1. Starts the worker pool and submits the scheduler tick to it
//! 2. Starts the webhook gateway, when enabled
//! 3. Runs every plugin's `on_start` hook
//! 4. Runs the dispatcher until Ctrl+C, SIGTERM, [`ParleyBot::stop`], or
//!    until every raw event sender is dropped
//! 5. Tears down in reverse: gateway, plugin `on_stop`, scheduled jobs, pool
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyBot;
//!
//! let bot = ParleyBot::builder()
//!     .config(load_config()?)
//!     .client(MyClient::login(..).await?)
//!     .plugin(ExamplePlugin::default())
//!     .build()?;
//!
//! // The platform transport pushes raw websocket payloads here.
//! let events = bot.event_sender().expect("taken before run");
//! tokio::spawn(my_transport.forward_into(events));
//!
//! bot.run().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ParleyConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use parley_core::{BoxedClient, ChatClient, Scheduler, WebhookEvent, WorkerPool};
use parley_framework::{
    BotContext, BoxedPlugin, DispatchSettings, Dispatcher, Plugin, PluginManager,
};
use parley_transport::{GatewayHandle, WebhookGateway};

type Receivers = (UnboundedReceiver<String>, UnboundedReceiver<WebhookEvent>);

/// A configured bot, ready to run.
pub struct ParleyBot {
    config: ParleyConfig,
    client: BoxedClient,
    manager: PluginManager,
    pool: Arc<WorkerPool>,
    scheduler: Scheduler,
    /// Dropped when `run` starts so the loop ends once transports hang up.
    events_tx: Mutex<Option<UnboundedSender<String>>>,
    webhook_tx: UnboundedSender<WebhookEvent>,
    receivers: Mutex<Option<Receivers>>,
    webhook_addr: Mutex<Option<SocketAddr>>,
    shutdown: CancellationToken,
    handle_signals: bool,
}

impl ParleyBot {
    /// Creates a bot builder.
    pub fn builder() -> ParleyBotBuilder {
        ParleyBotBuilder::new()
    }

    /// The configuration the bot was built with.
    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// The plugin manager.
    pub fn plugins(&self) -> &PluginManager {
        &self.manager
    }

    /// The scheduler shared with handlers.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The worker pool shared with handlers.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// A sender for raw transport payloads.
    ///
    /// Returns `None` once [`run`](Self::run) has started. The dispatcher
    /// stops when every sender handed out here is dropped.
    pub fn event_sender(&self) -> Option<UnboundedSender<String>> {
        self.events_tx.lock().clone()
    }

    /// A sender feeding webhook events straight to the dispatcher.
    pub fn webhook_sender(&self) -> UnboundedSender<WebhookEvent> {
        self.webhook_tx.clone()
    }

    /// Address the webhook gateway is listening on, while it runs.
    pub fn webhook_addr(&self) -> Option<SocketAddr> {
        *self.webhook_addr.lock()
    }

    /// The token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Asks a running bot to shut down.
    pub fn stop(&self) {
        info!("Stop requested");
        self.shutdown.cancel();
    }

    /// Runs the bot until it is told to stop.
    ///
    /// A bot runs once; a second call returns [`RuntimeError::AlreadyStarted`].
    pub async fn run(&self) -> RuntimeResult<()> {
        let (events_rx, webhooks_rx) = self
            .receivers
            .lock()
            .take()
            .ok_or(RuntimeError::AlreadyStarted)?;
        self.events_tx.lock().take();

        let identity = self.client.identity();
        info!(
            bot = %identity.username,
            plugins = self.manager.plugin_count(),
            num_workers = self.pool.num_workers(),
            "Starting bot"
        );

        let ctx = Arc::new(BotContext::with_current_runtime(
            Arc::clone(&self.client),
            Arc::clone(&self.pool),
            self.scheduler.clone(),
        ));
        let dispatcher = Dispatcher::from_manager(
            Arc::clone(&ctx),
            &self.manager,
            DispatchSettings {
                ignore_users: self.config.bot.ignore_users.clone(),
                ignore_own_messages: self.config.bot.ignore_own_messages,
                shutdown_grace: self.config.bot.shutdown_grace(),
            },
        )?;

        self.pool.start()?;
        let gateway = match self.start_background().await {
            Ok(gateway) => gateway,
            Err(e) => {
                self.stop_pool().await;
                return Err(e);
            }
        };

        self.manager.start_all(&ctx).await;

        let signals = self
            .handle_signals
            .then(|| tokio::spawn(cancel_on_signal(self.shutdown.clone())));

        info!("Bot is running");
        dispatcher
            .run(events_rx, webhooks_rx, self.shutdown.clone())
            .await;

        info!("Shutting down bot");
        self.shutdown.cancel();
        if let Some(signals) = signals {
            signals.abort();
        }
        if let Some(gateway) = gateway {
            self.webhook_addr.lock().take();
            if let Err(e) = gateway.shutdown().await {
                error!(error = %e, "Webhook gateway stopped with an error");
            }
        }
        self.manager.stop_all(&ctx).await;
        self.scheduler.clear();
        self.stop_pool().await;

        info!("Bot stopped");
        Ok(())
    }

    /// Submits the scheduler tick and starts the gateway, if enabled.
    async fn start_background(&self) -> RuntimeResult<Option<GatewayHandle>> {
        if self.pool.num_workers() == 1 {
            warn!("The scheduler tick occupies the only worker; threaded listeners will not run");
        }

        let scheduler = self.scheduler.clone();
        self.pool
            .add_periodic_task("scheduler", self.config.scheduler.period(), move || {
                scheduler.tick()
            })?;

        if !self.config.webhook.enabled {
            debug!("Webhook gateway disabled");
            return Ok(None);
        }

        let gateway = WebhookGateway::new(self.webhook_tx.clone())
            .bind(&self.config.webhook.bind_addr())
            .await?;
        let handle = gateway.spawn();
        *self.webhook_addr.lock() = Some(handle.local_addr());
        Ok(Some(handle))
    }

    /// Stops the pool off the async runtime; it joins worker threads.
    async fn stop_pool(&self) {
        let pool = Arc::clone(&self.pool);
        if let Err(e) = tokio::task::spawn_blocking(move || pool.stop()).await {
            error!(error = %e, "Failed to stop worker pool");
        }
    }
}

impl std::fmt::Debug for ParleyBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParleyBot")
            .field("identity", self.client.identity())
            .field("manager", &self.manager)
            .field("pool", &self.pool)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Cancels `shutdown` on Ctrl+C or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => match result {
                        Ok(()) => info!("Received Ctrl+C, shutting down"),
                        Err(e) => {
                            error!(error = %e, "Failed to listen for Ctrl+C");
                            sigterm.recv().await;
                            info!("Received SIGTERM, shutting down");
                        }
                    },
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    shutdown.cancel();
}

async fn wait_for_ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// ParleyBotBuilder
// =============================================================================

/// Builder for [`ParleyBot`].
///
/// # Example
///
/// ```rust,ignore
/// let bot = ParleyBot::builder()
///     .config(ConfigLoader::new().profile("production").load()?)
///     .client(client)
///     .plugin(ExamplePlugin::default())
///     .plugin(WebhookExample::default())
///     .build()?;
/// ```
pub struct ParleyBotBuilder {
    config: ParleyConfig,
    client: Option<BoxedClient>,
    plugins: Vec<BoxedPlugin>,
    help: bool,
    handle_signals: bool,
    init_logging: bool,
}

impl ParleyBotBuilder {
    /// Creates a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ParleyConfig::default(),
            client: None,
            plugins: Vec::new(),
            help: true,
            handle_signals: true,
            init_logging: true,
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: ParleyConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the chat client.
    pub fn client<C: ChatClient>(self, client: C) -> Self {
        self.client_arc(Arc::new(client))
    }

    /// Sets a shared chat client.
    pub fn client_arc(mut self, client: BoxedClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Adds a plugin.
    pub fn plugin<P: Plugin>(self, plugin: P) -> Self {
        self.plugin_arc(Arc::new(plugin))
    }

    /// Adds a shared plugin.
    pub fn plugin_arc(mut self, plugin: BoxedPlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Registers the built-in help listener (default: true).
    pub fn help(mut self, enabled: bool) -> Self {
        self.help = enabled;
        self
    }

    /// Stops the bot on Ctrl+C and SIGTERM (default: true).
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Installs the global subscriber from `logging` config (default: true).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Validates the configuration and registers every plugin.
    pub fn build(self) -> RuntimeResult<ParleyBot> {
        validate_config(&self.config)?;
        if self.init_logging {
            logging::init_from_config(&self.config.logging);
        }

        let client = self.client.ok_or(RuntimeError::MissingClient)?;

        let mut manager = PluginManager::new();
        for plugin in self.plugins {
            manager.register_arc(plugin)?;
        }
        if self.help {
            manager.register_help()?;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (webhook_tx, webhooks_rx) = mpsc::unbounded_channel();

        debug!(
            plugins = manager.plugin_count(),
            message_listeners = manager.message_listeners().len(),
            webhook_listeners = manager.webhook_listeners().len(),
            "Bot built"
        );

        Ok(ParleyBot {
            pool: Arc::new(WorkerPool::new(self.config.worker_pool.num_workers)),
            config: self.config,
            client,
            manager,
            scheduler: Scheduler::new(),
            events_tx: Mutex::new(Some(events_tx)),
            webhook_tx,
            receivers: Mutex::new(Some((events_rx, webhooks_rx))),
            webhook_addr: Mutex::new(None),
            shutdown: CancellationToken::new(),
            handle_signals: self.handle_signals,
        })
    }
}

impl Default for ParleyBotBuilder {
    fn default() -> Self {
        Self::new()
    }
}
