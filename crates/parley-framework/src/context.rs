//! The handler context.
//!
//! Every handler receives an `Arc<BotContext>`. It is created once per bot
//! and shared by all dispatches, so it only holds long-lived collaborators:
//! the chat client, the worker pool and the scheduler.
//!
//! Inline handlers are async and await client calls directly. Threaded
//! handlers run on worker threads outside the async runtime and use
//! [`BotContext::block_on`] or the `*_blocking` helpers instead.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;

use parley_core::{
    BotIdentity, BoxedClient, ChatClient, ChatMessage, ClientResult, Scheduler, WorkerPool,
};

/// Shared state handed to every listener handler.
pub struct BotContext {
    client: BoxedClient,
    pool: Arc<WorkerPool>,
    scheduler: Scheduler,
    runtime: Handle,
}

impl BotContext {
    /// Creates a context bound to the given runtime.
    pub fn new(
        client: BoxedClient,
        pool: Arc<WorkerPool>,
        scheduler: Scheduler,
        runtime: Handle,
    ) -> Self {
        Self {
            client,
            pool,
            scheduler,
            runtime,
        }
    }

    /// Creates a context bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn with_current_runtime(
        client: BoxedClient,
        pool: Arc<WorkerPool>,
        scheduler: Scheduler,
    ) -> Self {
        Self::new(client, pool, scheduler, Handle::current())
    }

    /// The chat client.
    pub fn client(&self) -> &dyn ChatClient {
        self.client.as_ref()
    }

    /// A shared handle to the chat client.
    pub fn client_arc(&self) -> BoxedClient {
        Arc::clone(&self.client)
    }

    /// Who the bot is.
    pub fn identity(&self) -> &BotIdentity {
        self.client.identity()
    }

    /// The worker pool running threaded handlers.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// The job scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The runtime inline handlers run on.
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Runs a future to completion from a worker thread.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async context, such as an inline
    /// handler.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    // ========================================================================
    // Client shortcuts
    // ========================================================================

    /// Replies to a message.
    pub async fn reply(&self, message: &ChatMessage, text: &str) -> ClientResult<String> {
        self.client.reply(message, text).await
    }

    /// Reacts to a message with an emoji.
    pub async fn react(&self, message: &ChatMessage, emoji_name: &str) -> ClientResult<()> {
        self.client.react(message, emoji_name).await
    }

    /// Posts a message to a channel.
    pub async fn create_post(&self, channel_id: &str, text: &str) -> ClientResult<String> {
        self.client.create_post(channel_id, text).await
    }

    /// Fetches a user's profile.
    pub async fn get_user_info(&self, user_id: &str) -> ClientResult<Value> {
        self.client.get_user_info(user_id).await
    }

    /// Blocking form of [`reply`](Self::reply) for threaded handlers.
    pub fn reply_blocking(&self, message: &ChatMessage, text: &str) -> ClientResult<String> {
        self.block_on(self.client.reply(message, text))
    }

    /// Blocking form of [`react`](Self::react) for threaded handlers.
    pub fn react_blocking(&self, message: &ChatMessage, emoji_name: &str) -> ClientResult<()> {
        self.block_on(self.client.react(message, emoji_name))
    }

    /// Blocking form of [`create_post`](Self::create_post) for threaded handlers.
    pub fn create_post_blocking(&self, channel_id: &str, text: &str) -> ClientResult<String> {
        self.block_on(self.client.create_post(channel_id, text))
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("identity", self.identity())
            .field("pool", &self.pool)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
