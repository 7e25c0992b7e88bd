//! Event dispatcher for the Parley framework.
//!
//! The [`Dispatcher`] is the single control loop between the transport and
//! the handlers. For every chat message it:
//!
//! 1. Strips a leading mention of the bot (`@parley: ping` becomes `ping`)
//! 2. Drops messages from ignored users and, optionally, from the bot itself
//! 3. Matches the text against every message listener
//! 4. Checks each matching listener's gates, replying with a denial where the
//!    sender is not allowed
//! 5. Runs the handlers that passed: inline handlers as tasks on the async
//!    runtime, threaded handlers on the worker pool
//!
//! All gates for an event are evaluated before any of its handlers starts.
//! Webhook events skip steps 1, 2 and 4 and are matched by webhook id.
//!
//! ```text
//! raw events ──▶ ┌────────────┐ ──▶ tokio task   (inline)
//!                │ Dispatcher │
//! webhooks   ──▶ └────────────┘ ──▶ WorkerPool   (threaded)
//! ```
//!
//! Handler failures are logged with the listener pattern and never reach the
//! loop or sibling handlers.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Level, debug, error, info, span, trace, warn};

use crate::context::BotContext;
use crate::error::{ListenerError, ListenerResult};
use crate::listener::{GateDecision, Handler, ListenerEvent};
use crate::manager::PluginManager;
use crate::registry::ListenerRegistry;
use parley_core::{ChatMessage, NormalizedEvent, WebhookEvent};

/// Reply sent when the `allowed_users` gate rejects a sender.
pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action!";

/// Message filtering settings.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Usernames whose messages are ignored (case-insensitive).
    pub ignore_users: Vec<String>,
    /// Ignore messages sent by the bot itself.
    pub ignore_own_messages: bool,
    /// How long shutdown waits for running inline handlers before aborting
    /// them.
    pub shutdown_grace: Duration,
}

/// Default for [`DispatchSettings::shutdown_grace`].
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            ignore_users: Vec::new(),
            ignore_own_messages: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

/// Routes normalized events to listener handlers.
pub struct Dispatcher {
    ctx: Arc<BotContext>,
    messages: ListenerRegistry<ChatMessage>,
    webhooks: ListenerRegistry<WebhookEvent>,
    ignore_users: Vec<String>,
    ignore_own_messages: bool,
    shutdown_grace: Duration,
    name_matcher: Regex,
    inline_tasks: JoinSet<()>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registries.
    pub fn new(
        ctx: Arc<BotContext>,
        messages: ListenerRegistry<ChatMessage>,
        webhooks: ListenerRegistry<WebhookEvent>,
        settings: DispatchSettings,
    ) -> ListenerResult<Self> {
        let username = &ctx.identity().username;
        let source = format!(r"^@?{}:?\s?", regex::escape(username));
        let name_matcher =
            Regex::new(&source).map_err(|source| ListenerError::InvalidPattern {
                pattern: username.clone(),
                source,
            })?;

        Ok(Self {
            ctx,
            messages,
            webhooks,
            ignore_users: settings
                .ignore_users
                .iter()
                .map(|u| u.to_lowercase())
                .collect(),
            ignore_own_messages: settings.ignore_own_messages,
            shutdown_grace: settings.shutdown_grace,
            name_matcher,
            inline_tasks: JoinSet::new(),
        })
    }

    /// Creates a dispatcher over every listener registered on `manager`.
    pub fn from_manager(
        ctx: Arc<BotContext>,
        manager: &PluginManager,
        settings: DispatchSettings,
    ) -> ListenerResult<Self> {
        Self::new(
            ctx,
            manager.message_listeners().clone(),
            manager.webhook_listeners().clone(),
            settings,
        )
    }

    /// The handler context.
    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    /// Number of inline handler tasks not yet reaped.
    pub fn inline_task_count(&self) -> usize {
        self.inline_tasks.len()
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Runs until `shutdown` fires or the raw event stream closes.
    ///
    /// `events` carries raw transport payloads; `webhooks` carries events
    /// from the webhook gateway. Inline handlers still running when the loop
    /// ends get the shutdown grace period to finish and are then aborted.
    pub async fn run(
        mut self,
        mut events: UnboundedReceiver<String>,
        mut webhooks: UnboundedReceiver<WebhookEvent>,
        shutdown: CancellationToken,
    ) {
        info!("Dispatcher started");
        let mut webhooks_open = true;

        loop {
            while let Some(result) = self.inline_tasks.try_join_next() {
                log_join_result(result);
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Dispatcher shutting down");
                    break;
                }

                raw = events.recv() => match raw {
                    Some(raw) => self.handle_raw(&raw),
                    None => {
                        info!("Event stream closed");
                        break;
                    }
                },

                event = webhooks.recv(), if webhooks_open => match event {
                    Some(event) => self.dispatch_webhook(event),
                    None => {
                        debug!("Webhook queue closed");
                        webhooks_open = false;
                    }
                },

                Some(result) = self.inline_tasks.join_next(), if !self.inline_tasks.is_empty() => {
                    log_join_result(result);
                }
            }
        }

        self.finish().await;
        info!("Dispatcher stopped");
    }

    /// Drains inline handlers for at most the shutdown grace period, then
    /// aborts whatever is still running.
    async fn finish(&mut self) {
        if self.inline_tasks.is_empty() {
            return;
        }

        let grace = self.shutdown_grace;
        if tokio::time::timeout(grace, self.drain()).await.is_err() {
            let aborted = self.inline_tasks.len();
            warn!(
                aborted,
                grace_ms = grace.as_millis() as u64,
                "Aborting inline listeners still running after the shutdown grace period"
            );
            self.inline_tasks.shutdown().await;
        }
    }

    /// Awaits every inline handler task spawned so far.
    pub async fn drain(&mut self) {
        while let Some(result) = self.inline_tasks.join_next().await {
            log_join_result(result);
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Normalizes and dispatches a raw transport payload.
    ///
    /// Malformed payloads are logged and dropped.
    pub fn handle_raw(&mut self, raw: &str) {
        match ChatMessage::from_raw(raw) {
            Ok(Some(message)) => self.dispatch_message(message),
            Ok(None) => trace!("Ignoring non-post event"),
            Err(e) => warn!(error = %e, "Dropping malformed event"),
        }
    }

    /// Dispatches an already normalized event.
    pub fn dispatch(&mut self, event: NormalizedEvent) {
        match event {
            NormalizedEvent::Message(message) => {
                self.dispatch_message(Arc::unwrap_or_clone(message))
            }
            NormalizedEvent::Webhook(event) => self.dispatch_webhook(Arc::unwrap_or_clone(event)),
        }
    }

    /// Dispatches a chat message.
    pub fn dispatch_message(&mut self, message: ChatMessage) {
        let stripped = self.name_matcher.replace(&message.text, "").trim().to_string();
        let message = message.with_text(stripped);

        let span = span!(
            Level::DEBUG,
            "dispatch",
            event = "message",
            post_id = %message.id,
            sender = %message.sender_name
        );
        let _enter = span.enter();

        if self.should_ignore(&message) {
            trace!("Ignoring message");
            return;
        }

        let message = Arc::new(message);
        let bot_user_id = &self.ctx.identity().user_id;

        // Gates are evaluated for every match before anything runs.
        let mut runnable = Vec::new();
        let mut denied = 0usize;
        for (entry, groups) in self.messages.matching(&message.text) {
            match entry.gates().evaluate(&message, bot_user_id) {
                GateDecision::Run => {
                    runnable.push((entry.source().to_string(), entry.handler().clone(), groups))
                }
                GateDecision::Skip => trace!(listener = %entry.source(), "Gate not satisfied"),
                GateDecision::Deny => {
                    debug!(listener = %entry.source(), "Sender not allowed");
                    denied += 1;
                }
            }
        }

        for _ in 0..denied {
            let ctx = Arc::clone(&self.ctx);
            let message = Arc::clone(&message);
            self.inline_tasks.spawn(
                async move {
                    if let Err(e) = ctx.reply(&message, PERMISSION_DENIED).await {
                        error!(error = %e, "Failed to send permission denial");
                    }
                }
                .in_current_span(),
            );
        }

        debug!(matched = runnable.len(), denied, "Dispatching message");
        for (listener, handler, groups) in runnable {
            self.invoke(listener, handler, Arc::clone(&message), groups);
        }
    }

    /// Dispatches a webhook event.
    pub fn dispatch_webhook(&mut self, event: WebhookEvent) {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            event = "webhook",
            webhook_id = %event.webhook_id
        );
        let _enter = span.enter();

        let event = Arc::new(event);
        let matched: Vec<_> = self
            .webhooks
            .matching(event.match_subject())
            .into_iter()
            .map(|(entry, groups)| (entry.source().to_string(), entry.handler().clone(), groups))
            .collect();

        debug!(matched = matched.len(), "Dispatching webhook");
        for (listener, handler, groups) in matched {
            self.invoke(listener, handler, Arc::clone(&event), groups);
        }
    }

    fn should_ignore(&self, message: &ChatMessage) -> bool {
        let sender = message.sender_name.to_lowercase();
        if self.ignore_users.iter().any(|u| *u == sender) {
            return true;
        }

        let identity = self.ctx.identity();
        self.ignore_own_messages
            && (message.user_id == identity.user_id || message.sender_name == identity.username)
    }

    fn invoke<E: ListenerEvent>(
        &mut self,
        listener: String,
        handler: Handler<E>,
        event: Arc<E>,
        groups: Vec<String>,
    ) {
        let ctx = Arc::clone(&self.ctx);
        match handler {
            Handler::Inline(handler) => {
                self.inline_tasks.spawn(
                    async move {
                        if let Err(e) = handler(ctx, event, groups).await {
                            error!(listener = %listener, error = %e, "Listener failed");
                        }
                    }
                    .in_current_span(),
                );
            }
            Handler::Threaded(handler) => {
                let span = tracing::Span::current();
                let pool = Arc::clone(self.ctx.pool());
                let submitted = pool.add_task(move || {
                    let _enter = span.enter();
                    if let Err(e) = handler(ctx, event, groups) {
                        error!(listener = %listener, error = %e, "Listener failed");
                    }
                });
                if let Err(e) = submitted {
                    error!(error = %e, "Failed to submit listener to worker pool");
                }
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("message_listeners", &self.messages.len())
            .field("webhook_listeners", &self.webhooks.len())
            .field("ignore_users", &self.ignore_users)
            .field("ignore_own_messages", &self.ignore_own_messages)
            .finish()
    }
}

fn log_join_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Inline listener panicked");
        } else {
            debug!(error = %e, "Inline listener cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use crate::listener::{listen_to, listen_webhook};
    use crate::plugin::PluginListeners;
    use crate::testing::{BOT_ID, Call, message, test_context};

    fn dispatcher_with(
        ctx: Arc<BotContext>,
        listeners: PluginListeners,
        settings: DispatchSettings,
    ) -> Dispatcher {
        let registries = listeners.build().unwrap();
        Dispatcher::new(ctx, registries.messages, registries.webhooks, settings).unwrap()
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ping_pong_end_to_end() {
        let (ctx, client) = test_context();
        let listeners = PluginListeners::new().with(
            listen_to("^ping$")
                .needs_mention()
                .inline(|ctx, msg, _| async move {
                    ctx.reply(&msg, "pong").await?;
                    Ok(())
                }),
        );
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        let mut msg = message("@parley ping");
        msg.mentions = HashSet::from([BOT_ID.to_string()]);
        dispatcher.dispatch_message(msg);
        dispatcher.drain().await;

        assert_eq!(client.replies(), vec!["pong"]);
        ctx.pool().stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_needs_mention_skips_unaddressed_message() {
        let (ctx, client) = test_context();
        let listeners = PluginListeners::new().with(
            listen_to("^ping$")
                .needs_mention()
                .inline(|ctx, msg, _| async move {
                    ctx.reply(&msg, "pong").await?;
                    Ok(())
                }),
        );
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        dispatcher.dispatch_message(message("ping"));
        dispatcher.drain().await;

        assert!(client.calls().is_empty());
        ctx.pool().stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mention_prefix_is_stripped() {
        let (ctx, _client) = test_context();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let listeners = PluginListeners::new().with(listen_to("^(.*)$").inline(
            move |_, msg, _| {
                s.lock().push(msg.text.clone());
                async { Ok(()) }
            },
        ));
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        for text in ["@parley: hello", "parley hi", "@parleyx yo", "hey @parley"] {
            dispatcher.dispatch_message(message(text));
        }
        dispatcher.drain().await;

        let mut seen = seen.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["hello", "hey @parley", "hi", "x yo"]);
        ctx.pool().stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ignored_and_own_messages_are_dropped() {
        let (ctx, _client) = test_context();
        let hits = counter();
        let h = Arc::clone(&hits);
        let listeners = PluginListeners::new().with(listen_to("hi").inline(move |_, _, _| {
            h.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }));
        let settings = DispatchSettings {
            ignore_users: vec!["Spammer".to_string()],
            ..DispatchSettings::default()
        };
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, settings);

        let mut spam = message("hi");
        spam.sender_name = "spammer".to_string();
        dispatcher.dispatch_message(spam);

        let mut own = message("hi");
        own.user_id = BOT_ID.to_string();
        dispatcher.dispatch_message(own);

        dispatcher.dispatch_message(message("hi"));
        dispatcher.drain().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        ctx.pool().stop();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_denied_sender_gets_reply_and_handler_skipped() {
        let (ctx, client) = test_context();
        let hits = counter();
        let h = Arc::clone(&hits);
        let listeners = PluginListeners::new().with(
            listen_to("^admin$")
                .allowed_users(["root"])
                .threaded(move |_, _, _| {
                    h.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        );
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        dispatcher.dispatch_message(message("admin"));
        dispatcher.drain().await;
        ctx.pool().stop();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(client.replies(), vec![PERMISSION_DENIED]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_and_sibling_listeners_each_fire() {
        let (ctx, _client) = test_context();
        let hits = counter();
        let (a, b) = (Arc::clone(&hits), Arc::clone(&hits));
        let listeners = PluginListeners::new()
            .with(listen_to("^go").threaded(move |_, _, _| {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .with(listen_to("^go").or(listen_to("^go now")).threaded(move |_, _, _| {
                b.fetch_add(10, Ordering::SeqCst);
                Ok(())
            }));
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        dispatcher.dispatch_message(message("go now"));
        dispatcher.drain().await;
        ctx.pool().stop();

        assert_eq!(hits.load(Ordering::SeqCst), 21);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_threaded_handler_runs_on_worker_with_groups() {
        let (ctx, client) = test_context();
        let listeners = PluginListeners::new().with(listen_to(r"^echo (.+)$").threaded(
            |ctx, msg, groups| {
                let thread = std::thread::current().name().unwrap_or("").to_string();
                assert!(thread.starts_with("parley-worker-"));
                ctx.reply_blocking(&msg, &groups.join(","))?;
                Ok(())
            },
        ));
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        dispatcher.dispatch_message(message("echo hello"));
        let calls = client.wait_for_calls(1).await;
        ctx.pool().stop();

        assert_eq!(
            calls,
            vec![Call::Reply {
                post_id: "post-1".to_string(),
                text: "hello".to_string()
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failing_handler_does_not_affect_siblings() {
        let (ctx, _client) = test_context();
        let hits = counter();
        let h = Arc::clone(&hits);
        let listeners = PluginListeners::new()
            .with(listen_to("x").inline(|_, _, _| async { Err("boom".into()) }))
            .with(listen_to("x").inline(|_, _, _| async { panic!("handler panicked") }))
            .with(listen_to("x").inline(move |_, _, _| {
                h.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }));
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        dispatcher.dispatch_message(message("x"));
        dispatcher.dispatch_message(message("x"));
        dispatcher.drain().await;
        ctx.pool().stop();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_webhook_dispatch_ignores_gates_and_ignore_list() {
        let (ctx, client) = test_context();
        let listeners = PluginListeners::new().with(listen_webhook("ping").inline(
            |ctx, event, _| async move {
                let text = event.context_str("text").unwrap_or_default().to_string();
                ctx.create_post("hooks", &text).await?;
                Ok(())
            },
        ));
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        dispatcher.dispatch_webhook(WebhookEvent::new("ping", json!({ "context": { "text": "hi" } })));
        dispatcher.dispatch_webhook(WebhookEvent::new("other", json!({})));
        dispatcher.drain().await;
        ctx.pool().stop();

        assert_eq!(
            client.calls(),
            vec![Call::Post {
                channel_id: "hooks".to_string(),
                text: "hi".to_string()
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_loop_consumes_both_queues_until_shutdown() {
        let (ctx, client) = test_context();
        let listeners = PluginListeners::new()
            .with(listen_to("^ping$").inline(|ctx, msg, _| async move {
                ctx.reply(&msg, "pong").await?;
                Ok(())
            }))
            .with(listen_webhook("ping").inline(|ctx, _, _| async move {
                ctx.create_post("hooks", "webhook").await?;
                Ok(())
            }));
        let dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (hooks_tx, hooks_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(events_rx, hooks_rx, shutdown.clone()));

        let raw = json!({
            "event": "posted",
            "data": {
                "channel_type": "D",
                "sender_name": "@alice",
                "post": json!({ "id": "p1", "user_id": "u1", "channel_id": "c1", "message": "ping" }).to_string(),
            }
        });
        events_tx.send(raw.to_string()).unwrap();
        events_tx.send("garbage".to_string()).unwrap();
        hooks_tx.send(WebhookEvent::new("ping", json!({}))).unwrap();

        let calls = client.wait_for_calls(2).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        ctx.pool().stop();

        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&Call::Reply {
            post_id: "p1".to_string(),
            text: "pong".to_string()
        }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_aborts_inline_listener_after_grace() {
        let (ctx, client) = test_context();
        let finished = counter();
        let f = Arc::clone(&finished);
        let listeners = PluginListeners::new()
            .with(listen_to("^sleep$").inline(move |_, _, _| {
                let f = Arc::clone(&f);
                async move {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
            .with(listen_to("^sleep$").inline(|ctx, msg, _| async move {
                ctx.reply(&msg, "going to sleep").await?;
                Ok(())
            }));
        let settings = DispatchSettings {
            shutdown_grace: Duration::from_millis(100),
            ..DispatchSettings::default()
        };
        let dispatcher = dispatcher_with(ctx.clone(), listeners, settings);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (_hooks_tx, hooks_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(events_rx, hooks_rx, shutdown.clone()));

        let raw = json!({
            "event": "posted",
            "data": {
                "channel_type": "D",
                "sender_name": "@alice",
                "post": json!({ "id": "p1", "user_id": "u1", "channel_id": "c1", "message": "sleep" }).to_string(),
            }
        });
        events_tx.send(raw.to_string()).unwrap();
        client.wait_for_calls(1).await;

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("dispatcher stops within the grace period")
            .unwrap();
        ctx.pool().stop();

        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(client.replies(), vec!["going to sleep"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_waits_for_short_inline_listener() {
        let (ctx, client) = test_context();
        let listeners = PluginListeners::new().with(listen_to("^nap$").inline(
            |ctx, msg, _| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ctx.reply(&msg, "rested").await?;
                Ok(())
            },
        ));
        let mut dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());
        dispatcher.dispatch_message(message("nap"));
        assert_eq!(dispatcher.inline_task_count(), 1);

        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let (_hooks_tx, hooks_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.run(events_rx, hooks_rx, shutdown),
        )
        .await
        .unwrap();
        ctx.pool().stop();

        assert_eq!(client.replies(), vec!["rested"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_busy_event_queue_does_not_starve_webhooks() {
        const BACKLOG: usize = 20_000;

        let (ctx, _client) = test_context();
        let ticks = counter();
        let t = Arc::clone(&ticks);
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let listeners = PluginListeners::new()
            .with(listen_to("^tick$").inline(move |_, _, _| {
                t.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }))
            .with(listen_webhook("^stop$").inline(move |_, _, _| {
                stop.cancel();
                async { Ok(()) }
            }));
        let dispatcher = dispatcher_with(ctx.clone(), listeners, DispatchSettings::default());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (hooks_tx, hooks_rx) = mpsc::unbounded_channel();
        let raw = json!({
            "event": "posted",
            "data": {
                "channel_type": "D",
                "sender_name": "@alice",
                "post": json!({ "id": "p1", "user_id": "u1", "channel_id": "c1", "message": "tick" }).to_string(),
            }
        })
        .to_string();
        for _ in 0..BACKLOG {
            events_tx.send(raw.clone()).unwrap();
        }
        hooks_tx.send(WebhookEvent::new("stop", json!({}))).unwrap();

        tokio::time::timeout(
            Duration::from_secs(10),
            dispatcher.run(events_rx, hooks_rx, shutdown),
        )
        .await
        .unwrap();
        ctx.pool().stop();

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen < BACKLOG, "webhook waited behind the whole backlog");
    }
}
