//! Examples of webhook listeners.
//!
//! With `webhook.enabled = true` the gateway accepts callbacks such as:
//!
//! ```bash
//! curl -X POST http://127.0.0.1:5001/hooks/ping \
//!      -d '{"context": {"channel_id": "town-square"}}'
//! ```

use parley::prelude::*;
use tracing::warn;

/// Webhook id the `!button` instructions point at.
pub const DEMO_WEBHOOK_ID: &str = "demo";

/// Answers webhook callbacks and explains how to send them.
#[derive(Debug)]
pub struct WebhookExample {
    gateway_url: String,
}

impl WebhookExample {
    /// `gateway_url` is where the webhook gateway is reachable, e.g.
    /// `http://127.0.0.1:5001`.
    pub fn new(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
        }
    }

    fn instructions(&self, channel_id: &str) -> String {
        format!(
            "Take your pick..\n\
             Ping: curl -X POST {url}/hooks/ping -d '{{\"context\": {{\"channel_id\": \"{channel_id}\"}}}}'\n\
             Send a webhook: curl -X POST {url}/hooks/{DEMO_WEBHOOK_ID} \
             -d '{{\"context\": {{\"channel_id\": \"{channel_id}\", \"text\": \"The webhook works! :tada:\"}}}}'",
            url = self.gateway_url,
        )
    }
}

#[async_trait]
impl Plugin for WebhookExample {
    fn listeners(self: Arc<Self>) -> PluginListeners {
        PluginListeners::new()
            .with(
                listen_to("!button")
                    .description("Shows how to trigger the webhook listeners.")
                    .inline(move |ctx, msg, _| {
                        let text = self.instructions(&msg.channel_id);
                        async move {
                            ctx.reply(&msg, &text).await?;
                            Ok(())
                        }
                    }),
            )
            .with(listen_webhook("^ping$").inline(|ctx, event, _| async move {
                match event.context_str("channel_id") {
                    Some(channel_id) => {
                        ctx.create_post(channel_id, "pong").await?;
                    }
                    None => warn!(webhook_id = %event.webhook_id, "Webhook has no channel_id"),
                }
                Ok(())
            }))
            .with(
                listen_webhook(format!("^{DEMO_WEBHOOK_ID}$")).inline(|ctx, event, _| async move {
                    let (Some(channel_id), Some(text)) =
                        (event.context_str("channel_id"), event.context_str("text"))
                    else {
                        warn!(webhook_id = %event.webhook_id, "Webhook needs channel_id and text");
                        return Ok(());
                    };
                    ctx.create_post(channel_id, text).await?;
                    Ok(())
                }),
            )
    }
}
