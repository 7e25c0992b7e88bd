//! Event types for the Parley framework.
//!
//! Two kinds of events reach the dispatcher:
//!
//! - [`ChatMessage`] - a message posted on the chat platform, normalized from
//!   the transport's raw websocket envelope by [`ChatMessage::from_raw`]
//! - [`WebhookEvent`] - a JSON body POSTed to the webhook gateway
//!
//! Both are immutable once built and are shared with handlers behind an `Arc`.
//!
//! # Raw envelope
//!
//! The transport delivers `posted` events shaped like this, where `post` and
//! `mentions` are themselves JSON documents encoded as strings:
//!
//! ```text
//! {
//!   "event": "posted",
//!   "data": {
//!     "channel_type": "D",
//!     "channel_name": "bot__user",
//!     "sender_name": "@alice",
//!     "team_id": "t1",
//!     "mentions": "[\"bot-id\"]",
//!     "post": "{\"id\":\"p1\",\"user_id\":\"u1\",\"channel_id\":\"c1\",\"message\":\"ping\"}"
//!   }
//! }
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{NormalizeError, NormalizeResult};

/// The only transport action that carries a chat message.
const POSTED_ACTION: &str = "posted";

/// Channel type marker for direct (one-to-one) channels.
const DIRECT_CHANNEL_TYPE: &str = "D";

// ============================================================================
// ChatMessage
// ============================================================================

/// A chat message after normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Platform identifier of the post.
    pub id: String,
    /// Identifier of the sending user.
    pub user_id: String,
    /// Sender's username, without a leading `@`.
    pub sender_name: String,
    /// Message text, trimmed.
    pub text: String,
    /// Channel the message was posted in.
    pub channel_id: String,
    /// Channel name, when the transport provides one.
    pub channel_name: String,
    /// Whether the message was posted in a direct channel.
    pub is_direct: bool,
    /// User identifiers mentioned in the message.
    pub mentions: HashSet<String>,
    /// Root post of the thread, or empty for a top-level post.
    pub root_id: String,
    /// Parent post, or empty.
    pub parent_id: String,
    /// Team the channel belongs to.
    pub team_id: String,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    event: String,
    #[serde(default)]
    data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    user_id: String,
    channel_id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    root_id: String,
    #[serde(default)]
    parent_id: String,
}

impl ChatMessage {
    /// Normalizes a raw transport event.
    ///
    /// Returns `Ok(None)` for actions other than `posted`, which the
    /// dispatcher ignores. Malformed `posted` payloads produce an error.
    pub fn from_raw(raw: &str) -> NormalizeResult<Option<Self>> {
        let envelope: RawEnvelope =
            serde_json::from_str(raw).map_err(|e| NormalizeError::json("event", e))?;

        if envelope.event != POSTED_ACTION {
            return Ok(None);
        }

        Self::from_posted_data(&envelope.data).map(Some)
    }

    /// Builds a message from the `data` object of a `posted` event.
    pub fn from_posted_data(data: &Map<String, Value>) -> NormalizeResult<Self> {
        let post = embedded_field(data, "post", "data.post")?
            .ok_or(NormalizeError::MissingField("data.post"))?;
        let post: RawPost =
            serde_json::from_value(post).map_err(|e| NormalizeError::json("data.post", e))?;

        let mentions = match embedded_field(data, "mentions", "data.mentions")? {
            Some(value) => serde_json::from_value::<Vec<String>>(value)
                .map_err(|e| NormalizeError::json("data.mentions", e))?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };

        Ok(Self {
            id: post.id,
            user_id: post.user_id,
            sender_name: string_field(data, "sender_name")
                .trim()
                .trim_matches('@')
                .to_string(),
            text: post.message.trim().to_string(),
            channel_id: post.channel_id,
            channel_name: string_field(data, "channel_name").to_string(),
            is_direct: string_field(data, "channel_type") == DIRECT_CHANNEL_TYPE,
            mentions,
            root_id: post.root_id,
            parent_id: post.parent_id,
            team_id: string_field(data, "team_id").trim().to_string(),
        })
    }

    /// Returns a copy of this message with different text.
    ///
    /// Used by the dispatcher to strip a leading self-mention before the
    /// message is shared with handlers.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// The post a reply should be threaded under.
    pub fn reply_id(&self) -> &str {
        if self.root_id.is_empty() {
            &self.id
        } else {
            &self.root_id
        }
    }

    /// Whether the given user id is mentioned in this message.
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.contains(user_id)
    }
}

/// Reads a nested field that may arrive as a JSON-encoded string.
///
/// Absent, `null` and blank-string values all read as `None`.
fn embedded_field(
    data: &Map<String, Value>,
    key: &str,
    field: &'static str,
) -> NormalizeResult<Option<Value>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| NormalizeError::json(field, e)),
        Some(other) => Ok(Some(other.clone())),
    }
}

fn string_field<'a>(data: &'a Map<String, Value>, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

// ============================================================================
// WebhookEvent
// ============================================================================

/// A webhook callback received by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Path segment the callback was posted to (`/hooks/{webhook_id}`).
    pub webhook_id: String,
    /// The `context` object of the body, or empty when absent.
    pub context: Map<String, Value>,
    /// The full JSON body.
    pub body: Value,
}

impl WebhookEvent {
    /// Wraps a parsed JSON body.
    pub fn new(webhook_id: impl Into<String>, body: Value) -> Self {
        let context = body
            .get("context")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            webhook_id: webhook_id.into(),
            context,
            body,
        }
    }

    /// Looks up a string value in the context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

// ============================================================================
// NormalizedEvent
// ============================================================================

/// Either kind of event accepted by the dispatcher.
#[derive(Debug, Clone)]
pub enum NormalizedEvent {
    /// A chat message.
    Message(Arc<ChatMessage>),
    /// A webhook callback.
    Webhook(Arc<WebhookEvent>),
}

impl NormalizedEvent {
    /// Short name used in logs and spans.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Webhook(_) => "webhook",
        }
    }
}

impl From<ChatMessage> for NormalizedEvent {
    fn from(message: ChatMessage) -> Self {
        Self::Message(Arc::new(message))
    }
}

impl From<WebhookEvent> for NormalizedEvent {
    fn from(event: WebhookEvent) -> Self {
        Self::Webhook(Arc::new(event))
    }
}
