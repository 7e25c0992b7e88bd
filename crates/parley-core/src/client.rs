//! Chat client trait and related types.
//!
//! This module defines the [`ChatClient`] trait, the boundary between the
//! dispatch engine and the chat platform. The platform transport (login,
//! REST calls, websocket) lives behind this trait and is not part of Parley.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ClientResult;
use crate::event::ChatMessage;

/// Who the bot is on the chat platform, as learned at login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotIdentity {
    /// Platform user id of the bot account.
    pub user_id: String,
    /// Username of the bot account, without a leading `@`.
    pub username: String,
}

impl BotIdentity {
    /// Creates a new identity.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// The opaque chat platform client.
///
/// Implementations must be cheap to share: the dispatcher hands the same
/// `Arc<dyn ChatClient>` to every handler, on the cooperative loop and on
/// worker threads alike.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct MyClient { identity: BotIdentity, http: reqwest::Client }
///
/// #[async_trait]
/// impl ChatClient for MyClient {
///     fn identity(&self) -> &BotIdentity { &self.identity }
///
///     async fn create_post(&self, channel_id: &str, message: &str) -> ClientResult<String> {
///         // POST /api/v4/posts ...
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait ChatClient: Send + Sync + 'static {
    /// Returns the bot's identity.
    fn identity(&self) -> &BotIdentity;

    /// Creates a new post in a channel and returns its id.
    async fn create_post(&self, channel_id: &str, message: &str) -> ClientResult<String>;

    /// Replies to a message, in its thread, and returns the new post id.
    ///
    /// The default implementation posts into the message's channel; platform
    /// clients should override it to attach the post to
    /// [`ChatMessage::reply_id`].
    async fn reply(&self, message: &ChatMessage, text: &str) -> ClientResult<String> {
        self.create_post(&message.channel_id, text).await
    }

    /// Adds an emoji reaction to a message.
    async fn react(&self, message: &ChatMessage, emoji_name: &str) -> ClientResult<()>;

    /// Fetches a user's profile.
    async fn get_user_info(&self, user_id: &str) -> ClientResult<Value>;
}

/// A shared ChatClient trait object.
pub type BoxedClient = Arc<dyn ChatClient>;
