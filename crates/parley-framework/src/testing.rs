//! Test doubles shared by the framework's unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::context::BotContext;
use parley_core::{
    BotIdentity, ChatClient, ChatMessage, ClientResult, Scheduler, WorkerPool,
};

pub(crate) const BOT_ID: &str = "bot-id";
pub(crate) const BOT_NAME: &str = "parley";

/// A call made against [`RecordingClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Post { channel_id: String, text: String },
    Reply { post_id: String, text: String },
    React { post_id: String, emoji: String },
}

/// A client that records every call instead of talking to a server.
pub(crate) struct RecordingClient {
    identity: BotIdentity,
    calls: Mutex<Vec<Call>>,
}

impl RecordingClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            identity: BotIdentity::new(BOT_ID, BOT_NAME),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub(crate) fn replies(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Reply { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Polls until `count` calls were recorded or the timeout expires.
    pub(crate) async fn wait_for_calls(&self, count: usize) -> Vec<Call> {
        for _ in 0..200 {
            if self.calls.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.calls()
    }
}

#[async_trait]
impl ChatClient for RecordingClient {
    fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    async fn create_post(&self, channel_id: &str, message: &str) -> ClientResult<String> {
        let mut calls = self.calls.lock();
        calls.push(Call::Post {
            channel_id: channel_id.to_string(),
            text: message.to_string(),
        });
        Ok(format!("post-{}", calls.len()))
    }

    async fn reply(&self, message: &ChatMessage, text: &str) -> ClientResult<String> {
        let mut calls = self.calls.lock();
        calls.push(Call::Reply {
            post_id: message.reply_id().to_string(),
            text: text.to_string(),
        });
        Ok(format!("post-{}", calls.len()))
    }

    async fn react(&self, message: &ChatMessage, emoji_name: &str) -> ClientResult<()> {
        self.calls.lock().push(Call::React {
            post_id: message.id.clone(),
            emoji: emoji_name.to_string(),
        });
        Ok(())
    }

    async fn get_user_info(&self, user_id: &str) -> ClientResult<Value> {
        Ok(json!({ "id": user_id, "username": format!("user-{user_id}") }))
    }
}

/// A started two-worker context around a fresh [`RecordingClient`].
///
/// Must be called inside a Tokio runtime. Stop the pool at the end of the test.
pub(crate) fn test_context() -> (Arc<BotContext>, Arc<RecordingClient>) {
    let client = RecordingClient::new();
    let pool = Arc::new(WorkerPool::new(2));
    pool.start().expect("pool starts");
    let ctx = BotContext::with_current_runtime(client.clone(), pool, Scheduler::new());
    (Arc::new(ctx), client)
}

/// A posted message from `alice` in a public channel.
pub(crate) fn message(text: &str) -> ChatMessage {
    ChatMessage {
        id: "post-1".to_string(),
        user_id: "user-alice".to_string(),
        sender_name: "alice".to_string(),
        text: text.to_string(),
        channel_id: "town-square".to_string(),
        ..Default::default()
    }
}
