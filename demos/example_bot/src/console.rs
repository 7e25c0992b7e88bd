//! A [`ChatClient`] that chats over stdin and stdout.
//!
//! Each stdin line becomes a `posted` event from the console user. Mention
//! the bot with `@parley` to trigger listeners that need a mention.

use std::sync::atomic::{AtomicU64, Ordering};

use parley::prelude::*;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Who is typing into the console, and where.
#[derive(Debug, Clone)]
pub struct ConsoleSession {
    pub user: String,
    pub channel: String,
    pub direct: bool,
}

/// Prints every post and reaction.
#[derive(Debug)]
pub struct ConsoleClient {
    identity: BotIdentity,
    next_post: AtomicU64,
}

impl ConsoleClient {
    pub fn new(username: &str) -> Self {
        Self {
            identity: BotIdentity::new(format!("{username}-id"), username),
            next_post: AtomicU64::new(1),
        }
    }

    fn next_post_id(&self) -> String {
        format!("post-{}", self.next_post.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a console line in the platform's `posted` envelope.
    pub fn posted_event(&self, session: &ConsoleSession, line: &str) -> String {
        let mentions: Vec<&str> = if line.contains(&format!("@{}", self.identity.username)) {
            vec![self.identity.user_id.as_str()]
        } else {
            Vec::new()
        };

        let post = json!({
            "id": self.next_post_id(),
            "user_id": format!("{}-id", session.user),
            "channel_id": session.channel,
            "message": line,
        });

        json!({
            "event": "posted",
            "data": {
                "channel_type": if session.direct { "D" } else { "O" },
                "channel_name": session.channel,
                "sender_name": format!("@{}", session.user),
                "team_id": "console",
                "post": post.to_string(),
                "mentions": mentions,
            }
        })
        .to_string()
    }
}

#[async_trait]
impl ChatClient for ConsoleClient {
    fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    async fn create_post(&self, channel_id: &str, message: &str) -> ClientResult<String> {
        println!("[{channel_id}] {}: {message}", self.identity.username);
        Ok(self.next_post_id())
    }

    async fn reply(&self, message: &ChatMessage, text: &str) -> ClientResult<String> {
        println!(
            "[{} > {}] {}: {text}",
            message.channel_id,
            message.reply_id(),
            self.identity.username
        );
        Ok(self.next_post_id())
    }

    async fn react(&self, message: &ChatMessage, emoji_name: &str) -> ClientResult<()> {
        println!("[{}] :{emoji_name}: on {}", message.channel_id, message.id);
        Ok(())
    }

    async fn get_user_info(&self, user_id: &str) -> ClientResult<Value> {
        let username = user_id.trim_end_matches("-id");
        Ok(json!({
            "id": user_id,
            "username": username,
            "email": format!("{username}@localhost"),
        }))
    }
}

/// Forwards stdin lines to the bot until stdin closes.
pub async fn forward_stdin(
    client: Arc<ConsoleClient>,
    session: ConsoleSession,
    events: UnboundedSender<String>,
) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                debug!(%line, "Console input");
                if events.send(client.posted_event(&session, &line)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Console closed");
                break;
            }
            Err(e) => {
                info!(error = %e, "Failed to read console input");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(direct: bool) -> ConsoleSession {
        ConsoleSession {
            user: "admin".to_string(),
            channel: "town-square".to_string(),
            direct,
        }
    }

    #[test]
    fn test_posted_event_normalizes() {
        let client = ConsoleClient::new("parley");
        let raw = client.posted_event(&session(false), "@parley ping");
        let message = ChatMessage::from_raw(&raw).unwrap().unwrap();

        assert_eq!(message.text, "@parley ping");
        assert_eq!(message.sender_name, "admin");
        assert_eq!(message.user_id, "admin-id");
        assert_eq!(message.channel_id, "town-square");
        assert!(!message.is_direct);
        assert!(message.mentions_user("parley-id"));
    }

    #[test]
    fn test_posted_event_direct_without_mention() {
        let client = ConsoleClient::new("parley");
        let first = client.posted_event(&session(true), "admin");
        let second = client.posted_event(&session(true), "admin");

        let first = ChatMessage::from_raw(&first).unwrap().unwrap();
        let second = ChatMessage::from_raw(&second).unwrap().unwrap();
        assert!(first.is_direct);
        assert!(first.mentions.is_empty());
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_user_info_has_email() {
        let client = ConsoleClient::new("parley");
        let info = client.get_user_info("admin-id").await.unwrap();
        assert_eq!(info["email"], "admin@localhost");
    }
}
