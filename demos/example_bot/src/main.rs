//! Example Bot
//!
//! Runs the demo plugins against a console client: type messages on stdin,
//! replies are printed on stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package example-bot -- --user admin --direct
//! > @parley ping
//! > help
//! > @parley add 1 2 3 --hex
//! ```
//!
//! Set `webhook.enabled = true` in `parley.toml` (or
//! `PARLEY_WEBHOOK__ENABLED=true`) to try the webhook listeners.

mod console;
mod plugins;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use parley::prelude::*;
use parley::runtime::config::load_config_from_file;
use tracing::info;

use console::{ConsoleClient, ConsoleSession};
use plugins::{ExamplePlugin, WebhookExample};

#[derive(Debug, Parser)]
#[command(version, about = "Chat with the Parley demo bot from the terminal")]
struct Args {
    /// Config file; defaults to parley.toml in the working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Username the console speaks as.
    #[arg(short, long, default_value = "admin")]
    user: String,

    /// Channel the console speaks in.
    #[arg(long, default_value = "town-square")]
    channel: String,

    /// Treat the console as a direct message channel.
    #[arg(long)]
    direct: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };
    let gateway_url = format!("http://{}", config.webhook.bind_addr());

    let client = Arc::new(ConsoleClient::new("parley"));
    let bot = ParleyBot::builder()
        .config(config)
        .client_arc(client.clone())
        .plugin(ExamplePlugin)
        .plugin(WebhookExample::new(gateway_url))
        .build()?;

    let events = bot
        .event_sender()
        .context("bot event sender already taken")?;
    let session = ConsoleSession {
        user: args.user,
        channel: args.channel,
        direct: args.direct,
    };
    tokio::spawn(console::forward_stdin(client, session, events));

    info!("Type a message, or `help` for the list of commands");
    bot.run().await?;
    Ok(())
}
