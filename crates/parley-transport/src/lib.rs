//! # Parley Transport
//!
//! Inbound network plumbing for Parley bots.
//!
//! The chat platform's own connection (websocket or otherwise) lives outside
//! the framework; it pushes raw event payloads into the bot. This crate
//! provides the HTTP side: the [`WebhookGateway`], an axum server that
//! accepts webhook callbacks and queues them for the dispatcher.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  parley-runtime     │  (starts the gateway when enabled)
//! ├─────────────────────┤
//! │  parley-transport   │  <- This crate
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parley_transport::WebhookGateway;
//!
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let handle = WebhookGateway::new(tx).bind("127.0.0.1:5001").await?.spawn();
//!
//! // hand `rx` to the dispatcher, then later:
//! handle.shutdown().await?;
//! ```

pub mod error;
pub mod webhook;

pub use error::{GatewayError, GatewayResult};
pub use webhook::{BoundGateway, GatewayHandle, WebhookGateway};
