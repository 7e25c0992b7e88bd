//! # Parley Core
//!
//! The dispatch and concurrency engine of the Parley chat-bot framework.
//!
//! This crate holds everything that coordinates work across threads:
//!
//! - **Events**: [`ChatMessage`] normalized from the chat transport and
//!   [`WebhookEvent`] received by the webhook gateway
//! - **Client boundary**: the [`ChatClient`] trait handlers use to talk back
//! - **Worker pool**: [`WorkerPool`], a bounded set of OS threads for blocking
//!   handlers and long-running loops
//! - **Scheduler**: [`Scheduler`], isolated one-time jobs and inline recurring
//!   jobs with cooperative cancellation
//!
//! Listener matching and the dispatcher live in `parley-framework`.
//!
//! ## Threads at a glance
//!
//! ```text
//! ┌───────────────┐  submit   ┌──────────────┐
//! │  Dispatcher   │──────────▶│  WorkerPool  │── worker 0..N
//! │ (tokio task)  │           └──────┬───────┘
//! └───────────────┘                  │ periodic task
//!                                    ▼
//!                             ┌──────────────┐  spawn   ┌──────────────────┐
//!                             │  Scheduler   │─────────▶│ executor/watcher │
//!                             └──────────────┘          └──────────────────┘
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod pool;
pub mod scheduler;

pub use client::{BotIdentity, BoxedClient, ChatClient};
pub use error::{
    BoxError, ClientError, ClientResult, JobError, NormalizeError, NormalizeResult, PoolError,
    PoolResult,
};
pub use event::{ChatMessage, NormalizedEvent, WebhookEvent};
pub use pool::{IntoTaskResult, TaskFn, WorkerPool};
pub use scheduler::{
    IntoJobOutcome, JobHandle, JobOutcome, JobResult, JobState, OnceAction, Scheduler,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::client::{BotIdentity, ChatClient};
    pub use super::error::{BoxError, ClientError, ClientResult};
    pub use super::event::{ChatMessage, NormalizedEvent, WebhookEvent};
    pub use super::pool::WorkerPool;
    pub use super::scheduler::{JobHandle, JobOutcome, Scheduler};
}
