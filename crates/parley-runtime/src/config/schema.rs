//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// Message filtering.
    #[serde(default)]
    pub bot: BotSettings,

    /// Worker pool sizing.
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,

    /// Scheduler tick.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Webhook gateway.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which incoming messages the bot ignores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotSettings {
    /// Usernames whose messages are ignored (case-insensitive).
    #[serde(default)]
    pub ignore_users: Vec<String>,

    /// Ignore messages posted by the bot itself.
    #[serde(default = "default_true")]
    pub ignore_own_messages: bool,

    /// Milliseconds shutdown waits for running inline listeners before
    /// aborting them.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl BotSettings {
    /// The shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            ignore_users: Vec::new(),
            ignore_own_messages: true,
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    ///
    /// The scheduler tick occupies one of them for the lifetime of the bot.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
        }
    }
}

fn default_num_workers() -> usize {
    10
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Milliseconds between scheduler ticks.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

impl SchedulerConfig {
    /// The tick period.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
        }
    }
}

fn default_period_ms() -> u64 {
    1000
}

/// Webhook gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Start the gateway.
    #[serde(default)]
    pub enabled: bool,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl WebhookConfig {
    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5001
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Output destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Per-module levels, e.g. `parley_core = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,

    /// Which span lifecycle events are logged.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Log file rotation for [`LogOutput::File`].
    #[serde(default)]
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            filters: BTreeMap::new(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line with all fields.
    Full,
    /// Multi-line, for development.
    Pretty,
    /// Newline-delimited JSON.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log output destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// The file at `logging.file_path`.
    File,
}

/// Log file rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// A single file.
    #[default]
    Never,
    /// A new file every hour.
    Hourly,
    /// A new file every day.
    Daily,
}

/// Span lifecycle events to log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}
