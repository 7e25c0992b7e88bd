//! Configuration module for the Parley runtime.
//!
//! Settings are layered with figment (defaults, TOML or YAML files,
//! `PARLEY_*` environment variables, programmatic overrides) and checked by
//! [`validate_config`] before a bot is built.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotSettings, LogFormat, LogOutput, LogRotation, LoggingConfig, ParleyConfig, SchedulerConfig,
    SpanEventConfig, WebhookConfig, WorkerPoolConfig,
};
pub use validation::validate_config;
