//! Configuration validation utilities.

use std::str::FromStr;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, ParleyConfig, WebhookConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &ParleyConfig) -> ConfigResult<()> {
    if config.worker_pool.num_workers == 0 {
        return Err(ConfigError::validation(
            "worker_pool.num_workers must be greater than 0",
        ));
    }

    if config.scheduler.period_ms == 0 {
        return Err(ConfigError::validation(
            "scheduler.period_ms must be greater than 0",
        ));
    }

    validate_webhook_config(&config.webhook)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates the webhook gateway settings. Only checked when enabled.
fn validate_webhook_config(webhook: &WebhookConfig) -> ConfigResult<()> {
    if !webhook.enabled {
        return Ok(());
    }

    if webhook.port == 0 {
        return Err(ConfigError::InvalidPort(webhook.port));
    }

    if webhook.host.trim().is_empty() {
        return Err(ConfigError::validation("webhook.host must not be empty"));
    }

    Ok(())
}

/// Validates the global level, per-module filters and file output.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    validate_level("logging.level", &logging.level)?;

    for (module, level) in &logging.filters {
        if module.trim().is_empty() {
            return Err(ConfigError::validation(
                "logging.filters keys must name a module",
            ));
        }
        validate_level(&format!("logging.filters.{module}"), level)?;
    }

    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    Ok(())
}

fn validate_level(field: &str, level: &str) -> ConfigResult<()> {
    tracing::Level::from_str(level)
        .map(|_| ())
        .map_err(|_| ConfigError::invalid_log_level(field, level))
}
