//! Semantic checks the schema alone cannot express.

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    BackoffConfig, BotConfig, GramlineConfig, LogOutput, LoggingConfig, PollingConfig,
};

/// Checks a loaded configuration before a client is built from it.
pub fn validate_config(config: &GramlineConfig) -> ConfigResult<()> {
    check_bot(&config.bot)?;
    check_polling(&config.polling)?;
    check_logging(&config.logging)?;

    // The long poll must end before the request times out.
    let poll_ms = u64::from(config.polling.timeout_secs) * 1000;
    if config.bot.timeout_ms <= poll_ms {
        return Err(ConfigError::invalid(
            "bot.timeout_ms",
            format!(
                "{} ms does not exceed the long-poll timeout of {} s",
                config.bot.timeout_ms, config.polling.timeout_secs
            ),
        ));
    }

    Ok(())
}

fn check_bot(bot: &BotConfig) -> ConfigResult<()> {
    if bot.token.trim().is_empty() {
        return Err(ConfigError::missing("bot.token"));
    }
    if !bot.token.contains(':') {
        return Err(ConfigError::invalid("bot.token", "expected <id>:<secret>"));
    }

    check_http_url("bot.api_base", &bot.api_base)?;
    if let Some(proxy) = &bot.proxy
        && proxy.trim().is_empty()
    {
        return Err(ConfigError::bad_url("bot.proxy", proxy, "empty"));
    }

    if bot.timeout_ms == 0 {
        return Err(ConfigError::invalid("bot.timeout_ms", "must be positive"));
    }
    if bot.media_timeout_ms == 0 {
        return Err(ConfigError::invalid("bot.media_timeout_ms", "must be positive"));
    }
    Ok(())
}

fn check_polling(polling: &PollingConfig) -> ConfigResult<()> {
    if !(1..=100).contains(&polling.limit) {
        return Err(ConfigError::invalid(
            "polling.limit",
            format!("{} is outside 1..=100", polling.limit),
        ));
    }
    check_backoff(&polling.backoff)
}

fn check_backoff(backoff: &BackoffConfig) -> ConfigResult<()> {
    if backoff.initial_delay_ms == 0 {
        return Err(ConfigError::invalid(
            "polling.backoff.initial_delay_ms",
            "must be positive",
        ));
    }
    if backoff.max_delay_ms < backoff.initial_delay_ms {
        return Err(ConfigError::invalid(
            "polling.backoff.max_delay_ms",
            "is below initial_delay_ms",
        ));
    }
    if backoff.multiplier < 1.0 {
        return Err(ConfigError::invalid(
            "polling.backoff.multiplier",
            "must be at least 1.0",
        ));
    }
    if !(0.0..=1.0).contains(&backoff.jitter) {
        return Err(ConfigError::invalid(
            "polling.backoff.jitter",
            "must be within 0.0..=1.0",
        ));
    }
    Ok(())
}

fn check_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing("logging.file_path"));
    }
    Ok(())
}

fn check_http_url(field: &'static str, url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::bad_url(field, url, "empty"));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::bad_url(field, url, "scheme must be http or https"));
    }
    Ok(())
}
