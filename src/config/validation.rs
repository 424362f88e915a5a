//! Configuration validation logic

use super::{
    ConfigError, MAX_STT_TIMEOUT_SECONDS, MIN_STT_TIMEOUT_SECONDS, ServerConfig,
    is_valid_stt_timeout,
};

/// Validate a merged configuration
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_host(&config.host)?;
    validate_stt_timeout(config.stt_timeout_seconds)?;
    validate_shutdown_timeout(config.shutdown_timeout_seconds)?;
    validate_rate_limit(config.rate_limit_requests_per_second, config.rate_limit_burst_size)?;
    Ok(())
}

fn validate_host(host: &str) -> Result<(), ConfigError> {
    if host.trim().is_empty() {
        return Err(ConfigError::Invalid("host must not be empty".to_string()));
    }
    Ok(())
}

fn validate_stt_timeout(seconds: f64) -> Result<(), ConfigError> {
    if !is_valid_stt_timeout(seconds) {
        return Err(ConfigError::Invalid(format!(
            "stt_timeout_seconds must be between {MIN_STT_TIMEOUT_SECONDS} and {MAX_STT_TIMEOUT_SECONDS}, got {seconds}"
        )));
    }
    Ok(())
}

fn validate_shutdown_timeout(seconds: f64) -> Result<(), ConfigError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "shutdown_timeout_seconds must be a positive number, got {seconds}"
        )));
    }
    Ok(())
}

fn validate_rate_limit(rps: u32, burst: u32) -> Result<(), ConfigError> {
    if rps == 0 || burst == 0 {
        return Err(ConfigError::Invalid(
            "rate limit values must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
