//! Environment variable loading

use std::str::FromStr;

use super::{ConfigError, ServerConfig};

/// Read an environment variable, treating blank values as unset
pub(super) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an environment variable, falling back to `default` when unset
pub(super) fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::InvalidEnv {
            var: name.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

/// Build a configuration from environment variables on top of defaults
pub(super) fn load_from_env() -> Result<ServerConfig, ConfigError> {
    let defaults = ServerConfig::default();

    Ok(ServerConfig {
        host: env_var("HOST").unwrap_or(defaults.host),
        port: parse_env("PORT", defaults.port)?,

        deepgram_api_key: env_var("DEEPGRAM_API_KEY"),
        cartesia_api_key: env_var("CARTESIA_API_KEY"),
        assemblyai_api_key: env_var("ASSEMBLYAI_API_KEY"),
        elevenlabs_api_key: env_var("ELEVENLABS_API_KEY"),
        openai_api_key: env_var("OPENAI_API_KEY"),
        groq_api_key: env_var("GROQ_API_KEY"),
        anthropic_api_key: env_var("ANTHROPIC_API_KEY"),
        gemini_api_key: env_var("GEMINI_API_KEY"),
        cerebras_api_key: env_var("CEREBRAS_API_KEY"),
        openrouter_api_key: env_var("OPENROUTER_API_KEY"),

        stt_timeout_seconds: parse_env("STT_TIMEOUT_SECONDS", defaults.stt_timeout_seconds)?,
        shutdown_timeout_seconds: parse_env(
            "SHUTDOWN_TIMEOUT_SECONDS",
            defaults.shutdown_timeout_seconds,
        )?,

        cors_allowed_origins: env_var("CORS_ALLOWED_ORIGINS").or(defaults.cors_allowed_origins),
        rate_limit_requests_per_second: parse_env(
            "RATE_LIMIT_REQUESTS_PER_SECOND",
            defaults.rate_limit_requests_per_second,
        )?,
        rate_limit_burst_size: parse_env("RATE_LIMIT_BURST_SIZE", defaults.rate_limit_burst_size)?,

        log_level: env_var("LOG_LEVEL"),
    })
}
