//! Merging YAML configuration over environment configuration

use super::yaml::YamlConfig;
use super::{ConfigError, ServerConfig, env};

/// Override `target` with `value` when the YAML file provided one
fn apply<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

/// Override an optional credential, treating blank YAML strings as unset
fn apply_key(target: &mut Option<String>, value: Option<String>) {
    if let Some(v) = value {
        let v = v.trim().to_string();
        *target = if v.is_empty() { None } else { Some(v) };
    }
}

/// Build the final configuration: environment (with defaults) as the base,
/// YAML values layered on top.
pub(super) fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let mut config = env::load_from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        apply(&mut config.host, server.host);
        apply(&mut config.port, server.port);
    }

    if let Some(p) = yaml.providers {
        apply_key(&mut config.deepgram_api_key, p.deepgram_api_key);
        apply_key(&mut config.cartesia_api_key, p.cartesia_api_key);
        apply_key(&mut config.assemblyai_api_key, p.assemblyai_api_key);
        apply_key(&mut config.elevenlabs_api_key, p.elevenlabs_api_key);
        apply_key(&mut config.openai_api_key, p.openai_api_key);
        apply_key(&mut config.groq_api_key, p.groq_api_key);
        apply_key(&mut config.anthropic_api_key, p.anthropic_api_key);
        apply_key(&mut config.gemini_api_key, p.gemini_api_key);
        apply_key(&mut config.cerebras_api_key, p.cerebras_api_key);
        apply_key(&mut config.openrouter_api_key, p.openrouter_api_key);
    }

    if let Some(runtime) = yaml.runtime {
        apply(&mut config.stt_timeout_seconds, runtime.stt_timeout_seconds);
        apply(
            &mut config.shutdown_timeout_seconds,
            runtime.shutdown_timeout_seconds,
        );
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        apply(
            &mut config.rate_limit_requests_per_second,
            security.rate_limit_requests_per_second,
        );
        apply(&mut config.rate_limit_burst_size, security.rate_limit_burst_size);
    }

    if let Some(logging) = yaml.logging
        && logging.level.is_some()
    {
        config.log_level = logging.level;
    }

    Ok(config)
}
