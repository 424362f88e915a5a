use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 8765
///
/// providers:
///   deepgram_api_key: "your-deepgram-key"
///   openai_api_key: "your-openai-key"
///   anthropic_api_key: "your-anthropic-key"
///
/// runtime:
///   stt_timeout_seconds: 0.8
///   shutdown_timeout_seconds: 2.0
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 100
///   rate_limit_burst_size: 50
///
/// logging:
///   level: "debug"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub runtime: Option<RuntimeYaml>,
    pub security: Option<SecurityYaml>,
    pub logging: Option<LoggingYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub deepgram_api_key: Option<String>,
    pub cartesia_api_key: Option<String>,
    pub assemblyai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    /// Shared by the OpenAI STT and LLM providers
    pub openai_api_key: Option<String>,
    /// Shared by the Groq STT and LLM providers
    pub groq_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub cerebras_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
}

/// Runtime defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeYaml {
    pub stt_timeout_seconds: Option<f64>,
    pub shutdown_timeout_seconds: Option<f64>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
}

/// Logging settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingYaml {
    pub level: Option<String>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

providers:
  deepgram_api_key: "dg-key"
  groq_api_key: "groq-key"

runtime:
  stt_timeout_seconds: 0.8
  shutdown_timeout_seconds: 3.0

security:
  cors_allowed_origins: "http://localhost:1420"
  rate_limit_requests_per_second: 20

logging:
  level: "debug"
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host, Some("127.0.0.1".to_string()));
        assert_eq!(server.port, Some(8080));

        let providers = config.providers.unwrap();
        assert_eq!(providers.deepgram_api_key, Some("dg-key".to_string()));
        assert_eq!(providers.groq_api_key, Some("groq-key".to_string()));
        assert_eq!(providers.anthropic_api_key, None);

        let runtime = config.runtime.unwrap();
        assert_eq!(runtime.stt_timeout_seconds, Some(0.8));
        assert_eq!(runtime.shutdown_timeout_seconds, Some(3.0));

        let security = config.security.unwrap();
        assert_eq!(security.rate_limit_requests_per_second, Some(20));
        assert_eq!(security.rate_limit_burst_size, None);

        assert_eq!(config.logging.unwrap().level, Some("debug".to_string()));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.providers.is_none());
    }

    #[test]
    fn test_yaml_from_file_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "server: [unterminated").unwrap();

        let result = YamlConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
