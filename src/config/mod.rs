//! Configuration module for the dictation gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use dictation_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Lower bound for the speech-recognition timeout, in seconds
pub const MIN_STT_TIMEOUT_SECONDS: f64 = 0.1;

/// Upper bound for the speech-recognition timeout, in seconds
pub const MAX_STT_TIMEOUT_SECONDS: f64 = 10.0;

/// Initial speech-recognition timeout when none is configured
pub const DEFAULT_STT_TIMEOUT_SECONDS: f64 = 0.5;

/// Budget for each of the two bounded shutdown waits
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: f64 = 2.0;

/// Returns true when `seconds` is an acceptable speech-recognition timeout
pub fn is_valid_stt_timeout(seconds: f64) -> bool {
    (MIN_STT_TIMEOUT_SECONDS..=MAX_STT_TIMEOUT_SECONDS).contains(&seconds)
}

/// Errors raised while loading configuration.
///
/// These are fatal: the binary prints guidance and exits with status 1
/// before any listener is bound.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    /// Config file is not valid YAML for the expected schema
    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    /// An environment variable holds a value of the wrong shape
    #[error("Invalid value for {var}: {message}")]
    InvalidEnv { var: String, message: String },

    /// The merged configuration failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
///
/// Contains all configuration needed to run the dictation gateway, including:
/// - Server settings (host, port)
/// - Provider API keys for speech-to-text and language-model backends
/// - Runtime defaults (speech-recognition timeout, shutdown budget)
/// - Security settings (CORS, rate limiting)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Speech-to-text provider keys
    pub deepgram_api_key: Option<String>,
    pub cartesia_api_key: Option<String>,
    pub assemblyai_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,

    /// OpenAI API key, used for both Whisper STT and chat completions
    pub openai_api_key: Option<String>,
    /// Groq API key, used for both Whisper STT and chat completions
    pub groq_api_key: Option<String>,

    // Language-model provider keys
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub cerebras_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,

    /// Initial speech-recognition timeout for new sessions
    pub stt_timeout_seconds: f64,
    /// Budget for each bounded wait during shutdown
    pub shutdown_timeout_seconds: f64,

    // Security settings
    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: u32,
    pub rate_limit_burst_size: u32,

    /// Log filter requested through configuration (LOG_LEVEL)
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            deepgram_api_key: None,
            cartesia_api_key: None,
            assemblyai_api_key: None,
            elevenlabs_api_key: None,
            openai_api_key: None,
            groq_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            cerebras_api_key: None,
            openrouter_api_key: None,
            stt_timeout_seconds: DEFAULT_STT_TIMEOUT_SECONDS,
            shutdown_timeout_seconds: DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
            cors_allowed_origins: Some("*".to_string()),
            rate_limit_requests_per_second: 100,
            rate_limit_burst_size: 50,
            log_level: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and defaults)
    ///
    /// The .env file is loaded by `main` before this is called, so its values
    /// are visible here as ordinary environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get API key for a specific provider
    ///
    /// # Arguments
    /// * `provider` - The provider id (e.g., "deepgram", "anthropic")
    ///
    /// # Returns
    /// * `Result<String, String>` - The API key on success, or an error message on failure
    pub fn get_api_key(&self, provider: &str) -> Result<String, String> {
        let (key, name) = match provider.to_lowercase().as_str() {
            "deepgram" => (&self.deepgram_api_key, "Deepgram"),
            "cartesia" => (&self.cartesia_api_key, "Cartesia"),
            "assemblyai" => (&self.assemblyai_api_key, "AssemblyAI"),
            "elevenlabs" => (&self.elevenlabs_api_key, "ElevenLabs"),
            "openai" => (&self.openai_api_key, "OpenAI"),
            "groq" => (&self.groq_api_key, "Groq"),
            "anthropic" => (&self.anthropic_api_key, "Anthropic"),
            "gemini" => (&self.gemini_api_key, "Gemini"),
            "cerebras" => (&self.cerebras_api_key, "Cerebras"),
            "openrouter" => (&self.openrouter_api_key, "OpenRouter"),
            _ => return Err(format!("Unsupported provider: {provider}")),
        };

        key.as_ref()
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .ok_or_else(|| format!("{name} API key not configured in server environment"))
    }
}
