//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables (with `APP_` prefix and `__` between sections)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special environment variables (`HOST`, `PORT`, `OPENAI_API_KEY`, `CHATBOT_PROMPT`)
//! 2. Environment variables (`APP_SERVER__PORT`, `APP_PROVIDER__MODEL`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values (defined in the Default impl)
//!
//! Configuration is read once at startup and never changes afterwards.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chatbot: ChatbotConfig,
    pub provider: ProviderConfig,
    pub session: SessionConfig,
    pub upload: UploadConfig,
}

/// Server-specific configuration settings.
///
/// - `host = "127.0.0.1"`: only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: accept connections from any address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the system prompt comes from.
///
/// ## Accepted forms:
/// - `bundled:<name>`: a prompt compiled into the binary
/// - `file:<path>`: a prompt file on disk
/// - `<path>`: shorthand for `file:<path>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatbotConfig {
    pub prompt: String,
}

/// Settings for the hosted conversational model.
///
/// ## Fields:
/// - `base_url`: API root, without the `/v1/...` path
/// - `api_key`: bearer token sent with every request
/// - `model`: a model that accepts audio input and produces audio output
/// - `voice`: synthesized voice for the spoken reply
/// - `audio_format`: container requested for the spoken reply (`wav`, `mp3`, ...)
/// - `timeout_secs`: upper bound for one complete exchange, enforced at the handler
/// - `connect_timeout_secs`: TCP/TLS connect bound for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub audio_format: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

/// Conversation session limits and lifetimes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum number of live sessions held in memory
    pub max_sessions: usize,
    /// Sessions untouched for this long are evicted
    pub idle_timeout_secs: u64,
    /// How often the reaper looks for idle sessions
    pub cleanup_interval_secs: u64,
    /// Most recent history messages replayed to the model per request
    pub max_history_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_size_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            chatbot: ChatbotConfig {
                prompt: "bundled:marvin.paranoid.android.txt".to_string(),
            },
            provider: ProviderConfig {
                base_url: "https://api.openai.com".to_string(),
                api_key: String::new(), // Must come from OPENAI_API_KEY or config.toml
                model: "gpt-4o-audio-preview".to_string(),
                voice: "alloy".to_string(),
                audio_format: "wav".to_string(),
                timeout_secs: 120,
                connect_timeout_secs: 10,
            },
            session: SessionConfig {
                max_sessions: 1000,
                idle_timeout_secs: 30 * 60,
                cleanup_interval_secs: 60,
                max_history_messages: 100,
            },
            upload: UploadConfig {
                max_file_size_bytes: 50 * 1024 * 1024, // 50MB
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: override server port
    /// - `APP_PROVIDER__MODEL=gpt-4o-mini-audio-preview`: override the model
    /// - `APP_SESSION__IDLE_TIMEOUT_SECS=600`: expire sessions after ten minutes
    /// - `OPENAI_API_KEY=sk-...`: provider credentials
    /// - `CHATBOT_PROMPT=file:/etc/assistant/prompt.txt`: custom system prompt
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Variables used by deployment platforms and provider SDKs
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }
        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("provider.api_key", api_key)?;
        }
        if let Ok(prompt) = env::var("CHATBOT_PROMPT") {
            settings = settings.set_override("chatbot.prompt", prompt)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching these at startup turns a confusing first-request failure
    /// into a clear boot error.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.chatbot.prompt.trim().is_empty() {
            return Err(anyhow::anyhow!("Chatbot prompt location cannot be empty"));
        }

        if self.provider.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Provider API key is not set (use OPENAI_API_KEY or provider.api_key)"
            ));
        }

        if self.provider.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Provider model cannot be empty"));
        }

        if self.provider.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Provider timeout must be greater than 0"));
        }

        if self.session.max_sessions == 0 {
            return Err(anyhow::anyhow!("Max sessions must be greater than 0"));
        }

        if self.session.cleanup_interval_secs == 0 {
            return Err(anyhow::anyhow!("Session cleanup interval must be greater than 0"));
        }

        if self.session.max_history_messages == 0 {
            return Err(anyhow::anyhow!("Max history messages must be greater than 0"));
        }

        if self.upload.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
