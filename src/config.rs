//! Environment-driven configuration.
//!
//! Everything comes from the process environment (a `.env` file is loaded
//! by `main` via dotenvy before this runs). Secrets are wrapped in
//! `SecretString` so they never end up in debug output.

use std::env;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
    /// Path to the protocol catalog JSON exported by the content store.
    pub catalog_path: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    url: String,
    pub pool_size: usize,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>, pool_size: usize) -> Self {
        Self {
            url: url.into(),
            pool_size,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which provider backend to use for a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderType {
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProviderType,
    pub gemini: GeminiConfig,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Idle timeout between provider stream chunks before the turn is
    /// aborted with an error event.
    pub turn_timeout: Duration,
    /// Upper bound on tool-call follow-up rounds within one user turn.
    pub max_tool_rounds: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(120),
            max_tool_rounds: 8,
        }
    }
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = DatabaseConfig {
            url: require("DATABASE_URL")?,
            pool_size: parse_or("DATABASE_POOL_SIZE", 8)?,
        };

        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
        };

        let gemini = GeminiConfig {
            api_key: secret("GEMINI_API_KEY"),
            base_url: env::var("GEMINI_BASE_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
        };

        let openai = OpenAiConfig {
            api_key: secret("OPENAI_API_KEY"),
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        };

        // Prefer Gemini when both keys are present.
        let provider = if gemini.api_key.is_some() {
            LlmProviderType::Gemini
        } else if openai.api_key.is_some() {
            LlmProviderType::OpenAi
        } else {
            return Err(ConfigError::NoProvider);
        };

        let chat = ChatConfig {
            turn_timeout: Duration::from_secs(parse_or("CHAT_TURN_TIMEOUT_SECS", 120)?),
            max_tool_rounds: parse_or("CHAT_MAX_TOOL_ROUNDS", 8)?,
        };

        let catalog_path =
            env::var("CATALOG_PATH").unwrap_or_else(|_| "content/protocols.json".to_string());

        Ok(Self {
            database,
            server,
            llm: LlmConfig {
                provider,
                gemini,
                openai,
            },
            chat,
            catalog_path,
        })
    }
}

fn require(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::MissingVar(var.to_string()))
}

fn secret(var: &str) -> Option<SecretString> {
    env::var(var).ok().filter(|v| !v.is_empty()).map(Into::into)
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
            var: var.to_string(),
            reason: format!("could not parse {raw:?}"),
        }),
        Err(_) => Ok(default),
    }
}
