//! Error types for each layer of the scheduler.

use std::time::Duration;

use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: String, reason: String },

    #[error("No AI provider configured. Set GEMINI_API_KEY or OPENAI_API_KEY.")]
    NoProvider,
}

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Row not found")]
    NotFound,
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(err.to_string())
    }
}

/// Errors from an LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider {provider} (retry after {retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Request to provider {provider} failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Stream from provider {provider} interrupted: {reason}")]
    StreamInterrupted { provider: String, reason: String },
}

/// Errors surfaced by tool execution.
///
/// These are mapped into a `ToolResult { success: false, .. }` at the
/// registry boundary so the model can explain the failure to the user;
/// they never abort a conversation turn.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),
}
