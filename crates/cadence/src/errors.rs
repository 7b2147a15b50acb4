use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Agent is busy: cannot {action} while {state}")]
    Busy { action: String, state: String },

    #[error("Nothing in flight to abort")]
    NothingInFlight,

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;

/// Failures talking to a model provider over HTTP.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request failed: {status}\n{body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Response has no body")]
    MissingBody,

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        AgentError::Transport(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Map a dotted config key to the environment variable that sets it.
pub fn to_env_var(field_path: &str) -> String {
    // Handle nested fields by converting dots to double underscores
    // If the field is in the provider object, we need to prefix it appropriately
    let normalized_path = if field_path == "type" {
        "provider.type".to_string()
    } else if field_path.starts_with("provider.") || field_path.starts_with("agent.") {
        field_path.to_string()
    } else {
        format!("provider.{}", field_path)
    };

    format!(
        "CADENCE_{}",
        normalized_path.replace('.', "__").to_uppercase()
    )
}
