//! Error types
//!
//! One error enum for the whole agent. Inside the conversation loop every
//! variant is downgraded to a context entry; only setup failures and the
//! iteration limit end a run.

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to launch tool process '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Tool session setup failed: {0}")]
    Setup(String),
    #[error("Tool process closed the connection")]
    Disconnected,
    #[error("MCP protocol error: {0}")]
    Protocol(String),
    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Model API error {status}: {body}")]
    ModelApi { status: u16, body: String },
    #[error("Model response could not be parsed: {0}")]
    ModelResponse(String),
    #[error("GEMINI_API_KEY not set - runs are unavailable")]
    MissingApiKey,
    #[error("Iteration limit of {0} reached without completion")]
    IterationLimit(usize),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether this error happened before the loop could start
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            AgentError::Spawn { .. } | AgentError::Setup(_) | AgentError::MissingApiKey
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
