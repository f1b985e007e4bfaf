use thiserror::Error;

use crate::assembler::AssemblyError;

/// Fatal outcomes of a chat invocation.
///
/// Tool failures never appear here: they are turned into error payloads and handed back to
/// the model instead.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM request failed: {0}")]
    Transport(#[from] ProviderError),

    #[error("Maximum iterations ({0}) reached, conversation might be too complex")]
    IterationLimitExceeded(usize),

    #[error("Stream cancelled by client")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Stable machine-readable code for callers that branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Transport(_) => "transport_error",
            AgentError::IterationLimitExceeded(_) => "iteration_limit_exceeded",
            AgentError::Cancelled => "cancelled",
            AgentError::Internal(_) => "internal_error",
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to send request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM API error: {message} ({kind})")]
    Api { message: String, kind: String },

    #[error("Context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Response contained no choices")]
    EmptyChoices,

    #[error("Stream error: {0}")]
    Stream(String),
}

impl From<AssemblyError> for ProviderError {
    fn from(err: AssemblyError) -> Self {
        ProviderError::Stream(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Decode(err.to_string())
    }
}

/// A failure contained to a single tool dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {message}")]
    ArgumentError { tool: String, message: String },

    #[error("{0}")]
    UpstreamError(#[from] ResourceError),

    #[error("failed to encode result: {0}")]
    Encode(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("client {identity} not found in cluster {cluster}")]
    NotFound { cluster: String, identity: String },

    #[error("client {identity} already exists in cluster {cluster}")]
    Conflict { cluster: String, identity: String },

    #[error("no available IP address in cluster {0}")]
    AddressExhausted(String),

    #[error("invalid network configuration: {0}")]
    InvalidNetwork(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
