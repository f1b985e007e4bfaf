use serde::{Deserialize, Serialize};

use super::message::Message;
use crate::errors::AgentError;

/// One user turn plus the conversation so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Earlier user and assistant messages, oldest first
    #[serde(default)]
    pub history: Vec<Message>,
}

impl ChatRequest {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A dispatched tool call and the payload it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: String,
    /// The tool's JSON result, or an `{"error": ...}` payload
    pub result: String,
}

/// An event emitted by a streaming invocation.
///
/// A stream carries any number of `content` and `tool_call` events followed by exactly one
/// `done` or `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Content {
        content: String,
    },
    ToolCall {
        tool_call: ToolCallRecord,
    },
    Done {
        #[serde(rename = "fullMessage")]
        full_message: String,
        #[serde(rename = "toolCalls")]
        tool_calls: Vec<ToolCallRecord>,
    },
    Error {
        error: String,
        code: String,
    },
}

impl StreamEvent {
    pub fn content<S: Into<String>>(content: S) -> Self {
        StreamEvent::Content {
            content: content.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

impl From<&AgentError> for StreamEvent {
    fn from(err: &AgentError) -> Self {
        StreamEvent::Error {
            error: err.to_string(),
            code: err.code().to_string(),
        }
    }
}
