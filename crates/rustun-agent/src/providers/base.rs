use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use crate::models::message::{Message, Role};
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One blocking round trip with the model
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub message: Message,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// A fragment of one tool call, tagged with the slot it belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// One increment of a streamed completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub role: Option<Role>,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
}

impl StreamDelta {
    pub fn content<S: Into<String>>(text: S) -> Self {
        Self {
            content: Some(text.into()),
            ..Default::default()
        }
    }

    /// A tool call fragment; `id` and `name` are usually only present on the first one
    pub fn tool_call(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: &str,
    ) -> Self {
        Self {
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(String::from),
                kind: id.map(|_| "function".to_string()),
                function: Some(FunctionDelta {
                    name: name.map(String::from),
                    arguments: Some(arguments.to_string()),
                }),
            }],
            ..Default::default()
        }
    }

    pub fn finish<S: Into<String>>(reason: S) -> Self {
        Self {
            finish_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

pub type DeltaStream = BoxStream<'static, Result<StreamDelta, ProviderError>>;

/// Base trait for chat-completions providers
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next assistant message for the transcript
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion, ProviderError>;

    /// Stream the next assistant message as increments.
    ///
    /// The stream ends at the provider's end marker, or early once `cancel` fires.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError>;
}
