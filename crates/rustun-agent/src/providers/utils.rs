use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

use super::base::{Completion, StreamDelta, ToolCallDelta, Usage};
use crate::errors::ProviderError;
use crate::models::message::{Message, Role};
use crate::models::tool::Tool;

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>, ProviderError> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ProviderError::InvalidRequest(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

impl From<ApiErrorBody> for ProviderError {
    fn from(body: ApiErrorBody) -> Self {
        let code = body.code.as_ref().and_then(Value::as_str).unwrap_or_default();
        if code == "context_length_exceeded" || code == "string_above_max_length" {
            return ProviderError::ContextLengthExceeded(body.message);
        }
        ProviderError::Api {
            message: body.message,
            kind: body.kind.unwrap_or_else(|| code.to_string()),
        }
    }
}

/// The provider's error envelope, if the body carries one
pub fn check_error_envelope(body: &Value) -> Option<ProviderError> {
    let error = body.get("error")?;
    if error.is_null() {
        return None;
    }
    match serde_json::from_value::<ApiErrorBody>(error.clone()) {
        Ok(parsed) => Some(parsed.into()),
        Err(_) => Some(ProviderError::Api {
            message: error.to_string(),
            kind: String::new(),
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
    total_tokens: Option<i32>,
}

impl From<UsageBody> for Usage {
    fn from(body: UsageBody) -> Self {
        let total = body.total_tokens.or(match (body.prompt_tokens, body.completion_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });
        Usage::new(body.prompt_tokens, body.completion_tokens, total)
    }
}

/// Interpret a blocking chat-completions response body
pub fn openai_response_to_completion(body: Value) -> Result<Completion, ProviderError> {
    if let Some(err) = check_error_envelope(&body) {
        return Err(err);
    }

    let response: ChatCompletion = serde_json::from_value(body)?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyChoices)?;

    let mut message = choice.message;
    message.role = Role::Assistant;

    Ok(Completion {
        message,
        stop_reason: choice.finish_reason,
        usage: response.usage.map(Usage::from).unwrap_or_default(),
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Interpret one streamed `data:` payload.
///
/// Chunks without choices, such as trailing usage reports, yield `None`.
pub fn parse_stream_chunk(data: &str) -> Result<Option<StreamDelta>, ProviderError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ProviderError::Stream(format!("malformed stream chunk: {e}")))?;
    if let Some(err) = check_error_envelope(&value) {
        return Err(err);
    }

    let chunk: ChatCompletionChunk = serde_json::from_value(value)
        .map_err(|e| ProviderError::Stream(format!("malformed stream chunk: {e}")))?;
    Ok(chunk.choices.into_iter().next().map(|choice| StreamDelta {
        role: choice.delta.role,
        content: choice.delta.content,
        tool_calls: choice.delta.tool_calls.unwrap_or_default(),
        finish_reason: choice.finish_reason,
    }))
}

/// Best-effort error for a non-success HTTP status
pub fn error_from_status(status: u16, body: String) -> ProviderError {
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| check_error_envelope(&value))
        .unwrap_or(ProviderError::Status { status, body })
}
