use serde::{Deserialize, Deserializer, Serialize};

/// The only tool call kind the agent dispatches.
pub const FUNCTION_KIND: &str = "function";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// Raw argument text exactly as the model produced it
    #[serde(default)]
    pub arguments: String,
}

/// A tool call requested by the model in an assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_kind() -> String {
    FUNCTION_KIND.to_string()
}

impl ToolCallRequest {
    pub fn function<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            kind: default_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn is_function(&self) -> bool {
        self.kind == FUNCTION_KIND
    }
}

/// A message to or from an LLM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_default"
    )]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// Providers send `"content": null` next to tool calls, and `"tool_calls": null` without them.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl Message {
    fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Message {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A tool result answering the assistant's call with the given id
    pub fn tool<I, N, C>(tool_call_id: I, name: N, content: C) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        C: Into<String>,
    {
        Message {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn with_tool_call(mut self, call: ToolCallRequest) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_tool_message_serialization() -> anyhow::Result<()> {
        let message = Message::tool("call_1", "list_clusters", "[]");
        let value: Value = serde_json::to_value(&message)?;
        assert_eq!(
            value,
            json!({
                "role": "tool",
                "content": "[]",
                "tool_call_id": "call_1",
                "name": "list_clusters"
            })
        );
        Ok(())
    }

    #[test]
    fn test_assistant_with_tool_calls_serialization() -> anyhow::Result<()> {
        let message = Message::assistant("").with_tool_call(ToolCallRequest::function(
            "call_1",
            "get_client",
            r#"{"cluster":"a","identity":"b"}"#,
        ));
        let value: Value = serde_json::to_value(&message)?;
        assert_eq!(value["tool_calls"][0]["type"], "function");
        assert_eq!(value["tool_calls"][0]["function"]["name"], "get_client");
        assert!(value.get("tool_call_id").is_none());
        Ok(())
    }

    #[test]
    fn test_deserialize_null_content_and_tool_calls() -> anyhow::Result<()> {
        let message: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_9",
                "function": {"name": "list_clusters", "arguments": "{}"}
            }]
        }))?;
        assert_eq!(message.content, "");
        assert!(message.tool_calls[0].is_function());

        let message: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": "hi",
            "tool_calls": null
        }))?;
        assert!(!message.has_tool_calls());
        Ok(())
    }
}
