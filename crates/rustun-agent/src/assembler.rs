use thiserror::Error;

use crate::models::message::{Message, Role, ToolCallRequest, FUNCTION_KIND};
use crate::providers::base::{StreamDelta, ToolCallDelta};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("tool call fragment for slot {index} arrived before slot {expected} was opened")]
    SlotOutOfOrder { index: usize, expected: usize },
}

/// Rebuilds one assistant message from streamed increments.
///
/// Tool call slots are opened in index order. Fragments for slots that are already open
/// may interleave freely; each slot's arguments are the concatenation of its own fragments
/// in arrival order.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    role: Option<Role>,
    content: String,
    tool_calls: Vec<ToolCallRequest>,
    finish_reason: Option<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one increment, returning the text fragment it carried, if any
    pub fn push(&mut self, delta: StreamDelta) -> Result<Option<String>, AssemblyError> {
        if delta.role.is_some() {
            self.role = delta.role;
        }
        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason;
        }
        for fragment in delta.tool_calls {
            self.merge_tool_call(fragment)?;
        }

        match delta.content {
            Some(text) if !text.is_empty() => {
                self.content.push_str(&text);
                Ok(Some(text))
            }
            _ => Ok(None),
        }
    }

    fn merge_tool_call(&mut self, fragment: ToolCallDelta) -> Result<(), AssemblyError> {
        let expected = self.tool_calls.len();
        if fragment.index > expected {
            return Err(AssemblyError::SlotOutOfOrder {
                index: fragment.index,
                expected,
            });
        }
        if fragment.index == expected {
            self.tool_calls.push(ToolCallRequest {
                id: String::new(),
                kind: String::new(),
                function: Default::default(),
            });
        }

        let slot = &mut self.tool_calls[fragment.index];
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            slot.id = id;
        }
        if let Some(kind) = fragment.kind.filter(|kind| !kind.is_empty()) {
            slot.kind = kind;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                slot.function.name = name;
            }
            if let Some(arguments) = function.arguments {
                slot.function.arguments.push_str(&arguments);
            }
        }
        Ok(())
    }

    /// Whether any tool call fragment has been seen, which makes this a tool round
    pub fn is_tool_round(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// The assembled assistant message; slots that never named a kind become functions
    pub fn finish(self) -> Message {
        let mut message = Message::assistant(self.content);
        message.tool_calls = self
            .tool_calls
            .into_iter()
            .map(|mut call| {
                if call.kind.is_empty() {
                    call.kind = FUNCTION_KIND.to_string();
                }
                call
            })
            .collect();
        message
    }
}
