//! These models represent the objects passed around by the agent
//!
//! There are three related formats we need to interact with:
//! - chat requests, responses and stream events exchanged with callers of the agent
//! - openai-compatible messages/tools, sent from the agent to the LLM
//! - cluster and client records, read and written by the management tools
//!
//! The message and tool models map directly onto the chat-completions wire format so they
//! can be sent without an intermediate conversion step.
pub mod chat;
pub mod client;
pub mod message;
pub mod tool;
