use anyhow::Result;
use console::style;
use rustun_agent::models::chat::{ChatRequest, StreamEvent, ToolCallRecord};
use rustun_agent::models::message::Message;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};

use crate::client::AgentClient;

const PROMPT: &str = "\x1b[1m\x1b[38;5;30mYou: \x1b[0m";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Exit,
    Help,
    Clear,
    Empty,
    Message(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => Command::Empty,
            "exit" | "quit" => Command::Exit,
            "help" => Command::Help,
            "clear" => Command::Clear,
            _ => Command::Message(line.to_string()),
        }
    }
}

/// One conversation with the server; user and assistant turns are re-sent with each request
pub struct Session {
    client: AgentClient,
    stream: bool,
    history: Vec<Message>,
}

impl Session {
    pub fn new(client: AgentClient, stream: bool) -> Self {
        Self {
            client,
            stream,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Sends one message and prints the reply; history only grows on success
    pub async fn send(&mut self, text: &str) -> Result<String> {
        let request = ChatRequest::new(text).with_history(self.history.clone());
        let answer = if self.stream {
            self.send_streaming(&request).await?
        } else {
            let reply = self.client.chat(&request).await?;
            if !reply.tool_calls.is_empty() {
                println!("{}", style("Actions taken:").bold());
                reply.tool_calls.iter().for_each(print_tool_call);
                println!();
            }
            println!("{} {}", style("Agent:").cyan().bold(), reply.message);
            reply.message
        };

        self.history.push(Message::user(text));
        self.history.push(Message::assistant(answer.as_str()));
        Ok(answer)
    }

    async fn send_streaming(&self, request: &ChatRequest) -> Result<String> {
        let mut answer = None;
        let mut failure = None;
        let mut started = false;

        self.client
            .chat_stream(request, |event| match event {
                StreamEvent::Content { content } => {
                    if !started {
                        print!("{} ", style("Agent:").cyan().bold());
                        started = true;
                    }
                    print!("{content}");
                    let _ = io::stdout().flush();
                }
                StreamEvent::ToolCall { tool_call } => {
                    if started {
                        println!();
                        started = false;
                    }
                    print_tool_call(&tool_call);
                }
                StreamEvent::Done { full_message, .. } => answer = Some(full_message),
                StreamEvent::Error { error, code } => failure = Some(format!("{error} ({code})")),
            })
            .await?;
        if started {
            println!();
        }

        match (answer, failure) {
            (_, Some(failure)) => anyhow::bail!(failure),
            (Some(answer), None) => Ok(answer),
            (None, None) => anyhow::bail!("stream ended without a final message"),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        print_tips();
        let mut editor = DefaultEditor::new()?;

        loop {
            let line = match editor.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            };

            match Command::parse(&line) {
                Command::Empty => continue,
                Command::Exit => break,
                Command::Help => print_help(),
                Command::Clear => {
                    self.clear();
                    println!("{}", style("Conversation history cleared").yellow());
                }
                Command::Message(text) => {
                    let _ = editor.add_history_entry(text.as_str());
                    if let Err(err) = self.send(&text).await {
                        println!("{} {err}", style("Error:").red().bold());
                    }
                    println!();
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }
}

fn print_tool_call(record: &ToolCallRecord) {
    println!("  {} {}", style("└─").dim(), style(&record.tool).green());
    println!("     {} {}", style("args:").dim(), record.arguments);
    println!("     {} {}", style("result:").dim(), record.result);
}

fn print_tips() {
    println!("{}", style("Tips:").bold());
    println!("  - Type your request in natural language");
    println!("  - The agent remembers the conversation context");
    println!("  - Type 'clear' to reset conversation history");
    println!("  - Type 'exit' or 'quit' to leave");
    println!("  - Type 'help' for examples");
    println!();
}

fn print_help() {
    println!();
    println!("{}", style("Example requests:").bold());
    println!("  • Create a client called NAS in the production cluster");
    println!("  • Which clients are in the production cluster?");
    println!("  • Add route 192.168.1.0/24 to the office client");
    println!("  • Rename the office client to headquarters");
    println!("  • List all clusters");
    println!();
    println!("{}", style("Commands:").bold());
    println!("  • clear - Clear conversation history");
    println!("  • help - Show this help");
    println!("  • exit/quit - Exit the program");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustun_agent::models::message::Role;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_command() {
        assert_eq!(Command::parse("  "), Command::Empty);
        assert_eq!(Command::parse("EXIT"), Command::Exit);
        assert_eq!(Command::parse("quit\n"), Command::Exit);
        assert_eq!(Command::parse("help"), Command::Help);
        assert_eq!(Command::parse(" clear "), Command::Clear);
        assert_eq!(
            Command::parse(" list clusters "),
            Command::Message("list clusters".to_string())
        );
    }

    #[tokio::test]
    async fn test_history_grows_on_success_only() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agent/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"message": "Two clusters.", "tool_calls": []})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/agent/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let mut session = Session::new(AgentClient::new(server.uri())?, false);
        assert_eq!(session.send("list clusters").await?, "Two clusters.");
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].role, Role::User);
        assert_eq!(session.history()[1].content, "Two clusters.");

        assert!(session.send("again").await.is_err());
        assert_eq!(session.history().len(), 2);

        session.clear();
        assert!(session.history().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_streamed_error_event_fails_the_turn() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/agent/chat/stream"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "data: {\"type\":\"error\",\"error\":\"Maximum iterations (10) reached, conversation might be too complex\",\"code\":\"iteration_limit_exceeded\"}\n\n",
            ))
            .mount(&server)
            .await;

        let mut session = Session::new(AgentClient::new(server.uri())?, true);
        let err = session.send("loop forever").await.unwrap_err();
        assert!(err.to_string().ends_with("(iteration_limit_exceeded)"));
        assert!(session.history().is_empty());
        Ok(())
    }
}
