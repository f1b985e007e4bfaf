use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::assembler::StreamAssembler;
use crate::errors::{AgentError, AgentResult, ProviderError};
use crate::models::chat::{ChatRequest, ChatResponse, StreamEvent, ToolCallRecord};
use crate::models::message::{Message, Role, ToolCallRequest};
use crate::models::tool::Tool;
use crate::providers::base::Provider;
use crate::registry::ToolRegistry;

/// Upper bound on model round trips per invocation
pub const MAX_ITERATIONS: usize = 10;

const STREAM_BUFFER: usize = 32;

/// Agent integrates a foundational LLM with the management tools it needs to pilot
#[derive(Clone)]
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    system_prompt: Arc<str>,
    max_iterations: usize,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        system_prompt: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            provider,
            registry,
            system_prompt: system_prompt.into(),
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Every invocation gets at least one round trip
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn tools(&self) -> &[Tool] {
        self.registry.list()
    }

    /// System prompt, caller history, then the new user message
    fn transcript(&self, request: &ChatRequest) -> Vec<Message> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(Message::system(self.system_prompt.as_ref()));
        for message in &request.history {
            match message.role {
                Role::User | Role::Assistant => messages.push(Message {
                    role: message.role,
                    content: message.content.clone(),
                    tool_calls: Vec::new(),
                    tool_call_id: None,
                    name: None,
                }),
                role => warn!(?role, "dropping history message with unsupported role"),
            }
        }
        messages.push(Message::user(request.message.as_str()));
        messages
    }

    /// Answers one user message, dispatching tool calls one after another
    pub async fn chat(&self, request: ChatRequest) -> AgentResult<ChatResponse> {
        let mut messages = self.transcript(&request);
        let mut records = Vec::new();

        for iteration in 1..=self.max_iterations {
            debug!(iteration, max = self.max_iterations, "requesting completion");
            let mut message = self.provider.complete(&messages, self.tools()).await?.message;
            message.role = Role::Assistant;
            info!(
                iteration,
                tool_calls = message.tool_calls.len(),
                content_len = message.content.len(),
                "model responded"
            );

            if !message.has_tool_calls() {
                let answer = message.content.clone();
                messages.push(message);
                return Ok(ChatResponse {
                    message: answer,
                    tool_calls: records,
                    error: None,
                });
            }

            let calls = dispatchable(&message.tool_calls);
            messages.push(message);
            for call in &calls {
                let (record, reply) = dispatch(&self.registry, call).await;
                records.push(record);
                messages.push(reply);
            }
        }

        warn!(max = self.max_iterations, "iteration limit reached");
        Err(AgentError::IterationLimitExceeded(self.max_iterations))
    }

    /// Answers one user message as a stream of events.
    ///
    /// The run happens on its own task; it stops when `cancel` fires or the returned stream
    /// is dropped. The stream always ends with exactly one `done` or `error` event.
    pub fn chat_stream(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let agent = self.clone();

        tokio::spawn(
            async move {
                let terminal = match agent.run_stream(request, &cancel, &tx).await {
                    Ok((full_message, tool_calls)) => StreamEvent::Done {
                        full_message,
                        tool_calls,
                    },
                    Err(err) => {
                        match &err {
                            AgentError::Cancelled => info!("stream cancelled"),
                            err => error!(error = %err, "stream failed"),
                        }
                        StreamEvent::from(&err)
                    }
                };
                let _ = tx.send(terminal).await;
            }
            .instrument(info_span!("chat_stream")),
        );

        ReceiverStream::new(rx)
    }

    async fn run_stream(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> AgentResult<(String, Vec<ToolCallRecord>)> {
        let mut messages = self.transcript(&request);
        let mut records = Vec::new();

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            debug!(iteration, max = self.max_iterations, "requesting stream");

            let mut deltas = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                stream = self.provider.stream(&messages, self.tools(), cancel.clone()) => stream?,
            };

            let mut assembler = StreamAssembler::new();
            loop {
                let delta = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    delta = deltas.next() => delta,
                };
                let Some(delta) = delta else { break };
                let fragment = assembler.push(delta?).map_err(ProviderError::from)?;
                if let Some(fragment) = fragment {
                    emit(tx, cancel, StreamEvent::content(fragment)).await?;
                }
            }
            drop(deltas);

            // the provider ends its stream quietly when cancelled
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            let tool_round = assembler.is_tool_round();
            let finish_reason = assembler.finish_reason().unwrap_or("none").to_string();
            let message = assembler.finish();
            info!(
                iteration,
                %finish_reason,
                tool_calls = message.tool_calls.len(),
                content_len = message.content.len(),
                "model responded"
            );

            if !tool_round {
                let answer = message.content.clone();
                messages.push(message);
                return Ok((answer, records));
            }

            let calls = dispatchable(&message.tool_calls);
            messages.push(message);

            let mut running = JoinSet::new();
            let mut replies: Vec<Option<Message>> = vec![None; calls.len()];
            for (slot, call) in calls.into_iter().enumerate() {
                let registry = Arc::clone(&self.registry);
                running.spawn(
                    async move {
                        let (record, reply) = dispatch(&registry, &call).await;
                        (slot, record, reply)
                    }
                    .in_current_span(),
                );
            }

            let joined =
                join_dispatches(&mut running, &mut replies, &mut records, cancel, tx).await;
            if joined.is_err() {
                // started dispatches run to completion
                running.detach_all();
            }
            joined?;

            // results join the transcript in request order
            messages.extend(replies.into_iter().flatten());
        }

        warn!(max = self.max_iterations, "iteration limit reached");
        Err(AgentError::IterationLimitExceeded(self.max_iterations))
    }
}

/// Runs one tool call, producing its record and the transcript message answering it
async fn dispatch(registry: &ToolRegistry, call: &ToolCallRequest) -> (ToolCallRecord, Message) {
    info!(tool = %call.function.name, id = %call.id, "calling tool");
    let result = registry
        .invoke(&call.function.name, &call.function.arguments)
        .await;
    let message = Message::tool(&call.id, &call.function.name, result.as_str());
    let record = ToolCallRecord {
        tool: call.function.name.clone(),
        arguments: call.function.arguments.clone(),
        result,
    };
    (record, message)
}

/// Collects a round's dispatches in completion order, emitting one event per finished call
async fn join_dispatches(
    running: &mut JoinSet<(usize, ToolCallRecord, Message)>,
    replies: &mut [Option<Message>],
    records: &mut Vec<ToolCallRecord>,
    cancel: &CancellationToken,
    tx: &mpsc::Sender<StreamEvent>,
) -> AgentResult<()> {
    loop {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            joined = running.join_next() => joined,
        };
        let Some(joined) = joined else {
            return Ok(());
        };
        let (slot, record, reply) =
            joined.map_err(|err| AgentError::Internal(format!("tool dispatch failed: {err}")))?;
        emit(
            tx,
            cancel,
            StreamEvent::ToolCall {
                tool_call: record.clone(),
            },
        )
        .await?;
        records.push(record);
        replies[slot] = Some(reply);
    }
}

/// Calls the agent can run; other kinds are skipped
fn dispatchable(calls: &[ToolCallRequest]) -> Vec<ToolCallRequest> {
    calls
        .iter()
        .filter(|call| {
            if !call.is_function() {
                debug!(kind = %call.kind, id = %call.id, "skipping non-function tool call");
            }
            call.is_function()
        })
        .cloned()
        .collect()
}

/// Sends one event unless the run is cancelled first; a closed receiver means the caller went away
async fn emit(
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
    event: StreamEvent,
) -> AgentResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        sent = tx.send(event) => sent.map_err(|_| AgentError::Cancelled),
    }
}
