use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Completion, DeltaStream, Provider, StreamDelta, Usage};

/// A mock provider that returns pre-configured responses for testing
#[derive(Default)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
    turns: Arc<Mutex<Vec<Vec<StreamDelta>>>>,
    calls: AtomicUsize,
    transcripts: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of blocking responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Default::default()
        }
    }

    /// Create a mock provider with a sequence of streamed turns
    pub fn streaming(turns: Vec<Vec<StreamDelta>>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(turns)),
            ..Default::default()
        }
    }

    /// Number of round trips made so far, blocking or streamed
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The transcript sent with each round trip
    pub fn transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts.lock().unwrap().clone()
    }

    fn record(&self, messages: &[Message]) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts.lock().unwrap().push(messages.to_vec());
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<Completion, ProviderError> {
        self.record(messages);
        let mut responses = self.responses.lock().unwrap();
        // Return empty response if no more pre-configured responses
        let message = if responses.is_empty() {
            Message::assistant("")
        } else {
            responses.remove(0)
        };
        Ok(Completion {
            message,
            stop_reason: Some("stop".to_string()),
            usage: Usage::default(),
        })
    }

    async fn stream(
        &self,
        messages: &[Message],
        _tools: &[Tool],
        _cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError> {
        self.record(messages);
        let mut turns = self.turns.lock().unwrap();
        let turn = if turns.is_empty() {
            vec![StreamDelta::finish("stop")]
        } else {
            turns.remove(0)
        };
        Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok))))
    }
}
