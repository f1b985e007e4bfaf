use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::base::{Completion, DeltaStream, Provider};
use super::configs::OpenAiProviderConfig;
use super::sse::{SseEvent, SseLineBuffer};
use super::utils::{
    error_from_status, openai_response_to_completion, parse_stream_chunk, tools_to_openai_spec,
    ChatCompletionRequest,
};
use crate::errors::ProviderError;
use crate::models::message::Message;
use crate::models::tool::Tool;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(
        &self,
        messages: &[Message],
        tools: &[Tool],
        stream: bool,
    ) -> Result<Response, ProviderError> {
        let payload = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            tools: tools_to_openai_spec(tools)?,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        };

        let mut request = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&payload);
        if stream {
            request = request.header(ACCEPT, "text/event-stream");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "provider rejected request");
            return Err(error_from_status(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    #[instrument(skip_all, fields(model = %self.config.model, messages = messages.len()))]
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<Completion, ProviderError> {
        let response = self.post(messages, tools, false).await?;
        let body = response.json().await?;
        let completion = openai_response_to_completion(body)?;
        debug!(
            tool_calls = completion.message.tool_calls.len(),
            stop_reason = ?completion.stop_reason,
            total_tokens = ?completion.usage.total_tokens,
            "completion received"
        );
        Ok(completion)
    }

    #[instrument(skip_all, fields(model = %self.config.model, messages = messages.len()))]
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
        cancel: CancellationToken,
    ) -> Result<DeltaStream, ProviderError> {
        let response = self.post(messages, tools, true).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut buffer = SseLineBuffer::new();
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("stream cancelled, dropping connection");
                        return;
                    }
                    chunk = bytes.next() => chunk,
                };

                let (events, ended) = match chunk {
                    Some(Ok(chunk)) => (buffer.feed(&chunk), false),
                    Some(Err(e)) => {
                        yield Err(ProviderError::Stream(format!("failed to read stream: {e}")));
                        return;
                    }
                    None => (buffer.flush(), true),
                };

                for event in events {
                    match event {
                        SseEvent::Done => return,
                        SseEvent::Data(data) => match parse_stream_chunk(&data) {
                            Ok(Some(delta)) => yield Ok(delta),
                            Ok(None) => {}
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        },
                    }
                }

                if ended {
                    debug!("stream ended without end marker");
                    return;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
