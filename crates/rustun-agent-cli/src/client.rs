use anyhow::{anyhow, bail, Context, Result};
use reqwest::{Client, Response};
use rustun_agent::models::chat::{ChatRequest, ChatResponse, StreamEvent};
use rustun_agent::providers::sse::{SseEvent, SseLineBuffer};
use std::time::Duration;

/// HTTP client for a running `rustun-agentd`
pub struct AgentClient {
    http: Client,
    base_url: String,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("server returned status {}", response.status().as_u16());
        }
        Ok(())
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self.post("/api/agent/chat", request).await?;
        let reply: ChatResponse = response
            .json()
            .await
            .context("failed to parse chat response")?;
        match reply.error.as_deref() {
            Some(error) if !error.is_empty() => Err(anyhow!("{error}")),
            _ => Ok(reply),
        }
    }

    /// Streams one exchange, handing each event to `on_event` as it arrives
    pub async fn chat_stream<F>(&self, request: &ChatRequest, mut on_event: F) -> Result<()>
    where
        F: FnMut(StreamEvent),
    {
        let mut response = self.post("/api/agent/chat/stream", request).await?;
        let mut buffer = SseLineBuffer::new();

        while let Some(chunk) = response.chunk().await? {
            for event in buffer.feed(&chunk) {
                if let Some(event) = decode(event)? {
                    on_event(event);
                }
            }
        }
        for event in buffer.flush() {
            if let Some(event) = decode(event)? {
                on_event(event);
            }
        }
        Ok(())
    }

    async fn post(&self, path: &str, request: &ChatRequest) -> Result<Response> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Server error (status {}): {}", status.as_u16(), body);
        }
        Ok(response)
    }
}

fn decode(event: SseEvent) -> Result<Option<StreamEvent>> {
    match event {
        SseEvent::Data(data) => serde_json::from_str(&data)
            .map(Some)
            .with_context(|| format!("unexpected stream event: {data}")),
        SseEvent::Done => Ok(None),
    }
}
