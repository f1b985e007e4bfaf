use futures::StreamExt;
use rustun_agent::agent::Agent;
use rustun_agent::models::chat::{ChatRequest, StreamEvent};
use rustun_agent::models::client::Client;
use rustun_agent::prompt_template::{load_knowledge, system_prompt};
use rustun_agent::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use rustun_agent::providers::factory::get_provider;
use rustun_agent::registry::ToolRegistry;
use rustun_agent::resources::{JsonFileStore, MemoryStore, NetworkConfig, RouteManager, RouteStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn agent_for(server: &MockServer, store: Arc<dyn RouteStore>) -> anyhow::Result<Agent> {
    let config = OpenAiProviderConfig::deepseek("test_api_key")
        .with_host(format!("{}/v1", server.uri()));
    let provider = get_provider(ProviderConfig::DeepSeek(config))?;

    let network = NetworkConfig::default();
    let manager = RouteManager::load(store, network.clone()).await?;
    let registry = Arc::new(ToolRegistry::new(Arc::new(manager)));
    let prompt = system_prompt(registry.list(), &network, &load_knowledge(None)?)?;
    Ok(Agent::new(provider, registry, prompt))
}

/// Answers each round trip in order, once
async fn mount_rounds(server: &MockServer, rounds: Vec<ResponseTemplate>) {
    for round in rounds {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(round)
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
}

fn completion(message: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"index": 0, "message": message, "finish_reason": "stop"}]
    }))
}

fn sse(chunks: &[Value]) -> ResponseTemplate {
    let mut body: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

#[tokio::test]
async fn test_create_client_persists_through_conversation() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_rounds(
        &server,
        vec![
            completion(json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "create_client",
                        "arguments": "{\"cluster\":\"office\",\"name\":\"nas\",\"ciders\":[\"192.168.1.0/24\"]}"
                    }
                }]
            })),
            completion(json!({"role": "assistant", "content": "Created nas in office."})),
        ],
    )
    .await;

    let dir = tempfile::tempdir()?;
    let routes = dir.path().join("routes.json");
    let agent = agent_for(&server, Arc::new(JsonFileStore::new(&routes))).await?;

    let response = agent
        .chat(ChatRequest::new("add a client called nas to office"))
        .await?;
    assert_eq!(response.message, "Created nas in office.");
    assert_eq!(response.tool_calls.len(), 1);

    let created: Client = serde_json::from_str(&response.tool_calls[0].result)?;
    assert_eq!(created.cluster, "office");
    assert_eq!(created.private_ip, "10.12.0.10");
    assert_eq!(created.routes, vec!["192.168.1.0/24".to_string()]);

    let stored: Vec<Client> = serde_json::from_str(&std::fs::read_to_string(&routes)?)?;
    assert_eq!(stored, vec![created.clone()]);

    // the second round trip answers the call by id
    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);
    let body: Value = serde_json::from_slice(&requests[1].body)?;
    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let last = messages.last().cloned().unwrap_or_default();
    assert_eq!(last["role"], "tool");
    assert_eq!(last["tool_call_id"], "call_1");
    assert_eq!(body["model"], "deepseek-chat");
    Ok(())
}

#[tokio::test]
async fn test_stream_tool_round_over_sse() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_rounds(
        &server,
        vec![
            sse(&[
                json!({"choices": [{"delta": {"role": "assistant", "tool_calls": [{
                    "index": 0, "id": "call_1", "type": "function",
                    "function": {"name": "list_clusters", "arguments": ""}
                }]}}]}),
                json!({"choices": [{"delta": {"tool_calls": [{
                    "index": 0, "function": {"arguments": "{}"}
                }]}, "finish_reason": "tool_calls"}]}),
            ]),
            sse(&[
                json!({"choices": [{"delta": {"content": "One cluster: "}}]}),
                json!({"choices": [{"delta": {"content": "office."}, "finish_reason": "stop"}]}),
            ]),
        ],
    )
    .await;

    let store = MemoryStore::with_clients(vec![Client {
        cluster: "office".to_string(),
        identity: "a".to_string(),
        name: "laptop".to_string(),
        private_ip: "10.12.0.10".to_string(),
        mask: "255.255.0.0".to_string(),
        gateway: "10.12.0.1".to_string(),
        routes: vec![],
    }]);
    let agent = agent_for(&server, Arc::new(store)).await?;

    let events: Vec<StreamEvent> = agent
        .chat_stream(ChatRequest::new("which clusters?"), CancellationToken::new())
        .collect()
        .await;

    assert_eq!(events.len(), 4);
    match &events[0] {
        StreamEvent::ToolCall { tool_call } => {
            assert_eq!(tool_call.tool, "list_clusters");
            let clusters: Value = serde_json::from_str(&tool_call.result)?;
            assert_eq!(clusters, json!([{"name": "office", "client_count": 1}]));
        }
        other => panic!("expected a tool call event, got {other:?}"),
    }
    assert_eq!(events[1], StreamEvent::content("One cluster: "));
    assert_eq!(events[2], StreamEvent::content("office."));
    assert!(matches!(
        &events[3],
        StreamEvent::Done { full_message, tool_calls }
            if full_message == "One cluster: office." && tool_calls.len() == 1
    ));
    Ok(())
}

#[tokio::test]
async fn test_provider_failure_is_reported_once() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_rounds(
        &server,
        vec![ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "maximum context length exceeded",
                "type": "invalid_request_error",
                "code": "context_length_exceeded"
            }
        }))],
    )
    .await;
    let agent = agent_for(&server, Arc::new(MemoryStore::new())).await?;

    let events: Vec<StreamEvent> = agent
        .chat_stream(ChatRequest::new("hi"), CancellationToken::new())
        .collect()
        .await;
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], StreamEvent::Error { code, .. } if code == "transport_error"));

    let err = agent.chat(ChatRequest::new("hi")).await.unwrap_err();
    assert_eq!(err.code(), "transport_error");
    Ok(())
}
