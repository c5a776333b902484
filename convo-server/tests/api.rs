use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use convo_agent::ConversationAgent;
use convo_core::config::AgentConfig;
use convo_core::session::SessionStore;
use convo_providers::{LLMProvider, LLMResponse, Message, ProviderError, ProviderResult};
use convo_server::{build_router, AppState};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tower::ServiceExt;

/// Echoes the last user message, or fails when it says "fail"
struct EchoProvider;

#[async_trait]
impl LLMProvider for EchoProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        _model: Option<String>,
        _max_tokens: u32,
        _temperature: f32,
    ) -> ProviderResult<LLMResponse> {
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        if last == "fail" {
            return Err(ProviderError::ApiError("HTTP 500: upstream down".to_string()));
        }
        Ok(LLMResponse::text(format!("echo: {last}")))
    }

    fn get_default_model(&self) -> String {
        "echo".to_string()
    }
}

async fn test_state() -> AppState {
    let store = SessionStore::in_memory().await.unwrap();
    let agent = ConversationAgent::new(Arc::new(EchoProvider), store, AgentConfig::default());
    AppState::new(Arc::new(agent))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn chat_then_history_and_sessions() {
    let app = build_router(test_state().await, None);

    let (status, body) = send(
        &app,
        "POST",
        "/chat",
        Some(json!({"content": "hi", "session_id": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "echo: hi"}));

    let (status, body) = send(&app, "GET", "/sessions/u1/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"messages": [
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "echo: hi"}
        ]})
    );

    let (status, body) = send(&app, "GET", "/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body.as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["session_id"], "u1");
    assert!(sessions[0]["last_updated"].is_string());
}

#[tokio::test]
async fn chat_defaults_session_id() {
    let app = build_router(test_state().await, None);

    let (status, _) = send(&app, "POST", "/chat", Some(json!({"content": "hey"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", "/sessions/default_user/history", None).await;
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn failed_turn_returns_500_with_detail() {
    let app = build_router(test_state().await, None);

    let (status, body) = send(
        &app,
        "POST",
        "/chat",
        Some(json!({"content": "fail", "session_id": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("upstream down"));

    // The user message stays persisted without a reply
    let (_, body) = send(&app, "GET", "/sessions/u1/history", None).await;
    assert_eq!(
        body,
        json!({"messages": [{"role": "user", "content": "fail"}]})
    );
}

#[tokio::test]
async fn prompt_routes() {
    let state = test_state().await;
    let default_prompt = state.agent.default_system_prompt().to_string();
    let app = build_router(state, None);

    let (status, body) = send(&app, "GET", "/sessions/u1/prompt", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"prompt": default_prompt}));

    let (status, body) = send(
        &app,
        "POST",
        "/sessions/u1/prompt",
        Some(json!({"prompt": "You are terse.", "session_id": "ignored"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (_, body) = send(&app, "GET", "/sessions/u1/prompt", None).await;
    assert_eq!(body, json!({"prompt": "You are terse."}));

    let (status, body) = send(&app, "POST", "/sessions/u1/use_prompt/teacher", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (_, prompts) = send(&app, "GET", "/prompts", None).await;
    let (_, body) = send(&app, "GET", "/sessions/u1/full_history", None).await;
    assert_eq!(body["system_prompt"], prompts["teacher"]);
    assert_eq!(body["session_id"], "u1");
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn unknown_prompt_type_is_404() {
    let app = build_router(test_state().await, None);

    let (status, body) = send(&app, "POST", "/sessions/u1/use_prompt/pirate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Prompt type not found"}));
}

#[tokio::test]
async fn prompts_lists_presets() {
    let app = build_router(test_state().await, None);

    let (status, body) = send(&app, "GET", "/prompts", None).await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    for key in ["coder", "french", "teacher", "writer"] {
        assert!(keys.contains(&key), "missing prompt {key}");
    }
}

#[tokio::test]
async fn delete_session_clears_history() {
    let app = build_router(test_state().await, None);
    send(
        &app,
        "POST",
        "/chat",
        Some(json!({"content": "hi", "session_id": "u1"})),
    )
    .await;

    let (status, body) = send(&app, "DELETE", "/sessions/u1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "success"}));

    let (_, body) = send(&app, "GET", "/sessions/u1/history", None).await;
    assert_eq!(body, json!({"messages": []}));
    let (_, body) = send(&app, "GET", "/sessions", None).await;
    assert_eq!(body, json!([]));

    // Deleting again is not an error
    let (status, _) = send(&app, "DELETE", "/sessions/u1", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn static_dir_serves_unmatched_paths() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>convo</h1>").unwrap();
    let app = build_router(test_state().await, Some(dir.path()));

    let request = Request::builder()
        .uri("/index.html")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"<h1>convo</h1>");

    let (status, _) = send(&app, "GET", "/prompts", None).await;
    assert_eq!(status, StatusCode::OK);
}

async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(test_state().await, None);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{}", addr)
}

#[tokio::test]
async fn websocket_runs_one_turn_per_frame() {
    let base = spawn_server().await;
    let (mut ws, _) = connect_async(format!("{base}/ws/u1")).await.unwrap();

    for content in ["hi", "again"] {
        ws.send(WsMessage::Text(content.to_string())).await.unwrap();
        let frame = timeout(Duration::from_secs(3), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = match frame {
            WsMessage::Text(text) => text,
            other => panic!("expected a text frame, got {other:?}"),
        };
        let reply: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            reply,
            json!({"response": format!("echo: {content}"), "session_id": "u1"})
        );
    }
}

#[tokio::test]
async fn websocket_closes_on_failed_turn() {
    let base = spawn_server().await;
    let (mut ws, _) = connect_async(format!("{base}/ws/u1")).await.unwrap();

    ws.send(WsMessage::Text("fail".to_string())).await.unwrap();
    let frame = timeout(Duration::from_secs(3), ws.next()).await.unwrap();
    match frame {
        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }
}
