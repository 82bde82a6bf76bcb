#![allow(dead_code)]

use std::net::SocketAddr;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Model name the mock answers with HTTP 500.
pub const FAILING_MODEL: &str = "always-fails";

/// Starts an OpenAI-compatible mock on its own runtime thread and returns its `/v1` base URL.
pub fn spawn_mock_openai() -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("mock runtime");
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
            tx.send(listener.local_addr().expect("mock addr"))
                .expect("report mock addr");
            axum::serve(listener, router()).await.expect("mock server");
        });
    });
    let addr: SocketAddr = rx.recv().expect("mock server started");
    format!("http://{addr}/v1")
}

/// Starts the mock on the current runtime.
pub async fn start_mock_openai() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router()).await;
    });
    format!("http://{addr}/v1")
}

fn router() -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
}

async fn chat_completions(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["model"] == FAILING_MODEL {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "upstream exploded"}})),
        );
    }
    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": format!("Generated: {prompt}")}
            }]
        })),
    )
}

async fn list_models() -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [
            {"id": "gpt-4o"},
            {"id": "gpt-4o-audio-preview"},
            {"id": "text-embedding-3-small"},
            {"id": "deepseek-chat"}
        ]
    }))
}
