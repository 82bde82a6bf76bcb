//! HTTP server inbound adapter that exposes generation via REST and SSE.

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context as AnyhowContext, Result};
use axum::response::sse::{Event, KeepAlive};
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response, Sse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_stream::{StreamExt, wrappers::UnboundedReceiverStream};
use tracing::{info, warn};

use crate::{
    adapters::outbound::export::{DocumentExporter, ExportFormat},
    core::{
        domain::{ModelDiscovery, ResultSet},
        error::Error as CoreError,
        ports::{DocumentService, GenerateRequest, PreviewRequest},
    },
};

/// Configuration options for the server adapter.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub keep_alive: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(15),
        }
    }
}

/// Server adapter that exposes the `DocumentService` via HTTP.
pub struct ServerAdapter {
    service: Arc<dyn DocumentService>,
    options: ServeOptions,
}

impl ServerAdapter {
    pub fn new(service: Arc<dyn DocumentService>, options: ServeOptions) -> Self {
        Self { service, options }
    }

    /// Run the HTTP server on the given address.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .context("failed to bind docbatch listener")?;
        self.run_with_listener(listener).await
    }

    /// Run the HTTP server with an existing listener (useful for tests).
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<()> {
        let state = Arc::new(ServeState::new(self.service, self.options));
        let router = build_router(state);
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "docbatch serve listening");
        } else {
            info!("docbatch serve listening");
        }
        axum::serve(listener, router.into_make_service())
            .await
            .context("serve endpoint failed")
    }
}

struct ServeState {
    service: Arc<dyn DocumentService>,
    exporter: DocumentExporter,
    keep_alive: Duration,
}

impl ServeState {
    fn new(service: Arc<dyn DocumentService>, options: ServeOptions) -> Self {
        Self {
            service,
            exporter: DocumentExporter::new(),
            keep_alive: options.keep_alive.max(Duration::from_secs(1)),
        }
    }
}

fn build_router(state: Arc<ServeState>) -> Router {
    Router::new()
        .route("/models", get(models_handler))
        .route("/preview", post(preview_handler))
        .route("/generate", post(generate_handler))
        .route("/generate/stream", post(generate_stream_handler))
        .route("/export", post(export_handler))
        .with_state(state)
}

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        Self {
            error: err.to_string(),
            retryable: err.is_retryable(),
            index: err.request_index(),
        }
    }
}

struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::Config(_) | CoreError::Template(_) => StatusCode::BAD_REQUEST,
        CoreError::Provider { .. } | CoreError::Discovery(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

async fn models_handler(State(state): State<Arc<ServeState>>) -> Json<ModelDiscovery> {
    Json(state.service.discover_models().await)
}

#[derive(Debug, Serialize, Deserialize)]
struct PreviewResponse {
    content: String,
}

async fn preview_handler(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let content = state.service.preview(request).await?;
    Ok(Json(PreviewResponse { content }))
}

async fn generate_handler(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<ResultSet>, ApiError> {
    Ok(Json(state.service.generate(request, None).await?))
}

/// Streams `progress` events while the batch runs, then exactly one `result` or `error` event.
async fn generate_stream_handler(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let service = state.service.clone();

    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let forward = async move {
            while let Some(event) = event_rx.recv().await {
                let _ = progress_tx.send(sse_json("progress", &event));
            }
        };
        let (outcome, ()) = tokio::join!(service.generate(request, Some(event_tx)), forward);
        let last = match outcome {
            Ok(result) => sse_json("result", &result),
            Err(err) => sse_json("error", &ErrorBody::from(&err)),
        };
        let _ = tx.send(last);
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive)
            .text("keep-alive"),
    )
}

fn sse_json<T: Serialize>(name: &str, payload: &T) -> Event {
    match Event::default().event(name).json_data(payload) {
        Ok(event) => event,
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize {name} event");
            Event::default().comment("serialization_error")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExportRequest {
    format: ExportFormat,
    result: ResultSet,
}

async fn export_handler(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let bytes = state.exporter.render(&request.result, request.format)?;
    let disposition = format!(
        "attachment; filename=\"generated_docs.{}\"",
        request.format.extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, request.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        Result as CoreResult,
        domain::{GeneratedDocument, GenerationEvent},
        ports::EventSender,
    };
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use chrono::Local;
    use tower::ServiceExt;

    struct MockDocumentService {
        fail_with: Option<fn() -> CoreError>,
    }

    impl MockDocumentService {
        fn ok() -> Self {
            Self { fail_with: None }
        }

        fn failing(make: fn() -> CoreError) -> Self {
            Self {
                fail_with: Some(make),
            }
        }
    }

    fn sample_result(n: usize) -> ResultSet {
        ResultSet {
            requested: n,
            documents: (1..=n)
                .map(|index| GeneratedDocument {
                    index,
                    content: format!("doc {index}"),
                    generated_at: Local::now(),
                })
                .collect(),
            failures: Vec::new(),
        }
    }

    #[async_trait]
    impl DocumentService for MockDocumentService {
        async fn generate(
            &self,
            request: GenerateRequest,
            events: Option<EventSender>,
        ) -> CoreResult<ResultSet> {
            if let Some(tx) = &events {
                for completed in 1..=request.num_docs {
                    let _ = tx.send(GenerationEvent::DocumentCompleted {
                        index: completed,
                        completed,
                        total: request.num_docs,
                        fraction: completed as f64 / request.num_docs as f64,
                    });
                }
            }
            if let Some(make) = self.fail_with {
                return Err(make());
            }
            Ok(sample_result(request.num_docs))
        }

        async fn preview(&self, request: PreviewRequest) -> CoreResult<String> {
            if let Some(make) = self.fail_with {
                return Err(make());
            }
            Ok(format!("preview of {}", request.template))
        }

        async fn discover_models(&self) -> ModelDiscovery {
            ModelDiscovery::FellBackToDefault {
                models: vec!["claude-3-5-sonnet-latest".into()],
                reason: "offline".into(),
            }
        }
    }

    fn app(service: MockDocumentService) -> Router {
        build_router(Arc::new(ServeState::new(
            Arc::new(service),
            ServeOptions::default(),
        )))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn models_endpoint_reports_fallback() {
        let response = app(MockDocumentService::ok())
            .oneshot(
                axum::http::Request::builder()
                    .uri("/models")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(value["source"], "fell_back_to_default");
        assert_eq!(value["models"][0], "claude-3-5-sonnet-latest");
    }

    #[tokio::test]
    async fn generate_endpoint_returns_result_set() {
        let response = app(MockDocumentService::ok())
            .oneshot(post_json(
                "/generate",
                serde_json::json!({"template": "hi", "num_docs": 3}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let result: ResultSet = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(result.len(), 3);
    }

    #[tokio::test]
    async fn template_errors_map_to_bad_request() {
        let response = app(MockDocumentService::failing(|| {
            CoreError::Template("missing values for: topic".into())
        }))
        .oneshot(post_json("/preview", serde_json::json!({"template": "{%topic%}"})))
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body.error.contains("topic"));
        assert!(!body.retryable);
    }

    #[tokio::test]
    async fn provider_errors_map_to_bad_gateway() {
        let response = app(MockDocumentService::failing(|| CoreError::Provider {
            index: 2,
            provider: "openai".into(),
            details: "HTTP 429".into(),
            retryable: true,
        }))
        .oneshot(post_json(
            "/generate",
            serde_json::json!({"template": "hi", "num_docs": 2}),
        ))
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: ErrorBody = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body.index, Some(2));
        assert!(body.retryable);
    }

    #[tokio::test]
    async fn stream_endpoint_ends_with_result_event() {
        let response = app(MockDocumentService::ok())
            .oneshot(post_json(
                "/generate/stream",
                serde_json::json!({"template": "hi", "num_docs": 2}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert_eq!(body.matches("event: progress").count(), 2);
        let result_at = body.find("event: result").expect("result event present");
        assert!(body.rfind("event: progress").unwrap() < result_at);
        assert!(!body.contains("event: error"));
    }

    #[tokio::test]
    async fn stream_endpoint_reports_errors_as_events() {
        let response = app(MockDocumentService::failing(|| {
            CoreError::Config("num_docs must be at least 1".into())
        }))
        .oneshot(post_json(
            "/generate/stream",
            serde_json::json!({"template": "hi", "num_docs": 1}),
        ))
        .await
        .unwrap();
        let body = body_string(response).await;
        assert!(body.contains("event: error"));
        assert!(!body.contains("event: result"));
    }

    #[tokio::test]
    async fn export_endpoint_returns_attachment() {
        let result = serde_json::to_value(sample_result(2)).unwrap();
        let response = app(MockDocumentService::ok())
            .oneshot(post_json(
                "/export",
                serde_json::json!({"format": "text", "result": result}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"generated_docs.txt\""
        );
        let body = body_string(response).await;
        assert_eq!(body, "doc 1\n\n===== Document Separator =====\n\ndoc 2");
    }
}
