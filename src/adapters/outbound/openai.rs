use std::{sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::core::{
    config::GenerationConfig,
    error::{Error as CoreError, Result as CoreResult},
    ports::{CompletionProvider, ModelLister},
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const PROVIDER_NAME: &str = "openai";

/// [`CompletionProvider`] for any endpoint speaking the OpenAI chat-completions API.
#[derive(Clone)]
pub struct OpenAiProvider {
    inner: Arc<OpenAiProviderInner>,
}

struct OpenAiProviderInner {
    api_key: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self> {
        Self::with_timeout(api_key, base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(anyhow!("API key may not be empty"));
        }

        let base_url = normalize_base_url(base_url.unwrap_or(DEFAULT_BASE_URL));
        if base_url.is_empty() {
            return Err(anyhow!("Base URL may not be empty"));
        }

        let http_client = build_http_client(timeout)?;
        Ok(Self {
            inner: Arc::new(OpenAiProviderInner {
                api_key: api_key.trim().to_string(),
                base_url,
                http_client,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.inner.base_url)
    }

    fn provider_error(index: usize, details: String, retryable: bool) -> CoreError {
        CoreError::Provider {
            index,
            provider: PROVIDER_NAME.to_string(),
            details,
            retryable,
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.inner.base_url)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(
        &self,
        message: &str,
        index: usize,
        config: &GenerationConfig,
    ) -> CoreResult<String> {
        let body = ChatCompletionRequest {
            model: &config.model,
            messages: [ChatMessage {
                role: "user",
                content: message,
            }],
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        debug!(index, model = %config.model, "sending chat completion request");
        let response = self
            .inner
            .http_client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.inner.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| Self::provider_error(index, format!("request failed: {err}"), true))?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            Self::provider_error(index, format!("failed to read response body: {err}"), true)
        })?;
        trace!(index, %status, bytes = text.len(), "chat completion response received");

        if !status.is_success() {
            return Err(Self::provider_error(
                index,
                format!("HTTP {status}: {}", truncate(&text, 300)),
                is_retryable_status(status),
            ));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|err| {
            Self::provider_error(index, format!("malformed response: {err}"), false)
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                Self::provider_error(
                    index,
                    "malformed response: no message content in first choice".into(),
                    false,
                )
            })
    }
}

#[async_trait]
impl ModelLister for OpenAiProvider {
    async fn list_models(&self) -> CoreResult<Vec<String>> {
        let response = self
            .inner
            .http_client
            .get(self.endpoint("models"))
            .bearer_auth(&self.inner.api_key)
            .send()
            .await
            .map_err(|err| CoreError::Discovery(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::Discovery(format!("HTTP {status}")));
        }
        let list: ModelList = response
            .json()
            .await
            .map_err(|err| CoreError::Discovery(format!("malformed model list: {err}")))?;
        Ok(list.data.into_iter().map(|entry| entry.id).collect())
    }
}

/// Trims trailing slashes and a pasted `/chat/completions` suffix.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    trimmed
        .strip_suffix("/chat/completions")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::CONFLICT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    // `reqwest::Client::default()` can consult OS-level proxy settings, which has been
    // observed to panic in sandboxed environments. Opt in with
    // `DOCBATCH_ENABLE_SYSTEM_PROXY=1`.
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if std::env::var_os("DOCBATCH_ENABLE_SYSTEM_PROXY").is_none() {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .map_err(|err| anyhow!("Failed to build HTTP client: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::HeaderMap,
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    async fn chat_handler(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer test-key");
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "invalid api key"}})),
            );
        }

        let content = body["messages"][0]["content"].as_str().unwrap_or_default();
        match body["model"].as_str().unwrap_or_default() {
            "rate-limited" => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "slow down"}})),
            ),
            "no-choices" => (StatusCode::OK, Json(json!({"choices": []}))),
            "null-content" => (
                StatusCode::OK,
                Json(json!({"choices": [{"message": {"role": "assistant", "content": null}}]})),
            ),
            model => (
                StatusCode::OK,
                Json(json!({
                    "choices": [{"message": {
                        "role": "assistant",
                        "content": format!("{model}|{content}|{}|{}", body["temperature"], body["max_tokens"]),
                    }}]
                })),
            ),
        }
    }

    async fn models_handler() -> Json<Value> {
        Json(json!({"data": [{"id": "gpt-4o"}, {"id": "whisper-1"}]}))
    }

    async fn spawn_mock() -> String {
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_handler))
            .route("/v1/models", get(models_handler));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn config(model: &str) -> GenerationConfig {
        GenerationConfig {
            model: model.into(),
            temperature: 0.5,
            max_tokens: 64,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn rejects_empty_api_key() {
        let err = OpenAiProvider::new("   ", None).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn normalizes_pasted_endpoints() {
        assert_eq!(
            normalize_base_url("https://api.302.ai/v1/chat/completions"),
            "https://api.302.ai/v1"
        );
        assert_eq!(normalize_base_url("https://x.test/v1/"), "https://x.test/v1");
        assert_eq!(normalize_base_url(" https://x.test/v1 "), "https://x.test/v1");
        let provider = OpenAiProvider::new("key", None).unwrap();
        assert_eq!(provider.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn debug_output_hides_api_key() {
        let provider = OpenAiProvider::new("sk-secret", Some("https://x.test/v1")).unwrap();
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("x.test"));
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn sends_single_user_message_with_sampling_settings() {
        let base = spawn_mock().await;
        let provider = OpenAiProvider::new("test-key", Some(base.as_str())).unwrap();
        let text = provider
            .complete("hello there", 1, &config("gpt-4o"))
            .await
            .unwrap();
        assert_eq!(text, "gpt-4o|hello there|0.5|64");
    }

    #[tokio::test]
    async fn rate_limit_is_a_retryable_provider_error() {
        let base = spawn_mock().await;
        let provider = OpenAiProvider::new("test-key", Some(base.as_str())).unwrap();
        let err = provider
            .complete("hi", 4, &config("rate-limited"))
            .await
            .unwrap_err();
        assert_eq!(err.request_index(), Some(4));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retryable() {
        let base = spawn_mock().await;
        let provider = OpenAiProvider::new("wrong-key", Some(base.as_str())).unwrap();
        let err = provider
            .complete("hi", 2, &config("gpt-4o"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn empty_or_null_choices_are_malformed() {
        let base = spawn_mock().await;
        let provider = OpenAiProvider::new("test-key", Some(base.as_str())).unwrap();
        for model in ["no-choices", "null-content"] {
            let err = provider.complete("hi", 1, &config(model)).await.unwrap_err();
            assert!(err.to_string().contains("malformed"), "{model}: {err}");
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let provider =
            OpenAiProvider::new("test-key", Some(format!("http://{addr}/v1").as_str())).unwrap();
        let err = provider.complete("hi", 9, &config("gpt-4o")).await.unwrap_err();
        assert_eq!(err.request_index(), Some(9));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn lists_model_ids() {
        let base = spawn_mock().await;
        let provider = OpenAiProvider::new("test-key", Some(base.as_str())).unwrap();
        let models = provider.list_models().await.unwrap();
        assert_eq!(models, vec!["gpt-4o".to_string(), "whisper-1".to_string()]);
    }
}
