//! Inbound ports (use-case ports) define the application service interface that
//! driving adapters (CLI, HTTP server) consume.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::{
    domain::{FailurePolicy, GenerationEvent, ModelDiscovery, ResultSet},
    error::Result,
};

/// Sending half of a run's progress stream.
pub type EventSender = UnboundedSender<GenerationEvent>;

/// Request to generate a batch of documents from one template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub template: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub num_docs: usize,
    /// Falls back to the configured ceiling when absent.
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub policy: FailurePolicy,
    /// Per-request model override.
    #[serde(default)]
    pub model: Option<String>,
}

/// Request to render a template and generate a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub template: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Primary inbound port for document generation.
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Render the template and run a full batch, streaming progress to `events`.
    async fn generate(
        &self,
        request: GenerateRequest,
        events: Option<EventSender>,
    ) -> Result<ResultSet>;

    /// Render the template and generate exactly one document.
    async fn preview(&self, request: PreviewRequest) -> Result<String>;

    /// List chat-capable models, falling back to defaults when listing fails.
    async fn discover_models(&self) -> ModelDiscovery;
}
