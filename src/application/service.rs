//! Application service implementation that provides the `DocumentService` trait.
//! This is the primary use-case port implementation that driving adapters consume.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    application::{catalog::ModelCatalog, generator::BatchGenerator},
    core::{
        config::GenerationConfig,
        domain::{FailurePolicy, ModelDiscovery, ResultSet},
        error::{Error as CoreError, Result as CoreResult},
        ports::{
            Clock, CompletionProvider, DocumentService, EventSender, GenerateRequest,
            PreviewRequest, PromptRenderer,
        },
    },
};

/// Application service that implements `DocumentService`.
///
/// Holds the collaborators a run needs and is injected into driving adapters
/// (CLI, HTTP server). It keeps no state between calls.
pub struct AppService {
    provider: Arc<dyn CompletionProvider>,
    catalog: ModelCatalog,
    renderer: Arc<dyn PromptRenderer>,
    clock: Arc<dyn Clock>,
    config: Arc<GenerationConfig>,
    default_variables: BTreeMap<String, String>,
}

impl AppService {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        catalog: ModelCatalog,
        renderer: Arc<dyn PromptRenderer>,
        clock: Arc<dyn Clock>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            provider,
            catalog,
            renderer,
            clock,
            config: Arc::new(config.normalized()),
            default_variables: BTreeMap::new(),
        }
    }

    /// Variables used when a request does not supply a value of its own.
    pub fn with_default_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.default_variables = variables;
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    fn render(&self, template: &str, variables: &BTreeMap<String, String>) -> CoreResult<String> {
        if template.trim().is_empty() {
            return Err(CoreError::Template("prompt template is empty".into()));
        }
        let mut merged = self.default_variables.clone();
        merged.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        let message = self.renderer.render(template, &merged)?;
        debug!(chars = message.chars().count(), "rendered prompt template");
        Ok(message)
    }

    fn config_for(&self, model: Option<&str>) -> Arc<GenerationConfig> {
        match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(model) if model != self.config.model => Arc::new(self.config.with_model(model)),
            _ => self.config.clone(),
        }
    }

    fn generator(&self, config: Arc<GenerationConfig>) -> BatchGenerator {
        BatchGenerator::new(self.provider.clone(), config, self.clock.clone())
    }
}

#[async_trait]
impl DocumentService for AppService {
    async fn generate(
        &self,
        request: GenerateRequest,
        events: Option<EventSender>,
    ) -> CoreResult<ResultSet> {
        let message = self.render(&request.template, &request.variables)?;
        let config = self.config_for(request.model.as_deref());
        let concurrency = request.concurrency.unwrap_or(config.concurrency);
        info!(
            model = %config.model,
            num_docs = request.num_docs,
            concurrency,
            "generate request accepted"
        );

        let mut generator = self.generator(config).with_policy(request.policy);
        if let Some(tx) = events {
            generator = generator.with_events(tx);
        }
        generator
            .generate_documents(&message, request.num_docs, concurrency)
            .await
    }

    async fn preview(&self, request: PreviewRequest) -> CoreResult<String> {
        let message = self.render(&request.template, &request.variables)?;
        let config = self.config_for(request.model.as_deref());
        let result = self
            .generator(config)
            .with_policy(FailurePolicy::FailFast)
            .generate_documents(&message, 1, 1)
            .await?;
        result
            .into_texts()
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::System("preview produced no document".into()))
    }

    async fn discover_models(&self) -> ModelDiscovery {
        self.catalog.discover().await
    }
}
