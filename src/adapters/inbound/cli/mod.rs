//! CLI inbound adapter that translates command-line arguments into application service calls.

mod definitions;

pub use definitions::*;

use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result, anyhow, bail, ensure};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

use crate::{
    adapters::{
        inbound::server::{ServeOptions, ServerAdapter},
        outbound::export::{DocumentExporter, ExportFormat},
    },
    application::catalog::CatalogRules,
    config::{DocbatchConfig, read_template_file},
    core::{
        config::GenerationConfig,
        domain::{GenerationEvent, ModelDiscovery, ResultSet},
        ports::{DocumentService, GenerateRequest, PreviewRequest},
    },
    env,
};

/// Everything a command needs after merging flags, the config file and the environment.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub generation: GenerationConfig,
    pub api_key: String,
    pub catalog: CatalogRules,
    /// Defaults from the config file; CLI `--var` values are sent per request.
    pub variables: BTreeMap<String, String>,
    pub template: Option<String>,
}

impl RunSettings {
    /// Merges settings with precedence CLI > config file > environment > defaults.
    pub fn resolve(
        provider: &ProviderArgs,
        template: Option<&TemplateArgs>,
        concurrency: Option<usize>,
        preview_limit: Option<usize>,
    ) -> Result<Self> {
        let file = match &provider.config {
            Some(path) => DocbatchConfig::from_path(path)?,
            None => DocbatchConfig::default(),
        };

        let mut generation = file.generation.apply(GenerationConfig::default());
        if let Some(model) = provider.model.as_deref().map(str::trim) {
            if model.is_empty() {
                bail!("--model must not be blank");
            }
            generation.model = model.to_string();
        }
        if let Some(temperature) = provider.temperature {
            ensure!(
                (0.0..=2.0).contains(&temperature),
                "--temperature must be within 0.0..=2.0"
            );
            generation.temperature = temperature;
        }
        if let Some(max_tokens) = provider.max_tokens {
            generation.max_tokens = max_tokens;
        }
        generation.base_url = provider
            .base_url
            .clone()
            .or(file.generation.base_url.clone())
            .or_else(|| env::resolve_base_url(None));
        generation.concurrency = concurrency
            .or(file.generation.concurrency)
            .unwrap_or(DEFAULT_CLI_CONCURRENCY);
        if let Some(limit) = preview_limit {
            generation.preview_limit = limit;
        }

        let api_key = env::resolve_api_key(provider.api_key.clone())?;

        let template = match template {
            Some(args) => match (&args.template, &args.prompt) {
                (Some(path), _) => Some(read_template_file(path, None)?),
                (None, Some(inline)) => Some(inline.clone()),
                (None, None) => file.template.clone(),
            },
            None => file.template.clone(),
        };

        Ok(Self {
            generation: generation.normalized(),
            api_key,
            catalog: file.catalog,
            variables: file.variables,
            template,
        })
    }

    pub fn require_template(&self) -> Result<String> {
        self.template
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                anyhow!("No prompt template: pass --template, --prompt, or set `template` in the config file")
            })
    }
}

/// Builds the application service for resolved settings.
pub type ServiceFactory =
    Arc<dyn Fn(&RunSettings) -> Result<Arc<dyn DocumentService>> + Send + Sync>;

/// CLI adapter that consumes the `DocumentService` to execute commands.
pub struct CliAdapter {
    factory: ServiceFactory,
    exporter: DocumentExporter,
}

impl CliAdapter {
    pub fn new(factory: ServiceFactory) -> Self {
        Self {
            factory,
            exporter: DocumentExporter::new(),
        }
    }

    /// Execute a CLI command by dispatching to the appropriate service method.
    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Generate(args) => self.generate_command(args).await,
            Commands::Preview(args) => self.preview_command(args).await,
            Commands::Models(args) => self.models_command(args).await,
            Commands::Serve(args) => self.serve_command(args).await,
        }
    }

    async fn generate_command(&self, args: GenerateArgs) -> Result<()> {
        let settings = RunSettings::resolve(
            &args.provider,
            Some(&args.template),
            args.concurrent,
            args.preview_limit,
        )?;
        let template = settings.require_template()?;
        let format = args
            .format
            .unwrap_or_else(|| ExportFormat::from_path(&args.output));
        let service = (self.factory)(&settings)?;

        let num_docs = usize::try_from(args.num).context("--num is too large")?;
        let request = GenerateRequest {
            template,
            variables: args.template.variables.iter().cloned().collect(),
            num_docs,
            concurrency: Some(settings.generation.concurrency),
            policy: args.on_error.into(),
            model: None,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = tokio::spawn(report_progress(rx));
        let outcome = service.generate(request, Some(tx)).await;
        // The sender is gone once `generate` returns, so the reporter drains and exits.
        let _ = reporter.await;
        let result = outcome?;

        print_preview(&result, settings.generation.preview_limit);
        print_summary(&result, &settings.generation);

        if result.is_empty() {
            bail!("No documents were generated; nothing to export");
        }
        self.exporter.write(&result, format, &args.output)?;
        println!("Documents saved to: {}", args.output.display());
        Ok(())
    }

    async fn preview_command(&self, args: PreviewArgs) -> Result<()> {
        let settings = RunSettings::resolve(&args.provider, Some(&args.template), None, None)?;
        let template = settings.require_template()?;
        let service = (self.factory)(&settings)?;
        let content = service
            .preview(PreviewRequest {
                template,
                variables: args.template.variables.iter().cloned().collect(),
                model: None,
            })
            .await?;
        println!("--- Preview Start ---\n{content}\n--- Preview End ---");
        Ok(())
    }

    async fn models_command(&self, args: ModelsArgs) -> Result<()> {
        let settings = RunSettings::resolve(&args.provider, None, None, None)?;
        let service = (self.factory)(&settings)?;
        let discovery = service.discover_models().await;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&discovery)?);
            return Ok(());
        }

        if let ModelDiscovery::FellBackToDefault { reason, .. } = &discovery {
            warn!("Model listing unavailable ({reason}); showing default models");
        }
        println!("Available models:");
        for model in discovery.models() {
            println!("- {model}");
        }
        Ok(())
    }

    async fn serve_command(&self, args: ServeArgs) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
            .parse()
            .context("Invalid bind/port combination for serve command")?;
        let settings = RunSettings::resolve(&args.provider, None, args.concurrent, None)?;
        let service = (self.factory)(&settings)?;
        info!("Serving docbatch API on http://{addr}");
        ServerAdapter::new(service, ServeOptions::default())
            .run(addr)
            .await
    }
}

async fn report_progress(mut rx: UnboundedReceiver<GenerationEvent>) {
    while let Some(event) = rx.recv().await {
        match event.progress() {
            Some(fraction) => info!("[{:>3.0}%] {}", fraction * 100.0, event.status_line()),
            None => info!("{}", event.status_line()),
        }
    }
}

fn print_preview(result: &ResultSet, limit: usize) {
    let shown = result.len().min(limit);
    if shown < result.len() {
        println!(
            "Previewing the first {shown} of {} documents; the export contains all of them.",
            result.len()
        );
    }
    for (position, doc) in result.documents.iter().take(shown).enumerate() {
        println!("\n=== Document {} ===\n{}", position + 1, doc.content);
    }
}

fn print_summary(result: &ResultSet, config: &GenerationConfig) {
    println!("\nGeneration summary:");
    println!("- Model: {}", config.model);
    println!("- Documents generated: {} of {}", result.len(), result.requested);
    println!("- Concurrency per batch: {}", config.concurrency);
    if !result.failures.is_empty() {
        println!("- Failed documents: {}", result.failures.len());
        for failure in &result.failures {
            let hint = if failure.retryable { " (retryable)" } else { "" };
            println!("  - #{}{hint}: {}", failure.index, failure.message);
        }
    }
}
