mod tracing_setup;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use uuid::Uuid;

use docbatch::{
    adapters::{
        inbound::cli::{Cli, CliAdapter, RunSettings, ServiceFactory},
        outbound::{clock::SystemClock, openai::OpenAiProvider},
        templating::PlaceholderRenderer,
    },
    application::{AppService, ModelCatalog},
    core::ports::DocumentService,
};

use tracing_setup::JsonLogFormat;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let run_id = cli
        .command
        .writes_run_log()
        .then(|| Uuid::new_v4().to_string());
    let json_format = if cli.pretty {
        JsonLogFormat::Pretty
    } else {
        JsonLogFormat::Compact
    };
    let guard = tracing_setup::init(cli.verbose, cli.log_json, json_format, run_id.as_deref());

    let adapter = CliAdapter::new(service_factory());
    if let Err(err) = adapter.execute(cli.command).await {
        tracing::error!("Command failed: {err:#}");
        drop(guard);
        std::process::exit(1);
    }
}

fn service_factory() -> ServiceFactory {
    Arc::new(|settings: &RunSettings| -> Result<Arc<dyn DocumentService>> {
        let provider = Arc::new(OpenAiProvider::new(
            settings.api_key.clone(),
            settings.generation.base_url.as_deref(),
        )?);
        tracing::debug!(base_url = provider.base_url(), model = %settings.generation.model, "provider ready");
        let catalog = ModelCatalog::new(provider.clone(), settings.catalog.clone());
        let service = AppService::new(
            provider,
            catalog,
            Arc::new(PlaceholderRenderer::new()),
            Arc::new(SystemClock::new()),
            settings.generation.clone(),
        )
        .with_default_variables(settings.variables.clone());
        Ok(Arc::new(service))
    })
}
