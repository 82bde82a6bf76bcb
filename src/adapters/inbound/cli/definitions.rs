use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{adapters::outbound::export::ExportFormat, core::domain::FailurePolicy};

/// Concurrency used by `generate` when neither the flag nor the config file sets one.
pub const DEFAULT_CLI_CONCURRENCY: usize = 10;

/// docbatch CLI definition.
#[derive(Debug, Parser)]
#[command(name = "docbatch")]
#[command(about = "Batch document generator for OpenAI-compatible chat APIs", version)]
pub struct Cli {
    /// Enable verbose logging (debug level, timestamps).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Pretty-print JSON logs (requires --log-json).
    #[arg(long, global = true, requires = "log_json")]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a batch of documents from a prompt template.
    Generate(GenerateArgs),
    /// Render the template and generate a single document.
    Preview(PreviewArgs),
    /// List chat-capable models exposed by the endpoint.
    Models(ModelsArgs),
    /// Serve the HTTP front end.
    Serve(ServeArgs),
}

impl Commands {
    /// Whether this command deserves a per-run log file.
    pub fn writes_run_log(&self) -> bool {
        matches!(self, Commands::Generate(_) | Commands::Serve(_))
    }
}

#[derive(Debug, Args, Clone, Default)]
pub struct ProviderArgs {
    #[arg(long, help = "Path to a docbatch YAML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Model identifier [default: gpt-3.5-turbo]")]
    pub model: Option<String>,

    #[arg(long, help = "Sampling temperature [default: 0.8]")]
    pub temperature: Option<f32>,

    #[arg(long, help = "Maximum output tokens per document [default: 8192]")]
    pub max_tokens: Option<u32>,

    #[arg(long, help = "API key (falls back to OPENAI_API_KEY)")]
    pub api_key: Option<String>,

    #[arg(long, help = "API base URL (falls back to OPENAI_API_BASE)")]
    pub base_url: Option<String>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct TemplateArgs {
    #[arg(
        short,
        long,
        conflicts_with = "prompt",
        help = "Path to the prompt template file"
    )]
    pub template: Option<PathBuf>,

    #[arg(long, help = "Inline prompt template")]
    pub prompt: Option<String>,

    #[arg(
        short = 'V',
        long = "var",
        value_name = "NAME=VALUE",
        value_parser = parse_variable,
        help = "Value for a {%NAME%} placeholder (repeatable)"
    )]
    pub variables: Vec<(String, String)>,
}

#[derive(Debug, Args, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    #[arg(short = 'n', long = "num", default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..), help = "Number of documents to generate")]
    pub num: u64,

    #[arg(
        short = 'c',
        long = "concurrent",
        help = "Maximum concurrent requests, 1-50 [default: 10]"
    )]
    pub concurrent: Option<usize>,

    #[arg(
        short,
        long,
        default_value = "generated_docs.txt",
        help = "Output file path"
    )]
    pub output: PathBuf,

    #[arg(
        long,
        value_enum,
        help = "Export format (inferred from the output extension when omitted)"
    )]
    pub format: Option<ExportFormat>,

    #[arg(
        long,
        value_enum,
        default_value_t = OnError::FailFast,
        help = "What to do when a single request fails"
    )]
    pub on_error: OnError,

    #[arg(long, help = "Documents to echo after generation [default: 10]")]
    pub preview_limit: Option<usize>,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Args, Clone)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ModelsArgs {
    #[arg(long, help = "Print the discovery result as JSON")]
    pub json: bool,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1", help = "Address to bind")]
    pub bind: String,

    #[arg(long, default_value_t = 8080, help = "Port to listen on")]
    pub port: u16,

    #[arg(long, help = "Default concurrency for requests that omit one [default: 10]")]
    pub concurrent: Option<usize>,

    #[command(flatten)]
    pub provider: ProviderArgs,
}

/// Failure handling surfaced via the CLI.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OnError {
    FailFast,
    CollectPartial,
}

impl From<OnError> for FailurePolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::FailFast => FailurePolicy::FailFast,
            OnError::CollectPartial => FailurePolicy::CollectPartial,
        }
    }
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("variable name missing in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}
