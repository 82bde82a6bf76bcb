use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, anyhow, ensure};
use serde::Deserialize;

use crate::{
    application::catalog::CatalogRules,
    core::config::{GenerationConfig, MAX_CONCURRENCY},
};

/// Optional YAML configuration file.
///
/// ```yaml
/// generation:
///   model: deepseek-chat
///   temperature: 0.9
///   base_url: https://api.deepseek.com/v1
///   concurrency: 8
/// template: prompts/post.txt
/// variables:
///   persona: a travel blogger
/// catalog:
///   supported_prefixes: [deepseek-]
/// ```
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct DocbatchConfig {
    #[serde(default)]
    pub generation: GenerationSection,
    /// Inline template text, or a path relative to the config file.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub catalog: CatalogRules,
}

impl DocbatchConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let raw = fs::read_to_string(path_ref)
            .with_context(|| format!("Failed to read config file at {}", path_ref.display()))?;
        let mut config = Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid configuration in {}", path_ref.display()))?;
        let base_dir = path_ref.parent().unwrap_or_else(|| Path::new("."));
        config
            .hydrate_template(base_dir)
            .with_context(|| format!("Failed to load template for {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml).context("Unable to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.generation.validate()?;
        for name in self.variables.keys() {
            ensure!(!name.trim().is_empty(), "Variable names must not be blank");
        }
        ensure!(
            !self.catalog.supported_prefixes.is_empty(),
            "catalog.supported_prefixes must list at least one prefix"
        );
        ensure!(
            !self.catalog.fallback_models.is_empty(),
            "catalog.fallback_models must list at least one model"
        );
        Ok(())
    }

    fn hydrate_template(&mut self, base_dir: &Path) -> Result<()> {
        if let Some(raw) = &self.template {
            self.template = Some(resolve_template(raw, base_dir)?);
        }
        Ok(())
    }
}

impl FromStr for DocbatchConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_yaml_str(s)
    }
}

/// Generation settings a config file may override. Unset fields keep their defaults.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GenerationSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub preview_limit: Option<usize>,
}

impl GenerationSection {
    fn validate(&self) -> Result<()> {
        if let Some(model) = &self.model {
            ensure!(!model.trim().is_empty(), "generation.model must not be blank");
        }
        if let Some(temperature) = self.temperature {
            ensure!(
                (0.0..=2.0).contains(&temperature),
                "generation.temperature must be within 0.0..=2.0"
            );
        }
        if let Some(max_tokens) = self.max_tokens {
            ensure!(max_tokens > 0, "generation.max_tokens must be > 0");
        }
        if let Some(concurrency) = self.concurrency {
            ensure!(concurrency > 0, "generation.concurrency must be > 0");
        }
        Ok(())
    }

    /// Layers these values over `base`. Concurrency is clamped to the global ceiling.
    pub fn apply(&self, base: GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            model: self.model.clone().unwrap_or(base.model),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            base_url: self.base_url.clone().or(base.base_url),
            concurrency: self.concurrency.unwrap_or(base.concurrency).min(MAX_CONCURRENCY),
            preview_limit: self.preview_limit.unwrap_or(base.preview_limit),
        }
        .normalized()
    }
}

/// Reads a template file, accepting either an absolute path or one relative to `base_dir`.
pub fn read_template_file(path: &Path, base_dir: Option<&Path>) -> Result<String> {
    let joined: PathBuf = match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    };
    let content = fs::read_to_string(&joined)
        .with_context(|| format!("Failed to read prompt template {}", joined.display()))?;
    ensure!(
        !content.trim().is_empty(),
        "Prompt template {} is empty",
        joined.display()
    );
    Ok(content)
}

fn resolve_template(raw: &str, base_dir: &Path) -> Result<String> {
    if raw.contains('\n') {
        return Ok(raw.to_string());
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    let candidate = Path::new(trimmed);
    let joined: PathBuf = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    };

    if joined.is_file() {
        return read_template_file(&joined, None);
    }

    if looks_like_template_path(trimmed) {
        return Err(anyhow!(
            "Prompt template '{}' was not found relative to {}",
            trimmed,
            base_dir.display()
        ));
    }

    Ok(raw.to_string())
}

fn looks_like_template_path(value: &str) -> bool {
    value.contains('/')
        || value.contains('\\')
        || value.ends_with(".txt")
        || value.ends_with(".md")
        || value.ends_with(".tmpl")
}
