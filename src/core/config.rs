use serde::{Deserialize, Serialize};

/// Upper bound on in-flight completion requests, whatever the caller asks for.
pub const MAX_CONCURRENCY: usize = 50;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.8;
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

/// Clamps a requested concurrency window to `1..=MAX_CONCURRENCY`.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Settings for one generation run. Built once, then shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: Option<String>,
    pub concurrency: usize,
    pub preview_limit: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            base_url: None,
            concurrency: MAX_CONCURRENCY,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

impl GenerationConfig {
    /// Returns a copy with the concurrency ceiling clamped into range.
    pub fn normalized(mut self) -> Self {
        self.concurrency = clamp_concurrency(self.concurrency);
        self
    }

    /// Returns a copy targeting a different model, leaving `self` untouched.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}
