use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{domain::ModelDiscovery, ports::ModelLister};

pub const DEFAULT_SUPPORTED_PREFIXES: &[&str] = &["gpt-4o", "claude-3-5", "gemini-1.5", "deepseek-"];
pub const DEFAULT_EXCLUDED_KEYWORDS: &[&str] = &[
    "vision",
    "instruct",
    "embedding",
    "audio",
    "dalle",
    "realtime",
    "search",
    "haiku",
];
pub const DEFAULT_FALLBACK_MODELS: &[&str] =
    &["claude-3-5-sonnet-latest", "claude-3-5-sonnet-20241022"];

/// Allow/deny rules applied to the raw model listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogRules {
    pub supported_prefixes: Vec<String>,
    pub excluded_keywords: Vec<String>,
    pub fallback_models: Vec<String>,
}

impl Default for CatalogRules {
    fn default() -> Self {
        Self {
            supported_prefixes: to_owned(DEFAULT_SUPPORTED_PREFIXES),
            excluded_keywords: to_owned(DEFAULT_EXCLUDED_KEYWORDS),
            fallback_models: to_owned(DEFAULT_FALLBACK_MODELS),
        }
    }
}

impl CatalogRules {
    pub fn accepts(&self, model_id: &str) -> bool {
        let lowered = model_id.to_lowercase();
        self.supported_prefixes
            .iter()
            .any(|prefix| model_id.starts_with(prefix.as_str()))
            && !self
                .excluded_keywords
                .iter()
                .any(|keyword| lowered.contains(&keyword.to_lowercase()))
    }

    /// Keeps accepted ids, sorted and de-duplicated.
    pub fn filter<I>(&self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut models: Vec<String> = ids.into_iter().filter(|id| self.accepts(id)).collect();
        models.sort();
        models.dedup();
        models
    }
}

/// Best-effort discovery of chat-capable models.
pub struct ModelCatalog {
    lister: Arc<dyn ModelLister>,
    rules: CatalogRules,
}

impl ModelCatalog {
    pub fn new(lister: Arc<dyn ModelLister>, rules: CatalogRules) -> Self {
        Self { lister, rules }
    }

    pub fn rules(&self) -> &CatalogRules {
        &self.rules
    }

    pub async fn discover(&self) -> ModelDiscovery {
        match self.lister.list_models().await {
            Ok(ids) => {
                let listed = ids.len();
                let models = self.rules.filter(ids);
                debug!(listed, kept = models.len(), "filtered provider model list");
                if models.is_empty() {
                    self.fall_back(format!(
                        "none of the {listed} listed models matched the supported families"
                    ))
                } else {
                    ModelDiscovery::Discovered { models }
                }
            }
            Err(err) => self.fall_back(err.to_string()),
        }
    }

    fn fall_back(&self, reason: String) -> ModelDiscovery {
        warn!(%reason, "model discovery degraded, using default model list");
        ModelDiscovery::FellBackToDefault {
            models: self.rules.fallback_models.clone(),
            reason,
        }
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
