//! Outbound ports: services the application layer calls out to.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use crate::core::{config::GenerationConfig, error::Result};

/// One chat-completion call against a remote endpoint.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name used in error messages and logs.
    fn name(&self) -> &str;

    /// Sends `message` as a single user turn and returns the first choice's text.
    ///
    /// Failures must be reported as [`crate::core::Error::Provider`] tagged with `index`.
    /// Implementations never retry.
    async fn complete(&self, message: &str, index: usize, config: &GenerationConfig)
    -> Result<String>;
}

/// Enumerates model identifiers exposed by the provider.
#[async_trait]
pub trait ModelLister: Send + Sync {
    async fn list_models(&self) -> Result<Vec<String>>;
}

/// Substitutes `{%name%}` placeholders in prompt templates.
pub trait PromptRenderer: Send + Sync {
    /// Placeholder names in order of first appearance, without duplicates.
    fn placeholders(&self, template: &str) -> Vec<String>;

    /// Renders `template`, failing when any placeholder has no value.
    fn render(&self, template: &str, variables: &BTreeMap<String, String>) -> Result<String>;
}

/// Abstraction for getting the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}
