use std::{fmt, sync::Arc};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One completion request: the shared rendered prompt and its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTask {
    pub message: Arc<str>,
    pub index: usize,
}

/// A successfully generated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub index: usize,
    pub content: String,
    pub generated_at: DateTime<Local>,
}

/// A request that failed while running under [`FailurePolicy::CollectPartial`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub index: usize,
    pub message: String,
    pub retryable: bool,
}

/// What a batch run does when a single request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the whole run on the first failure, discarding partial results.
    #[default]
    FailFast,
    /// Record failures per index and keep going.
    CollectPartial,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail-fast",
            FailurePolicy::CollectPartial => "collect-partial",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Documents produced by one batch run, in completion order (batch-major).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub requested: usize,
    pub documents: Vec<GeneratedDocument>,
    #[serde(default)]
    pub failures: Vec<DocumentFailure>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// True when every requested document was generated.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.documents.len() == self.requested
    }

    pub fn texts(&self) -> Vec<&str> {
        self.documents.iter().map(|doc| doc.content.as_str()).collect()
    }

    pub fn into_texts(self) -> Vec<String> {
        self.documents.into_iter().map(|doc| doc.content).collect()
    }
}

/// Progress notifications emitted by a batch run, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    Started {
        total: usize,
        concurrency: usize,
        batches: usize,
    },
    BatchStarted {
        batch: usize,
        batches: usize,
        size: usize,
    },
    DocumentCompleted {
        index: usize,
        completed: usize,
        total: usize,
        fraction: f64,
    },
    DocumentFailed {
        index: usize,
        completed: usize,
        total: usize,
        fraction: f64,
        message: String,
    },
    Finished {
        succeeded: usize,
        failed: usize,
    },
    Aborted {
        index: usize,
        message: String,
    },
}

impl GenerationEvent {
    /// Completion fraction carried by per-document events.
    pub fn progress(&self) -> Option<f64> {
        match self {
            GenerationEvent::DocumentCompleted { fraction, .. }
            | GenerationEvent::DocumentFailed { fraction, .. } => Some(*fraction),
            _ => None,
        }
    }

    /// Human-readable status text for this event.
    pub fn status_line(&self) -> String {
        match self {
            GenerationEvent::Started { total, .. } => {
                format!("Generating {total} documents...")
            }
            GenerationEvent::BatchStarted { batch, batches, .. } => {
                format!("Generating documents (batch {batch} of {batches})...")
            }
            GenerationEvent::DocumentCompleted {
                completed, total, ..
            } => format!("{completed} of {total} documents done"),
            GenerationEvent::DocumentFailed {
                index,
                completed,
                total,
                message,
                ..
            } => format!("{completed} of {total} documents done (document {index} failed: {message})"),
            GenerationEvent::Finished { failed: 0, .. } => "Document generation complete".to_string(),
            GenerationEvent::Finished { succeeded, failed } => format!(
                "Document generation complete ({succeeded} succeeded, {failed} failed)"
            ),
            GenerationEvent::Aborted { index, message } => {
                format!("Document generation aborted at document {index}: {message}")
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationEvent::Finished { .. } | GenerationEvent::Aborted { .. }
        )
    }
}

/// Outcome of model discovery. Discovery never fails outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ModelDiscovery {
    Discovered { models: Vec<String> },
    FellBackToDefault { models: Vec<String>, reason: String },
}

impl ModelDiscovery {
    pub fn models(&self) -> &[String] {
        match self {
            ModelDiscovery::Discovered { models }
            | ModelDiscovery::FellBackToDefault { models, .. } => models,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ModelDiscovery::FellBackToDefault { .. })
    }
}
