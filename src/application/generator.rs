use std::{collections::HashMap, ops::Range, sync::Arc};

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::{
    config::{GenerationConfig, clamp_concurrency},
    domain::{
        DocumentFailure, FailurePolicy, GeneratedDocument, GenerationEvent, GenerationTask,
        ResultSet,
    },
    error::{Error, Result},
    ports::{Clock, CompletionProvider, EventSender},
};

/// Fans a single prompt out into many independent completion requests.
///
/// Requests run in fixed windows of at most `concurrency` tasks. Each window is
/// awaited in full before the next one starts, so a slow request holds back the
/// following batch. Results are appended in the order requests finish.
pub struct BatchGenerator {
    provider: Arc<dyn CompletionProvider>,
    config: Arc<GenerationConfig>,
    clock: Arc<dyn Clock>,
    policy: FailurePolicy,
    events: Option<EventSender>,
}

impl BatchGenerator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        config: Arc<GenerationConfig>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            config,
            clock,
            policy: FailurePolicy::default(),
            events: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub async fn generate_documents(
        &self,
        message: &str,
        num_docs: usize,
        concurrency: usize,
    ) -> Result<ResultSet> {
        if num_docs == 0 {
            return Err(Error::Config(
                "number of documents must be at least 1".into(),
            ));
        }

        let window = clamp_concurrency(concurrency);
        let batches = num_docs.div_ceil(window);
        let message: Arc<str> = Arc::from(message);

        info!(
            num_docs,
            concurrency = window,
            batches,
            model = %self.config.model,
            policy = %self.policy,
            "starting document generation"
        );
        self.emit(GenerationEvent::Started {
            total: num_docs,
            concurrency: window,
            batches,
        });

        // Grows with completed documents; the requested count is caller input.
        let mut documents = Vec::with_capacity(num_docs.min(window));
        let mut failures = Vec::new();
        let mut completed = 0usize;

        for (batch_idx, range) in plan_batches(num_docs, window).enumerate() {
            debug!(
                batch = batch_idx + 1,
                first = range.start,
                last = range.end - 1,
                "dispatching batch"
            );
            self.emit(GenerationEvent::BatchStarted {
                batch: batch_idx + 1,
                batches,
                size: range.len(),
            });

            let mut join_set = JoinSet::new();
            let mut task_indices = HashMap::with_capacity(range.len());
            for index in range.clone() {
                let task = GenerationTask {
                    message: message.clone(),
                    index,
                };
                let provider = self.provider.clone();
                let config = self.config.clone();
                let handle = join_set.spawn(async move {
                    provider
                        .complete(&task.message, task.index, &config)
                        .await
                });
                task_indices.insert(handle.id(), index);
            }

            while let Some(joined) = join_set.join_next_with_id().await {
                let (task_id, outcome) = match joined {
                    Ok((task_id, outcome)) => (task_id, outcome),
                    Err(err) => {
                        let failure = Error::System(format!("request task did not finish: {err}"));
                        (err.id(), Err(failure))
                    }
                };
                let Some(index) = task_indices.remove(&task_id) else {
                    continue;
                };
                let outcome =
                    outcome.map_err(|err| err.for_request(index, self.provider.name()));
                completed += 1;
                let fraction = completed as f64 / num_docs as f64;

                match outcome {
                    Ok(content) => {
                        documents.push(GeneratedDocument {
                            index,
                            content,
                            generated_at: self.clock.now(),
                        });
                        self.emit(GenerationEvent::DocumentCompleted {
                            index,
                            completed,
                            total: num_docs,
                            fraction,
                        });
                    }
                    Err(err) => match self.policy {
                        FailurePolicy::FailFast => {
                            join_set.abort_all();
                            warn!(index, error = %err, "aborting batch after failed request");
                            self.emit(GenerationEvent::Aborted {
                                index,
                                message: err.to_string(),
                            });
                            return Err(err);
                        }
                        FailurePolicy::CollectPartial => {
                            warn!(index, error = %err, "request failed, continuing");
                            let failure = DocumentFailure {
                                index,
                                message: err.to_string(),
                                retryable: err.is_retryable(),
                            };
                            self.emit(GenerationEvent::DocumentFailed {
                                index,
                                completed,
                                total: num_docs,
                                fraction,
                                message: failure.message.clone(),
                            });
                            failures.push(failure);
                        }
                    },
                }
            }
        }

        info!(
            succeeded = documents.len(),
            failed = failures.len(),
            "document generation finished"
        );
        self.emit(GenerationEvent::Finished {
            succeeded: documents.len(),
            failed: failures.len(),
        });

        Ok(ResultSet {
            requested: num_docs,
            documents,
            failures,
        })
    }

    fn emit(&self, event: GenerationEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver just means nobody is watching anymore.
            let _ = tx.send(event);
        }
    }
}

/// Splits `1..=num_docs` into consecutive windows of at most `window` indices.
///
/// Windows are produced on demand, so the plan costs nothing up front however
/// many documents are requested.
pub fn plan_batches(num_docs: usize, window: usize) -> impl Iterator<Item = Range<usize>> {
    let window = window.max(1);
    let end = num_docs.saturating_add(1);
    (1..=num_docs)
        .step_by(window)
        .map(move |start| start..start.saturating_add(window).min(end))
}
