/*!
 * Concurrent batch dispatch.
 *
 * The dispatcher sends one job's batches to a [`TranslationBackend`], keeping
 * at most `concurrent_batches` of them in flight. Every attempt also holds a
 * permit of the process-wide [`BackendLimiter`] for the duration of the call.
 * Each batch is driven by its own [`RetryMachine`]; translations are written
 * into the text units only after all batches have finished.
 */

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::Config;
use crate::document::{Locator, TextUnit};
use crate::errors::{ProviderError, TranslationError};
use crate::translation::backend::{TranslationBackend, TranslationRequest};
use crate::translation::batch::Batch;
use crate::translation::cancel::CancelSignal;
use crate::translation::concurrency::BackendLimiter;
use crate::translation::retry::{AttemptOutcome, BatchState, RetryMachine, RetryPolicy};

/// Per-job dispatch settings
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Batches of one job in flight at once
    pub concurrent_batches: usize,
    /// Deadline for a single backend call
    pub call_timeout: Duration,
    /// Units above this size are never sent
    pub max_unit_bytes: usize,
    /// Backoff policy for transient failures
    pub retry: RetryPolicy,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrent_batches: 4,
            call_timeout: Duration::from_secs(30),
            max_unit_bytes: 32 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrent_batches: config.pipeline.concurrent_batches.max(1),
            call_timeout: config.translation.get_timeout(),
            max_unit_bytes: config.pipeline.max_unit_bytes,
            retry: config.translation.common.retry_policy(),
        }
    }
}

/// A batch that could not be translated
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub batch_index: usize,
    /// Every unit of the batch that was sent
    pub locators: Vec<Locator>,
    pub error: TranslationError,
    pub attempts: u32,
}

/// A unit that was left in its source language
#[derive(Debug, Clone)]
pub struct SkippedUnit {
    pub locator: Locator,
    pub error: TranslationError,
}

/// Outcome of dispatching all batches of a job
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Failed batches, in batch order
    pub failures: Vec<BatchFailure>,
    /// Units over the size limit, kept untranslated
    pub skipped: Vec<SkippedUnit>,
    /// Batches that finished successfully
    pub completed_batches: usize,
    /// Cancellation was observed before all batches finished
    pub cancelled: bool,
}

impl DispatchReport {
    /// All batches succeeded and nothing was cancelled
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Work for one batch: unit positions plus the request built from them
struct BatchWork {
    batch_index: usize,
    unit_indices: Vec<usize>,
    request: TranslationRequest,
}

struct BatchOutcome {
    batch_index: usize,
    unit_indices: Vec<usize>,
    result: Result<Vec<String>, TranslationError>,
    attempts: u32,
}

/// Sends batches to a backend under shared limits
pub struct TranslationDispatcher {
    backend: Arc<dyn TranslationBackend>,
    limiter: BackendLimiter,
    settings: DispatchSettings,
}

impl TranslationDispatcher {
    pub fn new(backend: Arc<dyn TranslationBackend>, limiter: BackendLimiter, settings: DispatchSettings) -> Self {
        Self { backend, limiter, settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn limiter(&self) -> &BackendLimiter {
        &self.limiter
    }

    /// Probe the backend once, outside the limiter
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        self.backend.test_connection().await
    }

    /// Translate every batch and write the results into `units`.
    ///
    /// `on_progress(done, total)` is called each time a batch finishes.
    /// Translations are applied only when no batch failed and the job was not
    /// cancelled; otherwise `units` keeps no translated text from the backend.
    pub async fn dispatch<F>(
        &self,
        units: &mut [TextUnit],
        batches: &[Batch],
        source_language: &str,
        target_language: &str,
        cancel: &CancelSignal,
        mut on_progress: F,
    ) -> DispatchReport
    where
        F: FnMut(usize, usize) + Send,
    {
        let mut report = DispatchReport::default();
        let total = batches.len();

        // Oversized units keep their source text and are not sent
        for unit in units.iter_mut() {
            let bytes = unit.byte_len();
            if bytes > self.settings.max_unit_bytes {
                warn!("{} is {} bytes, leaving it untranslated", unit.locator(), bytes);
                report.skipped.push(SkippedUnit {
                    locator: unit.locator().clone(),
                    error: TranslationError::UnitTooLarge { bytes, limit: self.settings.max_unit_bytes },
                });
                let source = unit.source_text().to_string();
                unit.set_translation(source);
            }
        }

        let mut work = Vec::with_capacity(total);
        for batch in batches {
            let unit_indices: Vec<usize> = batch.range.clone().filter(|&i| !units[i].is_translated()).collect();
            if unit_indices.is_empty() {
                report.completed_batches += 1;
                continue;
            }
            let texts = unit_indices.iter().map(|&i| units[i].source_text().to_string()).collect();
            work.push(BatchWork {
                batch_index: batch.index,
                unit_indices,
                request: TranslationRequest {
                    texts,
                    source_language: source_language.to_string(),
                    target_language: target_language.to_string(),
                },
            });
        }

        info!(
            "Dispatching {} batches ({} units) to {} with up to {} in flight",
            work.len(),
            units.len(),
            self.backend.name(),
            self.settings.concurrent_batches
        );
        on_progress(report.completed_batches, total);

        let mut outcomes = Vec::with_capacity(work.len());
        let mut in_flight = stream::iter(work)
            .map(|w| self.run_batch(w, cancel))
            .buffer_unordered(self.settings.concurrent_batches.max(1));

        while let Some(outcome) = in_flight.next().await {
            if outcome.result.is_ok() {
                report.completed_batches += 1;
            }
            on_progress(report.completed_batches, total);
            outcomes.push(outcome);
        }
        drop(in_flight);

        // Completion order is arbitrary
        outcomes.sort_by_key(|o| o.batch_index);

        report.cancelled = cancel.is_cancelled()
            || outcomes.iter().any(|o| matches!(o.result, Err(TranslationError::Cancelled)));

        let mut translated = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(texts) => translated.push((outcome.unit_indices, texts)),
                Err(TranslationError::Cancelled) => {}
                Err(error) => report.failures.push(BatchFailure {
                    batch_index: outcome.batch_index,
                    locators: outcome.unit_indices.iter().map(|&i| units[i].locator().clone()).collect(),
                    error,
                    attempts: outcome.attempts,
                }),
            }
        }

        if report.is_success() {
            for (indices, texts) in translated {
                for (i, text) in indices.into_iter().zip(texts) {
                    units[i].set_translation(text);
                }
            }
        }

        report
    }

    /// Drive one batch through its retry states
    async fn run_batch(&self, work: BatchWork, cancel: &CancelSignal) -> BatchOutcome {
        let mut machine = RetryMachine::new(self.settings.retry);
        let mut last_error = TranslationError::Cancelled;

        while let Some(attempt) = machine.begin_attempt() {
            if cancel.is_cancelled() {
                last_error = TranslationError::Cancelled;
                break;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TranslationError::Cancelled),
                result = self.attempt(&work.request) => result,
            };

            let error = match result {
                Ok(texts) => {
                    machine.record(AttemptOutcome::Success);
                    debug!("Batch {} succeeded on attempt {}", work.batch_index, attempt);
                    return BatchOutcome {
                        batch_index: work.batch_index,
                        unit_indices: work.unit_indices,
                        result: Ok(texts),
                        attempts: attempt,
                    };
                }
                Err(TranslationError::Cancelled) => {
                    last_error = TranslationError::Cancelled;
                    break;
                }
                Err(error) => error,
            };

            let outcome = match error {
                TranslationError::BackendTransient(_) => AttemptOutcome::Transient,
                _ => AttemptOutcome::Permanent,
            };
            match machine.record(outcome) {
                BatchState::RetryScheduled { delay, .. } => {
                    warn!(
                        "Batch {} attempt {} failed: {}. Retrying in {:?}",
                        work.batch_index, attempt, error, delay
                    );
                    last_error = error;
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            last_error = TranslationError::Cancelled;
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                _ => {
                    warn!("Batch {} failed after {} attempts: {}", work.batch_index, attempt, error);
                    last_error = error;
                }
            }
        }

        BatchOutcome {
            batch_index: work.batch_index,
            unit_indices: work.unit_indices,
            result: Err(last_error),
            attempts: machine.attempts(),
        }
    }

    /// One backend call under a limiter permit and the call timeout
    async fn attempt(&self, request: &TranslationRequest) -> Result<Vec<String>, TranslationError> {
        let _permit = self.limiter.acquire().await?;

        let response = tokio::time::timeout(self.settings.call_timeout, self.backend.translate(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("no reply within {:?}", self.settings.call_timeout))
            })??;

        if response.texts.len() != request.texts.len() {
            return Err(TranslationError::BackendContractViolation {
                expected: request.texts.len(),
                actual: response.texts.len(),
            });
        }

        Ok(response.texts)
    }
}
