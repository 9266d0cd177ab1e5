/*!
 * Job orchestration.
 *
 * The orchestrator owns every job's state and runs each job as its own task:
 * `Pending -> Extracting -> Translating -> Reassembling -> Done`, with any
 * stage able to end in `Failed`. Nothing is retried at this level.
 *
 * Parsing and reassembly are CPU-bound and run on the blocking pool. All jobs
 * share one dispatcher and therefore one backend limiter.
 */

use anyhow::Result;
use bytes::Bytes;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

use crate::app_config::Config;
use crate::document::{Document, DocumentFormat, ExtractionPlanner, TextUnit};
use crate::errors::{DocumentError, FailureReason, ProviderError};
use crate::pipeline::job::{Job, JobError, JobId, JobStatus, UnitFailure};
use crate::pipeline::reassembly::ReassemblyEngine;
use crate::providers;
use crate::translation::{
    BackendLimiter, BatchLimits, BatchPlanner, CancelHandle, CancelSignal, DispatchReport,
    DispatchSettings, LlmBackend, TranslationDispatcher, cancel_pair,
};

/// What a status poll returns
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub job: Job,
    /// Translated document, only for `Done` jobs
    pub output: Option<Bytes>,
}

struct JobEntry {
    job: Job,
    cancel: CancelHandle,
    output: Option<Bytes>,
    status_tx: watch::Sender<JobStatus>,
}

type JobTable = Arc<RwLock<HashMap<JobId, JobEntry>>>;

/// Runs translation jobs and tracks their state
#[derive(Clone)]
pub struct PipelineOrchestrator {
    dispatcher: Arc<TranslationDispatcher>,
    limits: BatchLimits,
    source_language: String,
    jobs: JobTable,
}

impl PipelineOrchestrator {
    pub fn new(dispatcher: Arc<TranslationDispatcher>, limits: BatchLimits, source_language: impl Into<String>) -> Self {
        Self {
            dispatcher,
            limits,
            source_language: source_language.into(),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Orchestrator for the provider and limits in a configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = providers::build_provider(&config.translation)?;
        let backend = Arc::new(LlmBackend::from_config(provider, &config.translation));
        let limiter = BackendLimiter::from_config(&config.translation, config.pipeline.global_concurrency);
        let dispatcher = TranslationDispatcher::new(backend, limiter, DispatchSettings::from_config(config));

        Ok(Self::new(
            Arc::new(dispatcher),
            config.pipeline.batch_limits(),
            config.source_language.clone(),
        ))
    }

    /// Check that the translation backend answers
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        self.dispatcher.test_connection().await
    }

    /// Queue a document for translation. Must be called within a Tokio runtime.
    pub fn submit(
        &self,
        bytes: impl Into<Bytes>,
        format: DocumentFormat,
        target_language: &str,
        file_name: Option<String>,
    ) -> JobId {
        let job = Job::new(format, target_language, file_name);
        let id = job.id;
        let (cancel, signal) = cancel_pair();
        let (status_tx, _) = watch::channel(JobStatus::Pending);

        info!("Job {} submitted: {} ({}) -> {}", id.short(), job.label(), format, target_language);
        self.jobs.write().insert(id, JobEntry { job, cancel, output: None, status_tx });

        let this = self.clone();
        let bytes = bytes.into();
        tokio::spawn(async move { this.run_job(id, bytes, signal).await });

        id
    }

    /// Current state of a job
    pub fn status(&self, id: JobId) -> Option<Job> {
        self.jobs.read().get(&id).map(|entry| entry.job.clone())
    }

    /// Current state of a job plus its output once done
    pub fn poll_status(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.read().get(&id).map(|entry| JobSnapshot {
            job: entry.job.clone(),
            output: entry.output.clone(),
        })
    }

    /// Translated document of a finished job
    pub fn output(&self, id: JobId) -> Option<Bytes> {
        self.jobs.read().get(&id).and_then(|entry| entry.output.clone())
    }

    /// Snapshots of all known jobs, oldest first
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().map(|e| e.job.clone()).collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Request cancellation. Returns false for unknown or finished jobs.
    ///
    /// A job that accepted the request never ends `Done`; the outcome is
    /// settled under the same lock that `finish` takes.
    pub fn cancel(&self, id: JobId) -> bool {
        let jobs = self.jobs.read();
        match jobs.get(&id) {
            Some(entry) if !entry.job.is_terminal() => {
                info!("Cancelling job {}", id.short());
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Wait until the job is `Done` or `Failed`
    pub async fn wait(&self, id: JobId) -> Option<Job> {
        let mut rx = self.jobs.read().get(&id)?.status_tx.subscribe();
        // The sender lives in the table; an error means the job was removed
        let _ = rx.wait_for(|status| status.is_terminal()).await;
        self.status(id)
    }

    /// Forget a finished job and release its output
    pub fn remove(&self, id: JobId) -> Option<Job> {
        let mut jobs = self.jobs.write();
        if jobs.get(&id).is_some_and(|entry| entry.job.is_terminal()) {
            return jobs.remove(&id).map(|entry| entry.job);
        }
        None
    }

    /// Apply `f` to a job and bump its update time
    fn update<F: FnOnce(&mut Job)>(&self, id: JobId, f: F) {
        if let Some(entry) = self.jobs.write().get_mut(&id) {
            f(&mut entry.job);
            entry.job.touch();
        }
    }

    fn set_status(&self, id: JobId, status: JobStatus) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        let Some(entry) = jobs.get_mut(&id) else {
            return Err(JobError::cancelled());
        };
        entry
            .job
            .transition(status)
            .map_err(|e| JobError::new(FailureReason::ReassemblyError, e.to_string()))?;
        entry.status_tx.send_replace(status);
        debug!("Job {} is {}", id.short(), status);
        Ok(())
    }

    fn finish(&self, id: JobId, result: Result<Bytes, JobError>) {
        let mut jobs = self.jobs.write();
        let Some(entry) = jobs.get_mut(&id) else {
            return;
        };

        // A cancel accepted after the last stage check still wins
        let result = match result {
            Ok(_) if entry.cancel.is_cancelled() => Err(JobError::cancelled()),
            other => other,
        };

        let outcome = match result {
            Ok(output) => entry.job.transition(JobStatus::Done).map(|_| {
                entry.output = Some(output);
            }),
            Err(job_error) => {
                if job_error.reason == FailureReason::Cancelled {
                    warn!("Job {} cancelled", id.short());
                } else {
                    error!("Job {} failed: {}", id.short(), job_error);
                }
                entry.job.fail(job_error)
            }
        };

        match outcome {
            Ok(()) => {
                entry.status_tx.send_replace(entry.job.status);
            }
            Err(e) => warn!("Job {}: {}", id.short(), e),
        }
    }

    async fn run_job(&self, id: JobId, bytes: Bytes, signal: CancelSignal) {
        let started = Instant::now();
        let result = self.execute(id, bytes, &signal).await;
        let succeeded = result.is_ok();
        self.finish(id, result);
        if succeeded {
            info!("Job {} done in {:.1}s", id.short(), started.elapsed().as_secs_f64());
        }
    }

    fn check_cancelled(signal: &CancelSignal) -> Result<(), JobError> {
        if signal.is_cancelled() {
            Err(JobError::cancelled())
        } else {
            Ok(())
        }
    }

    async fn execute(&self, id: JobId, bytes: Bytes, signal: &CancelSignal) -> Result<Bytes, JobError> {
        let Some(job) = self.status(id) else {
            return Err(JobError::cancelled());
        };

        // Extracting
        Self::check_cancelled(signal)?;
        self.set_status(id, JobStatus::Extracting)?;
        let format = job.format;
        let extraction = tokio::task::spawn_blocking(move || -> Result<(Document, Vec<TextUnit>), DocumentError> {
            let document = Document::parse(&bytes, format)?;
            let units = ExtractionPlanner::plan(&document)?;
            Ok((document, units))
        });
        let (mut document, mut units) = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(JobError::cancelled()),
            joined = extraction => joined
                .map_err(|e| JobError::new(FailureReason::CorruptDocument, format!("extraction task failed: {}", e)))?
                .map_err(|e| JobError::from(&e))?,
        };

        // Translating
        Self::check_cancelled(signal)?;
        let batches = BatchPlanner::new(self.limits).plan(&units);
        info!(
            "Job {}: {} units in {} batches",
            id.short(),
            units.len(),
            batches.len()
        );
        self.update(id, |job| {
            job.total_units = units.len();
            job.total_batches = batches.len();
        });
        self.set_status(id, JobStatus::Translating)?;

        let jobs = Arc::clone(&self.jobs);
        let report = self
            .dispatcher
            .dispatch(
                &mut units,
                &batches,
                &self.source_language,
                &job.target_language,
                signal,
                move |done, _total| {
                    if let Some(entry) = jobs.write().get_mut(&id) {
                        entry.job.completed_batches = done;
                        entry.job.touch();
                    }
                },
            )
            .await;

        let notes: Vec<UnitFailure> = report
            .skipped
            .iter()
            .map(|s| UnitFailure {
                locator: s.locator.clone(),
                reason: s.error.reason(),
                message: s.error.to_string(),
            })
            .collect();
        if !notes.is_empty() {
            warn!("Job {}: {} units left untranslated", id.short(), notes.len());
            self.update(id, |job| job.notes = notes);
        }

        if report.cancelled {
            return Err(JobError::cancelled());
        }
        if !report.failures.is_empty() {
            return Err(Self::failure_report(&report, batches.len()));
        }

        // Reassembling
        Self::check_cancelled(signal)?;
        self.set_status(id, JobStatus::Reassembling)?;
        let reassembly = tokio::task::spawn_blocking(move || ReassemblyEngine::reassemble(&mut document, &units));
        let output = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(JobError::cancelled()),
            joined = reassembly => joined
                .map_err(|e| JobError::new(FailureReason::ReassemblyError, format!("reassembly task failed: {}", e)))?
                .map_err(|e| JobError::from(&e))?,
        };

        // Cancellation after the last stage still discards the output
        Self::check_cancelled(signal)?;
        Ok(Bytes::from(output))
    }

    /// Aggregate failed batches into one job error listing every locator
    fn failure_report(report: &DispatchReport, total_batches: usize) -> JobError {
        let reason = report
            .failures
            .first()
            .map(|f| f.error.reason())
            .unwrap_or(FailureReason::BackendNonTransientError);

        let failed_units = report
            .failures
            .iter()
            .flat_map(|failure| {
                failure.locators.iter().map(move |locator| UnitFailure {
                    locator: locator.clone(),
                    reason: failure.error.reason(),
                    message: format!("{} (after {} attempts)", failure.error, failure.attempts),
                })
            })
            .collect();

        JobError::new(
            reason,
            format!("{} of {} batches failed", report.failures.len(), total_batches),
        )
        .with_units(failed_units)
    }
}
