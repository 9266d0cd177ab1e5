use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::pipeline::{Job, JobError, JobId, JobStatus, PipelineOrchestrator};

// @module: Application controller for document translation

/// How one input file ended
#[derive(Debug)]
pub enum FileOutcome {
    /// Translated document written to this path
    Translated(PathBuf),
    /// Output already existed
    Skipped(PathBuf),
    /// The job failed; the report lists every failed locator
    Failed(JobError),
}

/// Counts for a folder run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FolderSummary {
    pub translated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Main application controller for document translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Job runner shared by every file of a run
    orchestrator: PipelineOrchestrator,
    // @field: Interval between job status polls
    poll_interval: Duration,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let orchestrator = PipelineOrchestrator::from_config(&config)?;
        Ok(Self::with_orchestrator(config, orchestrator))
    }

    /// Create a controller around an existing orchestrator
    pub fn with_orchestrator(config: Config, orchestrator: PipelineOrchestrator) -> Self {
        Self {
            config,
            orchestrator,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    // @method: Probe the provider before any document is submitted
    pub async fn test_connection(&self) -> Result<()> {
        self.orchestrator.test_connection().await.map_err(|e| {
            anyhow!(
                "{} is not reachable at {}: {}",
                self.config.translation.provider.display_name(),
                self.config.translation.get_endpoint(),
                e
            )
        })
    }

    fn progress_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}}",
                unit
            ))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    /// Translate one file into `output_dir`
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf, force_overwrite: bool) -> Result<FileOutcome> {
        let multi_progress = MultiProgress::new();
        let start_time = std::time::Instant::now();

        info!(
            "doclingo: {} - {}",
            self.config.translation.provider.display_name(),
            self.config.translation.get_model()
        );
        let outcome = self.run_with_progress(&input_file, &output_dir, &multi_progress, force_overwrite).await?;

        match &outcome {
            FileOutcome::Translated(path) => {
                info!("Success: {} ({})", path.display(), Self::format_duration(start_time.elapsed()))
            }
            FileOutcome::Skipped(path) => {
                warn!("Skipping file, translation already exists at {} (use -f to force overwrite)", path.display())
            }
            FileOutcome::Failed(report) => error!("Translation failed: {}", report),
        }
        Ok(outcome)
    }

    async fn run_with_progress(
        &self,
        input_file: &Path,
        output_dir: &Path,
        multi_progress: &MultiProgress,
        force_overwrite: bool,
    ) -> Result<FileOutcome> {
        if !FileManager::file_exists(input_file) {
            return Err(anyhow!("Input file does not exist: {}", input_file.display()));
        }

        let format = FileManager::detect_format(input_file)?;
        let output_path =
            FileManager::generate_output_path(input_file, output_dir, &self.config.target_language, format);
        if output_path.exists() && !force_overwrite {
            return Ok(FileOutcome::Skipped(output_path));
        }

        let bytes = FileManager::read_bytes(input_file)?;
        let file_name = input_file.file_name().map(|n| n.to_string_lossy().to_string());
        let id = self
            .orchestrator
            .submit(bytes, format, &self.config.target_language, file_name);

        let job = self.follow_job(id, multi_progress).await?;
        match job.status {
            JobStatus::Done => {
                let output = self
                    .orchestrator
                    .output(id)
                    .ok_or_else(|| anyhow!("Job {} finished without output", id))?;
                FileManager::write_atomic(&output_path, &output)?;
                for note in &job.notes {
                    warn!("{} left untranslated: {}", note.locator, note.message);
                }
                self.orchestrator.remove(id);
                Ok(FileOutcome::Translated(output_path))
            }
            _ => {
                self.orchestrator.remove(id);
                let report = job
                    .error
                    .unwrap_or_else(|| JobError::new(crate::errors::FailureReason::Cancelled, "Job did not finish"));
                Ok(FileOutcome::Failed(report))
            }
        }
    }

    /// Poll a job until it finishes, mirroring its batch progress on a bar
    async fn follow_job(&self, id: JobId, multi_progress: &MultiProgress) -> Result<Job> {
        let progress_bar = multi_progress.add(ProgressBar::new(0));
        progress_bar.set_style(Self::progress_style("batches"));

        loop {
            let job = self
                .orchestrator
                .status(id)
                .ok_or_else(|| anyhow!("Job {} disappeared", id))?;

            progress_bar.set_length(job.total_batches as u64);
            progress_bar.set_position(job.completed_batches as u64);
            progress_bar.set_message(format!("{} ({})", job.label(), job.status));

            if job.is_terminal() {
                progress_bar.finish_and_clear();
                return Ok(job);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Translate every supported document under `input_dir`.
    ///
    /// Files are processed concurrently; the shared backend limiter bounds the
    /// number of calls in flight across all of them.
    pub async fn run_folder(
        &self,
        input_dir: PathBuf,
        output_dir: Option<PathBuf>,
        force_overwrite: bool,
    ) -> Result<FolderSummary> {
        let start_time = std::time::Instant::now();

        if !FileManager::dir_exists(&input_dir) {
            return Err(anyhow!("Input directory does not exist: {}", input_dir.display()));
        }

        let documents = FileManager::find_documents(&input_dir, Some(&self.config.target_language))?;
        if documents.is_empty() {
            return Err(anyhow!("No supported documents found in directory: {}", input_dir.display()));
        }

        let multi_progress = MultiProgress::new();
        let folder_pb = multi_progress.add(ProgressBar::new(documents.len() as u64));
        folder_pb.set_style(Self::progress_style("files"));
        folder_pb.set_message("Processing files");

        let runs = documents.iter().map(|document| {
            let target_dir = output_dir
                .clone()
                .or_else(|| document.parent().map(Path::to_path_buf))
                .unwrap_or_else(|| input_dir.clone());
            let multi_progress = &multi_progress;
            let folder_pb = &folder_pb;
            async move {
                let result = self
                    .run_with_progress(document, &target_dir, multi_progress, force_overwrite)
                    .await;
                folder_pb.inc(1);
                (document, result)
            }
        });
        let results = futures::future::join_all(runs).await;

        let mut summary = FolderSummary::default();
        for (document, result) in results {
            match result {
                Ok(FileOutcome::Translated(path)) => {
                    info!("Translated {} -> {}", document.display(), path.display());
                    summary.translated += 1;
                }
                Ok(FileOutcome::Skipped(_)) => {
                    warn!("Skipping {}, translation already exists (use -f to force overwrite)", document.display());
                    summary.skipped += 1;
                }
                Ok(FileOutcome::Failed(report)) => {
                    error!("Error processing file {}: {}", document.display(), report);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Error processing file {}: {}", document.display(), e);
                    summary.failed += 1;
                }
            }
        }

        folder_pb.finish_with_message("Folder processing complete");
        info!(
            "Folder processing completed in {}: {} translated, {} skipped, {} errors",
            Self::format_duration(start_time.elapsed()),
            summary.translated,
            summary.skipped,
            summary.failed
        );

        Ok(summary)
    }

    /// Format a duration as "1m 5s" or "4.250s"
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;

        if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
