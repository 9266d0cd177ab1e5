/*!
 * Job model.
 *
 * A job is one document being translated into one target language. Its
 * status only moves forward and stops at `Done` or `Failed`.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::document::{DocumentFormat, Locator};
use crate::errors::{DocumentError, FailureReason};

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First eight hex digits, for log lines
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Stage of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Extracting,
    Translating,
    Reassembling,
    Done,
    Failed,
}

impl JobStatus {
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Extracting => 1,
            Self::Translating => 2,
            Self::Reassembling => 3,
            Self::Done | Self::Failed => 4,
        }
    }

    /// Whether the job is finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Forward moves only; any live stage may fail
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            Self::Done => *self == Self::Reassembling,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Translating => "translating",
            Self::Reassembling => "reassembling",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Rejected status change
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid job transition from {from} to {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// One failed unit in a job report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub locator: Locator,
    pub reason: FailureReason,
    pub message: String,
}

/// Terminal error of a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    /// Category of the first failure
    pub reason: FailureReason,
    /// Summary for humans
    pub message: String,
    /// Every failed locator with its own reason
    pub failed_units: Vec<UnitFailure>,
}

impl JobError {
    /// Error without per-unit detail
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            failed_units: Vec::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureReason::Cancelled, "Job was cancelled")
    }

    pub fn with_units(mut self, failed_units: Vec<UnitFailure>) -> Self {
        self.failed_units = failed_units;
        self
    }
}

impl From<&DocumentError> for JobError {
    fn from(error: &DocumentError) -> Self {
        Self::new(error.reason(), error.to_string())
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)?;
        for unit in &self.failed_units {
            write!(f, "\n  {} [{}] {}", unit.locator, unit.reason, unit.message)?;
        }
        Ok(())
    }
}

/// Snapshot of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Name of the uploaded file, if known
    pub file_name: Option<String>,
    pub format: DocumentFormat,
    pub target_language: String,
    pub status: JobStatus,
    /// Set once the job has failed
    pub error: Option<JobError>,
    /// Extracted units
    pub total_units: usize,
    pub total_batches: usize,
    pub completed_batches: usize,
    /// Partial-failure notes for units left untranslated
    pub notes: Vec<UnitFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(format: DocumentFormat, target_language: impl Into<String>, file_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            file_name,
            format,
            target_language: target_language.into(),
            status: JobStatus::Pending,
            error: None,
            total_units: 0,
            total_batches: 0,
            completed_batches: 0,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing backward moves and moves out of terminal states
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError { from: self.status, to: next });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Fail the job with `error`; ignored once the job is terminal
    pub fn fail(&mut self, error: JobError) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Completed fraction of the translation stage (0.0 - 1.0)
    pub fn progress(&self) -> f64 {
        match self.status {
            JobStatus::Pending | JobStatus::Extracting => 0.0,
            JobStatus::Done => 1.0,
            _ if self.total_batches == 0 => 0.0,
            _ => self.completed_batches as f64 / self.total_batches as f64,
        }
    }

    /// Label for display: the file name or the short id
    pub fn label(&self) -> String {
        self.file_name.clone().unwrap_or_else(|| self.id.short())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
