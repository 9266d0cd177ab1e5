/*!
 * Per-job pipeline: job model, reassembly and orchestration.
 */

pub mod job;
pub mod orchestrator;
pub mod reassembly;

pub use self::job::{Job, JobError, JobId, JobStatus, TransitionError, UnitFailure};
pub use self::orchestrator::{JobSnapshot, PipelineOrchestrator};
pub use self::reassembly::ReassemblyEngine;
