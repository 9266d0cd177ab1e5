/*!
 * Batch translation of extracted text.
 *
 * This module turns ordered text units into translated text units. It is
 * split into several submodules:
 *
 * - `batch`: Greedy grouping of units into request-sized batches
 * - `backend`: The backend contract and the LLM-backed implementation
 * - `dispatcher`: Concurrent dispatch with retry, timeouts and cancellation
 * - `retry`: Per-batch retry state machine and backoff policy
 * - `concurrency`: Process-wide limiter shared by all jobs
 * - `cancel`: Job cancellation signalling
 * - `prompts`: Prompt templates and the JSON exchange format
 */

// Re-export main types for easier usage
pub use self::backend::{LlmBackend, TranslationBackend, TranslationRequest, TranslationResponse};
pub use self::batch::{Batch, BatchLimits, BatchPlanner};
pub use self::cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use self::concurrency::{BackendLimiter, ProviderProfile};
pub use self::dispatcher::{BatchFailure, DispatchReport, DispatchSettings, SkippedUnit, TranslationDispatcher};
pub use self::retry::{AttemptOutcome, BatchState, RetryMachine, RetryPolicy};

// Re-export prompt types
pub use self::prompts::{PromptTemplate, TranslationPreferences, TranslationPromptBuilder};

// Submodules
pub mod backend;
pub mod batch;
pub mod cancel;
pub mod concurrency;
pub mod dispatcher;
pub mod prompts;
pub mod retry;
