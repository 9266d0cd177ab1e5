/*!
 * Mock provider implementations for testing.
 *
 * The mock understands the batch payload sent by the translation backend and
 * answers with a well-formed batch reply unless its behavior says otherwise:
 * - `MockProvider::working()` - Always succeeds with tagged translations
 * - `MockProvider::echo()` - Returns every text unchanged
 * - `MockProvider::failing()` - Always fails with a 500 error
 * - `MockProvider::wrong_count()` - Drops the last translation
 */

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::{CompletionRequest, CompletionResponse, Provider};
use crate::translation::prompts::{BatchPayload, BatchReply};

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with a server error
    Failing,
    /// Always fails with a client error that retrying cannot fix
    Rejecting,
    /// Always answers 429
    RateLimited,
    /// Answers with one translation fewer than requested
    WrongCount,
    /// Answers with text that is not JSON
    Garbage,
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
    /// Slow only when the texts of a request exceed a byte threshold
    SlowAbove { threshold_bytes: usize, delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Calls currently running
    in_flight: Arc<AtomicUsize>,
    /// Highest number of calls seen running at once
    max_in_flight: Arc<AtomicUsize>,
    /// Builds the translation of one text for a target language
    translate: fn(&str, &str) -> String,
    /// Artificial latency added to every call
    latency: Duration,
}

fn tag_translation(text: &str, target_language: &str) -> String {
    format!("[{}] {}", target_language, text)
}

fn identity(text: &str, _target_language: &str) -> String {
    text.to_string()
}

/// Decrements the in-flight counter when a call ends
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            translate: tag_translation,
            latency: Duration::ZERO,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a working mock provider that returns texts unchanged
    pub fn echo() -> Self {
        Self::working().with_translator(identity)
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that answers with the wrong number of texts
    pub fn wrong_count() -> Self {
        Self::new(MockBehavior::WrongCount)
    }

    /// Create a mock that takes `delay_ms` for every call
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom per-text translation
    pub fn with_translator(mut self, translate: fn(&str, &str) -> String) -> Self {
        self.translate = translate;
        self
    }

    /// Add latency to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of calls received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply(&self, payload: &BatchPayload, drop_last: bool) -> Result<CompletionResponse, ProviderError> {
        let mut translations: Vec<String> = payload
            .texts
            .iter()
            .map(|text| (self.translate)(text, &payload.target_language))
            .collect();
        if drop_last {
            translations.pop();
        }

        let text = serde_json::to_string(&BatchReply { translations })
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Ok(CompletionResponse {
            text,
            prompt_tokens: Some(payload.texts.iter().map(|t| t.len() as u64).sum()),
            completion_tokens: Some(payload.texts.len() as u64),
        })
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let payload: BatchPayload = serde_json::from_str(&request.user)
            .map_err(|e| ProviderError::ApiError { status_code: 400, message: format!("bad payload: {}", e) })?;

        match self.behavior {
            MockBehavior::Working => self.reply(&payload, false),

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    self.reply(&payload, false)
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Rejecting => Err(ProviderError::ApiError {
                message: "Simulated invalid request".to_string(),
                status_code: 400,
            }),

            MockBehavior::RateLimited => {
                Err(ProviderError::RateLimitExceeded("Simulated quota exhaustion".to_string()))
            }

            MockBehavior::WrongCount => self.reply(&payload, true),

            MockBehavior::Garbage => Ok(CompletionResponse {
                text: "Sure! Here are your translations.".to_string(),
                prompt_tokens: None,
                completion_tokens: None,
            }),

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                self.reply(&payload, false)
            }

            MockBehavior::SlowAbove { threshold_bytes, delay_ms } => {
                let bytes: usize = payload.texts.iter().map(|t| t.len()).sum();
                if bytes > threshold_bytes {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                self.reply(&payload, false)
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::ConnectionError("mock is down".to_string())),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "Mock"
    }
}
