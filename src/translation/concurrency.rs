/*!
 * Process-wide backend concurrency control.
 *
 * A [`BackendLimiter`] is created once with a fixed capacity and shared by
 * every job's dispatcher. It bounds the number of backend calls in flight and
 * optionally enforces a requests-per-minute budget with a sliding window.
 */

use log::debug;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

/// Provider-specific concurrency profile with tuned defaults
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Maximum concurrent requests
    pub max_concurrent_requests: usize,
    /// Target requests per minute (for rate limiting)
    pub target_rpm: Option<u32>,
}

impl ProviderProfile {
    /// Get the optimal profile for a given provider
    pub fn for_provider(provider: TranslationProvider) -> Self {
        match provider {
            TranslationProvider::Ollama => Self {
                // Local, limited by the machine rather than a quota
                max_concurrent_requests: 8,
                target_rpm: None,
            },
            TranslationProvider::OpenAI => Self {
                max_concurrent_requests: 10,
                target_rpm: Some(60),
            },
            TranslationProvider::Anthropic => Self {
                max_concurrent_requests: 5,
                target_rpm: Some(45),
            },
            TranslationProvider::LMStudio => Self {
                max_concurrent_requests: 6,
                target_rpm: None,
            },
            TranslationProvider::DashScope => Self {
                max_concurrent_requests: 5,
                target_rpm: Some(60),
            },
        }
    }

    /// Get effective concurrent requests, respecting any user override
    pub fn effective_concurrent_requests(&self, user_override: Option<usize>) -> usize {
        user_override.unwrap_or(self.max_concurrent_requests)
    }
}

/// Sliding one-minute window of request start times
#[derive(Debug)]
struct RequestWindow {
    max_requests: usize,
    period: Duration,
    started: Mutex<VecDeque<Instant>>,
}

impl RequestWindow {
    fn new(max_requests: u32, period: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1) as usize,
            period,
            started: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until one more request fits in the window, then record it
    async fn admit(&self) {
        loop {
            let wait = {
                let mut started = self.started.lock();
                let now = Instant::now();
                while started
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= self.period)
                {
                    started.pop_front();
                }

                if started.len() < self.max_requests {
                    started.push_back(now);
                    return;
                }

                // Oldest entry leaves the window first
                match started.front() {
                    Some(oldest) => self.period.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            debug!("Request budget exhausted, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

/// Permit for one backend call. Released on drop.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
}

/// Shared limiter for backend calls across all jobs
#[derive(Debug, Clone)]
pub struct BackendLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    window: Option<Arc<RequestWindow>>,
}

impl BackendLimiter {
    /// Limiter with a fixed number of concurrent calls
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            window: None,
        }
    }

    /// Add a requests-per-minute budget
    pub fn with_rate_limit(self, requests_per_minute: u32) -> Self {
        self.with_window(requests_per_minute, Duration::from_secs(60))
    }

    /// Add a budget of `max_requests` per `period`
    pub fn with_window(mut self, max_requests: u32, period: Duration) -> Self {
        self.window = Some(Arc::new(RequestWindow::new(max_requests, period)));
        self
    }

    /// Limiter sized from the pipeline capacity and the active provider's budget.
    ///
    /// The capacity is the smaller of `global_concurrency` and the provider's
    /// `concurrent_requests` (or its profile default when unset).
    pub fn from_config(config: &TranslationConfig, global_concurrency: usize) -> Self {
        let profile = ProviderProfile::for_provider(config.provider);
        let provider_slots = profile.effective_concurrent_requests(
            config
                .get_active_provider_config()
                .map(|p| p.concurrent_requests)
                .filter(|n| *n > 0),
        );
        let limiter = Self::new(global_concurrency.min(provider_slots));
        let rpm = config.get_rate_limit().or(profile.target_rpm);
        match rpm {
            Some(rpm) if rpm > 0 => limiter.with_rate_limit(rpm),
            _ => limiter,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a free slot and, if configured, for request budget
    pub async fn acquire(&self) -> Result<LimiterPermit, ProviderError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::RequestFailed("backend limiter closed".to_string()))?;

        if let Some(window) = &self.window {
            window.admit().await;
        }

        Ok(LimiterPermit { _permit: permit })
    }
}
