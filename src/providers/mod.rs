/*!
 * Provider implementations for different LLM services.
 *
 * This module contains client implementations for various LLM providers:
 * - Ollama: Local LLM server
 * - OpenAI: OpenAI API and compatible servers (LM Studio, DashScope)
 * - Anthropic: Anthropic API integration
 * - Mock: scripted behaviors for tests
 *
 * Providers perform a single call; retrying is left to the dispatcher.
 */

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt::Debug;
use std::sync::Arc;
use url::Url;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

pub mod anthropic;
pub mod mock;
pub mod ollama;
pub mod openai;

/// One chat-style completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model name
    pub model: String,
    /// System prompt
    pub system: String,
    /// User message
    pub user: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

/// Text produced by a provider
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The generated text
    pub text: String,
    /// Prompt tokens, when reported
    pub prompt_tokens: Option<u64>,
    /// Completion tokens, when reported
    pub completion_tokens: Option<u64>,
}

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably behind an `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Complete a request using this provider
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Short provider name for logs
    fn name(&self) -> &str;
}

/// Map a non-success HTTP status to a provider error
pub fn status_error(provider: &str, status: StatusCode, body: String) -> ProviderError {
    let message = format!("{}: {}", provider, truncate(&body, 500));
    match status.as_u16() {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded(message),
        code => ProviderError::ApiError { status_code: code, message },
    }
}

/// Map a transport failure to a provider error
pub fn transport_error(provider: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(format!("{}: {}", provider, error))
    } else if error.is_connect() {
        ProviderError::ConnectionError(format!("{}: {}", provider, error))
    } else {
        ProviderError::RequestFailed(format!("{}: {}", provider, error))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

/// Check that an endpoint is an absolute http(s) URL and normalize it
pub fn validate_endpoint(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint).map_err(|e| anyhow!("Invalid endpoint '{}': {}", endpoint, e))?;
    match url.scheme() {
        "http" | "https" => Ok(endpoint.trim_end_matches('/').to_string()),
        other => Err(anyhow!("Unsupported endpoint scheme '{}' in {}", other, endpoint)),
    }
}

/// Build the provider selected in the configuration
pub fn build_provider(config: &TranslationConfig) -> Result<Arc<dyn Provider>> {
    let endpoint = validate_endpoint(&config.get_endpoint())?;
    let timeout = config.get_timeout();

    let provider: Arc<dyn Provider> = match config.provider {
        TranslationProvider::Ollama => Arc::new(ollama::Ollama::new(endpoint, timeout)),
        TranslationProvider::OpenAI | TranslationProvider::LMStudio | TranslationProvider::DashScope => {
            Arc::new(openai::OpenAI::new(
                config.provider.display_name(),
                config.get_api_key(),
                endpoint,
                timeout,
            ))
        }
        TranslationProvider::Anthropic => {
            Arc::new(anthropic::Anthropic::new(config.get_api_key(), endpoint, timeout))
        }
    };

    Ok(provider)
}
