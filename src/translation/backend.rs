/*!
 * Translation backend contract.
 *
 * A backend turns an ordered list of texts into an ordered list of
 * translations of the same length. The LLM-backed implementation wraps a
 * [`Provider`] and speaks a small JSON protocol with the model.
 */

use async_trait::async_trait;
use log::{debug, trace};
use std::sync::Arc;

use crate::app_config::TranslationConfig;
use crate::errors::ProviderError;
use crate::language_utils;
use crate::providers::{CompletionRequest, Provider};
use crate::translation::prompts::{BatchReply, TranslationPreferences, TranslationPromptBuilder};

/// One batch as sent to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    /// Texts in batch order
    pub texts: Vec<String>,
    /// Source language tag
    pub source_language: String,
    /// Target language tag
    pub target_language: String,
}

/// Translations in request order
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResponse {
    pub texts: Vec<String>,
}

/// Anything that can translate a batch of texts
///
/// Implementations make exactly one attempt per call. The dispatcher owns
/// retrying, timeouts and concurrency.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Translate a batch. The response may have the wrong length; the
    /// caller checks it.
    async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse, ProviderError>;

    /// Check that the backend is reachable
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Backend that prompts a chat model for a JSON array of translations
#[derive(Debug, Clone)]
pub struct LlmBackend {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    preferences: TranslationPreferences,
}

impl LlmBackend {
    /// Create a backend around a provider
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_tokens: 4096,
            preferences: TranslationPreferences::default(),
        }
    }

    /// Backend for the provider, model and preferences in a configuration
    pub fn from_config(provider: Arc<dyn Provider>, config: &TranslationConfig) -> Self {
        Self::new(provider, config.get_model())
            .with_temperature(config.common.temperature)
            .with_preferences(config.preferences.clone())
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_preferences(mut self, preferences: TranslationPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Human-readable language name for prompts, falling back to the tag
    fn language_label(tag: &str) -> String {
        language_utils::get_language_name(tag).unwrap_or_else(|_| tag.to_string())
    }

    /// Build the completion request for one batch
    pub fn build_request(&self, request: &TranslationRequest) -> CompletionRequest {
        let system = TranslationPromptBuilder::new(
            &Self::language_label(&request.source_language),
            &Self::language_label(&request.target_language),
        )
        .with_preferences(&self.preferences)
        .build_system_prompt();

        // The payload keeps the raw tags so the model sees regional variants
        let user = TranslationPromptBuilder::new(&request.source_language, &request.target_language)
            .with_texts(&request.texts)
            .build_user_prompt();

        CompletionRequest {
            model: self.model.clone(),
            system,
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl TranslationBackend for LlmBackend {
    async fn translate(&self, request: &TranslationRequest) -> Result<TranslationResponse, ProviderError> {
        let completion = self.provider.complete(self.build_request(request)).await?;

        if let (Some(prompt), Some(output)) = (completion.prompt_tokens, completion.completion_tokens) {
            debug!(
                "{} used {} prompt + {} completion tokens for {} texts",
                self.provider.name(),
                prompt,
                output,
                request.texts.len()
            );
        }
        trace!("Raw reply: {}", completion.text);

        let reply = BatchReply::parse(&completion.text).map_err(|e| {
            ProviderError::ParseError(format!("{}: reply is not a translation object: {}", self.provider.name(), e))
        })?;

        Ok(TranslationResponse { texts: reply.translations })
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        self.provider.test_connection().await
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
