/*!
 * Tests for provider construction and the LLM backend contract
 */

use anyhow::Result;
use std::sync::Arc;
use doclingo::app_config::{Config, TranslationProvider};
use doclingo::errors::{ProviderError, TranslationError, FailureReason};
use doclingo::providers::mock::{MockBehavior, MockProvider};
use doclingo::providers::{build_provider, validate_endpoint};
use doclingo::translation::{LlmBackend, TranslationBackend, TranslationRequest};

fn request(texts: &[&str]) -> TranslationRequest {
    TranslationRequest {
        texts: texts.iter().map(|t| t.to_string()).collect(),
        source_language: "en".to_string(),
        target_language: "pt-BR".to_string(),
    }
}

fn backend(behavior: MockBehavior) -> LlmBackend {
    LlmBackend::new(Arc::new(MockProvider::new(behavior)), "mock-model")
}

/// Every configured provider type builds a client
#[test]
fn test_build_provider_withEachProviderType_shouldSucceed() -> Result<()> {
    for provider in [
        TranslationProvider::Ollama,
        TranslationProvider::OpenAI,
        TranslationProvider::Anthropic,
        TranslationProvider::LMStudio,
        TranslationProvider::DashScope,
    ] {
        let mut config = Config::default();
        config.translation.provider = provider;
        build_provider(&config.translation)?;
    }
    Ok(())
}

/// Endpoints must be absolute http(s) URLs
#[test]
fn test_validate_endpoint_withVariousUrls_shouldNormalize() {
    assert_eq!(validate_endpoint("http://localhost:11434/").unwrap(), "http://localhost:11434");
    assert!(validate_endpoint("ftp://example.com").is_err());
    assert!(validate_endpoint("localhost:11434").is_err());
    assert!(validate_endpoint("").is_err());
}

/// The backend returns one text per input, in order
#[tokio::test]
async fn test_translate_withWorkingProvider_shouldKeepOrder() -> Result<()> {
    let backend = backend(MockBehavior::Working);

    let response = backend.translate(&request(&["One", "Two", "Three"])).await?;

    assert_eq!(response.texts, vec!["[pt-BR] One", "[pt-BR] Two", "[pt-BR] Three"]);
    Ok(())
}

/// Unparsable model output is a retryable parse error
#[tokio::test]
async fn test_translate_withGarbageReply_shouldReturnTransientParseError() {
    let result = backend(MockBehavior::Garbage).translate(&request(&["Hello"])).await;

    match result {
        Err(error @ ProviderError::ParseError(_)) => assert!(error.is_transient()),
        other => panic!("expected a parse error, got {:?}", other.map(|r| r.texts)),
    }
}

/// HTTP failures map to transient or permanent translation errors
#[tokio::test]
async fn test_translate_withFailingProviders_shouldClassifyErrors() {
    let cases = [
        (MockBehavior::Failing, FailureReason::BackendTransientError),
        (MockBehavior::RateLimited, FailureReason::BackendTransientError),
        (MockBehavior::Rejecting, FailureReason::BackendNonTransientError),
    ];

    for (behavior, expected) in cases {
        let error = backend(behavior)
            .translate(&request(&["Hello"]))
            .await
            .expect_err("mock should fail");
        assert_eq!(TranslationError::from(error).reason(), expected, "{:?}", behavior);
    }
}

/// A short reply passes through the backend; the count check belongs to dispatch
#[tokio::test]
async fn test_translate_withWrongCount_shouldReturnShortReply() -> Result<()> {
    let response = backend(MockBehavior::WrongCount).translate(&request(&["A", "B"])).await?;
    assert_eq!(response.texts.len(), 1);
    Ok(())
}

/// Authentication failures are never retried
#[test]
fn test_is_transient_withAuthAndServerErrors_shouldDiffer() {
    assert!(!ProviderError::AuthenticationError("bad key".to_string()).is_transient());
    assert!(ProviderError::Timeout("slow".to_string()).is_transient());
    assert!(ProviderError::ApiError { status_code: 502, message: String::new() }.is_transient());
    assert!(!ProviderError::ApiError { status_code: 404, message: String::new() }.is_transient());
}
