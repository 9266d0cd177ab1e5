/*!
 * Tests for application configuration functionality
 */

use anyhow::Result;
use std::time::Duration;
use doclingo::app_config::{Config, LogLevel, TranslationProvider};
use crate::common;

/// Test default configuration values
#[test]
fn test_default_config_withNoParameters_shouldHaveCorrectDefaults() {
    let config = Config::default();

    assert_eq!(config.source_language, "en");
    assert_eq!(config.target_language, "fr");
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.log_level, LogLevel::Info);

    let ollama_config = config
        .translation
        .get_provider_config(&TranslationProvider::Ollama)
        .expect("Ollama provider config should exist");
    assert_eq!(ollama_config.concurrent_requests, 4);
    assert_eq!(ollama_config.timeout_secs, 30);
    assert_eq!(ollama_config.rate_limit, None);

    let limits = config.pipeline.batch_limits();
    assert_eq!(limits.max_batch_bytes, 8 * 1024);
    assert_eq!(limits.max_batch_units, 40);
    assert_eq!(config.pipeline.global_concurrency, 8);
}

/// Test configuration validation
#[test]
fn test_config_validation_withVariousConfigs_shouldValidateCorrectly() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.target_language = "pt-BR".to_string();
    assert!(config.validate().is_ok());

    config.source_language = "xyz".to_string();
    assert!(config.validate().is_err());
    config.source_language = "en".to_string();

    config.pipeline.max_batch_units = 0;
    assert!(config.validate().is_err());
    config.pipeline.max_batch_units = 10;

    config.pipeline.global_concurrency = 0;
    assert!(config.validate().is_err());
    config.pipeline.global_concurrency = 2;

    config.translation.common.jitter = 1.5;
    assert!(config.validate().is_err());
}

/// Remote providers need an API key
#[test]
fn test_config_validation_withRemoteProviderAndKey_shouldPass() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Anthropic;
    for provider in config.translation.available_providers.iter_mut() {
        if provider.provider_type == "anthropic" {
            provider.api_key = "sk-test".to_string();
        }
    }

    assert!(config.validate().is_ok());
    assert_eq!(config.translation.get_api_key(), "sk-test");
    assert_eq!(config.translation.get_timeout(), Duration::from_secs(60));
    assert_eq!(config.translation.get_rate_limit(), Some(45));
}

/// Partial JSON files fall back to defaults for missing sections
#[test]
fn test_from_file_withPartialJson_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        br#"{
            "source_language": "en",
            "target_language": "de",
            "translation": { "provider": "ollama" },
            "pipeline": { "max_batch_units": 12 }
        }"#,
    )?;

    let config = Config::from_file(&path)?;

    assert_eq!(config.target_language, "de");
    assert_eq!(config.pipeline.max_batch_units, 12);
    assert_eq!(config.pipeline.max_batch_bytes, 8 * 1024);
    assert_eq!(config.translation.get_model(), "llama3");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:11434");
    assert_eq!(config.log_level, LogLevel::Info);
    Ok(())
}

/// Saved configurations load back unchanged
#[test]
fn test_save_to_file_thenLoad_shouldKeepSettings() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("nested").join("conf.json");

    let mut config = Config::default();
    config.target_language = "ja".to_string();
    config.translation.set_model("qwen2.5:14b");
    config.pipeline.concurrent_batches = 2;
    config.save_to_file(&path)?;

    let loaded = Config::from_file(&path)?;
    assert_eq!(loaded.target_language, "ja");
    assert_eq!(loaded.translation.get_model(), "qwen2.5:14b");
    assert_eq!(loaded.pipeline, config.pipeline);
    Ok(())
}

/// set_model adds an entry for a provider that has none
#[test]
fn test_set_model_withMissingProviderEntry_shouldAddIt() {
    let mut config = Config::default();
    config.translation.available_providers.clear();
    config.translation.provider = TranslationProvider::LMStudio;

    config.translation.set_model("mistral-7b");

    assert_eq!(config.translation.available_providers.len(), 1);
    assert_eq!(config.translation.get_model(), "mistral-7b");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:1234/v1");
}

/// Retry settings map onto the dispatcher's backoff policy
#[test]
fn test_retry_policy_fromCommonConfig_shouldUseMilliseconds() {
    let mut config = Config::default();
    config.translation.common.retry_count = 5;
    config.translation.common.retry_backoff_ms = 250;
    config.translation.common.max_backoff_ms = 100;

    let policy = config.translation.common.retry_policy();

    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.base_delay, Duration::from_millis(250));
    // The cap never drops below the base delay
    assert_eq!(policy.max_delay, Duration::from_millis(250));
}
