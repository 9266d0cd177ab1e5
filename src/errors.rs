/*!
 * Error types for the doclingo application.
 *
 * This module contains custom error types for different parts of the pipeline,
 * using the thiserror crate for ergonomic error definitions.
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The call did not finish within its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Whether a retry of the same request may succeed.
    ///
    /// Network failures, timeouts, rate limiting, 5xx responses and
    /// unparsable model output are transient. Client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_)
            | Self::ConnectionError(_)
            | Self::RateLimitExceeded(_)
            | Self::Timeout(_)
            | Self::ParseError(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::AuthenticationError(_) => false,
        }
    }
}

/// Errors raised by the format adapters
#[derive(Error, Debug, Clone)]
pub enum DocumentError {
    /// The file structure is not one of the supported formats
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The underlying parser rejected the byte stream
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// A locator from extraction no longer resolves in the document
    #[error("Reassembly error: {0}")]
    ReassemblyError(String),
}

/// Errors that can occur while translating batches
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// A single unit exceeds the backend's hard payload limit
    #[error("Unit too large: {bytes} bytes exceeds the {limit} byte limit")]
    UnitTooLarge { bytes: usize, limit: usize },

    /// Transient backend failure, retries exhausted
    #[error("Backend transient error: {0}")]
    BackendTransient(String),

    /// The backend answered with a different number of texts than requested
    #[error("Backend contract violation: expected {expected} texts, got {actual}")]
    BackendContractViolation { expected: usize, actual: usize },

    /// Permanent backend failure
    #[error("Backend error: {0}")]
    BackendNonTransient(String),

    /// The job was cancelled while the batch was pending or in flight
    #[error("Cancelled")]
    Cancelled,
}

impl TranslationError {
    /// Report category for this error
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::UnitTooLarge { .. } => FailureReason::UnitTooLarge,
            Self::BackendTransient(_) => FailureReason::BackendTransientError,
            Self::BackendContractViolation { .. } => FailureReason::BackendContractViolation,
            Self::BackendNonTransient(_) => FailureReason::BackendNonTransientError,
            Self::Cancelled => FailureReason::Cancelled,
        }
    }
}

impl From<ProviderError> for TranslationError {
    fn from(error: ProviderError) -> Self {
        if error.is_transient() {
            Self::BackendTransient(error.to_string())
        } else {
            Self::BackendNonTransient(error.to_string())
        }
    }
}

impl DocumentError {
    /// Report category for this error
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::UnsupportedFormat(_) => FailureReason::UnsupportedFormat,
            Self::CorruptDocument(_) => FailureReason::CorruptDocument,
            Self::ReassemblyError(_) => FailureReason::ReassemblyError,
        }
    }
}

/// Machine-readable failure category used in job error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    UnsupportedFormat,
    CorruptDocument,
    UnitTooLarge,
    BackendTransientError,
    BackendContractViolation,
    BackendNonTransientError,
    ReassemblyError,
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::CorruptDocument => "CorruptDocument",
            Self::UnitTooLarge => "UnitTooLarge",
            Self::BackendTransientError => "BackendTransientError",
            Self::BackendContractViolation => "BackendContractViolation",
            Self::BackendNonTransientError => "BackendNonTransientError",
            Self::ReassemblyError => "ReassemblyError",
            Self::Cancelled => "Cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a format adapter
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
