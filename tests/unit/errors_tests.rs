/*!
 * Tests for error types and their conversions
 */

use doclingo::errors::{AppError, DocumentError, FailureReason, ProviderError, TranslationError};

/// Lower-level errors convert into the application error
#[test]
fn test_app_error_fromLowerLevelErrors_shouldWrapThem() {
    let provider: AppError = ProviderError::Timeout("30s".to_string()).into();
    assert!(matches!(provider, AppError::Provider(ProviderError::Timeout(_))));

    let document: AppError = DocumentError::CorruptDocument("bad xref".to_string()).into();
    assert_eq!(document.to_string(), "Document error: Corrupt document: bad xref");

    let io: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
    assert!(matches!(io, AppError::File(_)));

    let other: AppError = anyhow::anyhow!("boom").into();
    assert!(matches!(other, AppError::Unknown(ref m) if m == "boom"));
}

/// Every translation error maps to its report category
#[test]
fn test_translation_error_reason_shouldMatchTaxonomy() {
    let cases = [
        (TranslationError::UnitTooLarge { bytes: 10, limit: 5 }, FailureReason::UnitTooLarge),
        (TranslationError::BackendTransient("503".to_string()), FailureReason::BackendTransientError),
        (
            TranslationError::BackendContractViolation { expected: 3, actual: 2 },
            FailureReason::BackendContractViolation,
        ),
        (TranslationError::BackendNonTransient("400".to_string()), FailureReason::BackendNonTransientError),
        (TranslationError::Cancelled, FailureReason::Cancelled),
    ];

    for (error, reason) in cases {
        assert_eq!(error.reason(), reason);
    }
    assert_eq!(DocumentError::ReassemblyError("x".to_string()).reason(), FailureReason::ReassemblyError);
}

/// Failure reasons serialize under their taxonomy names
#[test]
fn test_failure_reason_serialize_shouldUseTaxonomyNames() {
    assert_eq!(
        serde_json::to_string(&FailureReason::BackendContractViolation).unwrap(),
        r#""BackendContractViolation""#
    );
    assert_eq!(FailureReason::UnitTooLarge.to_string(), "UnitTooLarge");
}
