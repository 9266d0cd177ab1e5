/*!
 * Tests for file utility functions
 */

use anyhow::Result;
use std::fs;
use std::path::Path;
use doclingo::document::DocumentFormat;
use doclingo::file_utils::FileManager;
use crate::common;

/// Test that file_exists returns true for existing files
#[test]
fn test_file_exists_withExistingFile_shouldReturnTrue() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let test_file = common::create_test_file(temp_dir.path(), "report.docx", b"content")?;

    assert!(FileManager::file_exists(&test_file));
    assert!(!FileManager::file_exists(temp_dir.path().join("missing.docx")));
    assert!(!FileManager::file_exists(temp_dir.path()));
    Ok(())
}

/// Output paths carry the target language before the extension
#[test]
fn test_generate_output_path_withValidInputs_shouldCreateCorrectPath() {
    let output_path = FileManager::generate_output_path(
        Path::new("/tmp/input/budget.xlsx"),
        Path::new("/tmp/output"),
        "pt-BR",
        DocumentFormat::Xlsx,
    );

    assert_eq!(output_path, Path::new("/tmp/output/budget.pt-BR.xlsx"));
}

/// Content sniffing tells Word and Excel packages apart
#[test]
fn test_sniff_format_withGeneratedPackages_shouldDetectFormat() {
    let docx = common::docx_bytes(&common::docx_paragraph("Hello"));
    let xlsx = common::xlsx_bytes(&["Hello"], &[("Sheet1", "")]);
    let pdf = common::pdf_bytes(&[vec!["Hello".to_string()]]);

    assert_eq!(FileManager::sniff_format(&docx), Some(DocumentFormat::Docx));
    assert_eq!(FileManager::sniff_format(&xlsx), Some(DocumentFormat::Xlsx));
    assert_eq!(FileManager::sniff_format(&pdf), Some(DocumentFormat::Pdf));
    assert_eq!(FileManager::sniff_format(b"PK\x03\x04broken"), None);
}

/// Content wins over a misleading extension
#[test]
fn test_detect_format_withWrongExtension_shouldTrustContent() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let docx = common::docx_bytes(&common::docx_paragraph("Hello"));
    let path = common::create_test_file(temp_dir.path(), "renamed.xlsx", &docx)?;

    assert_eq!(FileManager::detect_format(&path)?, DocumentFormat::Docx);
    Ok(())
}

/// Nested directories are searched and results are sorted
#[test]
fn test_find_documents_withNestedDirs_shouldReturnSortedMatches() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let nested = temp_dir.path().join("q3");
    fs::create_dir_all(&nested)?;
    common::create_test_file(temp_dir.path(), "b.pdf", b"%PDF-1.5")?;
    common::create_test_file(&nested, "a.docx", b"x")?;
    common::create_test_file(&nested, "a.de.docx", b"x")?;
    common::create_test_file(temp_dir.path(), "readme.md", b"x")?;

    let found = FileManager::find_documents(temp_dir.path(), Some("de"))?;

    assert_eq!(found, vec![temp_dir.path().join("b.pdf"), nested.join("a.docx")]);
    Ok(())
}

/// Atomic writes create missing parent directories
#[test]
fn test_write_atomic_withMissingParent_shouldCreateIt() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let target = temp_dir.path().join("out").join("deep").join("doc.fr.pdf");

    FileManager::write_atomic(&target, b"%PDF-1.5 translated")?;

    assert_eq!(FileManager::read_bytes(&target)?, b"%PDF-1.5 translated");
    Ok(())
}
