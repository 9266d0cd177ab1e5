/*!
 * Integration tests for the application controller on real files
 */

use anyhow::Result;
use std::fs;
use doclingo::app_controller::{Controller, FileOutcome, FolderSummary};
use doclingo::document::{Document, DocumentFormat};
use doclingo::errors::FailureReason;
use doclingo::providers::mock::MockProvider;
use crate::common;

fn controller(provider: MockProvider) -> Controller {
    Controller::with_orchestrator(common::test_config(), common::mock_orchestrator(provider))
}

fn sample_docx() -> Vec<u8> {
    common::docx_bytes(&format!(
        "{}{}",
        common::docx_paragraph("Terms and conditions"),
        common::docx_paragraph("Signed in Lisbon")
    ))
}

/// Test the controller initialization with default config
#[test]
fn test_controller_initialization_withDefaultConfig_shouldSucceed() -> Result<()> {
    let controller = Controller::with_config(common::test_config())?;
    assert!(controller.orchestrator().jobs().is_empty());
    Ok(())
}

/// The connection probe reports unreachable providers
#[tokio::test]
async fn test_test_connection_withFailingProvider_shouldError() {
    assert!(controller(MockProvider::working()).test_connection().await.is_ok());

    let error = controller(MockProvider::failing())
        .test_connection()
        .await
        .expect_err("failing mock is unreachable");
    assert!(error.to_string().contains("Ollama is not reachable"));
}

/// A translated file lands next to the output directory with the language suffix
#[tokio::test]
async fn test_run_withDocx_shouldWriteTranslatedFile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "contract.docx", &sample_docx())?;
    let output_dir = temp_dir.path().join("out");

    let outcome = controller(MockProvider::working()).run(input, output_dir.clone(), false).await?;

    let expected = output_dir.join("contract.fr.docx");
    match outcome {
        FileOutcome::Translated(path) => assert_eq!(path, expected),
        other => panic!("expected a translated file, got {:?}", other),
    }
    let texts: Vec<String> = Document::parse(&fs::read(&expected)?, DocumentFormat::Docx)?
        .extract()?
        .into_iter()
        .map(|s| s.text)
        .collect();
    assert_eq!(texts, vec!["[fr] Terms and conditions", "[fr] Signed in Lisbon"]);
    Ok(())
}

/// Existing output is skipped unless overwriting is forced
#[tokio::test]
async fn test_run_withExistingOutput_shouldSkipUnlessForced() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "memo.docx", &sample_docx())?;
    let existing = common::create_test_file(temp_dir.path(), "memo.fr.docx", b"old")?;
    let controller = controller(MockProvider::working());

    let skipped = controller.run(input.clone(), temp_dir.path().to_path_buf(), false).await?;
    assert!(matches!(skipped, FileOutcome::Skipped(ref path) if *path == existing));
    assert_eq!(fs::read(&existing)?, b"old");

    let forced = controller.run(input, temp_dir.path().to_path_buf(), true).await?;
    assert!(matches!(forced, FileOutcome::Translated(_)));
    assert_ne!(fs::read(&existing)?, b"old");
    Ok(())
}

/// A failing backend produces a report and no output file
#[tokio::test]
async fn test_run_withFailingProvider_shouldReportFailure() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "notice.docx", &sample_docx())?;

    let outcome = controller(MockProvider::failing()).run(input, temp_dir.path().to_path_buf(), false).await?;

    match outcome {
        FileOutcome::Failed(report) => {
            assert_eq!(report.reason, FailureReason::BackendTransientError);
            assert_eq!(report.failed_units.len(), 2);
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    assert!(!temp_dir.path().join("notice.fr.docx").exists());
    Ok(())
}

/// Missing input files are an error, not an outcome
#[test]
fn test_run_withMissingInput_shouldError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = controller(MockProvider::working());

    let result = tokio_test::block_on(async {
        controller
            .run(temp_dir.path().join("absent.pdf"), temp_dir.path().to_path_buf(), false)
            .await
    });

    assert!(result.is_err());
    Ok(())
}

/// A folder run translates every document and counts the broken one
#[tokio::test]
async fn test_run_folder_withMixedDocuments_shouldSummarize() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input_dir = temp_dir.path().join("in");
    let output_dir = temp_dir.path().join("out");
    fs::create_dir_all(&input_dir)?;

    common::create_test_file(&input_dir, "letter.docx", &sample_docx())?;
    common::create_test_file(
        &input_dir,
        "budget.xlsx",
        &common::xlsx_bytes(&["Rent"], &[("Costs", &format!(r#"<row r="1">{}</row>"#, common::xlsx_cell("A1", 0)))]),
    )?;
    common::create_test_file(&input_dir, "slides.pdf", &common::pdf_bytes(&[vec!["Agenda".to_string()]]))?;
    common::create_test_file(&input_dir, "broken.docx", b"not a zip file")?;
    common::create_test_file(&input_dir, "notes.txt", b"ignored")?;

    let summary = controller(MockProvider::working())
        .run_folder(input_dir, Some(output_dir.clone()), false)
        .await?;

    assert_eq!(summary, FolderSummary { translated: 3, skipped: 0, failed: 1 });
    for name in ["letter.fr.docx", "budget.fr.xlsx", "slides.fr.pdf"] {
        assert!(output_dir.join(name).exists(), "{} was not written", name);
    }
    assert!(!output_dir.join("broken.fr.docx").exists());
    Ok(())
}

/// Folders without documents are rejected
#[tokio::test]
async fn test_run_folder_withNoDocuments_shouldError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_test_file(temp_dir.path(), "readme.txt", b"nothing here")?;

    let result = controller(MockProvider::working())
        .run_folder(temp_dir.path().to_path_buf(), None, false)
        .await;

    assert!(result.is_err());
    Ok(())
}
