/*!
 * End-to-end tests of the job pipeline with mock providers
 */

use anyhow::Result;
use std::time::{Duration, Instant};
use doclingo::document::{Document, DocumentFormat, DocxBlock, ExtractionPlanner, Locator};
use doclingo::errors::FailureReason;
use doclingo::pipeline::{JobId, JobStatus, PipelineOrchestrator};
use doclingo::providers::mock::{MockBehavior, MockProvider};
use doclingo::translation::{BackendLimiter, BatchLimits, DispatchSettings};
use crate::common;

const WAIT_LIMIT: Duration = Duration::from_secs(10);

async fn wait_done(orchestrator: &PipelineOrchestrator, id: JobId) -> doclingo::Job {
    common::init_logging();
    tokio::time::timeout(WAIT_LIMIT, orchestrator.wait(id))
        .await
        .expect("job did not finish in time")
        .expect("job is unknown")
}

async fn wait_for_status(orchestrator: &PipelineOrchestrator, id: JobId, status: JobStatus) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while orchestrator.status(id).map(|job| job.status) != Some(status) {
        assert!(Instant::now() < deadline, "job never reached {}", status);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Fifty runs over three pages, spread 17/17/16
fn fifty_run_pdf() -> Vec<u8> {
    let pages: Vec<Vec<String>> = [17, 17, 16]
        .iter()
        .enumerate()
        .map(|(page, runs)| (0..*runs).map(|run| format!("Page {} line {}", page + 1, run + 1)).collect())
        .collect();
    common::pdf_bytes(&pages)
}

/// A 3 page PDF with 50 runs goes out in batches of 20/20/10 and every run is replaced
#[tokio::test]
async fn test_pdf_job_withFiftyRuns_shouldTranslateEveryLocator() -> Result<()> {
    let provider = MockProvider::working();
    let limits = BatchLimits { max_batch_bytes: 8 * 1024, max_batch_units: 20 };
    let orchestrator = common::orchestrator_with(provider.clone(), BackendLimiter::new(4), common::test_settings(), limits);

    let id = orchestrator.submit(fifty_run_pdf(), DocumentFormat::Pdf, "fr", Some("report.pdf".to_string()));
    let job = wait_done(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Done, "{:?}", job.error);
    assert_eq!(job.total_units, 50);
    assert_eq!(job.total_batches, 3);
    assert_eq!(job.completed_batches, 3);
    assert!(job.notes.is_empty());
    assert_eq!(provider.request_count(), 3);

    let output = orchestrator.output(id).expect("done job has output");
    let translated = Document::parse(&output, DocumentFormat::Pdf)?;
    let units = ExtractionPlanner::plan(&translated)?;
    assert_eq!(units.len(), 50);
    assert_eq!(units[17].locator(), &Locator::Pdf { page: 1, run: 0 });
    assert_eq!(units[17].source_text(), "[fr] Page 2 line 1");
    assert!(units.iter().all(|u| u.source_text().starts_with("[fr] Page ")));
    Ok(())
}

/// Only the batch holding an oversized table cell times out; the job reports that one locator
#[tokio::test]
async fn test_docx_job_withSlowOversizedCell_shouldFailWithOneLocator() -> Result<()> {
    let big_cell = "Lorem ipsum dolor sit amet ".repeat(20);
    let body = format!(
        "{}{}{}",
        common::docx_paragraph("Summary"),
        common::docx_table(&[&["Item", big_cell.as_str()], &["Total", "Done"]]),
        common::docx_paragraph("Appendix"),
    );
    let provider = MockProvider::new(MockBehavior::SlowAbove { threshold_bytes: 300, delay_ms: 2_000 });
    let settings = DispatchSettings {
        call_timeout: Duration::from_millis(100),
        ..common::test_settings()
    };
    let limits = BatchLimits { max_batch_bytes: 200, max_batch_units: 10 };
    let orchestrator = common::orchestrator_with(provider.clone(), BackendLimiter::new(4), settings, limits);

    let id = orchestrator.submit(common::docx_bytes(&body), DocumentFormat::Docx, "de", None);
    let job = wait_done(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("failed job has an error");
    assert_eq!(error.reason, FailureReason::BackendTransientError);
    assert_eq!(error.failed_units.len(), 1);
    assert_eq!(
        error.failed_units[0].locator,
        Locator::Docx {
            block: DocxBlock::TableCell { table: 0, row: 0, cell: 1, paragraph: 0 },
            run: 0
        }
    );
    // First attempt plus two retries for the slow batch
    assert_eq!(provider.request_count(), job.total_batches + 2);
    assert!(orchestrator.output(id).is_none());
    Ok(())
}

/// A unit above the hard size limit is kept as-is and noted, but the job completes
#[tokio::test]
async fn test_docx_job_withUnitTooLarge_shouldFinishWithNote() -> Result<()> {
    let huge = "word ".repeat(100);
    let body = format!("{}{}", common::docx_paragraph("Short"), common::docx_paragraph(&huge));
    let settings = DispatchSettings { max_unit_bytes: 128, ..common::test_settings() };
    let orchestrator = common::orchestrator_with(MockProvider::working(), BackendLimiter::new(2), settings, BatchLimits::default());

    let id = orchestrator.submit(common::docx_bytes(&body), DocumentFormat::Docx, "fr", None);
    let job = wait_done(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Done, "{:?}", job.error);
    assert_eq!(job.notes.len(), 1);
    assert_eq!(job.notes[0].reason, FailureReason::UnitTooLarge);

    let output = orchestrator.output(id).expect("done job has output");
    let texts: Vec<String> = Document::parse(&output, DocumentFormat::Docx)?
        .extract()?
        .into_iter()
        .map(|s| s.text)
        .collect();
    assert_eq!(texts, vec!["[fr] Short".to_string(), huge]);
    Ok(())
}

/// A reply with the wrong number of texts fails the job without retrying
#[tokio::test]
async fn test_xlsx_job_withWrongCountReply_shouldReportContractViolation() -> Result<()> {
    let bytes = common::xlsx_bytes(
        &["Product", "Price", "Widget"],
        &[(
            "Sales",
            &format!(
                r#"<row r="1">{}{}</row><row r="2">{}<c r="B2"><v>9.5</v></c></row>"#,
                common::xlsx_cell("A1", 0),
                common::xlsx_cell("B1", 1),
                common::xlsx_cell("A2", 2)
            ),
        )],
    );
    let provider = MockProvider::wrong_count();
    let orchestrator = common::orchestrator_with(provider.clone(), BackendLimiter::new(2), common::test_settings(), BatchLimits::default());

    let id = orchestrator.submit(bytes, DocumentFormat::Xlsx, "es", None);
    let job = wait_done(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("failed job has an error");
    assert_eq!(error.reason, FailureReason::BackendContractViolation);
    let locators: Vec<String> = error.failed_units.iter().map(|u| u.locator.to_string()).collect();
    assert_eq!(locators, vec!["xlsx:Sales!A1", "xlsx:Sales!B1", "xlsx:Sales!A2"]);
    assert!(error.to_string().contains("xlsx:Sales!B1"));
    assert_eq!(provider.request_count(), 1);
    Ok(())
}

/// Cancelling mid-translation fails the job quickly and yields no output
#[tokio::test]
async fn test_cancel_duringTranslation_shouldFailAsCancelled() -> Result<()> {
    let pages = vec![(0..10).map(|i| format!("Sentence number {}", i + 1)).collect::<Vec<_>>()];
    let provider = MockProvider::slow(5_000);
    let settings = DispatchSettings {
        call_timeout: Duration::from_secs(30),
        ..common::test_settings()
    };
    let limits = BatchLimits { max_batch_bytes: 8 * 1024, max_batch_units: 2 };
    let orchestrator = common::orchestrator_with(provider, BackendLimiter::new(4), settings, limits);

    let id = orchestrator.submit(common::pdf_bytes(&pages), DocumentFormat::Pdf, "it", None);
    wait_for_status(&orchestrator, id, JobStatus::Translating).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    assert!(orchestrator.cancel(id));
    let job = wait_done(&orchestrator, id).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.expect("cancelled job has an error").reason, FailureReason::Cancelled);
    let snapshot = orchestrator.poll_status(id).expect("job is still tracked");
    assert!(snapshot.output.is_none());
    // Finished jobs cannot be cancelled again
    assert!(!orchestrator.cancel(id));
    Ok(())
}

/// Transient failures are retried until the batch succeeds
#[tokio::test]
async fn test_docx_job_withIntermittentProvider_shouldRecover() -> Result<()> {
    let body: String = (1..=6).map(|i| common::docx_paragraph(&format!("Paragraph {}", i))).collect();
    let provider = MockProvider::intermittent(2);
    let settings = DispatchSettings { concurrent_batches: 1, ..common::test_settings() };
    let limits = BatchLimits { max_batch_bytes: 8 * 1024, max_batch_units: 3 };
    let orchestrator = common::orchestrator_with(provider.clone(), BackendLimiter::new(1), settings, limits);

    let id = orchestrator.submit(common::docx_bytes(&body), DocumentFormat::Docx, "nl", None);
    let job = wait_done(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Done, "{:?}", job.error);
    // Every second request fails: ok, fail, ok
    assert_eq!(provider.request_count(), 3);
    Ok(())
}

/// Jobs on separate orchestrators sharing one limiter never exceed its capacity
#[tokio::test]
async fn test_shared_limiter_acrossJobs_shouldBoundCallsInFlight() -> Result<()> {
    let provider = MockProvider::working().with_latency(Duration::from_millis(30));
    let limiter = BackendLimiter::new(2);
    let limits = BatchLimits { max_batch_bytes: 8 * 1024, max_batch_units: 2 };
    let first = common::orchestrator_with(provider.clone(), limiter.clone(), common::test_settings(), limits);
    let second = common::orchestrator_with(provider.clone(), limiter.clone(), common::test_settings(), limits);

    let body: String = (1..=8).map(|i| common::docx_paragraph(&format!("Clause {}", i))).collect();
    let mut submitted = Vec::new();
    for orchestrator in [&first, &second, &first, &second] {
        let id = orchestrator.submit(common::docx_bytes(&body), DocumentFormat::Docx, "fr", None);
        submitted.push((orchestrator, id));
    }

    for (orchestrator, id) in submitted {
        let job = wait_done(orchestrator, id).await;
        assert_eq!(job.status, JobStatus::Done, "{:?}", job.error);
    }

    assert_eq!(provider.request_count(), 16);
    assert!(provider.max_in_flight() <= 2, "saw {} calls in flight", provider.max_in_flight());
    assert_eq!(limiter.available(), 2);
    Ok(())
}

/// A document with nothing to translate completes with its bytes rewritten unchanged
#[tokio::test]
async fn test_job_withNoTranslatableText_shouldFinishWithoutCalls() -> Result<()> {
    let provider = MockProvider::working();
    let orchestrator = common::mock_orchestrator(provider.clone());
    let bytes = common::pdf_bytes(&[vec!["2024".to_string(), "- 3 -".to_string()]]);

    let id = orchestrator.submit(bytes, DocumentFormat::Pdf, "fr", None);
    let job = wait_done(&orchestrator, id).await;

    assert_eq!(job.status, JobStatus::Done, "{:?}", job.error);
    assert_eq!(job.total_units, 0);
    assert_eq!(job.total_batches, 0);
    assert_eq!(provider.request_count(), 0);
    let output = orchestrator.output(id).expect("done job has output");
    let segments = Document::parse(&output, DocumentFormat::Pdf)?.extract()?;
    assert_eq!(segments.len(), 2);
    Ok(())
}

/// Identity translation through the whole pipeline keeps every format's text
#[tokio::test]
async fn test_echo_jobs_withEveryFormat_shouldRoundTrip() -> Result<()> {
    let orchestrator = common::mock_orchestrator(MockProvider::echo());
    let docx = common::docx_bytes(&format!(
        "{}{}",
        common::docx_paragraph("Hello"),
        common::docx_table(&[&["Left", "Right"]])
    ));
    let xlsx = common::xlsx_bytes(
        &["Alpha", "Beta"],
        &[("Data", &format!(r#"<row r="1">{}{}</row>"#, common::xlsx_cell("A1", 0), common::xlsx_cell("C1", 1)))],
    );
    let pdf = common::pdf_bytes(&[vec!["Hello".to_string()], vec!["World".to_string()]]);

    for (bytes, format) in [(docx, DocumentFormat::Docx), (xlsx, DocumentFormat::Xlsx), (pdf, DocumentFormat::Pdf)] {
        let before = ExtractionPlanner::plan(&Document::parse(&bytes, format)?)?;
        let id = orchestrator.submit(bytes, format, "en", None);
        let job = wait_done(&orchestrator, id).await;
        assert_eq!(job.status, JobStatus::Done, "{} failed: {:?}", format, job.error);

        let output = orchestrator.output(id).expect("done job has output");
        let after = ExtractionPlanner::plan(&Document::parse(&output, format)?)?;
        assert_eq!(before, after, "{} changed under identity translation", format);
    }
    assert_eq!(orchestrator.jobs().len(), 3);
    Ok(())
}
