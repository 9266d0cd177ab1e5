/*!
 * Tests for format adapters and extraction planning through the public API
 */

use anyhow::Result;
use doclingo::document::{Document, DocumentFormat, DocxBlock, ExtractionPlanner, Locator, TextUnit, XlsxDocument};
use doclingo::errors::DocumentError;
use doclingo::pipeline::ReassemblyEngine;
use crate::common;

fn listing(units: &[TextUnit]) -> Vec<(String, String)> {
    units
        .iter()
        .map(|u| (u.locator().to_string(), u.source_text().to_string()))
        .collect()
}

/// Reinsert every unit's own text and extract again
fn identity_round_trip(bytes: &[u8], format: DocumentFormat) -> Result<(Vec<TextUnit>, Vec<TextUnit>)> {
    let mut document = Document::parse(bytes, format)?;
    let units = ExtractionPlanner::plan(&document)?;

    let mut translated = units.clone();
    for unit in translated.iter_mut() {
        let text = unit.source_text().to_string();
        unit.set_translation(text);
    }
    let output = ReassemblyEngine::reassemble(&mut document, &translated)?;

    let reparsed = Document::parse(&output, format)?;
    Ok((units, ExtractionPlanner::plan(&reparsed)?))
}

fn sample_docx() -> Vec<u8> {
    let body = format!(
        "{}{}{}",
        common::docx_paragraph("Quarterly report"),
        common::docx_table(&[&["Region", "Revenue"], &["North", "1200"]]),
        common::docx_paragraph("Prepared by the finance team"),
    );
    common::docx_bytes(&body)
}

fn sample_xlsx() -> Vec<u8> {
    common::xlsx_bytes(
        &["Region", "North", "South"],
        &[
            (
                "Sales",
                &format!(
                    r#"<row r="1">{}<c r="B1"><v>2024</v></c></row><row r="2">{}</row>"#,
                    common::xlsx_cell("A1", 0),
                    common::xlsx_cell("A2", 1)
                ),
            ),
            ("Notes", &format!(r#"<row r="3">{}</row>"#, common::xlsx_cell("B3", 2))),
        ],
    )
}

fn sample_pdf() -> Vec<u8> {
    common::pdf_bytes(&[
        vec!["Introduction".to_string(), "42".to_string()],
        vec!["Conclusion".to_string()],
    ])
}

/// Identity translation must give back the same units for every format
#[test]
fn test_identity_round_trip_withEveryFormat_shouldPreserveUnits() -> Result<()> {
    for (bytes, format) in [
        (sample_docx(), DocumentFormat::Docx),
        (sample_xlsx(), DocumentFormat::Xlsx),
        (sample_pdf(), DocumentFormat::Pdf),
    ] {
        let (before, after) = identity_round_trip(&bytes, format)?;
        assert!(!before.is_empty(), "{} sample has no units", format);
        assert_eq!(listing(&before), listing(&after), "{} round trip changed units", format);
    }
    Ok(())
}

/// DOCX units follow document order through tables
#[test]
fn test_docx_plan_withTable_shouldSkipNumbersAndKeepOrder() -> Result<()> {
    let document = Document::parse(&sample_docx(), DocumentFormat::Docx)?;
    let units = ExtractionPlanner::plan(&document)?;

    let texts: Vec<&str> = units.iter().map(|u| u.source_text()).collect();
    assert_eq!(texts, vec!["Quarterly report", "Region", "Revenue", "North", "Prepared by the finance team"]);
    assert_eq!(
        units[2].locator(),
        &Locator::Docx {
            block: DocxBlock::TableCell { table: 0, row: 0, cell: 1, paragraph: 0 },
            run: 0
        }
    );
    assert_eq!(units[4].locator(), &Locator::Docx { block: DocxBlock::Paragraph { index: 1 }, run: 0 });
    Ok(())
}

/// XLSX units carry sheet name, row and column
#[test]
fn test_xlsx_plan_withTwoSheets_shouldAddressCellsBySheet() -> Result<()> {
    assert_eq!(XlsxDocument::parse(&sample_xlsx())?.sheet_names(), vec!["Sales", "Notes"]);
    let document = Document::parse(&sample_xlsx(), DocumentFormat::Xlsx)?;
    let units = ExtractionPlanner::plan(&document)?;

    let locators: Vec<String> = units.iter().map(|u| u.locator().to_string()).collect();
    assert_eq!(locators, vec!["xlsx:Sales!A1", "xlsx:Sales!A2", "xlsx:Notes!B3"]);
    assert_eq!(
        units[2].locator(),
        &Locator::Xlsx { sheet: "Notes".to_string(), row: 3, column: 2 }
    );
    Ok(())
}

/// PDF runs are numbered per page and numeric runs are not planned
#[test]
fn test_pdf_plan_shouldNumberRunsPerPage() -> Result<()> {
    let document = Document::parse(&sample_pdf(), DocumentFormat::Pdf)?;
    let segments = document.extract()?;
    let units = ExtractionPlanner::plan(&document)?;

    assert_eq!(segments.len(), 3);
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].locator(), &Locator::Pdf { page: 0, run: 0 });
    assert_eq!(units[1].locator(), &Locator::Pdf { page: 1, run: 0 });
    Ok(())
}

/// Translations change only the text at the addressed locators
#[test]
fn test_reassemble_withTranslatedDocx_shouldReplaceOnlyText() -> Result<()> {
    let mut document = Document::parse(&sample_docx(), DocumentFormat::Docx)?;
    let mut units = ExtractionPlanner::plan(&document)?;
    for unit in units.iter_mut() {
        let text = format!("FR {}", unit.source_text());
        unit.set_translation(text);
    }

    let output = ReassemblyEngine::reassemble(&mut document, &units)?;
    let reparsed = Document::parse(&output, DocumentFormat::Docx)?;
    let texts: Vec<String> = reparsed.extract()?.into_iter().map(|s| s.text).collect();

    assert_eq!(
        texts,
        vec!["FR Quarterly report", "FR Region", "FR Revenue", "FR North", "1200", "FR Prepared by the finance team"]
    );
    Ok(())
}

/// Bytes that are no known container are rejected before any work
#[test]
fn test_parse_withGarbage_shouldFailWithDocumentError() {
    assert!(matches!(
        Document::parse(b"not a document", DocumentFormat::Pdf),
        Err(DocumentError::CorruptDocument(_)) | Err(DocumentError::UnsupportedFormat(_))
    ));
    assert!(Document::parse(b"PK\x03\x04garbage", DocumentFormat::Docx).is_err());

    // A workbook is not a Word document
    let workbook = sample_xlsx();
    assert!(matches!(
        Document::parse(&workbook, DocumentFormat::Docx),
        Err(DocumentError::UnsupportedFormat(_))
    ));
}

/// A unit without translation cannot be reassembled
#[test]
fn test_reassemble_withMissingTranslation_shouldFail() -> Result<()> {
    let mut document = Document::parse(&sample_pdf(), DocumentFormat::Pdf)?;
    let units = ExtractionPlanner::plan(&document)?;

    let result = ReassemblyEngine::reassemble(&mut document, &units);

    assert!(matches!(result, Err(DocumentError::ReassemblyError(_))));
    Ok(())
}
