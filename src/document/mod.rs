/*!
 * Format adapters for translatable office documents.
 *
 * Each supported format lives in its own submodule and implements
 * [`FormatAdapter`]:
 *
 * - `pdf`: text-showing operators of page content streams
 * - `docx`: runs of body and table-cell paragraphs
 * - `xlsx`: string cells of every worksheet
 *
 * The `planner` submodule turns the raw segments an adapter yields into the
 * canonical ordered list of [`TextUnit`]s for a job.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::DocumentError;

pub mod docx;
pub mod ooxml;
pub mod pdf;
pub mod planner;
pub mod xlsx;

pub use self::docx::DocxDocument;
pub use self::pdf::PdfDocument;
pub use self::planner::ExtractionPlanner;
pub use self::xlsx::XlsxDocument;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
}

impl DocumentFormat {
    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
        }
    }

    /// Format for a file extension, case-insensitive
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .ok_or_else(|| DocumentError::UnsupportedFormat(format!("unknown file type '{}'", s)))
    }
}

/// Position of a paragraph inside a DOCX body.
///
/// Tables are numbered in document order, including nested ones; row and
/// cell indices are relative to the innermost table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocxBlock {
    /// Paragraph directly in the body
    Paragraph { index: usize },
    /// Paragraph inside a table cell
    TableCell {
        table: usize,
        row: usize,
        cell: usize,
        paragraph: usize,
    },
}

/// Structural reference to the insertion point of a text unit.
///
/// Locators are structural paths, never byte offsets, so rewriting one unit
/// cannot invalidate another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Locator {
    /// Zero-based page and text run index
    Pdf { page: usize, run: usize },
    /// Paragraph path and run index within that paragraph
    Docx { block: DocxBlock, run: usize },
    /// Sheet name and one-based row/column
    Xlsx { sheet: String, row: u32, column: u32 },
}

impl Locator {
    /// Format the locator belongs to
    pub fn format(&self) -> DocumentFormat {
        match self {
            Self::Pdf { .. } => DocumentFormat::Pdf,
            Self::Docx { .. } => DocumentFormat::Docx,
            Self::Xlsx { .. } => DocumentFormat::Xlsx,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdf { page, run } => write!(f, "pdf:page {} run {}", page + 1, run),
            Self::Docx { block: DocxBlock::Paragraph { index }, run } => {
                write!(f, "docx:paragraph {} run {}", index, run)
            }
            Self::Docx { block: DocxBlock::TableCell { table, row, cell, paragraph }, run } => write!(
                f,
                "docx:table {} row {} cell {} paragraph {} run {}",
                table, row, cell, paragraph, run
            ),
            Self::Xlsx { sheet, row, column } => {
                write!(f, "xlsx:{}!{}{}", sheet, column_name(*column), row)
            }
        }
    }
}

/// Spreadsheet column letters for a one-based column index
pub fn column_name(mut column: u32) -> String {
    let mut name = Vec::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.push(b'A' + rem);
        column = (column - 1) / 26;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

/// Raw text found by an adapter, before planning filters it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub locator: Locator,
    pub text: String,
}

impl TextSegment {
    pub fn new(locator: Locator, text: impl Into<String>) -> Self {
        Self { locator, text: text.into() }
    }
}

/// A translatable unit of a document.
///
/// The source text never changes after extraction; the translation is set
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    locator: Locator,
    source_text: String,
    translated_text: Option<String>,
}

impl TextUnit {
    /// Create an untranslated unit
    pub fn new(locator: Locator, source_text: impl Into<String>) -> Self {
        Self {
            locator,
            source_text: source_text.into(),
            translated_text: None,
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    pub fn translated_text(&self) -> Option<&str> {
        self.translated_text.as_deref()
    }

    pub fn is_translated(&self) -> bool {
        self.translated_text.is_some()
    }

    /// Size of the source text in bytes, as counted against batch limits
    pub fn byte_len(&self) -> usize {
        self.source_text.len()
    }

    /// Record the translation. Returns false if one was already set.
    pub fn set_translation(&mut self, text: impl Into<String>) -> bool {
        if self.translated_text.is_some() {
            return false;
        }
        self.translated_text = Some(text.into());
        true
    }
}

/// Locator to translated text, as handed to [`FormatAdapter::reinsert`]
pub type TranslationMap = HashMap<Locator, String>;

/// Common contract of every format adapter
pub trait FormatAdapter: Send {
    /// Format handled by this adapter
    fn format(&self) -> DocumentFormat;

    /// Walk the document and return every text segment in document order.
    ///
    /// Extraction is deterministic: the same document state always yields
    /// the same sequence.
    fn extract(&self) -> Result<Vec<TextSegment>, DocumentError>;

    /// Replace the text payload at every locator of the map in a single
    /// structural pass. Formatting is never touched.
    fn reinsert(&mut self, translations: &TranslationMap) -> Result<(), DocumentError>;

    /// Serialize the document back to its file format
    fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError>;
}

/// A parsed document, owned by exactly one job
pub enum Document {
    Pdf(PdfDocument),
    Docx(DocxDocument),
    Xlsx(XlsxDocument),
}

impl Document {
    /// Parse a byte stream as the given format
    pub fn parse(bytes: &[u8], format: DocumentFormat) -> Result<Self, DocumentError> {
        Ok(match format {
            DocumentFormat::Pdf => Self::Pdf(PdfDocument::parse(bytes)?),
            DocumentFormat::Docx => Self::Docx(DocxDocument::parse(bytes)?),
            DocumentFormat::Xlsx => Self::Xlsx(XlsxDocument::parse(bytes)?),
        })
    }

    /// Access the adapter for this document
    pub fn adapter(&self) -> &dyn FormatAdapter {
        match self {
            Self::Pdf(doc) => doc,
            Self::Docx(doc) => doc,
            Self::Xlsx(doc) => doc,
        }
    }

    /// Mutable access to the adapter for this document
    pub fn adapter_mut(&mut self) -> &mut dyn FormatAdapter {
        match self {
            Self::Pdf(doc) => doc,
            Self::Docx(doc) => doc,
            Self::Xlsx(doc) => doc,
        }
    }

    pub fn format(&self) -> DocumentFormat {
        self.adapter().format()
    }

    pub fn extract(&self) -> Result<Vec<TextSegment>, DocumentError> {
        self.adapter().extract()
    }

    pub fn reinsert(&mut self, translations: &TranslationMap) -> Result<(), DocumentError> {
        self.adapter_mut().reinsert(translations)
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError> {
        self.adapter_mut().to_bytes()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", self.format())
    }
}

/// Build the error for locators that did not resolve during reinsertion
pub(crate) fn unresolved_error<'a>(
    format: DocumentFormat,
    missing: impl Iterator<Item = &'a Locator>,
) -> Option<DocumentError> {
    let mut missing: Vec<&Locator> = missing.collect();
    if missing.is_empty() {
        return None;
    }
    missing.sort();
    let listed: Vec<String> = missing.iter().take(5).map(|l| l.to_string()).collect();
    Some(DocumentError::ReassemblyError(format!(
        "{} {} locator(s) could not be resolved: {}{}",
        missing.len(),
        format,
        listed.join(", "),
        if missing.len() > 5 { ", ..." } else { "" }
    )))
}
