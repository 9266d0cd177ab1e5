/*!
 * PDF format adapter.
 *
 * Text lives in the content streams of each page as text-showing operators.
 * Every `Tj`, `TJ`, `'` and `"` operation is one run, numbered per page in
 * content order. Reinsertion swaps only the string operands; positioning,
 * fonts and graphics state stay exactly as they were.
 */

use log::{debug, warn};
use lopdf::content::{Content, Operation};
use lopdf::{Document as LoDocument, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, HashSet};

use super::{DocumentFormat, FormatAdapter, Locator, TextSegment, TranslationMap, unresolved_error};
use crate::errors::DocumentError;

/// Kerning (in thousandths of an em) past which a `TJ` gap reads as a space
const TJ_SPACE_THRESHOLD: f64 = -200.0;

const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];

/// A parsed PDF document
#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: LoDocument,
}

impl PdfDocument {
    /// Parse a PDF byte stream
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        if !bytes.starts_with(b"%PDF-") {
            return Err(DocumentError::UnsupportedFormat(
                "missing %PDF- header".to_string(),
            ));
        }

        let inner = LoDocument::load_mem(bytes)
            .map_err(|e| DocumentError::CorruptDocument(format!("failed to parse PDF: {}", e)))?;

        if inner.trailer.get(b"Encrypt").is_ok() {
            return Err(DocumentError::UnsupportedFormat(
                "encrypted PDFs are not supported".to_string(),
            ));
        }

        debug!("Parsed PDF with {} pages", inner.get_pages().len());
        Ok(Self { inner })
    }

    /// Number of pages
    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    fn page_ids(&self) -> Vec<ObjectId> {
        self.inner.get_pages().into_values().collect()
    }

    fn page_content(&self, page_id: ObjectId) -> Result<Content, DocumentError> {
        self.inner
            .get_and_decode_page_content(page_id)
            .map_err(|e| DocumentError::CorruptDocument(format!("unreadable page content: {}", e)))
    }
}

/// Which operand of a text-showing operation carries the text
fn text_operand(operation: &Operation) -> Option<usize> {
    match operation.operator.as_str() {
        "Tj" | "'" | "TJ" => Some(0),
        "\"" => Some(2),
        _ => None,
    }
}

/// Decode a PDF string: UTF-16BE when it starts with a BOM, else one char per byte
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&UTF16_BOM) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => bytes.iter().map(|b| *b as char).collect(),
    }
}

/// Whether every char of `text` fits a single-byte PDF string
pub fn is_single_byte(text: &str) -> bool {
    text.chars().all(|c| (c as u32) <= 0xFF)
}

/// Encode text as a PDF string, single-byte when every char fits
pub fn encode_pdf_string(text: &str) -> Vec<u8> {
    if is_single_byte(text) {
        return text.chars().map(|c| c as u8).collect();
    }
    let mut bytes = UTF16_BOM.to_vec();
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Text shown by one operand: a string, or a `TJ` array of strings and kerns
fn operand_text(operand: &Object) -> String {
    match operand {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        Object::Array(items) => {
            let mut text = String::new();
            let mut gap = false;
            for item in items {
                match item {
                    Object::String(bytes, _) => {
                        let piece = decode_pdf_string(bytes);
                        if gap
                            && !piece.is_empty()
                            && !piece.starts_with(' ')
                            && !text.is_empty()
                            && !text.ends_with(' ')
                        {
                            text.push(' ');
                        }
                        gap = false;
                        text.push_str(&piece);
                    }
                    other => {
                        if number(other).is_some_and(|n| n < TJ_SPACE_THRESHOLD) {
                            gap = true;
                        }
                    }
                }
            }
            text
        }
        _ => String::new(),
    }
}

/// Put a translation into an operand, emptying any further `TJ` strings
fn replace_operand_text(operand: &mut Object, text: &str) {
    let encoded = encode_pdf_string(text);
    match operand {
        Object::Array(items) => {
            let mut placed = false;
            for item in items.iter_mut() {
                if let Object::String(bytes, format) = item {
                    if placed {
                        bytes.clear();
                    } else {
                        *bytes = encoded.clone();
                        *format = StringFormat::Literal;
                        placed = true;
                    }
                }
            }
            if !placed {
                items.insert(0, Object::String(encoded, StringFormat::Literal));
            }
        }
        other => *other = Object::String(encoded, StringFormat::Literal),
    }
}

impl FormatAdapter for PdfDocument {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    fn extract(&self) -> Result<Vec<TextSegment>, DocumentError> {
        let mut segments = Vec::new();

        for (page, page_id) in self.page_ids().into_iter().enumerate() {
            let content = self.page_content(page_id)?;
            let mut run = 0;
            for operation in &content.operations {
                let Some(index) = text_operand(operation) else {
                    continue;
                };
                let text = operation
                    .operands
                    .get(index)
                    .map(operand_text)
                    .unwrap_or_default();
                segments.push(TextSegment::new(Locator::Pdf { page, run }, text));
                run += 1;
            }
        }

        debug!("PDF extraction found {} text runs", segments.len());
        Ok(segments)
    }

    fn reinsert(&mut self, translations: &TranslationMap) -> Result<(), DocumentError> {
        let mut by_page: BTreeMap<usize, Vec<(usize, &Locator, &str)>> = BTreeMap::new();
        for (locator, text) in translations {
            if let Locator::Pdf { page, run } = locator {
                by_page
                    .entry(*page)
                    .or_default()
                    .push((*run, locator, text.as_str()));
            }
        }

        let page_ids = self.page_ids();
        let mut resolved: HashSet<&Locator> = HashSet::new();

        for (page, runs) in &by_page {
            let Some(page_id) = page_ids.get(*page).copied() else {
                continue;
            };

            let mut content = self.page_content(page_id)?;
            let mut run = 0;
            let mut wide_runs = 0;
            for operation in content.operations.iter_mut() {
                let Some(index) = text_operand(operation) else {
                    continue;
                };
                if let Some((_, locator, text)) = runs.iter().find(|(r, _, _)| *r == run) {
                    if let Some(operand) = operation.operands.get_mut(index) {
                        replace_operand_text(operand, text);
                        resolved.insert(*locator);
                        if !is_single_byte(text) {
                            wide_runs += 1;
                        }
                    }
                }
                run += 1;
            }
            if wide_runs > 0 {
                warn!(
                    "Page {}: {} translated runs are outside Latin-1 and were written as UTF-16; fonts without such glyphs will not render them",
                    page + 1,
                    wide_runs
                );
            }

            let encoded = content.encode().map_err(|e| {
                DocumentError::ReassemblyError(format!("failed to encode page {}: {}", page + 1, e))
            })?;
            let stream_id = self.inner.add_object(Stream::new(lopdf::Dictionary::new(), encoded));
            self.inner
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| {
                    DocumentError::ReassemblyError(format!("page {} is not a dictionary: {}", page + 1, e))
                })?
                .set("Contents", Object::Reference(stream_id));
        }

        let missing = translations.keys().filter(|locator| !resolved.contains(locator));
        if let Some(error) = unresolved_error(DocumentFormat::Pdf, missing) {
            return Err(error);
        }

        debug!("PDF reinsertion rewrote {} runs on {} pages", resolved.len(), by_page.len());
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError> {
        let mut bytes = Vec::new();
        self.inner
            .save_to(&mut bytes)
            .map_err(|e| DocumentError::ReassemblyError(format!("failed to write PDF: {}", e)))?;
        Ok(bytes)
    }
}
