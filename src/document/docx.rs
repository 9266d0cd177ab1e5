/*!
 * DOCX format adapter.
 *
 * Walks `word/document.xml` in document order. Every `<w:r>` that carries
 * `<w:t>` text is one segment, located by its paragraph path and its index
 * among the runs of that paragraph. Table content is reached row-major as
 * the XML lists it.
 *
 * Tabs and line breaks inside a run read as `\t` and `\n`. A rewritten run
 * gets its tabs and breaks from the translation, in the translation's order.
 */

use log::debug;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashSet;
use std::io::Cursor;

use super::ooxml::{self, ZipPackage};
use super::{
    DocumentFormat, DocxBlock, FormatAdapter, Locator, TextSegment, TranslationMap,
    unresolved_error,
};
use crate::errors::DocumentError;

const DOCUMENT_PART: &str = "word/document.xml";

/// A parsed Word document
#[derive(Debug, Clone)]
pub struct DocxDocument {
    package: ZipPackage,
}

impl DocxDocument {
    /// Parse a DOCX byte stream
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let package = ZipPackage::read(bytes)?;
        if !package.contains(DOCUMENT_PART) {
            return Err(DocumentError::UnsupportedFormat(format!(
                "ZIP container has no {}",
                DOCUMENT_PART
            )));
        }
        Ok(Self { package })
    }
}

#[derive(Debug)]
struct TableFrame {
    index: usize,
    row: Option<usize>,
    cell: Option<usize>,
    paragraphs_in_cell: usize,
}

#[derive(Debug)]
struct ParagraphFrame {
    block: DocxBlock,
    runs: usize,
}

#[derive(Debug)]
struct RunFrame {
    locator: Locator,
    text: String,
    text_elements: usize,
}

/// Tracks the structural position while streaming through the body.
///
/// Extraction and reinsertion drive the same walker, so both sides always
/// agree on locators.
#[derive(Debug, Default)]
struct BodyWalker {
    body_paragraphs: usize,
    tables_seen: usize,
    tables: Vec<TableFrame>,
    paragraphs: Vec<ParagraphFrame>,
    runs: Vec<RunFrame>,
    in_text: bool,
}

impl BodyWalker {
    fn enter(&mut self, name: &[u8]) {
        match name {
            b"w:tbl" => {
                self.tables.push(TableFrame {
                    index: self.tables_seen,
                    row: None,
                    cell: None,
                    paragraphs_in_cell: 0,
                });
                self.tables_seen += 1;
            }
            b"w:tr" => {
                if let Some(table) = self.tables.last_mut() {
                    table.row = Some(table.row.map_or(0, |r| r + 1));
                    table.cell = None;
                }
            }
            b"w:tc" => {
                if let Some(table) = self.tables.last_mut() {
                    table.cell = Some(table.cell.map_or(0, |c| c + 1));
                    table.paragraphs_in_cell = 0;
                }
            }
            b"w:p" => {
                let block = match self.tables.last_mut() {
                    Some(table) => {
                        let paragraph = table.paragraphs_in_cell;
                        table.paragraphs_in_cell += 1;
                        DocxBlock::TableCell {
                            table: table.index,
                            row: table.row.unwrap_or(0),
                            cell: table.cell.unwrap_or(0),
                            paragraph,
                        }
                    }
                    None => {
                        let index = self.body_paragraphs;
                        self.body_paragraphs += 1;
                        DocxBlock::Paragraph { index }
                    }
                };
                self.paragraphs.push(ParagraphFrame { block, runs: 0 });
            }
            b"w:r" => {
                if let Some(paragraph) = self.paragraphs.last_mut() {
                    let locator = Locator::Docx {
                        block: paragraph.block.clone(),
                        run: paragraph.runs,
                    };
                    paragraph.runs += 1;
                    self.runs.push(RunFrame {
                        locator,
                        text: String::new(),
                        text_elements: 0,
                    });
                }
            }
            b"w:t" => {
                if let Some(run) = self.runs.last_mut() {
                    run.text_elements += 1;
                    self.in_text = true;
                }
            }
            _ => {}
        }
    }

    /// Close an element. Returns the finished run when a `</w:r>` closes.
    fn leave(&mut self, name: &[u8]) -> Option<RunFrame> {
        match name {
            b"w:tbl" => {
                self.tables.pop();
            }
            b"w:p" => {
                self.paragraphs.pop();
            }
            b"w:r" => {
                // Runs only open inside paragraphs; ignore stray closes
                if !self.paragraphs.is_empty() {
                    return self.runs.pop();
                }
            }
            b"w:t" => self.in_text = false,
            _ => {}
        }
        None
    }

    fn current_run(&self) -> Option<&RunFrame> {
        self.runs.last()
    }

    /// A `<w:tab/>` or line break inside the current run
    fn push_separator(&mut self, separator: char) {
        if let Some(run) = self.runs.last_mut() {
            run.text.push(separator);
        }
    }

    fn push_text(&mut self, text: &str) {
        if self.in_text {
            if let Some(run) = self.runs.last_mut() {
                run.text.push_str(text);
            }
        }
    }
}

impl FormatAdapter for DocxDocument {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Docx
    }

    fn extract(&self) -> Result<Vec<TextSegment>, DocumentError> {
        let xml = self.package.xml_part(DOCUMENT_PART)?;
        let mut reader = Reader::from_str(xml);
        let mut walker = BodyWalker::default();
        let mut segments = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) => walker.enter(e.name().as_ref()),
                Ok(Event::Empty(e)) => {
                    let name = e.name();
                    walker.enter(name.as_ref());
                    if let Some(separator) = separator_of(&e) {
                        walker.push_separator(separator);
                    }
                    if let Some(run) = walker.leave(name.as_ref()) {
                        if run.text_elements > 0 {
                            segments.push(TextSegment::new(run.locator, run.text));
                        }
                    }
                }
                Ok(Event::End(e)) => {
                    if let Some(run) = walker.leave(e.name().as_ref()) {
                        if run.text_elements > 0 {
                            segments.push(TextSegment::new(run.locator, run.text));
                        }
                    }
                }
                Ok(Event::Text(e)) => {
                    let text = e.unescape().map_err(|err| ooxml::xml_error(DOCUMENT_PART, err))?;
                    walker.push_text(&text);
                }
                Ok(_) => {}
                Err(e) => return Err(ooxml::xml_error(DOCUMENT_PART, e)),
            }
        }

        debug!("DOCX extraction found {} text runs", segments.len());
        Ok(segments)
    }

    fn reinsert(&mut self, translations: &TranslationMap) -> Result<(), DocumentError> {
        let xml = self.package.xml_part(DOCUMENT_PART)?;
        let mut reader = Reader::from_str(xml);
        let mut writer = Writer::new(Cursor::new(Vec::with_capacity(xml.len())));
        let mut walker = BodyWalker::default();
        let mut resolved: HashSet<Locator> = HashSet::new();
        // Translation for the run being rewritten, and whether it was written yet
        let mut active: Option<(&str, bool)> = None;
        let mut carry = TextCarry::Keep;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| ooxml::xml_error(DOCUMENT_PART, e))?;

            match event {
                Event::Eof => break,
                Event::Start(e) => {
                    let name = e.name();
                    walker.enter(name.as_ref());
                    match name.as_ref() {
                        b"w:r" => {
                            active = walker
                                .current_run()
                                .and_then(|run| translations.get(&run.locator))
                                .map(|text| (text.as_str(), false));
                        }
                        b"w:t" if active.is_some() => {
                            carry = TextCarry::Blank;
                            if let Some((text, written)) = active.as_mut() {
                                if !*written {
                                    write_run_text(&mut writer, *text, &preserve_space(&e))?;
                                    *written = true;
                                    carry = TextCarry::Drop;
                                    continue;
                                }
                            }
                        }
                        _ => {}
                    }
                    writer
                        .write_event(Event::Start(e))
                        .map_err(|err| ooxml::xml_write_error(DOCUMENT_PART, err))?;
                }
                Event::Empty(e) => {
                    let name = e.name();
                    walker.enter(name.as_ref());
                    let is_text = name.as_ref() == b"w:t";
                    let is_separator = separator_of(&e).is_some();
                    let mut replaced = false;
                    if let Some((text, written)) = active.as_mut() {
                        if !*written && (is_text || is_separator) {
                            let start = if is_text { preserve_space(&e) } else { text_start() };
                            write_run_text(&mut writer, *text, &start)?;
                            *written = true;
                            replaced = true;
                        } else if is_separator {
                            // Already carried by the translation
                            replaced = true;
                        }
                    }
                    if !replaced {
                        writer
                            .write_event(Event::Empty(e.borrow()))
                            .map_err(|err| ooxml::xml_write_error(DOCUMENT_PART, err))?;
                    }
                    if let Some(run) = walker.leave(name.as_ref()) {
                        if active.is_some_and(|(_, written)| written) {
                            resolved.insert(run.locator);
                        }
                        active = None;
                    }
                }
                Event::End(e) => {
                    let name = e.name();
                    let mut dropped = false;
                    if name.as_ref() == b"w:t" {
                        dropped = carry == TextCarry::Drop;
                        carry = TextCarry::Keep;
                    }
                    if let Some(run) = walker.leave(name.as_ref()) {
                        if active.is_some_and(|(_, written)| written) {
                            resolved.insert(run.locator);
                        }
                        active = None;
                    }
                    if !dropped {
                        writer
                            .write_event(Event::End(e))
                            .map_err(|err| ooxml::xml_write_error(DOCUMENT_PART, err))?;
                    }
                }
                // Text of a rewritten run is replaced wholesale
                Event::Text(_) if carry != TextCarry::Keep => {}
                other => {
                    writer
                        .write_event(other)
                        .map_err(|err| ooxml::xml_write_error(DOCUMENT_PART, err))?;
                }
            }
        }

        let wanted = translations
            .keys()
            .filter(|locator| !resolved.contains(*locator));
        if let Some(error) = unresolved_error(DocumentFormat::Docx, wanted) {
            return Err(error);
        }

        let rewritten = writer.into_inner().into_inner();
        self.package.replace_part(DOCUMENT_PART, rewritten)?;
        debug!("DOCX reinsertion rewrote {} runs", resolved.len());
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError> {
        self.package.write()
    }
}

/// How the `<w:t>` being read is carried into a rewritten run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextCarry {
    Keep,
    /// Element kept, its text dropped
    Blank,
    /// Element and text dropped; the translation was written in its place
    Drop,
}

/// Character a run-level element stands for. Page and column breaks are
/// layout, not text.
fn separator_of(element: &BytesStart<'_>) -> Option<char> {
    match element.name().as_ref() {
        // Tab stop definitions in `w:tabs` carry a position
        b"w:tab" if ooxml::attr_value(element, b"w:pos").is_none() => Some('\t'),
        b"w:cr" => Some('\n'),
        b"w:br" => match ooxml::attr_value(element, b"w:type").as_deref() {
            None | Some("textWrapping") => Some('\n'),
            _ => None,
        },
        _ => None,
    }
}

/// Write a translation as `<w:t>` pieces split by `<w:tab/>` and `<w:br/>`
fn write_run_text(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    text: &str,
    start: &BytesStart<'_>,
) -> Result<(), DocumentError> {
    let mut piece_start = 0;
    for (i, c) in text.char_indices() {
        let separator = match c {
            '\t' => "w:tab",
            '\n' => "w:br",
            _ => continue,
        };
        write_text_element(writer, &text[piece_start..i], start)?;
        writer
            .write_event(Event::Empty(BytesStart::new(separator)))
            .map_err(|err| ooxml::xml_write_error(DOCUMENT_PART, err))?;
        piece_start = i + c.len_utf8();
    }
    write_text_element(writer, &text[piece_start..], start)
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    text: &str,
    start: &BytesStart<'_>,
) -> Result<(), DocumentError> {
    let events = [
        Event::Start(start.borrow()),
        Event::Text(BytesText::new(text)),
        Event::End(start.to_end()),
    ];
    for event in events {
        writer
            .write_event(event)
            .map_err(|err| ooxml::xml_write_error(DOCUMENT_PART, err))?;
    }
    Ok(())
}

/// A fresh `<w:t xml:space="preserve">`
fn text_start() -> BytesStart<'static> {
    let mut start = BytesStart::new("w:t");
    start.push_attribute(("xml:space", "preserve"));
    start
}

/// Copy of a `<w:t>` start tag with `xml:space="preserve"` set
fn preserve_space(element: &BytesStart<'_>) -> BytesStart<'static> {
    let mut start = element.to_owned();
    if ooxml::attr_value(element, b"xml:space").is_none() {
        start.push_attribute(("xml:space", "preserve"));
    }
    start
}
