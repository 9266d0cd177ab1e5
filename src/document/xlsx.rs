/*!
 * XLSX format adapter.
 *
 * Sheets are visited in workbook order and cells in the order the sheet XML
 * lists them, which is row-major. Only string cells without a formula are
 * translatable: shared-string cells (`t="s"`) and inline-string cells
 * (`t="inlineStr"`). Translated cells are rewritten as inline strings so the
 * shared string table never has to change. Rich text keeps its runs: the
 * translation goes into the first run and the others are emptied.
 */

use log::{debug, warn};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};

use super::ooxml::{self, ZipPackage};
use super::{DocumentFormat, FormatAdapter, Locator, TextSegment, TranslationMap, unresolved_error};
use crate::errors::DocumentError;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// A worksheet and the package part that holds it
#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetRef {
    name: String,
    path: String,
}

/// One formatted run of a rich string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RichRun {
    /// Raw `<rPr>` markup, copied back unchanged
    properties: Option<Vec<u8>>,
    text: String,
}

/// Text of a `<si>` or `<is>` item; `runs` is empty for plain strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct StringItem {
    text: String,
    runs: Vec<RichRun>,
}

/// Collects the text and runs of one string item from its inner events
#[derive(Default)]
struct ItemCollector {
    item: StringItem,
    run: Option<RichRun>,
    properties: Option<Writer<Vec<u8>>>,
    in_text: bool,
    in_phonetic: bool,
}

impl ItemCollector {
    fn feed(&mut self, event: &Event<'_>, part: &str) -> Result<(), DocumentError> {
        if let Some(writer) = self.properties.as_mut() {
            writer
                .write_event(event.clone())
                .map_err(|e| ooxml::xml_write_error(part, e))?;
            if matches!(event, Event::End(e) if e.local_name().as_ref() == b"rPr") {
                let raw = self.properties.take().map(Writer::into_inner);
                if let Some(run) = self.run.as_mut() {
                    run.properties = raw;
                }
            }
            return Ok(());
        }

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"r" => self.run = Some(RichRun::default()),
                b"rPr" if self.run.is_some() => {
                    let mut writer = Writer::new(Vec::new());
                    writer
                        .write_event(event.clone())
                        .map_err(|err| ooxml::xml_write_error(part, err))?;
                    self.properties = Some(writer);
                }
                b"rPh" => self.in_phonetic = true,
                b"t" if !self.in_phonetic => self.in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"rPr" => {
                if let Some(run) = self.run.as_mut() {
                    let mut writer = Writer::new(Vec::new());
                    writer
                        .write_event(event.clone())
                        .map_err(|err| ooxml::xml_write_error(part, err))?;
                    run.properties = Some(writer.into_inner());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"r" => {
                    if let Some(run) = self.run.take() {
                        self.item.runs.push(run);
                    }
                }
                b"rPh" => self.in_phonetic = false,
                b"t" => self.in_text = false,
                _ => {}
            },
            Event::Text(e) if self.in_text => {
                let text = e.unescape().map_err(|err| ooxml::xml_error(part, err))?;
                self.item.text.push_str(&text);
                if let Some(run) = self.run.as_mut() {
                    run.text.push_str(&text);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> StringItem {
        self.item
    }
}

/// A parsed Excel workbook
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    package: ZipPackage,
    sheets: Vec<SheetRef>,
    shared_strings: Vec<StringItem>,
}

impl XlsxDocument {
    /// Parse an XLSX byte stream
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let package = ZipPackage::read(bytes)?;
        if !package.contains(WORKBOOK_PART) {
            return Err(DocumentError::UnsupportedFormat(format!(
                "ZIP container has no {}",
                WORKBOOK_PART
            )));
        }

        let sheets = read_sheets(&package)?;
        let shared_strings = match package.part(SHARED_STRINGS_PART) {
            Some(_) => read_shared_strings(package.xml_part(SHARED_STRINGS_PART)?)?,
            None => Vec::new(),
        };

        debug!(
            "Parsed workbook with {} sheets and {} shared strings",
            sheets.len(),
            shared_strings.len()
        );

        Ok(Self { package, sheets, shared_strings })
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

impl FormatAdapter for XlsxDocument {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Xlsx
    }

    fn extract(&self) -> Result<Vec<TextSegment>, DocumentError> {
        let mut segments = Vec::new();
        for sheet in &self.sheets {
            let xml = self.package.xml_part(&sheet.path)?;
            extract_sheet(xml, sheet, &self.shared_strings, &mut segments)?;
        }
        debug!("XLSX extraction found {} string cells", segments.len());
        Ok(segments)
    }

    fn reinsert(&mut self, translations: &TranslationMap) -> Result<(), DocumentError> {
        let mut resolved: HashSet<Locator> = HashSet::new();

        for sheet in &self.sheets {
            let wanted = translations.keys().any(|locator| {
                matches!(locator, Locator::Xlsx { sheet: name, .. } if *name == sheet.name)
            });
            if !wanted {
                continue;
            }

            let xml = self.package.xml_part(&sheet.path)?;
            let rewritten = rewrite_sheet(xml, sheet, &self.shared_strings, translations, &mut resolved)?;
            self.package.replace_part(&sheet.path, rewritten)?;
        }

        let missing = translations
            .keys()
            .filter(|locator| !resolved.contains(*locator));
        if let Some(error) = unresolved_error(DocumentFormat::Xlsx, missing) {
            return Err(error);
        }

        debug!("XLSX reinsertion rewrote {} cells", resolved.len());
        Ok(())
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>, DocumentError> {
        self.package.write()
    }
}

/// Unescaped value of a namespaced attribute, matched on its local name
fn prefixed_attr(element: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.prefix().is_some() && attr.key.local_name().as_ref() == local)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Resolve the worksheets listed in the workbook, in order
fn read_sheets(package: &ZipPackage) -> Result<Vec<SheetRef>, DocumentError> {
    let mut targets: HashMap<String, (String, String)> = HashMap::new();
    if package.part(WORKBOOK_RELS_PART).is_some() {
        let rels = package.xml_part(WORKBOOK_RELS_PART)?;
        let mut reader = Reader::from_str(rels);
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    let id = ooxml::attr_value(&e, b"Id");
                    let kind = ooxml::attr_value(&e, b"Type").unwrap_or_default();
                    let target = ooxml::attr_value(&e, b"Target");
                    if let (Some(id), Some(target)) = (id, target) {
                        targets.insert(id, (kind, target));
                    }
                }
                Ok(_) => {}
                Err(e) => return Err(ooxml::xml_error(WORKBOOK_RELS_PART, e)),
            }
        }
    }

    let workbook = package.xml_part(WORKBOOK_PART)?;
    let mut reader = Reader::from_str(workbook);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let name = ooxml::attr_value(&e, b"name").ok_or_else(|| {
                    DocumentError::CorruptDocument("sheet without a name".to_string())
                })?;
                let rel_id = prefixed_attr(&e, b"id").ok_or_else(|| {
                    DocumentError::CorruptDocument(format!("sheet '{}' has no relationship", name))
                })?;
                let (kind, target) = targets.get(&rel_id).ok_or_else(|| {
                    DocumentError::CorruptDocument(format!(
                        "sheet '{}' points at unknown relationship {}",
                        name, rel_id
                    ))
                })?;

                if !kind.ends_with("/worksheet") {
                    debug!("Skipping non-worksheet sheet '{}'", name);
                    continue;
                }

                let path = match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{}", target),
                };
                if !package.contains(&path) {
                    return Err(DocumentError::CorruptDocument(format!(
                        "sheet '{}' part {} is missing",
                        name, path
                    )));
                }
                sheets.push(SheetRef { name, path });
            }
            Ok(_) => {}
            Err(e) => return Err(ooxml::xml_error(WORKBOOK_PART, e)),
        }
    }

    Ok(sheets)
}

/// Every `<si>` entry with its runs; phonetic runs are left out
fn read_shared_strings(xml: &str) -> Result<Vec<StringItem>, DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current: Option<ItemCollector> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ooxml::xml_error(SHARED_STRINGS_PART, e))?;
        match &event {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"si" => current = Some(ItemCollector::default()),
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(StringItem::default()),
            Event::End(e) if e.local_name().as_ref() == b"si" => {
                strings.push(current.take().map(ItemCollector::finish).unwrap_or_default());
            }
            _ => {
                if let Some(collector) = current.as_mut() {
                    collector.feed(&event, SHARED_STRINGS_PART)?;
                }
            }
        }
    }

    Ok(strings)
}

/// Split an A1-style reference into one-based (row, column)
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut column: u32 = 0;
    for c in letters.chars() {
        let value = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        column = column.checked_mul(26)?.checked_add(value)?;
    }
    let row = digits.parse::<u32>().ok().filter(|r| *r > 0)?;
    Some((row, column))
}

/// Current row and column while streaming a sheet.
///
/// Uses the `r` attributes when present and counts otherwise.
#[derive(Debug, Default)]
struct SheetCursor {
    row: u32,
    column: u32,
}

impl SheetCursor {
    fn enter_row(&mut self, element: &BytesStart<'_>) {
        self.row = ooxml::attr_value(element, b"r")
            .and_then(|r| r.parse().ok())
            .unwrap_or(self.row + 1);
        self.column = 0;
    }

    fn enter_cell(&mut self, element: &BytesStart<'_>) -> (u32, u32) {
        match ooxml::attr_value(element, b"r").and_then(|r| parse_cell_ref(&r)) {
            Some((row, column)) => {
                self.row = row;
                self.column = column;
            }
            None => self.column += 1,
        }
        (self.row, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Shared,
    Inline,
    Other,
}

impl CellKind {
    fn of(element: &BytesStart<'_>) -> Self {
        match ooxml::attr_value(element, b"t").as_deref() {
            Some("s") => Self::Shared,
            Some("inlineStr") => Self::Inline,
            _ => Self::Other,
        }
    }
}

#[derive(Debug)]
struct CellFrame {
    locator: Locator,
    kind: CellKind,
    has_formula: bool,
    value: String,
    inline: String,
}

fn extract_sheet(
    xml: &str,
    sheet: &SheetRef,
    shared_strings: &[StringItem],
    segments: &mut Vec<TextSegment>,
) -> Result<(), DocumentError> {
    let mut reader = Reader::from_str(xml);
    let mut cursor = SheetCursor::default();
    let mut cell: Option<CellFrame> = None;
    let mut in_value = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        let event = reader.read_event().map_err(|e| ooxml::xml_error(&sheet.path, e))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => cursor.enter_row(&e),
                b"c" => {
                    let (row, column) = cursor.enter_cell(&e);
                    cell = Some(CellFrame {
                        locator: Locator::Xlsx { sheet: sheet.name.clone(), row, column },
                        kind: CellKind::of(&e),
                        has_formula: false,
                        value: String::new(),
                        inline: String::new(),
                    });
                }
                b"f" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.has_formula = true;
                    }
                }
                b"v" => in_value = true,
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"row" => cursor.enter_row(&e),
                b"c" => {
                    cursor.enter_cell(&e);
                }
                b"f" => {
                    if let Some(cell) = cell.as_mut() {
                        cell.has_formula = true;
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some(frame) = cell.take() {
                        if let Some(segment) = finish_cell(frame, shared_strings)? {
                            segments.push(segment);
                        }
                    }
                }
                b"v" => in_value = false,
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(e) if in_value || in_text => {
                let text = e.unescape().map_err(|err| ooxml::xml_error(&sheet.path, err))?;
                if let Some(cell) = cell.as_mut() {
                    if in_value {
                        cell.value.push_str(&text);
                    } else {
                        cell.inline.push_str(&text);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn finish_cell(cell: CellFrame, shared_strings: &[StringItem]) -> Result<Option<TextSegment>, DocumentError> {
    if cell.has_formula {
        return Ok(None);
    }
    match cell.kind {
        CellKind::Shared => {
            let index: usize = cell.value.trim().parse().map_err(|_| {
                DocumentError::CorruptDocument(format!(
                    "{} has invalid shared string index '{}'",
                    cell.locator, cell.value
                ))
            })?;
            let item = shared_strings.get(index).ok_or_else(|| {
                DocumentError::CorruptDocument(format!(
                    "{} references shared string {} of {}",
                    cell.locator,
                    index,
                    shared_strings.len()
                ))
            })?;
            Ok(Some(TextSegment::new(cell.locator, item.text.clone())))
        }
        CellKind::Inline => Ok(Some(TextSegment::new(cell.locator, cell.inline))),
        CellKind::Other => Ok(None),
    }
}

/// A cell held back until its end tag shows whether it has a formula
struct PendingCell<'x, 't> {
    locator: Locator,
    text: &'t str,
    start: BytesStart<'x>,
    events: Vec<Event<'x>>,
    has_formula: bool,
}

/// Runs of the string a held-back cell shows, empty for plain text
fn cell_runs(cell: &PendingCell<'_, '_>, shared_strings: &[StringItem], part: &str) -> Result<Vec<RichRun>, DocumentError> {
    match CellKind::of(&cell.start) {
        CellKind::Shared => {
            let mut value = String::new();
            let mut in_value = false;
            for event in &cell.events {
                match event {
                    Event::Start(e) if e.local_name().as_ref() == b"v" => in_value = true,
                    Event::End(e) if e.local_name().as_ref() == b"v" => in_value = false,
                    Event::Text(e) if in_value => {
                        value.push_str(&e.unescape().map_err(|err| ooxml::xml_error(part, err))?);
                    }
                    _ => {}
                }
            }
            Ok(value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|index| shared_strings.get(index))
                .map(|item| item.runs.clone())
                .unwrap_or_default())
        }
        CellKind::Inline => {
            let mut collector = ItemCollector::default();
            // Skip the cell's own start tag
            for event in cell.events.iter().skip(1) {
                collector.feed(event, part)?;
            }
            Ok(collector.finish().runs)
        }
        CellKind::Other => Ok(Vec::new()),
    }
}

fn rewrite_sheet(
    xml: &str,
    sheet: &SheetRef,
    shared_strings: &[StringItem],
    translations: &TranslationMap,
    resolved: &mut HashSet<Locator>,
) -> Result<Vec<u8>, DocumentError> {
    let part = sheet.path.as_str();
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(xml.len())));
    let mut cursor = SheetCursor::default();
    let mut pending: Option<PendingCell<'_, '_>> = None;

    loop {
        let event = reader.read_event().map_err(|e| ooxml::xml_error(part, e))?;

        if pending.is_some() {
            let closes = matches!(&event, Event::End(e) if e.local_name().as_ref() == b"c");
            let formula = matches!(
                &event,
                Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"f"
            );
            if let Some(cell) = pending.as_mut() {
                cell.has_formula |= formula;
                cell.events.push(event);
            }
            if closes {
                if let Some(cell) = pending.take() {
                    if cell.has_formula {
                        warn!("{} has a formula and is left untouched", cell.locator);
                        for buffered in cell.events {
                            writer
                                .write_event(buffered)
                                .map_err(|e| ooxml::xml_write_error(part, e))?;
                        }
                    } else {
                        let runs = cell_runs(&cell, shared_strings, part)?;
                        write_inline_cell(&mut writer, &cell.start, cell.text, &runs, part)?;
                        resolved.insert(cell.locator);
                    }
                }
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                cursor.enter_row(&e);
                writer
                    .write_event(Event::Start(e))
                    .map_err(|err| ooxml::xml_write_error(part, err))?;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                cursor.enter_row(&e);
                writer
                    .write_event(Event::Empty(e))
                    .map_err(|err| ooxml::xml_write_error(part, err))?;
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let (row, column) = cursor.enter_cell(&e);
                let locator = Locator::Xlsx { sheet: sheet.name.clone(), row, column };
                let is_string = CellKind::of(&e) != CellKind::Other;
                match translations.get(&locator) {
                    Some(text) if is_string => {
                        pending = Some(PendingCell {
                            locator,
                            text: text.as_str(),
                            start: e.clone(),
                            events: vec![Event::Start(e)],
                            has_formula: false,
                        });
                    }
                    _ => {
                        writer
                            .write_event(Event::Start(e))
                            .map_err(|err| ooxml::xml_write_error(part, err))?;
                    }
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                cursor.enter_cell(&e);
                writer
                    .write_event(Event::Empty(e))
                    .map_err(|err| ooxml::xml_write_error(part, err))?;
            }
            other => {
                writer
                    .write_event(other)
                    .map_err(|err| ooxml::xml_write_error(part, err))?;
            }
        }
    }

    Ok(writer.into_inner().into_inner())
}

/// Write `<c ... t="inlineStr"><is>...</is></c>` keeping every other
/// attribute of the original cell. With `runs`, each run keeps its `<rPr>`;
/// the first carries the text and the rest are emptied.
fn write_inline_cell(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    original: &BytesStart<'_>,
    text: &str,
    runs: &[RichRun],
    part: &str,
) -> Result<(), DocumentError> {
    let prefix = ooxml::prefix_of(original);
    let cell_name = String::from_utf8_lossy(original.name().as_ref()).into_owned();
    let is_name = format!("{}is", prefix);
    let run_name = format!("{}r", prefix);
    let text_name = format!("{}t", prefix);

    let mut cell = BytesStart::new(cell_name.as_str());
    for attr in original.attributes().flatten() {
        if attr.key.as_ref() != b"t" {
            cell.push_attribute(attr);
        }
    }
    cell.push_attribute(("t", "inlineStr"));

    emit(writer, Event::Start(cell), part)?;
    emit(writer, Event::Start(BytesStart::new(is_name.as_str())), part)?;
    if runs.is_empty() {
        emit_text(writer, &text_name, text, part)?;
    } else {
        for (i, run) in runs.iter().enumerate() {
            emit(writer, Event::Start(BytesStart::new(run_name.as_str())), part)?;
            if let Some(properties) = &run.properties {
                writer
                    .get_mut()
                    .write_all(properties)
                    .map_err(|e| ooxml::xml_write_error(part, e))?;
            }
            emit_text(writer, &text_name, if i == 0 { text } else { "" }, part)?;
            emit(writer, Event::End(BytesEnd::new(run_name.as_str())), part)?;
        }
    }
    emit(writer, Event::End(BytesEnd::new(is_name.as_str())), part)?;
    emit(writer, Event::End(BytesEnd::new(cell_name.as_str())), part)
}

fn emit(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>, part: &str) -> Result<(), DocumentError> {
    writer
        .write_event(event)
        .map_err(|e| ooxml::xml_write_error(part, e))
}

/// `<t xml:space="preserve">content</t>`
fn emit_text(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, content: &str, part: &str) -> Result<(), DocumentError> {
    let mut start = BytesStart::new(name);
    start.push_attribute(("xml:space", "preserve"));
    emit(writer, Event::Start(start), part)?;
    if !content.is_empty() {
        emit(writer, Event::Text(BytesText::new(content)), part)?;
    }
    emit(writer, Event::End(BytesEnd::new(name)), part)
}
