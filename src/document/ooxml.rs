/*!
 * Shared plumbing for Office Open XML packages (DOCX and XLSX).
 *
 * A package is a ZIP container of XML parts. It is held fully in memory so
 * individual parts can be rewritten and the container re-emitted with every
 * untouched part copied as-is, in the original order and with its original
 * compression method.
 */

use quick_xml::events::BytesStart;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::DocumentError;

/// One entry of the container
#[derive(Debug, Clone)]
struct PackagePart {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
    compression: CompressionMethod,
}

/// In-memory OOXML container
#[derive(Debug, Clone)]
pub struct ZipPackage {
    parts: Vec<PackagePart>,
}

impl ZipPackage {
    /// Read every part of a ZIP container
    pub fn read(bytes: &[u8]) -> Result<Self, DocumentError> {
        if !bytes.starts_with(b"PK") {
            return Err(DocumentError::UnsupportedFormat(
                "not a ZIP container".to_string(),
            ));
        }

        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;
        let mut parts = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut file = archive.by_index(index).map_err(zip_error)?;
            let name = file.name().to_string();
            let is_dir = file.is_dir();
            let compression = file.compression();
            // Header sizes are not trusted for allocation
            let mut data = Vec::new();
            if !is_dir {
                file.read_to_end(&mut data)
                    .map_err(|e| DocumentError::CorruptDocument(format!("{}: {}", name, e)))?;
            }
            parts.push(PackagePart { name, data, is_dir, compression });
        }

        Ok(Self { parts })
    }

    /// Whether a part with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.parts.iter().any(|p| p.name == name)
    }

    /// Raw bytes of a part
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|p| p.name == name && !p.is_dir)
            .map(|p| p.data.as_slice())
    }

    /// A part decoded as UTF-8 XML
    pub fn xml_part(&self, name: &str) -> Result<&str, DocumentError> {
        let data = self.part(name).ok_or_else(|| {
            DocumentError::CorruptDocument(format!("missing package part {}", name))
        })?;
        std::str::from_utf8(data)
            .map_err(|e| DocumentError::CorruptDocument(format!("{} is not UTF-8: {}", name, e)))
    }

    /// Replace the content of an existing part
    pub fn replace_part(&mut self, name: &str, data: Vec<u8>) -> Result<(), DocumentError> {
        let part = self
            .parts
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| DocumentError::ReassemblyError(format!("missing package part {}", name)))?;
        part.data = data;
        Ok(())
    }

    /// Names of all file parts, in container order
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter(|p| !p.is_dir).map(|p| p.name.as_str())
    }

    /// Write the container back out
    pub fn write(&self) -> Result<Vec<u8>, DocumentError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for part in &self.parts {
            let options = SimpleFileOptions::default().compression_method(write_method(part.compression));
            if part.is_dir {
                writer
                    .add_directory(part.name.as_str(), options)
                    .map_err(zip_write_error)?;
                continue;
            }
            writer
                .start_file(part.name.as_str(), options)
                .map_err(zip_write_error)?;
            writer
                .write_all(&part.data)
                .map_err(|e| DocumentError::ReassemblyError(e.to_string()))?;
        }

        let cursor = writer.finish().map_err(zip_write_error)?;
        Ok(cursor.into_inner())
    }
}

/// Check a ZIP container for a part without keeping it in memory
pub fn zip_contains(bytes: &[u8], name: &str) -> bool {
    match ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive.file_names().any(|n| n == name),
        Err(_) => false,
    }
}

/// Methods this build can write; anything else is re-deflated
fn write_method(method: CompressionMethod) -> CompressionMethod {
    match method {
        CompressionMethod::Stored => CompressionMethod::Stored,
        _ => CompressionMethod::Deflated,
    }
}

fn zip_error(error: zip::result::ZipError) -> DocumentError {
    DocumentError::CorruptDocument(format!("invalid ZIP container: {}", error))
}

fn zip_write_error(error: zip::result::ZipError) -> DocumentError {
    DocumentError::ReassemblyError(format!("failed to write ZIP container: {}", error))
}

/// Map an XML parser failure to a corrupt-document error
pub fn xml_error(part: &str, error: quick_xml::Error) -> DocumentError {
    DocumentError::CorruptDocument(format!("malformed XML in {}: {}", part, error))
}

/// Map an XML writer failure during reinsertion
pub fn xml_write_error(part: &str, error: impl std::fmt::Display) -> DocumentError {
    DocumentError::ReassemblyError(format!("failed to rewrite {}: {}", part, error))
}

/// Unescaped value of an attribute, matched on its qualified name
pub fn attr_value(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Namespace prefix of a qualified element name, including the colon
pub fn prefix_of(element: &BytesStart<'_>) -> String {
    let name = element.name();
    let name = name.as_ref();
    match name.iter().position(|b| *b == b':') {
        Some(pos) => String::from_utf8_lossy(&name[..=pos]).into_owned(),
        None => String::new(),
    }
}
