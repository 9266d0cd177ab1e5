use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::document::DocumentFormat;
use crate::document::ooxml::zip_contains;

// @module: File and directory utilities

// @struct: File operations utility
pub struct FileManager;

impl FileManager {
    // @checks: File existence
    pub fn file_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    // @checks: Directory existence
    pub fn dir_exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_dir()
    }

    // @creates: Directory and parents if needed
    pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.as_os_str().is_empty() && !path.exists() {
            fs::create_dir_all(path)
                .with_context(|| format!("Failed to create directory: {}", path.display()))?;
        }
        Ok(())
    }

    // @generates: `<stem>.<lang>.<ext>` next to the output directory
    pub fn generate_output_path<P1: AsRef<Path>, P2: AsRef<Path>>(
        input_file: P1,
        output_dir: P2,
        target_language: &str,
        format: DocumentFormat,
    ) -> PathBuf {
        let stem = input_file.as_ref().file_stem().unwrap_or_default();
        let file_name = format!(
            "{}.{}.{}",
            stem.to_string_lossy(),
            target_language,
            format.extension()
        );
        output_dir.as_ref().join(file_name)
    }

    /// Format from the leading bytes of a file, if recognizable
    pub fn sniff_format(bytes: &[u8]) -> Option<DocumentFormat> {
        if bytes.starts_with(b"%PDF-") {
            return Some(DocumentFormat::Pdf);
        }
        if bytes.starts_with(b"PK") {
            if zip_contains(bytes, "word/document.xml") {
                return Some(DocumentFormat::Docx);
            }
            if zip_contains(bytes, "xl/workbook.xml") {
                return Some(DocumentFormat::Xlsx);
            }
        }
        None
    }

    /// Detect the format of a file from its content, then its extension
    pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<DocumentFormat> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;

        if let Some(format) = Self::sniff_format(&bytes) {
            return Ok(format);
        }

        path.extension()
            .and_then(|ext| DocumentFormat::from_extension(&ext.to_string_lossy()))
            .ok_or_else(|| anyhow!("Unsupported document type: {}", path.display()))
    }

    /// Whether a path has a supported document extension
    pub fn is_supported<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| DocumentFormat::from_extension(&ext.to_string_lossy()))
            .is_some()
    }

    /// Find supported documents under a directory, sorted by path.
    ///
    /// Files that look like earlier output (`name.<lang>.ext`) for `skip_language` are ignored.
    pub fn find_documents<P: AsRef<Path>>(dir: P, skip_language: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut result = Vec::new();

        for entry in WalkDir::new(dir.as_ref()).follow_links(true) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();
            if !path.is_file() || !Self::is_supported(path) {
                continue;
            }
            // Office lock files
            if path.file_name().is_some_and(|n| n.to_string_lossy().starts_with("~$")) {
                continue;
            }
            if let Some(lang) = skip_language {
                let stem = path.file_stem().unwrap_or_default().to_string_lossy();
                if stem.ends_with(&format!(".{}", lang)) {
                    continue;
                }
            }
            result.push(path.to_path_buf());
        }

        result.sort();
        Ok(result)
    }

    /// Read a whole file
    pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let mut file = fs::File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        Ok(bytes)
    }

    /// Write a file atomically: the data goes to a temporary file in the
    /// destination directory which is then renamed over the target
    pub fn write_atomic<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::ensure_dir(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        temp.write_all(content)
            .with_context(|| format!("Failed to write temporary file for {}", path.display()))?;
        temp.as_file().sync_all()?;
        temp.persist(path)
            .map_err(|e| anyhow!("Failed to move output into place at {}: {}", path.display(), e.error))?;

        Ok(())
    }
}
