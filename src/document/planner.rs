/*!
 * Extraction planning.
 *
 * Turns the raw segments of a format adapter into the ordered list of text
 * units a job translates. Segments with nothing to translate (whitespace,
 * numbers, punctuation, symbols) are dropped; they stay untouched in the
 * output document.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::{Document, TextSegment, TextUnit};
use crate::errors::DocumentError;

/// Text made only of whitespace, numbers, punctuation or symbols
static NON_TRANSLATABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\p{N}\p{P}\p{S}]*$").unwrap());

/// Builds the canonical text-unit order for a document
pub struct ExtractionPlanner;

impl ExtractionPlanner {
    /// Extract and filter the translatable units of a document, in document order
    pub fn plan(document: &Document) -> Result<Vec<TextUnit>, DocumentError> {
        let segments = document.extract()?;
        let total = segments.len();
        let units = Self::plan_segments(segments)?;
        debug!(
            "Planned {} translatable units out of {} {} segments",
            units.len(),
            total,
            document.format()
        );
        Ok(units)
    }

    /// Filter already-extracted segments into units
    pub fn plan_segments(segments: Vec<TextSegment>) -> Result<Vec<TextUnit>, DocumentError> {
        let mut seen = HashSet::with_capacity(segments.len());
        let mut units = Vec::with_capacity(segments.len());

        for segment in segments {
            if !seen.insert(segment.locator.clone()) {
                return Err(DocumentError::CorruptDocument(format!(
                    "duplicate text location {}",
                    segment.locator
                )));
            }
            if Self::is_translatable(&segment.text) {
                units.push(TextUnit::new(segment.locator, segment.text));
            }
        }

        Ok(units)
    }

    /// Whether the text contains anything worth sending to a backend
    pub fn is_translatable(text: &str) -> bool {
        !NON_TRANSLATABLE.is_match(text)
    }
}
