/*!
 * Reassembly of translated documents.
 */

use log::debug;

use crate::document::{Document, TextUnit, TranslationMap};
use crate::errors::DocumentError;

/// Writes translated units back through their document's adapter
pub struct ReassemblyEngine;

impl ReassemblyEngine {
    /// Build the locator mapping for a fully translated unit list
    pub fn translation_map(units: &[TextUnit]) -> Result<TranslationMap, DocumentError> {
        let mut map = TranslationMap::with_capacity(units.len());
        for unit in units {
            let text = unit.translated_text().ok_or_else(|| {
                DocumentError::ReassemblyError(format!("{} has no translation", unit.locator()))
            })?;
            if map.insert(unit.locator().clone(), text.to_string()).is_some() {
                return Err(DocumentError::ReassemblyError(format!(
                    "{} appears more than once",
                    unit.locator()
                )));
            }
        }
        Ok(map)
    }

    /// Apply every translation in one pass and serialize the document
    pub fn reassemble(document: &mut Document, units: &[TextUnit]) -> Result<Vec<u8>, DocumentError> {
        let map = Self::translation_map(units)?;
        debug!("Reinserting {} units into {:?}", map.len(), document);
        document.reinsert(&map)?;
        document.to_bytes()
    }
}
