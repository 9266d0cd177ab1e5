/*!
 * Prompt engineering for document translation.
 *
 * This module provides:
 * - The system prompt template and translation preferences
 * - The JSON payload sent for a batch and the reply expected back
 */

pub mod templates;

// Re-export main types
pub use templates::{
    BatchPayload, BatchReply, Formality, PromptTemplate, TranslationPreferences,
    TranslationPromptBuilder,
};
