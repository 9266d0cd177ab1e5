/*!
 * Prompt templates for document translation.
 *
 * The model receives a JSON object with the texts of one batch and must answer
 * with a JSON object holding the same number of translations, in order.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// System prompt template for document translation.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// The default system prompt for document translation.
    pub const DOCUMENT_TRANSLATOR: &'static str = r#"You are a professional translator. You translate fragments of an office document from {source_language} to {target_language}.

## Your Role
- Keep the tone and style of the original
- Produce natural, fluent {target_language}
- Translate technical terms accurately
- Each fragment is a piece of a paragraph, table cell or spreadsheet cell; translate it on its own

## Output Requirements
- Return ONLY valid JSON of the form {"translations": ["...", "..."]}
- Return exactly one translation per input text, in the same order
- Keep leading and trailing whitespace of every fragment
- Keep tab (\t) and line break (\n) characters where they belong in the translation
- Never merge, split, drop or reorder fragments
- Do not include any text outside the JSON structure"#;

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Create the default document translator template.
    pub fn document_translator() -> Self {
        Self::new(Self::DOCUMENT_TRANSLATOR)
    }

    /// Render the template with the given variables.
    pub fn render(&self, source_language: &str, target_language: &str) -> String {
        self.template
            .replace("{source_language}", source_language)
            .replace("{target_language}", target_language)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::document_translator()
    }
}

/// Register of the translated text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    #[default]
    Formal,
    Neutral,
    Casual,
}

impl Formality {
    fn describe(&self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Neutral => "neutral",
            Self::Casual => "casual, conversational",
        }
    }
}

/// User preferences that shape every translation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationPreferences {
    /// Register of the output
    #[serde(default)]
    pub formality: Formality,

    /// Subject area, e.g. "legal" or "medical"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Keep proper nouns in their original form
    #[serde(default = "default_true")]
    pub keep_original_terms: bool,

    /// Fixed translations for specific terms
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub terminology: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for TranslationPreferences {
    fn default() -> Self {
        Self {
            formality: Formality::default(),
            domain: None,
            keep_original_terms: true,
            terminology: BTreeMap::new(),
        }
    }
}

/// Builder for the prompts of one batch request.
#[derive(Debug, Clone)]
pub struct TranslationPromptBuilder {
    source_language: String,
    target_language: String,
    preferences: TranslationPreferences,
    texts: Vec<String>,
}

impl TranslationPromptBuilder {
    /// Create a new prompt builder.
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            preferences: TranslationPreferences::default(),
            texts: Vec::new(),
        }
    }

    /// Set the style preferences.
    pub fn with_preferences(mut self, preferences: &TranslationPreferences) -> Self {
        self.preferences = preferences.clone();
        self
    }

    /// Set the texts to translate.
    pub fn with_texts(mut self, texts: &[String]) -> Self {
        self.texts = texts.to_vec();
        self
    }

    /// Build the system prompt.
    pub fn build_system_prompt(&self) -> String {
        let mut prompt = PromptTemplate::document_translator()
            .render(&self.source_language, &self.target_language);

        let prefs = &self.preferences;
        prompt.push_str("\n\n## Preferences\n");
        prompt.push_str(&format!("- Register: {}\n", prefs.formality.describe()));
        if let Some(domain) = prefs.domain.as_deref().filter(|d| !d.trim().is_empty()) {
            prompt.push_str(&format!("- Subject domain: {}\n", domain));
        }
        if prefs.keep_original_terms {
            prompt.push_str("- Keep proper nouns and product names in their original form\n");
        }

        if !prefs.terminology.is_empty() {
            prompt.push_str("\n## Terminology\n");
            for (term, translation) in &prefs.terminology {
                prompt.push_str(&format!("- {} => {}\n", term, translation));
            }
        }

        prompt
    }

    /// Build the user prompt as a JSON request.
    pub fn build_user_prompt(&self) -> String {
        let payload = BatchPayload {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            texts: self.texts.clone(),
        };

        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string())
    }

    /// Build both system and user prompts.
    pub fn build(&self) -> (String, String) {
        (self.build_system_prompt(), self.build_user_prompt())
    }
}

/// Request body sent to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayload {
    pub source_language: String,
    pub target_language: String,
    pub texts: Vec<String>,
}

/// Expected response structure from the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReply {
    pub translations: Vec<String>,
}

impl BatchReply {
    /// Parse a model reply, tolerating a surrounding Markdown code fence
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(strip_code_fence(raw))
    }
}

/// Body of a fenced code block, or the trimmed input when there is none
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
