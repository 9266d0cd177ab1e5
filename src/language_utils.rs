/*!
 * Language tag handling.
 *
 * Target languages are given as BCP-47 style tags ("fr", "pt-BR", "zh-Hant").
 * Only the primary subtag is checked against ISO 639; region and script
 * subtags are passed through to the model untouched.
 */

use anyhow::{Result, anyhow};
use isolang::Language;

/// Kind of ISO 639 code found in the primary subtag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T or 639-3 (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter bibliographic) code
    Part2B,
}

/// Bibliographic codes that differ from their terminological form
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    PART2B_TO_PART2T
        .iter()
        .find(|(b, _)| *b == code)
        .map(|(_, t)| *t)
}

/// Split a tag into its lowercase primary subtag and the remainder
fn split_tag(tag: &str) -> (String, Option<&str>) {
    let tag = tag.trim();
    match tag.find(['-', '_']) {
        Some(pos) => (tag[..pos].to_lowercase(), Some(&tag[pos + 1..])),
        None => (tag.to_lowercase(), None),
    }
}

/// Resolve the primary subtag of a tag to an ISO 639 language
fn resolve(tag: &str) -> Option<(Language, LanguageCodeType)> {
    let (primary, _) = split_tag(tag);
    match primary.len() {
        2 => Language::from_639_1(&primary).map(|lang| (lang, LanguageCodeType::Part1)),
        3 => Language::from_639_3(&primary)
            .map(|lang| (lang, LanguageCodeType::Part2T))
            .or_else(|| {
                part2b_to_part2t(&primary)
                    .and_then(Language::from_639_3)
                    .map(|lang| (lang, LanguageCodeType::Part2B))
            }),
        _ => None,
    }
}

/// Validate a language tag by its primary subtag
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    resolve(code)
        .map(|(_, kind)| kind)
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Normalize the primary subtag to ISO 639-2/T (3-letter) form
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    resolve(code)
        .map(|(lang, _)| lang.to_639_3().to_string())
        .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))
}

/// Whether two tags name the same language, ignoring region and script
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (resolve(code1), resolve(code2)) {
        (Some((a, _)), Some((b, _))) => a == b,
        _ => false,
    }
}

/// English name of the language, with any subtags appended: "Portuguese (BR)"
pub fn get_language_name(code: &str) -> Result<String> {
    let (lang, _) = resolve(code).ok_or_else(|| anyhow!("Failed to get language from code: {}", code))?;
    let (_, rest) = split_tag(code);

    Ok(match rest.filter(|r| !r.is_empty()) {
        Some(rest) => format!("{} ({})", lang.to_name(), rest),
        None => lang.to_name().to_string(),
    })
}
