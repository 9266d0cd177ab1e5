/*!
 * Tests for language tag utilities
 */

use doclingo::language_utils::{
    LanguageCodeType, get_language_name, language_codes_match, normalize_to_part2t, validate_language_code,
};

/// Region and script subtags pass validation through their primary subtag
#[test]
fn test_validate_language_code_withBcp47Tags_shouldAcceptPrimarySubtag() {
    assert_eq!(validate_language_code("zh-Hant").unwrap(), LanguageCodeType::Part1);
    assert_eq!(validate_language_code("pt_BR").unwrap(), LanguageCodeType::Part1);
    assert_eq!(validate_language_code("deu").unwrap(), LanguageCodeType::Part2T);
    assert_eq!(validate_language_code("fre").unwrap(), LanguageCodeType::Part2B);
    assert!(validate_language_code("klingon").is_err());
}

/// Part 1, 2/B and 2/T codes normalize to the same value
#[test]
fn test_normalize_to_part2t_withEquivalentCodes_shouldAgree() {
    assert_eq!(normalize_to_part2t("fr").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("fre").unwrap(), "fra");
    assert_eq!(normalize_to_part2t("FR-ca").unwrap(), "fra");
    assert!(normalize_to_part2t("zz").is_err());
}

/// Matching ignores regional variants
#[test]
fn test_language_codes_match_withVariants_shouldCompareLanguages() {
    assert!(language_codes_match("en", "eng"));
    assert!(language_codes_match("pt-BR", "por"));
    assert!(!language_codes_match("en", "fr"));
    assert!(!language_codes_match("en", "invalid"));
}

/// Names include the subtags after the primary language
#[test]
fn test_get_language_name_withRegion_shouldAppendIt() {
    assert_eq!(get_language_name("es").unwrap(), "Spanish");
    assert_eq!(get_language_name("pt-BR").unwrap(), "Portuguese (BR)");
    assert!(get_language_name("").is_err());
}
