/*!
 * Tests for ISO language code helpers
 */

use slidecast::language_utils::{get_language_name, language_codes_match, normalize_to_part2t};

#[test]
fn test_languageCodesMatch_acrossCodeForms_shouldMatch() {
    assert!(language_codes_match("fr", "fra"));
    assert!(language_codes_match("fr", "fre"));
    assert!(language_codes_match("DE", "deu"));
    assert!(!language_codes_match("fr", "de"));
    assert!(!language_codes_match("fr", "nope"));
}

#[test]
fn test_normalizeToPart2t_shouldMapBibliographicCodes() {
    assert_eq!(normalize_to_part2t("ger").ok().as_deref(), Some("deu"));
    assert_eq!(normalize_to_part2t("es").ok().as_deref(), Some("spa"));
}

#[test]
fn test_getLanguageName_shouldReturnEnglishName() {
    assert_eq!(get_language_name("ja").ok().as_deref(), Some("Japanese"));
    assert!(get_language_name("").is_err());
}
