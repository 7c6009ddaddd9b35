//! Character-level normalization rules, applied to every text run.

use tts_core::TtsResult;
use unicode_normalization::UnicodeNormalization;

/// A text normalization rule.
pub trait Rule: Send + Sync + std::fmt::Debug {
    /// Get the rule name.
    fn name(&self) -> &str;

    /// Apply the rule to a run of text.
    fn apply(&self, input: &str) -> TtsResult<String>;
}

/// Create the default set of normalization rules.
///
/// Whitespace collapsing is not a rule: it has to see across markup
/// boundaries, so the text builder does it.
pub fn default_rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(UnicodeNormalizationRule), Box::new(ControlCharRule)]
}

/// Unicode normalization (NFC form) plus typographic cleanup.
#[derive(Debug)]
pub struct UnicodeNormalizationRule;

impl Rule for UnicodeNormalizationRule {
    fn name(&self) -> &str {
        "unicode_normalization"
    }

    fn apply(&self, input: &str) -> TtsResult<String> {
        let composed: String = input.nfc().collect();
        let result = composed
            .replace(['\u{00A0}', '\u{2007}', '\u{202F}'], " ") // No-break spaces
            .replace(['\u{2019}', '\u{2018}'], "'") // Curly single quotes
            .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"") // Curly and angle quotes
            .replace('\u{2014}', " - ") // Em dash
            .replace('\u{2013}', "-") // En dash
            .replace('\u{2026}', "..."); // Ellipsis

        Ok(result)
    }
}

/// Drop control and zero-width characters; keep whitespace for collapsing.
#[derive(Debug)]
pub struct ControlCharRule;

impl Rule for ControlCharRule {
    fn name(&self) -> &str {
        "control_chars"
    }

    fn apply(&self, input: &str) -> TtsResult<String> {
        Ok(input
            .chars()
            .filter(|&c| {
                c.is_whitespace()
                    || !(c.is_control() || matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unicode_normalization_rule() {
        let rule = UnicodeNormalizationRule;

        let result = rule.apply("hello—world").unwrap();
        assert_eq!(result, "hello - world");

        let result = rule.apply("\u{201C}hello\u{201D}").unwrap();
        assert_eq!(result, "\"hello\"");

        // e + combining acute composes to a single code point
        let result = rule.apply("e\u{0301}").unwrap();
        assert_eq!(result, "\u{00E9}");

        // й decomposed (и + combining breve) composes back
        let result = rule.apply("и\u{0306}").unwrap();
        assert_eq!(result, "й");
    }

    #[test]
    fn test_control_char_rule() {
        let rule = ControlCharRule;
        let result = rule.apply("a\u{0007}b\u{200B}c\td").unwrap();
        assert_eq!(result, "abc\td");
    }

    #[test]
    fn test_default_rules_order() {
        let names: Vec<_> = default_rules().iter().map(|r| r.name().to_string()).collect();
        assert_eq!(names, vec!["unicode_normalization", "control_chars"]);
    }
}
