//! Case folding of text and target pattern.
//!
//! All strategies compare bytes of the folded UTF-8 text. Folding uses the
//! Unicode default lower-case mapping, which does not depend on the process
//! locale, so counts are reproducible across machines.

use crate::errors::{CountError, CountResult};

/// Text and pattern folded to their canonical comparison form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedInput {
    pub text: String,
    pub pattern: String,
}

impl NormalizedInput {
    pub fn text_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn pattern_bytes(&self) -> &[u8] {
        self.pattern.as_bytes()
    }
}

/// Rejects patterns that are empty or contain only whitespace
pub fn validate_pattern(pattern: &str) -> CountResult<()> {
    if pattern.trim().is_empty() {
        return Err(CountError::invalid_argument(
            "target pattern must not be blank",
        ));
    }
    Ok(())
}

/// Folds a single string
pub fn fold(value: &str) -> String {
    value.to_lowercase()
}

/// Validates the pattern and folds both inputs
pub fn normalize(text: &str, pattern: &str) -> CountResult<NormalizedInput> {
    validate_pattern(pattern)?;
    Ok(NormalizedInput {
        text: fold(text),
        pattern: fold(pattern),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_ascii_and_unicode() {
        let input = normalize("The CAT sat on ÉCOLE", "École").unwrap();
        assert_eq!(input.text, "the cat sat on école");
        assert_eq!(input.pattern, "école");
    }

    #[test]
    fn test_rejects_blank_patterns() {
        assert!(matches!(
            normalize("text", ""),
            Err(CountError::InvalidArgument(_))
        ));
        assert!(matches!(
            normalize("text", "  \t"),
            Err(CountError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_text_is_allowed() {
        let input = normalize("", "word").unwrap();
        assert!(input.text_bytes().is_empty());
        assert_eq!(input.pattern_bytes(), b"word");
    }

    #[test]
    fn test_folding_is_locale_independent() {
        // Turkish dotted capital I folds the same way everywhere
        assert_eq!(fold("İ"), "i\u{307}");
        assert_eq!(fold("I"), "i");
    }
}
