//! Clinical note preprocessing: abbreviation expansion, cleanup,
//! tokenization, and common-misspelling correction. Runs before any text
//! is handed to the text model so that shorthand like "bp" or "c/o"
//! reaches the extractor in canonical form.

use std::sync::LazyLock;

use regex::Regex;

/// Shorthand found in real clinical notes, expanded before matching.
const MEDICAL_ABBREVIATIONS: &[(&str, &str)] = &[
    ("bp", "blood pressure"),
    ("hr", "heart rate"),
    ("temp", "temperature"),
    ("c/o", "complains of"),
    ("h/o", "history of"),
    ("s/p", "status post"),
    ("dx", "diagnosis"),
    ("tx", "treatment"),
    ("sx", "symptoms"),
];

/// Misspellings frequent enough in patient-entered text to correct inline.
const COMMON_MISSPELLINGS: &[(&str, &str)] = &[
    ("feaver", "fever"),
    ("headake", "headache"),
    ("nausia", "nausea"),
    ("caugh", "cough"),
];

static ABBREVIATION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    MEDICAL_ABBREVIATIONS
        .iter()
        .map(|(abbr, full)| {
            let pattern = format!(r"\b{}\b", regex::escape(abbr));
            (Regex::new(&pattern).expect("static abbreviation pattern"), *full)
        })
        .collect()
});

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://|www\.)\S+").expect("static url pattern"));

static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));

/// Lowercase, expand abbreviations, strip URLs and punctuation, collapse
/// whitespace. Returns an empty string for empty input.
pub fn preprocess_text(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let mut cleaned = text.to_lowercase();
    for (pattern, full) in ABBREVIATION_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, *full).into_owned();
    }
    cleaned = URL_PATTERN.replace_all(&cleaned, "").into_owned();
    cleaned = cleaned
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    WHITESPACE_PATTERN
        .replace_all(cleaned.trim(), " ")
        .into_owned()
}

/// Preprocess and split into word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    preprocess_text(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Replace known misspellings token-by-token.
pub fn correct_spelling(tokens: Vec<String>) -> Vec<String> {
    tokens
        .into_iter()
        .map(|tok| {
            COMMON_MISSPELLINGS
                .iter()
                .find(|(wrong, _)| *wrong == tok)
                .map(|(_, right)| right.to_string())
                .unwrap_or(tok)
        })
        .collect()
}

/// Full pipeline: clean, tokenize, correct, and rejoin for the text model.
pub fn preprocess_pipeline(text: &str) -> String {
    correct_spelling(tokenize(text)).join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_medical_abbreviations() {
        let out = preprocess_text("Patient c/o high BP and elevated HR");
        assert!(out.contains("complains of"));
        assert!(out.contains("blood pressure"));
        assert!(out.contains("heart rate"));
    }

    #[test]
    fn abbreviation_requires_word_boundary() {
        // "bpm" must not expand to "blood pressurem"
        let out = preprocess_text("hr 80 bpm");
        assert!(out.contains("bpm"));
        assert!(!out.contains("pressurem"));
    }

    #[test]
    fn strips_urls_and_punctuation() {
        let out = preprocess_text("see https://example.org/labs; fever, chills!");
        assert!(!out.contains("http"));
        assert!(!out.contains(';'));
        assert_eq!(out, "see fever chills");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(preprocess_text("  fever   \n chills "), "fever chills");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(preprocess_text(""), "");
        assert_eq!(preprocess_text("   "), "");
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn corrects_common_misspellings() {
        let tokens = correct_spelling(vec![
            "feaver".to_string(),
            "headake".to_string(),
            "fine".to_string(),
        ]);
        assert_eq!(tokens, vec!["fever", "headache", "fine"]);
    }

    #[test]
    fn full_pipeline_combines_steps() {
        let out = preprocess_pipeline("C/O feaver and caugh, BP elevated.");
        assert_eq!(
            out,
            "complains of fever and cough blood pressure elevated"
        );
    }
}
