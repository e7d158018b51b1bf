//! Input validation for incoming questions.
//!
//! Questions are validated before any routing or external call happens, so
//! malformed input never consumes a retry budget.

use crate::error::{Error, Result};
use tracing::warn;

/// Minimum question length in characters (after trimming).
pub const MIN_QUESTION_CHARS: usize = 3;

/// Maximum question length in characters.
pub const MAX_QUESTION_CHARS: usize = 1000;

/// Literal fragments that are never legitimate in a question.
const SUSPICIOUS_FRAGMENTS: &[&str] = &["<script", "javascript:", "onerror=", "onclick="];

/// Validate and normalize a user question.
///
/// Returns the trimmed question on success.
pub fn validate_question(question: &str) -> Result<String> {
    let question = question.trim();

    if question.is_empty() {
        return Err(Error::Validation("question cannot be empty".into()));
    }

    let len = question.chars().count();
    if len < MIN_QUESTION_CHARS {
        return Err(Error::Validation(format!(
            "question too short ({} chars, minimum {})",
            len, MIN_QUESTION_CHARS
        )));
    }
    if len > MAX_QUESTION_CHARS {
        return Err(Error::Validation(format!(
            "question too long ({} chars, maximum {})",
            len, MAX_QUESTION_CHARS
        )));
    }

    let lowered = question.to_lowercase();
    for fragment in SUSPICIOUS_FRAGMENTS {
        if lowered.contains(fragment) {
            warn!(fragment, "suspicious fragment in question, rejecting");
            return Err(Error::Validation(
                "question contains suspicious content".into(),
            ));
        }
    }

    Ok(question.to_string())
}

/// Sanitize free text: drop null bytes, collapse whitespace, optionally cap length.
pub fn sanitize_text(text: &str, max_length: Option<usize>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;

    for ch in text.chars() {
        if ch == '\0' {
            continue;
        }
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }

    let mut out = out.trim_end().to_string();
    if let Some(max) = max_length {
        if out.chars().count() > max {
            out = out.chars().take(max).collect();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_normal_question() {
        let q = validate_question("  What is agent memory?  ").unwrap();
        assert_eq!(q, "What is agent memory?");
    }

    #[test]
    fn rejects_empty_and_short() {
        assert!(validate_question("").is_err());
        assert!(validate_question("   ").is_err());
        assert!(validate_question("hi").is_err());
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(MAX_QUESTION_CHARS + 1);
        assert!(validate_question(&long).is_err());
    }

    #[test]
    fn rejects_suspicious_content() {
        assert!(validate_question("tell me <script>alert(1)</script>").is_err());
        assert!(validate_question("open JAVASCRIPT:void(0) please").is_err());
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_text("a\0b\n\n  c\t", None), "ab c");
        assert_eq!(sanitize_text("  hello   world  ", Some(8)), "hello wo");
    }
}
