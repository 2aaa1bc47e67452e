//! Heuristic validation of free-form user input.
//!
//! The denylist catches the common script-injection shapes (script tags,
//! inline event handlers, script URLs). It is a blocklist, not an HTML
//! parser: anything that reaches a renderer must still go through
//! [`crate::sanitize`].

use once_cell::sync::Lazy;
use regex::Regex;

/// Default maximum input length, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 1000;

/// Structured error type for input validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("input is empty")]
    Empty,
    #[error("input is {actual} characters, maximum is {max}")]
    TooLong { max: usize, actual: usize },
    #[error("input contains a forbidden pattern: {0}")]
    Forbidden(&'static str),
}

#[allow(clippy::unwrap_used)] // patterns are static and covered by tests
static DENYLIST: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("script tag", r"(?i)<\s*script"),
        ("javascript url", r"(?i)javascript\s*:"),
        ("vbscript url", r"(?i)vbscript\s*:"),
        ("html data url", r"(?i)data\s*:\s*text/html"),
        ("event handler", r"(?i)\bon[a-z]+\s*="),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

/// Check `input` and report which rule, if any, it breaks.
///
/// # Errors
///
/// Returns an `InputError` if:
/// - The input is empty
/// - The input is longer than `max_length` characters
/// - The input matches a denylisted pattern
pub fn check_input(input: &str, max_length: usize) -> Result<(), InputError> {
    if input.is_empty() {
        return Err(InputError::Empty);
    }

    let actual = input.chars().count();
    if actual > max_length {
        return Err(InputError::TooLong {
            max: max_length,
            actual,
        });
    }

    if let Some((name, _)) = DENYLIST.iter().find(|(_, re)| re.is_match(input)) {
        return Err(InputError::Forbidden(name));
    }

    Ok(())
}

/// Whether `input` is non-empty, within `max_length` characters and free of
/// denylisted patterns.
#[must_use]
pub fn validate_input(input: &str, max_length: usize) -> bool {
    check_input(input, max_length).is_ok()
}
