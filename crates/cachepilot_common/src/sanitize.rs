//! Input sanitization gates
//!
//! These functions never transform input beyond trimming where noted. They
//! either hand the value back or reject it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ValidationError, ValidationResult};

/// Characters that can alter shell parsing of an argument
pub const DISALLOWED_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '<', '>', '(', ')', '{', '}', '[', ']',
];

/// Characters rejected in arguments forwarded to the CLI
pub const DANGEROUS_ARG_CHARS: &[char] = &[
    ';', '|', '&', '$', '`', '\n', '\r', '>', '<', '(', ')', '{', '}',
];

/// Request-level patterns for script and command injection
static SUSPICIOUS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\.\./\.\.",
        r"<script",
        r"javascript:",
        r"onclick=",
        r"onerror=",
        r"eval\(",
        r"exec\(",
        r"system\(",
        r"passthru\(",
        r"shell_exec\(",
        r"\$\{",
        r"`[^`]*`",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Gate for values that end up on a command line or in a file name.
///
/// Rejects empty input, any of `DISALLOWED_CHARS`, variable expansion
/// (`${`) and, unless `allow_spaces`, any whitespace. Returns the input
/// unchanged.
pub fn sanitize_input(input: &str, allow_spaces: bool) -> ValidationResult<&str> {
    if input.is_empty() {
        return Err(ValidationError::input("input must not be empty"));
    }

    if input.contains("${") {
        return Err(ValidationError::input("variable expansion is not allowed"));
    }

    if let Some(c) = input.chars().find(|c| DISALLOWED_CHARS.contains(c)) {
        return Err(ValidationError::input(format!(
            "disallowed character '{}'",
            c
        )));
    }

    if !allow_spaces && input.chars().any(char::is_whitespace) {
        return Err(ValidationError::input("whitespace is not allowed"));
    }

    Ok(input)
}

/// Check a single CLI argument and return it trimmed.
pub fn sanitize_command_argument(arg: &str) -> ValidationResult<&str> {
    if let Some(c) = arg.chars().find(|c| DANGEROUS_ARG_CHARS.contains(c)) {
        return Err(ValidationError::input(format!(
            "argument contains dangerous character {:?}",
            c
        )));
    }

    if arg.contains("..") {
        return Err(ValidationError::input(
            "argument contains directory traversal pattern",
        ));
    }

    Ok(arg.trim())
}

/// Case-insensitive scan for script/command injection markers.
pub fn contains_suspicious_pattern(value: &str) -> bool {
    let lowered = value.to_lowercase();
    SUSPICIOUS_PATTERNS.iter().any(|re| re.is_match(&lowered))
}
