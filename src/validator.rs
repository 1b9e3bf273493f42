// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Payload validator.
//!
//! Implements ingress-level checks on request text:
//! - Length bounds
//! - HTML escaping of the forwarded payload
//! - Prompt/script injection patterns (invalidating)
//! - SQL injection heuristics (warning only)
//!
//! Also provides PII redaction for anything that ends up in logs.

use crate::config::ValidationConfig;
use crate::error::{GateError, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("input too short (minimum {min} characters)")]
    TooShort { min: usize },

    #[error("input too long (maximum {max} characters)")]
    TooLong { max: usize },

    #[error("suspicious content detected")]
    SuspiciousContent,
}

/// Result of validating one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    /// Payload with HTML special characters escaped
    pub sanitized: String,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Error messages joined for a single human-readable reason.
    pub fn reason(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Phrases and markup treated as injection attempts.
pub fn default_suspicious_patterns() -> Vec<String> {
    [
        r"ignore\s+(all\s+)?previous\s+instructions",
        r"system\s+prompt",
        r"role\s*:\s*(assistant|system)",
        r"<script[^>]*>.*?</script>",
        r"<\s*script",
        r"javascript:",
        r"data:text/html",
        r"vbscript:",
        r"\bon(load|error|click|mouseover)\s*=",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

static SQL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bunion\s+(all\s+)?select\b",
        r"(?i)\bdrop\s+table\b",
        r"(?i)\bdelete\s+from\b",
        r"(?i)\binsert\s+into\b",
        r"(?i)\bupdate\s+\w+\s+set\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static CARD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b").unwrap());

static SSN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

const TRUNCATION_MARKER: &str = "...[TRUNCATED]";

/// Request payload validator.
pub struct InputValidator {
    min_len: usize,
    max_len: usize,
    log_preview_max_len: usize,
    suspicious: Vec<Regex>,
}

impl InputValidator {
    /// Create a validator, compiling the configured patterns.
    pub fn new(config: ValidationConfig) -> Result<Self> {
        let suspicious = config
            .suspicious_patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .dot_matches_new_line(true)
                    .build()
                    .map_err(|e| {
                        GateError::Internal(format!("invalid suspicious pattern {pattern:?}: {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            min_len: config.min_len,
            max_len: config.max_len,
            log_preview_max_len: config.log_preview_max_len,
            suspicious,
        })
    }

    /// Validate and sanitize a payload. Every rule runs; errors accumulate.
    pub fn validate(&self, text: &str) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let len = text.chars().count();
        if len < self.min_len {
            errors.push(ValidationError::TooShort { min: self.min_len });
        }
        if len > self.max_len {
            errors.push(ValidationError::TooLong { max: self.max_len });
        }

        let sanitized = match escape_html(text) {
            Cow::Borrowed(unchanged) => unchanged.to_string(),
            Cow::Owned(escaped) => {
                warnings.push("HTML characters escaped".to_string());
                escaped
            }
        };

        // Patterns run on the raw text; escaping would hide markup from them.
        if self.suspicious.iter().any(|re| re.is_match(text)) {
            debug!(preview = %self.redact_for_logging(text), "Suspicious pattern matched");
            errors.push(ValidationError::SuspiciousContent);
        }

        if SQL_PATTERNS.iter().any(|re| re.is_match(text)) {
            warnings.push("potential SQL injection pattern detected".to_string());
        }

        ValidationReport {
            valid: errors.is_empty(),
            sanitized,
            errors,
            warnings,
        }
    }

    /// Replace PII-shaped substrings and truncate, for safe logging.
    pub fn redact_for_logging(&self, text: &str) -> String {
        redact_for_logging(text, self.log_preview_max_len)
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

/// Redact emails, card numbers and SSNs, then truncate to `max_chars`.
pub fn redact_for_logging(text: &str, max_chars: usize) -> String {
    let text = EMAIL_RE.replace_all(text, "[EMAIL_REDACTED]");
    let text = CARD_RE.replace_all(&text, "[CARD_REDACTED]");
    let text = SSN_RE.replace_all(&text, "[SSN_REDACTED]");

    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.into_owned(),
    }
}

/// Escape `& < > " '`. Borrows when nothing needed escaping.
fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}
