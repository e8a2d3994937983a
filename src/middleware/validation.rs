// Input validation helpers shared by handlers: length bounds, format
// grammars, and the XSS deny-list. Applied inline in handlers rather than as
// a blanket body-inspecting layer, since each endpoint's payload shape
// differs.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::PipelineError;

const XSS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "onerror=",
    "onload=",
    "onclick=",
    "<iframe",
    "<object",
    "eval(",
    "expression(",
];

static FIR_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^FIR-[0-9a-f]{8}-\d{14}$").expect("static regex"));

pub fn contains_xss(input: &str) -> bool {
    let lower = input.to_lowercase();
    XSS_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}

pub fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

pub fn validate_text(text: &str, min: usize, max: usize) -> Result<(), PipelineError> {
    if contains_xss(text) {
        return Err(PipelineError::InvalidInput("input contains disallowed markup".to_string()));
    }
    let len = text.chars().count();
    if len < min || len > max {
        return Err(PipelineError::InvalidInput(format!(
            "text length must be between {min} and {max} characters, got {len}"
        )));
    }
    Ok(())
}

pub fn validate_session_id(raw: &str) -> Result<Uuid, PipelineError> {
    Uuid::parse_str(raw).map_err(|_| PipelineError::InvalidInput("invalid session id".to_string()))
}

pub fn validate_fir_number(raw: &str) -> Result<(), PipelineError> {
    if FIR_NUMBER_RE.is_match(raw) {
        Ok(())
    } else {
        Err(PipelineError::InvalidInput("invalid fir number format".to_string()))
    }
}

pub fn validate_pagination(limit: i64, offset: i64) -> Result<(), PipelineError> {
    if !(1..=100).contains(&limit) {
        return Err(PipelineError::InvalidInput("limit must be between 1 and 100".to_string()));
    }
    if offset < 0 {
        return Err(PipelineError::InvalidInput("offset must be non-negative".to_string()));
    }
    Ok(())
}

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "audio/wav", "audio/mpeg"];

pub fn validate_upload(bytes_len: usize, mime: &str) -> Result<(), PipelineError> {
    if bytes_len > MAX_UPLOAD_BYTES {
        return Err(PipelineError::PayloadTooLarge);
    }
    if !ALLOWED_MIME_TYPES.contains(&mime) {
        return Err(PipelineError::UnsupportedMediaType(mime.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_script_tags_case_insensitively() {
        assert!(contains_xss("<SCRIPT>alert(1)</script>"));
        assert!(contains_xss("javascript:alert(1)"));
        assert!(!contains_xss("a perfectly normal complaint"));
    }

    #[test]
    fn fir_number_grammar_is_enforced() {
        assert!(validate_fir_number("FIR-abcd1234-20240115120000").is_ok());
        assert!(validate_fir_number("FIR-ABCD1234-20240115120000").is_err());
        assert!(validate_fir_number("not-a-fir-number").is_err());
    }

    #[test]
    fn pagination_bounds() {
        assert!(validate_pagination(1, 0).is_ok());
        assert!(validate_pagination(100, 0).is_ok());
        assert!(validate_pagination(0, 0).is_err());
        assert!(validate_pagination(101, 0).is_err());
        assert!(validate_pagination(10, -1).is_err());
    }

    #[test]
    fn upload_rejects_oversize_and_bad_mime() {
        assert!(validate_upload(100, "image/jpeg").is_ok());
        assert!(validate_upload(MAX_UPLOAD_BYTES + 1, "image/jpeg").is_err());
        assert!(validate_upload(100, "audio/ogg").is_err());
    }
}
