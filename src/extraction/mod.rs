//! HTML to property hash extraction driven by mappings.
//!
//! - `resolver`: retrieves raw text for one field descriptor
//! - `embedded`: parses JSON payloads embedded in `<script>` tags
//! - `fields`: typed extraction passes and field traces
//! - `orchestrator`: runs the passes for a mapping and builds diagnostics

mod embedded;
mod fields;
mod orchestrator;
mod resolver;

pub use embedded::{extract_path, find_balanced, ParseCache};
pub use fields::{FieldExtractor, FieldTrace};
pub use orchestrator::{
    extract_from_html, extract_with_mapping, ExtractionDiagnostics, ExtractionError,
    ExtractionRequest, ExtractionResult,
};
pub use resolver::{clean_up_string, retrieve_text, retrieve_values};

pub(crate) use orchestrator::{resolve_mapping, run_mapping};

/// Parse the leading base-10 integer of `text`, ignoring leading whitespace.
///
/// `"3 beds"` parses as 3. Anything without leading digits, or that
/// overflows, is 0.
pub fn parse_leading_int(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    match digits[..end].parse::<i64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) => 0,
    }
}

/// Parse the leading decimal number of `text` (`"1250.50 EUR"` is 1250.5).
pub fn parse_leading_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end = 1;
    }
    let mut seen_digit = false;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    if !seen_digit {
        return 0.0;
    }
    trimmed[..end]
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int("3"), 3);
        assert_eq!(parse_leading_int("  3 beds"), 3);
        assert_eq!(parse_leading_int("-2"), -2);
        assert_eq!(parse_leading_int("beds: 3"), 0);
        assert_eq!(parse_leading_int(""), 0);
        assert_eq!(parse_leading_int("12.7"), 12);
        assert_eq!(parse_leading_int("99999999999999999999999"), 0);
    }

    #[test]
    fn test_parse_leading_float() {
        assert_eq!(parse_leading_float("450000"), 450000.0);
        assert_eq!(parse_leading_float("1250.50 EUR"), 1250.5);
        assert_eq!(parse_leading_float(".5"), 0.5);
        assert_eq!(parse_leading_float("12."), 12.0);
        assert_eq!(parse_leading_float("-0.25"), -0.25);
        assert_eq!(parse_leading_float("£450,000"), 0.0);
        assert_eq!(parse_leading_float("abc"), 0.0);
        assert_eq!(parse_leading_float("-"), 0.0);
    }
}
