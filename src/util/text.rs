use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{QuoteError, Result};

/// 合法的千分位寫法，例如 "1,234" 或 "-12,345.67"
static THOUSANDS_GROUPING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("Failed to compile thousands regex")
});

/// Parses a floating-point value from a given string.
///
/// Only surrounding whitespace (including `\u{a0}`) is ignored. Anything inside
/// the token must be part of the number, and non-finite results such as `NaN`
/// or `inf` are rejected.
///
/// # Arguments
///
/// * `s`: A string slice containing the textual number.
///
/// # Returns
///
/// * `Result<f64>`: The parsed value, or `QuoteError::Parse` carrying the original text.
pub fn parse_f64(s: &str) -> Result<f64> {
    let trimmed = s.trim();
    let value = f64::from_str(trimmed)
        .map_err(|why| QuoteError::parse(s, format!("'{}' is not a float: {}", trimmed, why)))?;

    if !value.is_finite() {
        return Err(QuoteError::parse(s, format!("'{}' is not finite", trimmed)));
    }

    Ok(value)
}

/// Parses a number that may carry thousands separators.
///
/// `,` is removed only when the token is grouped in threes, so `1,234.50`
/// parses while `1,2,3` or a decimal comma such as `1,50` is a parse error.
///
/// # Example
///
/// ```ignore
/// let price = parse_grouped_f64("1,234.56")?;
/// assert_eq!(price, 1234.56);
/// ```
pub fn parse_grouped_f64(s: &str) -> Result<f64> {
    let trimmed = s.trim();
    if !trimmed.contains(',') {
        return parse_f64(s);
    }

    if !THOUSANDS_GROUPING.is_match(trimmed) {
        return Err(QuoteError::parse(
            s,
            format!("'{}' is not a valid thousands grouping", trimmed),
        ));
    }

    parse_f64(&trimmed.replace(',', "")).map_err(|_| QuoteError::parse(s, "not a float"))
}

#[cfg(test)]
mod tests {
    // 注意這個慣用法：在 tests 模組中，從外部範疇匯入所有名字。
    use super::*;

    #[test]
    fn test_parse_f64() {
        assert_eq!(parse_f64("150.25").unwrap(), 150.25);
        assert_eq!(parse_f64(" 150.25\n").unwrap(), 150.25);
        assert_eq!(parse_f64("\u{a0}42.10\u{a0}").unwrap(), 42.1);
        assert_eq!(parse_f64("+1.50").unwrap(), 1.5);
        assert_eq!(parse_f64("-0.84").unwrap(), -0.84);
    }

    #[test]
    fn test_parse_f64_rejects_garbage() {
        for text in ["", "N/A", "1.2.3", "NaN", "inf", "1 50.25", "1,234.50", "+1,50"] {
            match parse_f64(text) {
                Err(QuoteError::Parse { text: original, .. }) => assert_eq!(original, text),
                other => panic!("expected parse error for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_parse_grouped_f64() {
        assert_eq!(parse_grouped_f64("1,234.50").unwrap(), 1234.5);
        assert_eq!(parse_grouped_f64(" 12,345,678\n").unwrap(), 12345678.0);
        assert_eq!(parse_grouped_f64("-1,000").unwrap(), -1000.0);
        assert_eq!(parse_grouped_f64("150.25").unwrap(), 150.25);
    }

    #[test]
    fn test_parse_grouped_f64_rejects_bad_grouping() {
        for text in ["1,2,3", "1,50", "+1,50", "1234,567", "1,234.5,6", ",123", "1 50.25", "1, 234"] {
            match parse_grouped_f64(text) {
                Err(QuoteError::Parse { text: original, .. }) => assert_eq!(original, text),
                other => panic!("expected parse error for {:?}, got {:?}", text, other),
            }
        }
    }
}
