//! String helpers shared by the document processing code: integer literals,
//! whitespace normalization, ASCII folding and `major[.minor]` versions.

use serde::Serialize;
use std::fmt;

/// Parse an integer literal the way `strtol(text, &end, 0)` accepts it.
///
/// Accepts an optional sign followed by decimal digits, `0x`/`0X` hex digits,
/// or octal digits with a leading zero. Leading whitespace is skipped; any
/// trailing character makes the literal invalid. Values in
/// `i32::MIN..=u32::MAX` are accepted and wrapped into 32 bits, so
/// `0xFFFFFFFF` reads as `-1` exactly like the C `int` conversion did.
pub fn parse_integer(text: &str) -> Option<i32> {
    let trimmed = text.trim_start_matches(is_c_space);
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (radix, digits) = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16, hex)
    } else if rest.len() > 1 && rest.starts_with('0') {
        (8, &rest[1..])
    } else {
        (10, rest)
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    if value < i64::from(i32::MIN) || value > i64::from(u32::MAX) {
        return None;
    }
    Some(value as u32 as i32)
}

/// Whitespace as C's `isspace` sees it in the "C" locale
fn is_c_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0b' | '\x0c')
}

/// Trim leading/trailing whitespace and collapse inner runs to one space.
///
/// `" Multi\nline   text "` becomes `"Multi line text"`.
pub fn normalize_whitespace(input: &str) -> String {
    input
        .split(is_c_space)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace every non-ASCII character with `?`
pub fn to_ascii_lossy(input: &str) -> String {
    input
        .chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

/// Document format or revision number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse `"x"` or `"x.y"`.
    ///
    /// Only the leading digits of each part are significant; a missing or
    /// non-numeric minor part reads as 0. Fails only if there is no leading
    /// major number at all.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start_matches(is_c_space);
        let major_len = leading_digits(text);
        if major_len == 0 {
            return None;
        }
        let major = text[..major_len].parse().ok()?;

        let minor = match text[major_len..].strip_prefix('.') {
            Some(rest) => {
                let minor_len = leading_digits(rest);
                rest[..minor_len].parse().unwrap_or(0)
            }
            None => 0,
        };

        Some(Self { major, minor })
    }
}

fn leading_digits(text: &str) -> usize {
    text.bytes().take_while(u8::is_ascii_digit).count()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_bases() {
        assert_eq!(parse_integer("42"), Some(42));
        assert_eq!(parse_integer("-42"), Some(-42));
        assert_eq!(parse_integer("+7"), Some(7));
        assert_eq!(parse_integer("0x1F"), Some(31));
        assert_eq!(parse_integer("0XfF"), Some(255));
        assert_eq!(parse_integer("010"), Some(8));
        assert_eq!(parse_integer("0"), Some(0));
        assert_eq!(parse_integer("-0x10"), Some(-16));
        assert_eq!(parse_integer("  12"), Some(12));
    }

    #[test]
    fn test_parse_integer_rejects_partial_literals() {
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("   "), None);
        assert_eq!(parse_integer("-"), None);
        assert_eq!(parse_integer("0x"), None);
        assert_eq!(parse_integer("08"), None);
        assert_eq!(parse_integer("12 "), None);
        assert_eq!(parse_integer("12abc"), None);
        assert_eq!(parse_integer("BRIGHTNESS"), None);
    }

    #[test]
    fn test_parse_integer_wraps_to_32_bits() {
        assert_eq!(parse_integer("0xFFFFFFFF"), Some(-1));
        assert_eq!(parse_integer("0x0A046D01"), Some(0x0A046D01));
        assert_eq!(parse_integer("-2147483648"), Some(i32::MIN));
        assert_eq!(parse_integer("0x100000000"), None);
        assert_eq!(parse_integer("-2147483649"), None);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace(" text  "), "text");
        assert_eq!(normalize_whitespace(" Multi\nline \t text"), "Multi line text");
        assert_eq!(normalize_whitespace("\n\n"), "");
        assert_eq!(normalize_whitespace("single"), "single");
    }

    #[test]
    fn test_to_ascii_lossy() {
        assert_eq!(to_ascii_lossy("Focus"), "Focus");
        assert_eq!(to_ascii_lossy("Schärfe"), "Sch?rfe");
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(Version::parse("1.0"), Some(Version::new(1, 0)));
        assert_eq!(Version::parse("2"), Some(Version::new(2, 0)));
        assert_eq!(Version::parse("3.14"), Some(Version::new(3, 14)));
        assert_eq!(Version::parse("3.x"), Some(Version::new(3, 0)));
        assert_eq!(Version::parse("4.2beta"), Some(Version::new(4, 2)));
        assert_eq!(Version::parse("v1"), None);
        assert_eq!(Version::parse(""), None);
        assert_eq!(Version::new(1, 2).to_string(), "1.2");
    }
}
