//! Formats keys and values for logging and diagnostics.

use crate::keys::{self, TS_WIDTH};

/// Renders bytes as a double-quoted string with non-printable characters
/// escaped.
pub fn bytes(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for escaped in raw.iter().copied().flat_map(std::ascii::escape_default) {
        out.push(escaped as char);
    }
    out.push('"');
    out
}

/// Renders a composite key as `"user_key"@ts`. Keys too short to carry a
/// timestamp suffix render as plain bytes.
pub fn composite(key: &[u8]) -> String {
    if key.len() < TS_WIDTH {
        return bytes(key);
    }
    format!("{}@{}", bytes(keys::user_key(key)), keys::parse_ts(key))
}

/// Renders a key/value pair.
pub fn key_value(key: &[u8], value: &[u8]) -> String {
    format!("{} → {}", composite(key), bytes(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_escapes() {
        assert_eq!(bytes(b"abc"), r#""abc""#);
        assert_eq!(bytes(&[0x00, 0xff]), r#""\x00\xff""#);
        assert_eq!(bytes(b""), r#""""#);
    }

    #[test]
    fn test_composite_key() {
        let key = keys::key_with_ts(b"user", 1234);
        assert_eq!(composite(&key), r#""user"@1234"#);
        // Too short for a suffix: plain bytes.
        assert_eq!(composite(b"abc"), r#""abc""#);
    }

    #[test]
    fn test_key_value() {
        let key = keys::key_with_ts(b"k", 9);
        assert_eq!(key_value(&key, b"v"), r#""k"@9 → "v""#);
    }
}
