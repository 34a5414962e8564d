//! Charset conversion for decoded text bodies.

use tracing::warn;

/// Converts decoded bytes to a string using the named charset.
///
/// UTF-8 (and a missing charset) is decoded lossily. Unknown labels fall
/// back to lossy UTF-8 with a warning.
#[must_use]
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    let Some(label) = charset.map(str::trim).filter(|c| !c.is_empty()) else {
        return String::from_utf8_lossy(bytes).into_owned();
    };

    if label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8") {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    if let Some(encoding) = encoding_rs::Encoding::for_label(label.as_bytes()) {
        let (decoded, _, _) = encoding.decode(bytes);
        decoded.into_owned()
    } else {
        warn!(charset = label, "Unknown charset, falling back to UTF-8 lossy");
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_default() {
        assert_eq!(decode_text("héllo".as_bytes(), None), "héllo");
        assert_eq!(decode_text("héllo".as_bytes(), Some("UTF-8")), "héllo");
    }

    #[test]
    fn test_latin1() {
        assert_eq!(decode_text(b"caf\xE9", Some("ISO-8859-1")), "café");
    }

    #[test]
    fn test_unknown_charset_is_lossy() {
        assert_eq!(decode_text(b"plain", Some("x-made-up")), "plain");
        assert_eq!(decode_text(b"a\xFFb", Some("x-made-up")), "a\u{FFFD}b");
    }
}
