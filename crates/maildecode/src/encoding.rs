//! MIME encoding and decoding primitives.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 header encoded-words.
//! The [`crate::decoder`] family wraps the transfer encodings behind a
//! common trait; these functions are the transforms themselves.

use crate::charset;
use crate::error::DecodeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// Line breaks, spaces and tabs are stripped before decoding, so wrapped
/// bodies decode the same as a single line.
///
/// # Errors
///
/// Returns an error if the input contains characters outside the standard
/// alphabet or has invalid padding.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n' | b' ' | b'\t'))
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Maximum line length for Quoted-Printable encoding.
const MAX_LINE_LENGTH: usize = 76;

/// Encodes bytes using Quoted-Printable encoding (RFC 2045).
///
/// Encodes bytes that are not printable ASCII or would interfere
/// with email transmission.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut result = String::new();
    let mut line_length = 0;

    for byte in data {
        // Check if we need soft line break
        if line_length >= MAX_LINE_LENGTH - 3 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        match byte {
            // Printable ASCII except '=' and space (handle separately)
            b'!'..=b'<' | b'>'..=b'~' => {
                result.push(char::from(*byte));
                line_length += 1;
            }
            // Space needs special handling (encode at line end)
            b' ' => {
                if line_length >= MAX_LINE_LENGTH - 1 {
                    result.push_str("=20");
                    line_length += 3;
                } else {
                    result.push(' ');
                    line_length += 1;
                }
            }
            // Everything else gets encoded
            _ => {
                result.push('=');
                let _ = write!(result, "{byte:02X}");
                line_length += 3;
            }
        }
    }

    result
}

/// Decodes Quoted-Printable data (RFC 2045 section 6.7).
///
/// Soft line breaks (`=` plus optional whitespace before the line end) are
/// removed, trailing whitespace before a hard line break is dropped, and a
/// lone `=` at the very end of the input is treated as a soft break.
///
/// # Errors
///
/// Returns an error if `=` is followed by anything other than two hex
/// digits or a line break.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        match data[i] {
            b'=' => {
                let rest = &data[i + 1..];
                let padding = whitespace_run(rest);
                let after = &rest[padding..];

                if after.is_empty() {
                    break;
                }
                if after.starts_with(b"\r\n") {
                    i += 1 + padding + 2;
                    continue;
                }
                if after[0] == b'\n' {
                    i += 1 + padding + 1;
                    continue;
                }

                let hi = rest.first().copied().and_then(hex_value);
                let lo = rest.get(1).copied().and_then(hex_value);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        result.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        return Err(DecodeError::InvalidEscape {
                            position: i,
                            reason: escape_snippet(rest),
                        });
                    }
                }
            }
            b' ' | b'\t' => {
                let run = whitespace_run(&data[i..]);
                let next = &data[i + run..];
                if !(next.starts_with(b"\r\n") || next.first() == Some(&b'\n')) {
                    result.extend_from_slice(&data[i..i + run]);
                }
                i += run;
            }
            byte => {
                result.push(byte);
                i += 1;
            }
        }
    }

    Ok(result)
}

fn whitespace_run(data: &[u8]) -> usize {
    data.iter().take_while(|b| matches!(b, b' ' | b'\t')).count()
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

fn escape_snippet(rest: &[u8]) -> String {
    let shown = &rest[..rest.len().min(2)];
    if shown.is_empty() {
        "incomplete escape sequence".to_string()
    } else {
        format!("expected two hex digits, found {:?}", String::from_utf8_lossy(shown))
    }
}

/// Decodes RFC 2047 encoded-words inside a header value.
///
/// Format: `=?charset?encoding?encoded-text?=`. Whitespace between two
/// adjacent encoded-words is dropped. Words that cannot be decoded are
/// kept verbatim.
#[must_use]
pub fn decode_rfc2047(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    let mut previous_was_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_encoded_word(candidate) {
            if !(previous_was_word && before.trim().is_empty()) {
                result.push_str(before);
            }
            result.push_str(&decoded);
            rest = &candidate[consumed..];
            previous_was_word = true;
        } else {
            result.push_str(before);
            result.push_str("=?");
            rest = &candidate[2..];
            previous_was_word = false;
        }
    }

    result.push_str(rest);
    result
}

/// Decodes one encoded-word at the start of `word`, returning the text and
/// the number of bytes consumed.
fn decode_encoded_word(word: &str) -> Option<(String, usize)> {
    let inner = word.strip_prefix("=?")?;
    let mut fields = inner.splitn(3, '?');
    let charset_field = fields.next()?;
    let encoding = fields.next()?;
    let tail = fields.next()?;
    let end = tail.find("?=")?;
    let payload = &tail[..end];

    // RFC 2231 allows a language suffix: charset*lang
    let charset_name = charset_field.split('*').next().unwrap_or(charset_field);

    let bytes = match encoding {
        "B" | "b" => decode_base64(payload.as_bytes()).ok()?,
        "Q" | "q" => decode_quoted_printable(payload.replace('_', " ").as_bytes()).ok()?,
        _ => return None,
    };

    let consumed = 2 + charset_field.len() + 1 + encoding.len() + 1 + end + 2;
    Some((charset::decode_text(&bytes, Some(charset_name)), consumed))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_strips_line_breaks() {
        let decoded = decode_base64(b"SGVs\r\nbG8s IFdv\tcmxk\nIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_rejects_invalid_characters() {
        assert!(decode_base64(b"SGVs*bG8=").is_err());
        assert!(decode_base64(b"SGVsbG8").is_err());
    }

    #[test]
    fn test_quoted_printable_encode() {
        let encoded = encode_quoted_printable(b"Hello, World!");
        assert_eq!(encoded, "Hello, World!");

        let encoded = encode_quoted_printable("Héllo, Wørld!".as_bytes());
        assert!(encoded.contains("=C3"));
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable(b"Hello, World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");

        let decoded = decode_quoted_printable(b"H=C3=A9llo").unwrap();
        assert_eq!(decoded, "Héllo".as_bytes());

        let decoded = decode_quoted_printable(b"H=c3=a9llo").unwrap();
        assert_eq!(decoded, "Héllo".as_bytes());
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello= \t\r\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(decode_quoted_printable(b"Hello=").unwrap(), b"Hello");
    }

    #[test]
    fn test_quoted_printable_trailing_whitespace() {
        let decoded = decode_quoted_printable(b"line one  \r\nline two\t\nend ").unwrap();
        assert_eq!(decoded, b"line one\r\nline two\nend ");
    }

    #[test]
    fn test_quoted_printable_malformed_escape() {
        let err = decode_quoted_printable(b"abc=ZZdef").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEscape { position: 3, .. }));
        assert!(decode_quoted_printable(b"abc=4").is_err());
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello"), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?="), "Héllo");
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo?="), "Héllo");
        assert_eq!(decode_rfc2047("=?UTF-8?q?a_b?="), "a b");
    }

    #[test]
    fn test_rfc2047_adjacent_words_and_plain_text() {
        let decoded = decode_rfc2047("Re: =?utf-8?Q?caf=C3=A9?= =?utf-8?Q?_au_lait?= today");
        assert_eq!(decoded, "Re: café au lait today");
    }

    #[test]
    fn test_rfc2047_invalid_word_kept() {
        assert_eq!(decode_rfc2047("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
        assert_eq!(decode_rfc2047("price =? unknown"), "price =? unknown");
    }

    #[test]
    fn test_rfc2047_latin1() {
        assert_eq!(decode_rfc2047("=?iso-8859-1?Q?caf=E9?="), "café");
    }

    proptest! {
        #[test]
        fn prop_base64_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode_base64(&data);
            prop_assert_eq!(decode_base64(encoded.as_bytes()).unwrap(), data);
        }

        #[test]
        fn prop_quoted_printable_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = encode_quoted_printable(&data);
            prop_assert_eq!(decode_quoted_printable(encoded.as_bytes()).unwrap(), data);
        }
    }
}
