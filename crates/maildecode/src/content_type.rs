//! MIME content type and content disposition handling.

use crate::charset;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Characters that may not appear in an RFC 2045 token.
const TSPECIALS: &str = "()<>@,;:\\\"/[]?=";

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx). Keys are lowercase.
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates a text/plain content type, the RFC 2045 default.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present and non-empty.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters
            .get("boundary")
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }

    /// Returns the name parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks for a specific `type/subtype`, ignoring case.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main_type)
            && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the type or subtype is missing or contains
    /// characters that are not allowed in an RFC 2045 token.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, params) = s.split_once(';').unwrap_or((s, ""));
        let type_str = type_str.trim();

        if type_str.is_empty() {
            return Err(Error::InvalidContentType("Empty content type".to_string()));
        }

        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype: {type_str}")))?;
        let main_type = main_type.trim();
        let sub_type = sub_type.trim();

        if !is_token(main_type) || !is_token(sub_type) {
            return Err(Error::InvalidContentType(format!(
                "Invalid media type: {type_str}"
            )));
        }

        Ok(Self {
            main_type: main_type.to_lowercase(),
            sub_type: sub_type.to_lowercase(),
            parameters: parse_parameters(params),
        })
    }
}

impl Default for ContentType {
    fn default() -> Self {
        Self::text_plain()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort();
        for (key, value) in params {
            // Quote value if it contains special characters
            if is_token(value) {
                write!(f, "; {key}={value}")?;
            } else {
                write!(f, "; {key}=\"{value}\"")?;
            }
        }

        Ok(())
    }
}

/// Parsed `Content-Disposition` header (RFC 2183).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type as written (e.g., "attachment", "inline").
    pub disposition: String,
    /// Parameters (e.g., filename, size). Keys are lowercase.
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a content disposition string.
    ///
    /// # Errors
    ///
    /// Returns an error if the disposition type is missing or not a token.
    pub fn parse(s: &str) -> Result<Self> {
        let (kind, params) = s.split_once(';').unwrap_or((s, ""));
        let kind = kind.trim();

        if !is_token(kind) {
            return Err(Error::InvalidDisposition(format!(
                "Invalid disposition type: {kind:?}"
            )));
        }

        Ok(Self {
            disposition: kind.to_string(),
            parameters: parse_parameters(params),
        })
    }

    /// Checks for the `inline` disposition.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.disposition.eq_ignore_ascii_case("inline")
    }

    /// Checks for the `attachment` disposition.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.disposition.eq_ignore_ascii_case("attachment")
    }

    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }

    /// Returns the size parameter if present and numeric.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        self.parameters.get("size").and_then(|s| s.trim().parse().ok())
    }
}

/// Returns true if `s` is a non-empty RFC 2045 token.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_graphic() && !TSPECIALS.contains(c))
}

/// An RFC 2231 parameter segment: `name*index*=value`.
struct Segment {
    name: String,
    index: usize,
    encoded: bool,
    value: String,
}

/// Parses `; key=value` parameters, honouring quoted strings and RFC 2231
/// continuations (`name*0=`, `name*1*=`) and charset-tagged values.
pub(crate) fn parse_parameters(s: &str) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    let mut segments = Vec::new();

    for param in split_unquoted(s) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = unquote(value.trim());

        if let Some((name, rest)) = key.split_once('*') {
            segments.push(Segment {
                name: name.to_string(),
                index: rest.trim_end_matches('*').parse().unwrap_or(0),
                encoded: rest.is_empty() || rest.ends_with('*'),
                value,
            });
        } else if !key.is_empty() {
            parameters.insert(key, value);
        }
    }

    segments.sort_by(|a, b| a.name.cmp(&b.name).then(a.index.cmp(&b.index)));

    let mut start = 0;
    while start < segments.len() {
        let name = segments[start].name.clone();
        let end = segments[start..]
            .iter()
            .position(|seg| seg.name != name)
            .map_or(segments.len(), |offset| start + offset);
        parameters.insert(name, join_segments(&segments[start..end]));
        start = end;
    }

    parameters
}

fn join_segments(segments: &[Segment]) -> String {
    let mut charset_name = None;
    let mut bytes = Vec::new();

    for (i, seg) in segments.iter().enumerate() {
        if !seg.encoded {
            bytes.extend_from_slice(seg.value.as_bytes());
            continue;
        }

        let mut value = seg.value.as_str();
        if i == 0 {
            let mut fields = value.splitn(3, '\'');
            if let (Some(cs), Some(_lang), Some(rest)) = (fields.next(), fields.next(), fields.next())
            {
                charset_name = Some(cs.to_string()).filter(|c| !c.is_empty());
                value = rest;
            }
        }
        bytes.extend(percent_decode(value));
    }

    charset::decode_text(&bytes, charset_name.as_deref())
}

fn percent_decode(value: &str) -> Vec<u8> {
    let raw = value.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%'
            && let Some(hex) = value.get(i + 1..i + 3)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}

/// Splits on `;` outside of quoted strings.
fn split_unquoted(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Strips surrounding quotes and backslash escapes.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_new() {
        let ct = ContentType::new("text", "plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("Text/Plain; charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert_eq!(ct.mime_type(), "text/plain");
        assert!(ct.is("TEXT", "plain"));
    }

    #[test]
    fn test_content_type_parse_quoted() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert_eq!(ct.main_type, "multipart");
        assert_eq!(ct.sub_type, "mixed");
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
        assert!(ct.is_multipart());
    }

    #[test]
    fn test_quoted_semicolon_kept() {
        let ct = ContentType::parse("application/pdf; name=\"a;b.pdf\"; x=1").unwrap();
        assert_eq!(ct.name(), Some("a;b.pdf"));
        assert_eq!(ct.parameters.get("x").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_empty_boundary_is_none() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"\"").unwrap();
        assert_eq!(ct.boundary(), None);
    }

    #[test]
    fn test_content_type_parse_invalid() {
        assert!(ContentType::parse("").is_err());
        assert!(ContentType::parse("text").is_err());
        assert!(ContentType::parse("text/").is_err());
        assert!(ContentType::parse("te xt/plain").is_err());
        assert!(ContentType::parse("text/pl@in").is_err());
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::text_plain().with_parameter("charset", "utf-8");
        assert_eq!(ct.to_string(), "text/plain; charset=utf-8");

        let ct = ContentType::new("multipart", "mixed").with_parameter("boundary", "a=b");
        assert_eq!(ct.to_string(), "multipart/mixed; boundary=\"a=b\"");
    }

    #[test]
    fn test_disposition_parse() {
        let cd = ContentDisposition::parse("Attachment; filename=\"report.pdf\"; size=1024")
            .unwrap();
        assert_eq!(cd.disposition, "Attachment");
        assert!(cd.is_attachment());
        assert!(!cd.is_inline());
        assert_eq!(cd.filename(), Some("report.pdf"));
        assert_eq!(cd.size(), Some(1024));
    }

    #[test]
    fn test_disposition_invalid() {
        assert!(ContentDisposition::parse("").is_err());
        assert!(ContentDisposition::parse("; filename=a").is_err());
    }

    #[test]
    fn test_rfc2231_extended_value() {
        let cd = ContentDisposition::parse("attachment; filename*=utf-8''na%C3%AFve%20file.txt")
            .unwrap();
        assert_eq!(cd.filename(), Some("naïve file.txt"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let cd = ContentDisposition::parse(
            "attachment; filename*1=\"part-two.txt\"; filename*0*=us-ascii'en'part-one-",
        )
        .unwrap();
        assert_eq!(cd.filename(), Some("part-one-part-two.txt"));
    }
}
