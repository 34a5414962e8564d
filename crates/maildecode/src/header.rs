//! MIME header handling.

use crate::content_type::{ContentDisposition, ContentType};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// Ordered collection of email header fields.
///
/// Lookups are case-insensitive. Field order and duplicates are preserved
/// for iteration; the name is kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.fields.push((name, value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header, in order.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all fields in order, duplicates included.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of fields, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Collapses the fields into a map keyed by canonical name.
    ///
    /// When a name repeats, the last value wins.
    #[must_use]
    pub fn collapse(&self) -> HashMap<String, String> {
        self.fields
            .iter()
            .map(|(n, v)| (canonical_name(n), v.clone()))
            .collect()
    }

    /// Parses the `Content-Type` field, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is present but malformed.
    pub fn content_type(&self) -> Result<Option<ContentType>> {
        self.get("content-type").map(ContentType::parse).transpose()
    }

    /// Parses the `Content-Disposition` field, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is present but malformed.
    pub fn content_disposition(&self) -> Result<Option<ContentDisposition>> {
        self.get("content-disposition")
            .map(ContentDisposition::parse)
            .transpose()
    }

    /// Parses headers from raw text, rejecting malformed lines.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///  continuation
    /// ```
    ///
    /// Parsing stops at the first empty line.
    ///
    /// # Errors
    ///
    /// Returns an error for a line that is neither a field nor a
    /// continuation of one.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_impl(text, true)
    }

    /// Parses headers from raw text, skipping malformed lines.
    #[must_use]
    pub fn parse_lenient(text: &str) -> Self {
        Self::parse_impl(text, false).unwrap_or_default()
    }

    fn parse_impl(text: &str, strict: bool) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                match current.as_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None if strict => {
                        return Err(Error::InvalidHeader(format!(
                            "continuation without a field: {line:?}"
                        )));
                    }
                    None => {}
                }
                continue;
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value.trim().to_string());
            }

            match line.split_once(':') {
                Some((name, value)) if !name.trim().is_empty() => {
                    current = Some((name.trim().to_string(), value.trim().to_string()));
                }
                _ if strict => {
                    return Err(Error::InvalidHeader(format!("not a header field: {line:?}")));
                }
                _ => {}
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim().to_string());
        }

        Ok(headers)
    }
}

/// Canonicalizes a header name (e.g., "content-type" -> "Content-Type").
#[must_use]
pub fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
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

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("content-type"), Some("text/plain")); // Case insensitive
    }

    #[test]
    fn test_headers_duplicates_preserved() {
        let mut headers = Headers::new();
        headers.add("Received", "first");
        headers.add("Subject", "Test");
        headers.add("received", "second");

        assert_eq!(headers.get("Received"), Some("first"));
        assert_eq!(headers.get_all("RECEIVED"), vec!["first", "second"]);

        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Received", "Subject", "received"]);
    }

    #[test]
    fn test_headers_set() {
        let mut headers = Headers::new();
        headers.add("To", "alice@example.com");
        headers.add("To", "bob@example.com");
        assert_eq!(headers.get_all("To").len(), 2);

        headers.set("To", "charlie@example.com");
        assert_eq!(headers.get_all("To").len(), 1);
        assert_eq!(headers.get("To"), Some("charlie@example.com"));
    }

    #[test]
    fn test_headers_remove() {
        let mut headers = Headers::new();
        headers.add("Subject", "Test");
        headers.remove("subject");
        assert!(headers.get("Subject").is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn test_collapse_last_wins() {
        let mut headers = Headers::new();
        headers.add("x-tag", "one");
        headers.add("X-Tag", "two");
        headers.add("subject", "Hi");

        let map = headers.collapse();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("X-Tag").map(String::as_str), Some("two"));
        assert_eq!(map.get("Subject").map(String::as_str), Some("Hi"));
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("content-type"), "Content-Type");
        assert_eq!(canonical_name("MESSAGE-ID"), "Message-Id");
        assert_eq!(canonical_name("x-custom-header"), "X-Custom-Header");
    }

    #[test]
    fn test_headers_parse() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: text/plain;\r\n",
            " charset=utf-8\r\n",
            "\r\n",
            "Body: not a header\r\n"
        );

        let headers = Headers::parse(text).unwrap();
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn test_headers_parse_strict_rejects_garbage() {
        assert!(Headers::parse("this is not a header\r\n").is_err());
        assert!(Headers::parse(" leading continuation\r\n").is_err());
    }

    #[test]
    fn test_headers_parse_lenient_skips_garbage() {
        let headers = Headers::parse_lenient("garbage line\r\nContent-Type: image/png\r\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content-type"), Some("image/png"));
    }

    #[test]
    fn test_typed_accessors() {
        let mut headers = Headers::new();
        assert!(headers.content_type().unwrap().is_none());

        headers.add("Content-Type", "image/png; name=a.png");
        headers.add("Content-Disposition", "inline; filename=a.png");
        let ct = headers.content_type().unwrap().unwrap();
        assert_eq!(ct.mime_type(), "image/png");
        let cd = headers.content_disposition().unwrap().unwrap();
        assert!(cd.is_inline());
    }

    #[test]
    fn test_headers_display() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");

        let s = headers.to_string();
        assert_eq!(s, "From: sender@example.com\nTo: recipient@example.com\n");
    }
}
