//! Decoding of whole messages into bodies and attachments.

use crate::charset;
use crate::config::DecodeConfig;
use crate::content_type::ContentType;
use crate::decoder::DecoderManager;
use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};
use crate::part::{RawPart, section_label, strip_angle_brackets};
use chrono::{DateTime, FixedOffset};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

/// A decoded non-body part.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Attachment {
    /// Suggested filename, if the part carries one.
    pub filename: Option<String>,
    /// Media type without parameters (e.g., "application/pdf").
    pub content_type: String,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    /// Disposition type as written, empty when the header is absent.
    pub disposition: String,
    /// Decoded content.
    pub content: Vec<u8>,
    /// Size declared by the `size` disposition parameter.
    pub declared_size: Option<u64>,
}

impl Attachment {
    /// Size in bytes: the declared size, or the decoded length.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.declared_size
            .unwrap_or_else(|| u64::try_from(self.content.len()).unwrap_or(u64::MAX))
    }

    /// Inline parts have an `inline` disposition or a Content-ID.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.disposition.eq_ignore_ascii_case("inline") || self.content_id.is_some()
    }

    fn from_part(part: &RawPart, content_type: String, content: Vec<u8>) -> Self {
        let disposition = part.content_disposition();
        let disposition_type = disposition.as_ref().map_or_else(
            || {
                part.headers
                    .get("content-disposition")
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            },
            |cd| cd.disposition.clone(),
        );

        Self {
            filename: part.filename(),
            content_type,
            content_id: part.content_id(),
            disposition: disposition_type,
            content,
            declared_size: disposition.and_then(|cd| cd.size()),
        }
    }
}

/// Flat result of decoding a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DecodedMessage {
    /// Top-level header fields by canonical name; the last duplicate wins.
    pub headers: HashMap<String, String>,
    /// First `text/plain` leaf, decoded.
    pub text_body: String,
    /// First `text/html` leaf, decoded.
    pub html_body: String,
    /// All other leaves, in document order.
    pub attachments: Vec<Attachment>,
    /// Leaves whose transfer encoding could not be applied and were
    /// delivered undecoded.
    pub warnings: Vec<String>,
}

impl DecodedMessage {
    /// Looks up a top-level header, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Subject with encoded-words decoded.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.header("subject").map(decode_rfc2047)
    }

    /// Gets the From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.header("from")
    }

    /// Gets the To header.
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.header("to")
    }

    /// Message-ID without angle brackets.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.header("message-id").map(strip_angle_brackets)
    }

    /// Date header parsed as RFC 2822.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.header("date")
            .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
    }

    /// Attachments that are rendered inline.
    pub fn inline_attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_inline())
    }

    /// Finds an attachment by Content-ID; brackets on `id` are ignored.
    #[must_use]
    pub fn attachment_by_content_id(&self, id: &str) -> Option<&Attachment> {
        let id = strip_angle_brackets(id);
        self.attachments
            .iter()
            .find(|a| a.content_id.as_deref() == Some(id))
    }

    /// True when there is no text, no HTML and no attachment.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text_body.is_empty() && self.html_body.is_empty() && self.attachments.is_empty()
    }
}

/// Walks an entity tree and decodes every leaf.
#[derive(Debug, Clone, Copy)]
pub struct MessageDecoder<'a> {
    manager: &'a DecoderManager,
    config: DecodeConfig,
}

impl<'a> MessageDecoder<'a> {
    /// Creates a decoder with the default configuration.
    #[must_use]
    pub const fn new(manager: &'a DecoderManager) -> Self {
        Self::with_config(manager, DecodeConfig::new())
    }

    /// Creates a decoder with a custom configuration.
    #[must_use]
    pub const fn with_config(manager: &'a DecoderManager, config: DecodeConfig) -> Self {
        Self { manager, config }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decodes a fully buffered raw message.
    ///
    /// # Errors
    ///
    /// Returns a structural error if the message cannot be framed or nests
    /// deeper than the configured limit. Per-part problems never fail.
    pub fn decode_message(&self, raw: &[u8]) -> Result<DecodedMessage> {
        self.decode_message_with_tree(raw).map(|(_, message)| message)
    }

    /// Decodes a raw message and also returns the undecoded tree, for use
    /// with the [`crate::structure`] utilities.
    ///
    /// # Errors
    ///
    /// Same as [`MessageDecoder::decode_message`].
    pub fn decode_message_with_tree(&self, raw: &[u8]) -> Result<(RawPart, DecodedMessage)> {
        let tree = RawPart::parse(raw, self.config.max_depth)?;
        let message = self.decode_tree(&tree)?;
        Ok((tree, message))
    }

    /// Buffers and decodes a message from a reader.
    ///
    /// # Errors
    ///
    /// Returns a structural error if reading fails, plus the errors of
    /// [`MessageDecoder::decode_message`].
    pub fn decode_reader<R: Read>(&self, reader: R) -> Result<DecodedMessage> {
        let tree = RawPart::read_from(reader, self.config.max_depth)?;
        self.decode_tree(&tree)
    }

    /// Decodes an already framed entity tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NestingTooDeep`] if the tree is deeper than the
    /// configured limit.
    pub fn decode_tree(&self, root: &RawPart) -> Result<DecodedMessage> {
        let mut walk = Walk {
            decoder: self,
            text: OnceCell::new(),
            html: OnceCell::new(),
            attachments: Vec::new(),
            warnings: Vec::new(),
        };
        let mut path = Vec::new();
        walk.visit(root, &mut path)?;

        Ok(DecodedMessage {
            headers: root.headers.collapse(),
            text_body: walk.text.take().unwrap_or_default(),
            html_body: walk.html.take().unwrap_or_default(),
            attachments: walk.attachments,
            warnings: walk.warnings,
        })
    }

    fn to_text(&self, bytes: &[u8], content_type: &ContentType) -> String {
        if self.config.decode_charsets {
            charset::decode_text(bytes, content_type.charset())
        } else {
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// State of one decode call. Bodies are set once; later candidates are
/// dropped.
struct Walk<'d, 'a> {
    decoder: &'d MessageDecoder<'a>,
    text: OnceCell<String>,
    html: OnceCell<String>,
    attachments: Vec<Attachment>,
    warnings: Vec<String>,
}

impl Walk<'_, '_> {
    fn visit(&mut self, part: &RawPart, path: &mut Vec<usize>) -> Result<()> {
        let limit = self.decoder.config.max_depth;
        if path.len() > limit {
            return Err(Error::NestingTooDeep { limit });
        }

        let content_type = match part.content_type() {
            Ok(Some(ct)) => ct,
            Ok(None) => ContentType::text_plain(),
            Err(err) => {
                warn!(part = %section_label(path), error = %err, "unparseable Content-Type, assuming text/plain");
                ContentType::text_plain()
            }
        };

        if content_type.is_multipart() {
            if content_type.boundary().is_none() {
                warn!(part = %section_label(path), "multipart entity without boundary");
            }
            for (index, child) in part.children.iter().enumerate() {
                path.push(index + 1);
                self.visit(child, path)?;
                path.pop();
            }
            return Ok(());
        }

        self.leaf(part, &content_type, path);
        Ok(())
    }

    fn leaf(&mut self, part: &RawPart, content_type: &ContentType, path: &[usize]) {
        let encoding = part.transfer_encoding();
        let decoded = self.decoder.manager.decode_lenient(&part.body, encoding);

        if let Some(err) = decoded.fallback
            && self.decoder.config.record_fallbacks
        {
            self.warnings
                .push(format!("{}: {err}; content delivered undecoded", section_label(path)));
        }

        if content_type.is("text", "plain") {
            Self::assign_once(&self.text, || self.decoder.to_text(&decoded.bytes, content_type), path);
        } else if content_type.is("text", "html") {
            Self::assign_once(&self.html, || self.decoder.to_text(&decoded.bytes, content_type), path);
        } else {
            let mime_type = content_type.mime_type();
            debug!(part = %section_label(path), %mime_type, size = decoded.bytes.len(), "attachment");
            self.attachments
                .push(Attachment::from_part(part, mime_type, decoded.bytes));
        }
    }

    fn assign_once(cell: &OnceCell<String>, text: impl FnOnce() -> String, path: &[usize]) {
        if cell.get().is_some() {
            debug!(part = %section_label(path), "body already assigned, dropping part");
            return;
        }
        let _ = cell.set(text());
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
    use crate::header::Headers;

    fn decode(raw: &str) -> DecodedMessage {
        let manager = DecoderManager::new();
        MessageDecoder::new(&manager)
            .decode_message(raw.as_bytes())
            .unwrap()
    }

    #[test]
    fn test_single_part_base64_text() {
        let message = decode(concat!(
            "Subject: Test\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "SGVsbG8sIFdvcmxkIQ==\r\n"
        ));
        assert_eq!(message.text_body, "Hello, World!");
        assert!(message.html_body.is_empty());
        assert!(message.attachments.is_empty());
        assert!(message.warnings.is_empty());
    }

    #[test]
    fn test_missing_content_type_is_text() {
        let message = decode("Subject: x\r\n\r\nplain body");
        assert_eq!(message.text_body, "plain body");
    }

    #[test]
    fn test_single_part_html() {
        let message = decode("Content-Type: text/html\r\n\r\n<p>hi</p>");
        assert_eq!(message.html_body, "<p>hi</p>");
        assert!(message.text_body.is_empty());
    }

    #[test]
    fn test_quoted_printable_latin1() {
        let message = decode(concat!(
            "Content-Type: text/plain; charset=iso-8859-1\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "caf=E9 cr=E8me=\r\n br=FBl=E9e"
        ));
        assert_eq!(message.text_body, "café crème brûlée");
    }

    #[test]
    fn test_raw_charset_option() {
        let manager = DecoderManager::new();
        let config = DecodeConfig::builder().decode_charsets(false).build();
        let message = MessageDecoder::with_config(&manager, config)
            .decode_message(b"Content-Type: text/plain; charset=iso-8859-1\r\n\r\ncaf\xE9")
            .unwrap();
        assert_eq!(message.text_body, "caf\u{FFFD}");
    }

    #[test]
    fn test_first_text_part_wins_even_when_empty() {
        let message = decode(concat!(
            "Content-Type: multipart/alternative; boundary=b\r\n\r\n",
            "--b\r\nContent-Type: text/plain\r\n\r\n\r\n",
            "--b\r\nContent-Type: text/plain\r\n\r\nsecond\r\n",
            "--b--\r\n"
        ));
        assert_eq!(message.text_body, "");
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_encoding_not_inherited() {
        let message = decode(concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "Content-Transfer-Encoding: base64\r\n\r\n",
            "--b\r\nContent-Type: text/plain\r\n\r\nnot base64 at all\r\n",
            "--b--\r\n"
        ));
        assert_eq!(message.text_body, "not base64 at all");
        assert!(message.warnings.is_empty());
    }

    #[test]
    fn test_malformed_leaf_is_delivered_raw() {
        let message = decode(concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n",
            "--b\r\nContent-Type: image/png\r\nContent-Transfer-Encoding: base64\r\n\r\n",
            "***not base64***\r\n",
            "--b\r\nContent-Type: application/zip\r\nContent-Transfer-Encoding: x-uuencode\r\n\r\n",
            "begin 644 a.zip\r\n",
            "--b--\r\n"
        ));
        assert_eq!(message.attachments.len(), 2);
        assert_eq!(message.attachments[0].content, b"***not base64***");
        assert_eq!(message.attachments[1].content, b"begin 644 a.zip");
        assert_eq!(message.warnings.len(), 2);
        assert!(message.warnings[0].starts_with("part 1:"));
        assert!(message.warnings[1].contains("x-uuencode"));
    }

    #[test]
    fn test_fallback_warnings_can_be_disabled() {
        let manager = DecoderManager::new();
        let config = DecodeConfig::builder().record_fallbacks(false).build();
        let message = MessageDecoder::with_config(&manager, config)
            .decode_message(b"Content-Transfer-Encoding: base64\r\n\r\n!!!")
            .unwrap();
        assert_eq!(message.text_body, "!!!");
        assert!(message.warnings.is_empty());
    }

    #[test]
    fn test_bad_content_type_degrades_to_text() {
        let message = decode("Content-Type: nonsense\r\n\r\nstill text");
        assert_eq!(message.text_body, "still text");
    }

    #[test]
    fn test_attachment_metadata() {
        let message = decode(concat!(
            "Content-Type: multipart/related; boundary=rel\r\n\r\n",
            "--rel\r\nContent-Type: text/html\r\n\r\n<img src=\"cid:logo\">\r\n",
            "--rel\r\n",
            "Content-Type: image/png; name=logo.png\r\n",
            "Content-ID: <logo>\r\n",
            "Content-Transfer-Encoding: base64\r\n\r\n",
            "iVBORw==\r\n",
            "--rel\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: Attachment; filename=\"report.pdf\"; size=4096\r\n\r\n",
            "%PDF\r\n",
            "--rel--\r\n"
        ));

        assert_eq!(message.attachments.len(), 2);
        let logo = &message.attachments[0];
        assert_eq!(logo.content_type, "image/png");
        assert_eq!(logo.content_id.as_deref(), Some("logo"));
        assert_eq!(logo.filename.as_deref(), Some("logo.png"));
        assert_eq!(logo.disposition, "");
        assert!(logo.is_inline());
        assert_eq!(logo.size(), 4);

        let pdf = &message.attachments[1];
        assert_eq!(pdf.disposition, "Attachment");
        assert_eq!(pdf.filename.as_deref(), Some("report.pdf"));
        assert_eq!(pdf.size(), 4096);
        assert!(!pdf.is_inline());

        assert_eq!(message.inline_attachments().count(), 1);
        assert_eq!(
            message.attachment_by_content_id("<logo>").map(|a| a.content.len()),
            Some(4)
        );
    }

    #[test]
    fn test_headers_collapsed_last_wins() {
        let message = decode(concat!(
            "Subject: =?utf-8?Q?caf=C3=A9?=\r\n",
            "X-Tag: one\r\n",
            "x-tag: two\r\n",
            "Message-ID: <abc@example.com>\r\n",
            "Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n",
            "\r\n",
            "body"
        ));
        assert_eq!(message.header("X-TAG"), Some("two"));
        assert_eq!(message.headers.get("X-Tag").map(String::as_str), Some("two"));
        assert_eq!(message.subject().as_deref(), Some("café"));
        assert_eq!(message.message_id(), Some("abc@example.com"));
        assert_eq!(message.date().unwrap().timestamp(), 1057049557);
    }

    #[test]
    fn test_decode_tree_depth_guard() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/mixed; boundary=x");
        let mut tree = RawPart::new(Headers::new(), b"leaf".to_vec());
        for _ in 0..4 {
            tree = RawPart::with_children(headers.clone(), vec![tree]);
        }

        let manager = DecoderManager::new();
        let shallow = DecodeConfig::builder().max_depth(3).build();
        assert!(matches!(
            MessageDecoder::with_config(&manager, shallow).decode_tree(&tree),
            Err(Error::NestingTooDeep { limit: 3 })
        ));

        let deep = DecodeConfig::builder().max_depth(4).build();
        let message = MessageDecoder::with_config(&manager, deep)
            .decode_tree(&tree)
            .unwrap();
        assert_eq!(message.text_body, "leaf");
    }

    #[test]
    fn test_structural_failure() {
        let manager = DecoderManager::new();
        let err = MessageDecoder::new(&manager).decode_message(b"").unwrap_err();
        assert!(err.is_structural());
    }
}
