//! Undecoded MIME entity tree and multipart framing.

use crate::content_type::{ContentDisposition, ContentType};
use crate::decoder::DEFAULT_ENCODING;
use crate::encoding::decode_rfc2047;
use crate::error::{Error, Result};
use crate::header::Headers;
use memchr::memchr;
use std::io::Read;

/// A node in the parsed-but-undecoded entity tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPart {
    /// Part headers, in order.
    pub headers: Headers,
    /// Body bytes as transmitted (still transfer-encoded).
    pub body: Vec<u8>,
    /// Child entities of a multipart, in document order.
    pub children: Vec<Self>,
}

impl RawPart {
    /// Creates a leaf part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            body,
            children: Vec::new(),
        }
    }

    /// Creates a container part.
    #[must_use]
    pub const fn with_children(headers: Headers, children: Vec<Self>) -> Self {
        Self {
            headers,
            body: Vec::new(),
            children,
        }
    }

    /// Frames a fully buffered message into an entity tree.
    ///
    /// Top-level headers are parsed strictly; nested part headers skip
    /// malformed lines.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if the input is empty or its header
    /// block cannot be framed, and [`Error::NestingTooDeep`] if multipart
    /// nesting exceeds `max_depth`.
    pub fn parse(raw: &[u8], max_depth: usize) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Structural("empty message".to_string()));
        }

        let (header_bytes, body) = split_header_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes))
            .map_err(|e| Error::Structural(format!("cannot frame message headers: {e}")))?;

        Self::build(headers, body, 0, max_depth)
    }

    /// Buffers `reader` to the end, then frames it like [`RawPart::parse`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the reader fails, plus the errors of
    /// [`RawPart::parse`].
    pub fn read_from<R: Read>(mut reader: R, max_depth: usize) -> Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Self::parse(&raw, max_depth)
    }

    fn parse_nested(raw: &[u8], depth: usize, max_depth: usize) -> Result<Self> {
        let (header_bytes, body) = split_header_body(raw);
        let headers = Headers::parse_lenient(&String::from_utf8_lossy(header_bytes));
        Self::build(headers, body, depth, max_depth)
    }

    /// Containers keep only their children; the raw body is stored on
    /// leaves and on multiparts with no usable delimiter.
    fn build(headers: Headers, body: &[u8], depth: usize, max_depth: usize) -> Result<Self> {
        let content_type = headers.content_type().ok().flatten().unwrap_or_default();
        if !content_type.is_multipart() {
            return Ok(Self::new(headers, body.to_vec()));
        }

        if depth >= max_depth {
            return Err(Error::NestingTooDeep { limit: max_depth });
        }

        let Some(boundary) = content_type
            .boundary()
            .map(str::to_string)
            .or_else(|| infer_boundary(body))
        else {
            return Ok(Self::new(headers, body.to_vec()));
        };

        let children = split_multipart(body, &boundary)
            .into_iter()
            .map(|chunk| Self::parse_nested(chunk, depth + 1, max_depth))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::with_children(headers, children))
    }

    /// Parses the `Content-Type` header, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is present but malformed.
    pub fn content_type(&self) -> Result<Option<ContentType>> {
        self.headers.content_type()
    }

    /// Content type used for classification: the declared one, or
    /// `text/plain` when missing or unparseable.
    #[must_use]
    pub fn effective_content_type(&self) -> ContentType {
        self.content_type().ok().flatten().unwrap_or_default()
    }

    /// `type/subtype` of [`RawPart::effective_content_type`].
    #[must_use]
    pub fn mime_type(&self) -> String {
        self.effective_content_type().mime_type()
    }

    /// Checks whether this entity is a multipart container.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.effective_content_type().is_multipart()
    }

    /// Declared multipart boundary, if any.
    #[must_use]
    pub fn boundary(&self) -> Option<String> {
        self.effective_content_type().boundary().map(str::to_string)
    }

    /// Parsed `Content-Disposition`, or `None` if missing or malformed.
    #[must_use]
    pub fn content_disposition(&self) -> Option<ContentDisposition> {
        self.headers.content_disposition().ok().flatten()
    }

    /// `Content-ID` with surrounding angle brackets removed.
    #[must_use]
    pub fn content_id(&self) -> Option<String> {
        self.headers
            .get("content-id")
            .map(strip_angle_brackets)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// This part's own `Content-Transfer-Encoding`, defaulting to `7bit`.
    #[must_use]
    pub fn transfer_encoding(&self) -> &str {
        self.headers
            .get("content-transfer-encoding")
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(DEFAULT_ENCODING)
    }

    /// Suggested filename: the disposition `filename`, falling back to the
    /// content type `name`. Encoded-words are decoded.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let from_disposition = self
            .content_disposition()
            .and_then(|cd| cd.filename().map(str::to_string));
        from_disposition
            .or_else(|| self.effective_content_type().name().map(str::to_string))
            .map(|name| decode_rfc2047(&name))
            .filter(|name| !name.is_empty())
    }
}

/// Removes one pair of surrounding angle brackets, plus whitespace.
#[must_use]
pub fn strip_angle_brackets(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .strip_prefix('<')
        .and_then(|v| v.strip_suffix('>'))
        .unwrap_or(trimmed)
        .trim()
}

/// Location of a part by section number, e.g. "part 1.2".
pub(crate) fn section_label(path: &[usize]) -> String {
    if path.is_empty() {
        return "message".to_string();
    }
    let section: Vec<String> = path.iter().map(ToString::to_string).collect();
    format!("part {}", section.join("."))
}

/// Splits an entity at the first empty line.
fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(body) = raw.strip_prefix(b"\r\n") {
        return (&[], body);
    }
    if let Some(body) = raw.strip_prefix(b"\n") {
        return (&[], body);
    }

    let mut search = 0;
    while let Some(pos) = memchr(b'\n', &raw[search..]).map(|p| p + search) {
        let rest = &raw[pos + 1..];
        if let Some(body) = rest.strip_prefix(b"\r\n") {
            return (&raw[..=pos], body);
        }
        if let Some(body) = rest.strip_prefix(b"\n") {
            return (&raw[..=pos], body);
        }
        search = pos + 1;
    }

    (raw, &[])
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b' ' | b'\t'))
        .map_or(0, |p| p + 1);
    &line[..end]
}

fn strip_line_break(chunk: &[u8]) -> &[u8] {
    chunk
        .strip_suffix(b"\r\n")
        .or_else(|| chunk.strip_suffix(b"\n"))
        .unwrap_or(chunk)
}

/// Guesses the delimiter from the `--token` lines in a body.
///
/// A token seen on two or more lines wins over one seen once, so a lone
/// `-----BEGIN ...-----` line in the preamble is not taken as a delimiter.
fn infer_boundary(body: &[u8]) -> Option<String> {
    let candidates: Vec<&[u8]> = body
        .split(|b| *b == b'\n')
        .map(trim_line_end)
        .filter_map(|line| line.strip_prefix(b"--"))
        .map(|token| token.strip_suffix(b"--").unwrap_or(token))
        .filter(|token| !token.is_empty())
        .collect();

    let repeated = candidates
        .iter()
        .find(|token| candidates.iter().filter(|&other| other == *token).count() > 1);
    repeated
        .or_else(|| candidates.first())
        .map(|token| String::from_utf8_lossy(token).into_owned())
}

/// Splits a multipart body on `--boundary` delimiter lines.
///
/// The preamble and epilogue are discarded. The line break before each
/// delimiter belongs to the delimiter. Without a close delimiter the last
/// part runs to the end of the body.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut line_start = 0;

    while line_start < body.len() {
        let line_end = memchr(b'\n', &body[line_start..]).map_or(body.len(), |p| line_start + p);
        let line = trim_line_end(&body[line_start..line_end]);

        if let Some(rest) = line.strip_prefix(delimiter.as_bytes()) {
            let closing = rest == b"--";
            if rest.is_empty() || closing {
                if let Some(start) = current.take() {
                    parts.push(strip_line_break(&body[start..line_start]));
                }
                if closing {
                    return parts;
                }
                current = Some((line_end + 1).min(body.len()));
            }
        }

        line_start = line_end + 1;
    }

    if let Some(start) = current.filter(|start| *start < body.len()) {
        parts.push(&body[start..]);
    }
    parts
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn mixed(boundary_param: &str) -> String {
        format!(
            concat!(
                "From: a@example.com\r\n",
                "Content-Type: multipart/mixed{}\r\n",
                "\r\n",
                "This is the preamble.\r\n",
                "--XYZ\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "first\r\n",
                "--XYZ\r\n",
                "Content-Type: application/octet-stream\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "AAEC\r\n",
                "--XYZ--\r\n",
                "epilogue\r\n",
            ),
            boundary_param
        )
    }

    #[test]
    fn test_parse_single_part() {
        let part = RawPart::parse(b"Subject: Hi\r\n\r\nHello\r\n", 10).unwrap();
        assert_eq!(part.headers.get("subject"), Some("Hi"));
        assert_eq!(part.body, b"Hello\r\n");
        assert!(part.children.is_empty());
        assert_eq!(part.mime_type(), "text/plain");
    }

    #[test]
    fn test_parse_multipart() {
        let part = RawPart::parse(mixed("; boundary=XYZ").as_bytes(), 10).unwrap();
        assert!(part.is_multipart());
        assert_eq!(part.boundary().as_deref(), Some("XYZ"));
        assert_eq!(part.children.len(), 2);
        assert_eq!(part.children[0].body, b"first");
        assert_eq!(part.children[1].mime_type(), "application/octet-stream");
        assert_eq!(part.children[1].transfer_encoding(), "base64");
        assert_eq!(part.children[1].body, b"AAEC");
    }

    #[test]
    fn test_missing_boundary_is_inferred() {
        let part = RawPart::parse(mixed("").as_bytes(), 10).unwrap();
        assert_eq!(part.boundary(), None);
        assert_eq!(part.children.len(), 2);
        assert_eq!(part.children[0].body, b"first");
    }

    #[test]
    fn test_inferred_boundary_skips_armor_line() {
        let raw = concat!(
            "Content-Type: multipart/signed\r\n\r\n",
            "-----BEGIN PGP SIGNED MESSAGE-----\r\n",
            "--sig\r\nContent-Type: text/plain\r\n\r\nsigned text\r\n",
            "--sig\r\nContent-Type: application/pgp-signature\r\n\r\nSIG\r\n",
            "--sig--\r\n"
        );
        let part = RawPart::parse(raw.as_bytes(), 10).unwrap();
        assert_eq!(part.children.len(), 2);
        assert_eq!(part.children[0].body, b"signed text");
        assert_eq!(part.children[1].mime_type(), "application/pgp-signature");
    }

    #[test]
    fn test_containers_do_not_keep_body_copies() {
        fn stored(part: &RawPart) -> usize {
            part.body.len() + part.children.iter().map(stored).sum::<usize>()
        }

        let leaf = "A".repeat(10_000);
        let mut raw = format!("Content-Type: text/plain\r\n\r\n{leaf}");
        for level in 0..50 {
            raw = format!(
                "Content-Type: multipart/mixed; boundary=b{level}\r\n\r\n--b{level}\r\n{raw}\r\n--b{level}--\r\n"
            );
        }

        let tree = RawPart::parse(raw.as_bytes(), 100).unwrap();
        assert!(stored(&tree) <= raw.len());
        assert!(stored(&tree) >= leaf.len());
        assert!(tree.body.is_empty());
    }

    #[test]
    fn test_lf_only_line_endings() {
        let raw = mixed("; boundary=\"XYZ\"").replace("\r\n", "\n");
        let part = RawPart::parse(raw.as_bytes(), 10).unwrap();
        assert_eq!(part.children.len(), 2);
        assert_eq!(part.children[1].body, b"AAEC");
    }

    #[test]
    fn test_unterminated_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n\r\nonly part\r\n";
        let part = RawPart::parse(raw, 10).unwrap();
        assert_eq!(part.children.len(), 1);
        assert_eq!(part.children[0].body, b"only part\r\n");
        assert!(part.children[0].headers.is_empty());
    }

    #[test]
    fn test_similar_boundary_prefix_not_split() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n",
            "--b\r\n\r\nkeep --bb inside\r\n--bb\r\n",
            "--b--\r\n"
        );
        let part = RawPart::parse(raw.as_bytes(), 10).unwrap();
        assert_eq!(part.children.len(), 1);
        assert_eq!(part.children[0].body, b"keep --bb inside\r\n--bb");
    }

    #[test]
    fn test_empty_message_is_structural() {
        assert!(matches!(RawPart::parse(b"", 10), Err(Error::Structural(_))));
        assert!(matches!(RawPart::parse(b" \r\n", 10), Err(Error::Structural(_))));
    }

    #[test]
    fn test_garbage_headers_are_structural() {
        let err = RawPart::parse(b"not a header line\r\n\r\nbody", 10).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_nested_garbage_headers_are_tolerated() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n",
            "--b\r\ngarbage\r\nContent-Type: text/html\r\n\r\n<p>x</p>\r\n",
            "--b--\r\n"
        );
        let part = RawPart::parse(raw.as_bytes(), 10).unwrap();
        assert_eq!(part.children[0].mime_type(), "text/html");
    }

    #[test]
    fn test_depth_limit() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=a\r\n\r\n",
            "--a\r\n",
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n",
            "--b\r\n\r\ndeep\r\n--b--\r\n",
            "--a--\r\n"
        );
        assert!(RawPart::parse(raw.as_bytes(), 2).is_ok());
        assert!(matches!(
            RawPart::parse(raw.as_bytes(), 1),
            Err(Error::NestingTooDeep { limit: 1 })
        ));
    }

    #[test]
    fn test_read_from_failure_is_structural() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }
        }
        let err = RawPart::read_from(Broken, 10).unwrap_err();
        assert!(err.is_structural());
        assert!(matches!(err, Error::Io(ref e) if e.to_string() == "disk gone"));
    }

    #[test]
    fn test_read_from_reader() {
        let part = RawPart::read_from(&b"Subject: x\r\n\r\nbody"[..], 10).unwrap();
        assert_eq!(part.body, b"body");
    }

    #[test]
    fn test_accessors() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "image/png; name=\"=?utf-8?Q?caf=C3=A9.png?=\"");
        headers.add("Content-ID", " <logo@example.com> ");
        headers.add("Content-Disposition", "inline");
        let part = RawPart::new(headers, Vec::new());

        assert_eq!(part.content_id().as_deref(), Some("logo@example.com"));
        assert_eq!(part.filename().as_deref(), Some("café.png"));
        assert!(part.content_disposition().unwrap().is_inline());
        assert_eq!(part.transfer_encoding(), "7bit");
    }

    #[test]
    fn test_unparseable_content_type_defaults_to_text_plain() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "garbage");
        let part = RawPart::new(headers, Vec::new());
        assert!(part.content_type().is_err());
        assert_eq!(part.mime_type(), "text/plain");
    }

    #[test]
    fn test_section_label() {
        assert_eq!(section_label(&[]), "message");
        assert_eq!(section_label(&[1, 2]), "part 1.2");
    }

    #[test]
    fn test_strip_angle_brackets() {
        assert_eq!(strip_angle_brackets("<img1>"), "img1");
        assert_eq!(strip_angle_brackets("img1"), "img1");
        assert_eq!(strip_angle_brackets(" < img1 > "), "img1");
        assert_eq!(strip_angle_brackets("<img1"), "<img1");
    }
}
