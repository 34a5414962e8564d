//! Read-only inspection of the undecoded entity tree.
//!
//! Used for diagnostics and to resolve `cid:` references from HTML bodies.
//! None of these functions mutate the tree or fail.

use crate::content_type::ContentType;
use crate::message::DecodedMessage;
use crate::part::{RawPart, section_label, strip_angle_brackets};
use std::fmt::Write as _;

/// Counts every node, containers included.
#[must_use]
pub fn count_parts(tree: &RawPart) -> usize {
    1 + tree.children.iter().map(count_parts).sum::<usize>()
}

/// Finds the first node, depth-first, whose Content-ID matches `id`.
///
/// Angle brackets are ignored on both sides; the comparison is
/// case-sensitive.
#[must_use]
pub fn find_by_content_id<'a>(tree: &'a RawPart, id: &str) -> Option<&'a RawPart> {
    let wanted = strip_angle_brackets(id);
    if tree
        .headers
        .get("content-id")
        .is_some_and(|cid| strip_angle_brackets(cid) == wanted)
    {
        return Some(tree);
    }
    tree.children
        .iter()
        .find_map(|child| find_by_content_id(child, wanted))
}

/// Collects, in document order, every node whose `type/subtype` equals
/// `media_type` (case-insensitive).
#[must_use]
pub fn find_by_type<'a>(tree: &'a RawPart, media_type: &str) -> Vec<&'a RawPart> {
    let mut found = Vec::new();
    collect_by_type(tree, media_type.trim(), &mut found);
    found
}

fn collect_by_type<'a>(node: &'a RawPart, media_type: &str, found: &mut Vec<&'a RawPart>) {
    if node.mime_type().eq_ignore_ascii_case(media_type) {
        found.push(node);
    }
    for child in &node.children {
        collect_by_type(child, media_type, found);
    }
}

/// Renders the tree one node per line, indented two spaces per level.
///
/// ```text
/// multipart/mixed boundary=outer
///   text/plain
///   application/pdf [attachment] (report.pdf)
/// ```
#[must_use]
pub fn render_structure(tree: &RawPart) -> String {
    let mut out = String::new();
    render_node(tree, 0, &mut out);
    out
}

fn render_node(node: &RawPart, depth: usize, out: &mut String) {
    let content_type = node.effective_content_type();
    let _ = write!(out, "{:indent$}{}", "", content_type.mime_type(), indent = depth * 2);

    if let Some(disposition) = node.content_disposition() {
        let _ = write!(out, " [{}]", disposition.disposition);
    }
    if let Some(filename) = node.filename() {
        let _ = write!(out, " ({filename})");
    }
    if content_type.is_multipart()
        && let Some(boundary) = content_type.boundary()
    {
        let _ = write!(out, " boundary={boundary}");
    }
    out.push('\n');

    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

/// Collects advisory warnings about a decoded message and its tree.
///
/// Reports an empty message, a missing root, per-node media type problems
/// and multipart nodes without a boundary, followed by the transfer
/// decoding fallbacks recorded during decode.
#[must_use]
pub fn validate(tree: Option<&RawPart>, message: &DecodedMessage) -> Vec<String> {
    let mut warnings = Vec::new();

    if message.is_empty() {
        warnings.push("no content: message has no text, HTML or attachments".to_string());
    }

    match tree {
        Some(root) => validate_node(root, &mut Vec::new(), &mut warnings),
        None => warnings.push("root part is missing".to_string()),
    }

    warnings.extend(message.warnings.iter().cloned());
    warnings
}

fn validate_node(node: &RawPart, path: &mut Vec<usize>, warnings: &mut Vec<String>) {
    let label = section_label(path);

    match node.headers.get("content-type") {
        None => warnings.push(format!("{label}: missing media type")),
        Some(raw) => match ContentType::parse(raw) {
            Ok(content_type) => {
                if content_type.is_multipart() && content_type.boundary().is_none() {
                    warnings.push(format!(
                        "{label}: {} has no boundary",
                        content_type.mime_type()
                    ));
                }
            }
            Err(err) => warnings.push(format!("{label}: {err}")),
        },
    }

    for (index, child) in node.children.iter().enumerate() {
        path.push(index + 1);
        validate_node(child, path, warnings);
        path.pop();
    }
}
