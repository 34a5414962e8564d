//! Integration tests for message decoding.
//!
//! These tests drive the public API end to end, from raw message bytes to
//! decoded bodies, attachments and structure queries.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use maildecode::decoder::{IdentityDecoder, TransferDecoder};
use maildecode::encoding::{encode_base64, encode_quoted_printable};
use maildecode::{
    DecodeConfig, DecodedMessage, DecoderManager, DecoderRegistry, Error, MessageDecoder,
    structure,
};

const MIXED_WITH_PDF: &str = concat!(
    "From: alice@example.com\r\n",
    "To: bob@example.com\r\n",
    "Subject: Quarterly report\r\n",
    "MIME-Version: 1.0\r\n",
    "Content-Type: multipart/mixed; boundary=\"==outer==\"\r\n",
    "\r\n",
    "This is a multi-part message in MIME format.\r\n",
    "--==outer==\r\n",
    "Content-Type: text/plain; charset=utf-8\r\n",
    "Content-Transfer-Encoding: quoted-printable\r\n",
    "\r\n",
    "Report attached. Caf=C3=A9 at noon?\r\n",
    "--==outer==\r\n",
    "Content-Type: application/pdf; name=\"q3.pdf\"\r\n",
    "Content-Disposition: attachment; filename=\"q3.pdf\"\r\n",
    "Content-Transfer-Encoding: base64\r\n",
    "\r\n",
    "JVBERi0xLjQK\r\n",
    "--==outer==--\r\n",
    "epilogue\r\n",
);

const RELATED_WITH_IMAGE: &str = concat!(
    "Subject: Newsletter\r\n",
    "Content-Type: multipart/related; boundary=rel; type=\"text/html\"\r\n",
    "\r\n",
    "--rel\r\n",
    "Content-Type: text/html; charset=us-ascii\r\n",
    "\r\n",
    "<html><body><img src=\"cid:img1\"></body></html>\r\n",
    "--rel\r\n",
    "Content-Type: image/gif\r\n",
    "Content-ID: <img1>\r\n",
    "Content-Disposition: inline\r\n",
    "Content-Transfer-Encoding: base64\r\n",
    "\r\n",
    "R0lGODlhAQABAAAAACw=\r\n",
    "--rel--\r\n",
);

fn decode(raw: &str) -> DecodedMessage {
    maildecode::decode_message(raw.as_bytes()).unwrap()
}

#[test]
fn test_single_part_base64() {
    let payload = "Line one\r\nLine two";
    let raw = format!(
        "Content-Type: text/plain\r\nContent-Transfer-Encoding: base64\r\n\r\n{}\r\n",
        encode_base64(payload.as_bytes())
    );

    let message = decode(&raw);
    assert_eq!(message.text_body, payload);
    assert!(message.attachments.is_empty());
}

#[test]
fn test_single_part_quoted_printable() {
    let payload = "Grüße aus München = viele Grüße\n".repeat(4);
    let raw = format!(
        "Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\n{}",
        encode_quoted_printable(payload.as_bytes())
    );

    let message = decode(&raw);
    assert_eq!(message.text_body, payload);
}

#[test]
fn test_mixed_with_pdf_attachment() {
    let message = decode(MIXED_WITH_PDF);

    assert_eq!(message.text_body, "Report attached. Café at noon?");
    assert!(message.html_body.is_empty());
    assert_eq!(message.attachments.len(), 1);

    let pdf = &message.attachments[0];
    assert_eq!(pdf.content_type, "application/pdf");
    assert_eq!(pdf.disposition, "attachment");
    assert_eq!(pdf.filename.as_deref(), Some("q3.pdf"));
    assert_eq!(pdf.content, b"%PDF-1.4\n");
    assert_eq!(pdf.size(), 9);

    assert_eq!(message.subject().as_deref(), Some("Quarterly report"));
    assert_eq!(message.from(), Some("alice@example.com"));
    assert_eq!(message.header("mime-version"), Some("1.0"));
}

#[test]
fn test_related_content_id_lookup() {
    let decoder = MessageDecoder::new(DecoderManager::global());
    let (tree, message) = decoder
        .decode_message_with_tree(RELATED_WITH_IMAGE.as_bytes())
        .unwrap();

    let image = structure::find_by_content_id(&tree, "img1").unwrap();
    assert_eq!(image.mime_type(), "image/gif");
    assert_eq!(image.content_id().as_deref(), Some("img1"));
    assert!(structure::find_by_content_id(&tree, "<img1>").is_some());
    assert!(structure::find_by_content_id(&tree, "IMG1").is_none());

    assert!(message.html_body.contains("cid:img1"));
    let attachment = message.attachment_by_content_id("img1").unwrap();
    assert!(attachment.is_inline());
    assert_eq!(&attachment.content[..6], b"GIF89a");
}

#[test]
fn test_alternative_keeps_first_text_part() {
    let message = decode(concat!(
        "Content-Type: multipart/alternative; boundary=alt\r\n",
        "\r\n",
        "--alt\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "first\r\n",
        "--alt\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "second\r\n",
        "--alt--\r\n",
    ));

    assert_eq!(message.text_body, "first");
    assert!(message.attachments.is_empty());
    assert!(message.warnings.is_empty());
}

#[test]
fn test_nested_alternative_inside_mixed() {
    let message = decode(concat!(
        "Content-Type: multipart/mixed; boundary=outer\r\n",
        "\r\n",
        "--outer\r\n",
        "Content-Type: multipart/alternative; boundary=inner\r\n",
        "\r\n",
        "--inner\r\n",
        "Content-Type: text/plain\r\n\r\nplain\r\n",
        "--inner\r\n",
        "Content-Type: text/html\r\n\r\n<b>rich</b>\r\n",
        "--inner--\r\n",
        "--outer\r\n",
        "Content-Type: text/plain\r\n",
        "Content-Disposition: attachment; filename=notes.txt\r\n",
        "\r\n",
        "dropped, text/plain is already set\r\n",
        "--outer--\r\n",
    ));

    assert_eq!(message.text_body, "plain");
    assert_eq!(message.html_body, "<b>rich</b>");
    assert!(message.attachments.is_empty());
}

#[test]
fn test_validate_reports_no_content() {
    let decoder = MessageDecoder::new(DecoderManager::global());
    let (tree, message) = decoder
        .decode_message_with_tree(b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b--\r\n")
        .unwrap();

    assert!(message.is_empty());
    let warnings = structure::validate(Some(&tree), &message);
    assert!(warnings.iter().any(|w| w.starts_with("no content")));
}

#[test]
fn test_malformed_leaf_flagged_by_validate() {
    let decoder = MessageDecoder::new(DecoderManager::global());
    let (tree, message) = decoder
        .decode_message_with_tree(concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n",
            "--b\r\nContent-Type: text/plain\r\n\r\nok\r\n",
            "--b\r\nContent-Type: image/png\r\nContent-Transfer-Encoding: base64\r\n\r\n",
            "%%%%\r\n",
            "--b--\r\n",
        ).as_bytes())
        .unwrap();

    assert_eq!(message.attachments[0].content, b"%%%%");
    let warnings = structure::validate(Some(&tree), &message);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("part 2:"));
    assert!(warnings[0].contains("base64"));
}

#[test]
fn test_render_and_count() {
    let decoder = MessageDecoder::new(DecoderManager::global());
    let (tree, _) = decoder
        .decode_message_with_tree(MIXED_WITH_PDF.as_bytes())
        .unwrap();

    assert_eq!(structure::count_parts(&tree), 3);
    assert_eq!(
        structure::render_structure(&tree),
        "multipart/mixed boundary===outer==\n  text/plain\n  application/pdf [attachment] (q3.pdf)\n"
    );
    assert_eq!(structure::find_by_type(&tree, "TEXT/PLAIN").len(), 1);
}

#[test]
fn test_depth_limit_is_fatal() {
    let mut raw = String::new();
    for level in 0..5 {
        raw.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=b{level}\r\n\r\n--b{level}\r\n"
        ));
    }
    raw.push_str("Content-Type: text/plain\r\n\r\ndeep\r\n");

    let manager = DecoderManager::new();
    let config = DecodeConfig::builder().max_depth(2).build();
    let err = MessageDecoder::with_config(&manager, config)
        .decode_message(raw.as_bytes())
        .unwrap_err();
    assert!(matches!(err, Error::NestingTooDeep { limit: 2 }));
    assert!(err.is_structural());

    let message = MessageDecoder::new(&manager)
        .decode_message(raw.as_bytes())
        .unwrap();
    assert_eq!(message.text_body, "deep\r\n");
}

#[test]
fn test_decode_reader() {
    let manager = DecoderManager::new();
    let message = MessageDecoder::new(&manager)
        .decode_reader(MIXED_WITH_PDF.as_bytes())
        .unwrap();
    assert_eq!(message.attachments.len(), 1);
}

#[test]
fn test_empty_input_for_every_encoding() {
    let manager = DecoderManager::new();
    for encoding in manager.registry().list_supported() {
        assert!(manager.decode(b"", &encoding).unwrap().is_empty(), "{encoding}");
    }
}

#[test]
fn test_aliases_resolve_to_one_instance() {
    let manager = DecoderManager::new();
    let base = manager.decoder("base64").unwrap();
    for alias in ["Base-64", "BASE_64", " base64 "] {
        assert!(Arc::ptr_eq(&base, &manager.decoder(alias).unwrap()));
    }
    assert_eq!(manager.cache_size(), 1);
}

#[test]
fn test_concurrent_miss_constructs_once() {
    const THREADS: usize = 16;

    let constructed = Arc::new(AtomicUsize::new(0));
    let registry = DecoderRegistry::with_defaults();
    let counter = Arc::clone(&constructed);
    registry.register("x-counted", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(IdentityDecoder::binary()) as Arc<dyn TransferDecoder>
    });

    let manager = DecoderManager::with_registry(registry);
    let barrier = Barrier::new(THREADS);
    assert_eq!(manager.cache_size(), 0);

    let decoders: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    manager.decoder("X-Counted").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(manager.cache_size(), 1);
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(decoders.iter().all(|d| Arc::ptr_eq(d, &decoders[0])));
}

#[test]
fn test_concurrent_message_decodes_share_manager() {
    let manager = DecoderManager::new();

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let message = MessageDecoder::new(&manager)
                    .decode_message(MIXED_WITH_PDF.as_bytes())
                    .unwrap();
                assert_eq!(message.attachments.len(), 1);
            });
        }
    });

    assert_eq!(manager.cache_size(), 2);
}

#[test]
fn test_unframeable_input_is_structural() {
    let err = maildecode::decode_message(b"\x00\x01 not a header\r\n\r\nbody").unwrap_err();
    assert!(err.is_structural());
}
