//! # maildecode
//!
//! Decoding of raw MIME messages into text, HTML and attachments.
//!
//! ## Features
//!
//! - **Transfer decoders**: `7bit`, `8bit`, `binary`, `base64` and
//!   `quoted-printable`, with aliases and room for custom encodings
//! - **Decoder cache**: one shared instance per encoding, safe to use from
//!   many threads
//! - **Multipart walking**: depth-first, depth-bounded, lenient per part
//! - **Structure inspection**: part counts, Content-ID lookup, tree rendering
//!   and validation
//!
//! ## Quick Start
//!
//! ```
//! let raw = b"Subject: Test\r\n\
//!             Content-Type: text/plain\r\n\
//!             Content-Transfer-Encoding: base64\r\n\
//!             \r\n\
//!             SGVsbG8sIFdvcmxkIQ==\r\n";
//!
//! let message = maildecode::decode_message(raw)?;
//! assert_eq!(message.text_body, "Hello, World!");
//! assert_eq!(message.subject().as_deref(), Some("Test"));
//! # Ok::<(), maildecode::Error>(())
//! ```
//!
//! ### Inspecting Structure
//!
//! ```
//! use maildecode::{DecoderManager, MessageDecoder, structure};
//!
//! let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n\
//!             --b\r\nContent-Type: text/plain\r\n\r\nhi\r\n\
//!             --b\r\nContent-Type: image/png\r\nContent-ID: <img1>\r\n\r\nPNG\r\n\
//!             --b--\r\n";
//!
//! let decoder = MessageDecoder::new(DecoderManager::global());
//! let (tree, message) = decoder.decode_message_with_tree(raw)?;
//!
//! assert_eq!(structure::count_parts(&tree), 3);
//! assert!(structure::find_by_content_id(&tree, "img1").is_some());
//! assert!(structure::validate(Some(&tree), &message).is_empty());
//! # Ok::<(), maildecode::Error>(())
//! ```
//!
//! ### Custom Encodings
//!
//! ```
//! use std::sync::Arc;
//! use maildecode::decoder::{DecoderManager, IdentityDecoder, TransferDecoder};
//!
//! let manager = DecoderManager::new();
//! manager.register("x-passthrough", || {
//!     Arc::new(IdentityDecoder::binary()) as Arc<dyn TransferDecoder>
//! });
//! assert_eq!(manager.decode(b"abc", "X-Passthrough")?, b"abc");
//! # Ok::<(), maildecode::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod charset;
mod config;
mod content_type;
mod error;
mod header;
mod message;
mod part;

pub mod decoder;
pub mod encoding;
pub mod structure;

pub use config::{DEFAULT_MAX_DEPTH, DecodeConfig, DecodeConfigBuilder};
pub use content_type::{ContentDisposition, ContentType};
pub use decoder::{DecoderManager, DecoderRegistry, TransferDecoder};
pub use error::{DecodeError, Error, Result};
pub use header::{Headers, canonical_name};
pub use message::{Attachment, DecodedMessage, MessageDecoder};
pub use part::{RawPart, strip_angle_brackets};

/// Decodes a raw message with the process-wide decoder manager and the
/// default configuration.
///
/// # Errors
///
/// Returns a structural error if the message cannot be framed or nests too
/// deeply. Per-part decoding problems are tolerated and reported in
/// [`DecodedMessage::warnings`].
pub fn decode_message(raw: &[u8]) -> Result<DecodedMessage> {
    MessageDecoder::new(DecoderManager::global()).decode_message(raw)
}
