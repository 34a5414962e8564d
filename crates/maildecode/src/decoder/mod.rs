//! Content-Transfer-Encoding decoders.
//!
//! Every encoding is a [`TransferDecoder`]. The [`DecoderRegistry`] maps
//! normalized names to constructors, and the [`DecoderManager`] caches
//! constructed decoders and falls back to the identity decoder when a body
//! cannot be decoded.

mod manager;
mod registry;

pub use manager::{DecoderManager, LenientDecode};
pub use registry::{Constructor, DEFAULT_ENCODING, DecoderRegistry, normalize_encoding};

use crate::encoding;
use crate::error::DecodeError;

/// A stateless transform from encoded body bytes to raw bytes.
pub trait TransferDecoder: Send + Sync {
    /// Canonical name of the encoding this decoder handles.
    fn encoding_name(&self) -> &str;

    /// Runs the transform on non-empty input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed for this encoding.
    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError>;

    /// Decodes `input`. Empty input yields empty output without running
    /// the transform.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed for this encoding.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        self.transform(input)
    }
}

/// Base64 decoder (RFC 2045 section 6.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Decoder;

impl TransferDecoder for Base64Decoder {
    fn encoding_name(&self) -> &str {
        "base64"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        encoding::decode_base64(input)
    }
}

/// Quoted-Printable decoder (RFC 2045 section 6.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotedPrintableDecoder;

impl TransferDecoder for QuotedPrintableDecoder {
    fn encoding_name(&self) -> &str {
        "quoted-printable"
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        encoding::decode_quoted_printable(input)
    }
}

/// Identity decoder for `7bit`, `8bit` and `binary` bodies. Never fails.
#[derive(Debug, Clone)]
pub struct IdentityDecoder {
    name: &'static str,
}

impl IdentityDecoder {
    /// `7bit`, the default when no encoding is declared.
    #[must_use]
    pub const fn seven_bit() -> Self {
        Self { name: "7bit" }
    }

    /// `8bit`.
    #[must_use]
    pub const fn eight_bit() -> Self {
        Self { name: "8bit" }
    }

    /// `binary`.
    #[must_use]
    pub const fn binary() -> Self {
        Self { name: "binary" }
    }
}

impl TransferDecoder for IdentityDecoder {
    fn encoding_name(&self) -> &str {
        self.name
    }

    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        Ok(input.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Panicking;

    impl TransferDecoder for Panicking {
        fn encoding_name(&self) -> &str {
            "x-panicking"
        }

        fn transform(&self, _input: &[u8]) -> Result<Vec<u8>, DecodeError> {
            panic!("transform must not run on empty input");
        }
    }

    #[test]
    fn test_empty_input_skips_transform() {
        assert!(Panicking.decode(b"").unwrap().is_empty());
        assert!(Base64Decoder.decode(b"").unwrap().is_empty());
        assert!(QuotedPrintableDecoder.decode(b"").unwrap().is_empty());
        assert!(IdentityDecoder::binary().decode(b"").unwrap().is_empty());
    }

    #[test]
    fn test_names() {
        assert_eq!(Base64Decoder.encoding_name(), "base64");
        assert_eq!(QuotedPrintableDecoder.encoding_name(), "quoted-printable");
        assert_eq!(IdentityDecoder::seven_bit().encoding_name(), "7bit");
        assert_eq!(IdentityDecoder::eight_bit().encoding_name(), "8bit");
        assert_eq!(IdentityDecoder::binary().encoding_name(), "binary");
    }

    #[test]
    fn test_base64_decoder() {
        assert_eq!(Base64Decoder.decode(b"aGk=\r\n").unwrap(), b"hi");
        assert!(Base64Decoder.decode(b"not base64!").is_err());
    }

    #[test]
    fn test_quoted_printable_decoder() {
        assert_eq!(QuotedPrintableDecoder.decode(b"a=3Db").unwrap(), b"a=b");
        assert!(QuotedPrintableDecoder.decode(b"a=G1").is_err());
    }

    proptest! {
        #[test]
        fn prop_identity_returns_input(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert_eq!(IdentityDecoder::eight_bit().decode(&data).unwrap(), data);
        }
    }
}
