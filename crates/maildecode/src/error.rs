//! Error types for MIME decoding.

/// Result type alias for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single transfer decoder on a malformed payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Base64 payload contains invalid characters or padding.
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Quoted-printable escape sequence is malformed.
    #[error("invalid escape at byte {position}: {reason}")]
    InvalidEscape {
        /// Byte offset of the `=` that starts the escape.
        position: usize,
        /// What was wrong with it.
        reason: String,
    },
}

/// MIME decoding error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The message cannot be framed at all, or its body is unreadable.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Multipart nesting exceeds the configured depth limit.
    #[error("Multipart nesting exceeds depth limit of {limit}")]
    NestingTooDeep {
        /// The configured limit.
        limit: usize,
    },

    /// No decoder is registered for the transfer encoding.
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedEncoding(String),

    /// The payload is not valid for its declared transfer encoding.
    #[error("Malformed {encoding} content: {source}")]
    MalformedContent {
        /// Encoding name as written by the caller.
        encoding: String,
        /// Underlying decoder failure.
        #[source]
        source: DecodeError,
    },

    /// Invalid MIME header.
    #[error("Invalid MIME header: {0}")]
    InvalidHeader(String),

    /// Invalid content type.
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// Invalid content disposition.
    #[error("Invalid content disposition: {0}")]
    InvalidDisposition(String),

    /// I/O error while reading a message source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for failures that abort a whole message decode.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Structural(_) | Self::NestingTooDeep { .. } | Self::Io(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(Error::Structural("empty".into()).is_structural());
        assert!(Error::NestingTooDeep { limit: 3 }.is_structural());
        assert!(!Error::UnsupportedEncoding("x-uue".into()).is_structural());
        assert!(!Error::InvalidContentType("text".into()).is_structural());
    }

    #[test]
    fn test_malformed_keeps_original_name() {
        let err = Error::MalformedContent {
            encoding: "Base-64".into(),
            source: DecodeError::InvalidEscape {
                position: 0,
                reason: "test".into(),
            },
        };
        assert!(err.to_string().contains("Base-64"));
    }
}
