//! Caching facade over the decoder registry.

use super::registry::{DEFAULT_ENCODING, DecoderRegistry, normalize_encoding};
use super::TransferDecoder;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::{debug, trace, warn};

static GLOBAL: LazyLock<DecoderManager> = LazyLock::new(DecoderManager::new);

/// Result of a decode that is allowed to fall back to the identity decoder.
#[derive(Debug)]
pub struct LenientDecode {
    /// Decoded bytes, or the input unchanged after a fallback.
    pub bytes: Vec<u8>,
    /// Why the requested encoding was abandoned, if it was.
    pub fallback: Option<Error>,
}

/// Decoder cache keyed by normalized encoding name.
///
/// Cache hits take a shared read lock only; a miss takes the write lock,
/// re-checks, then constructs and inserts, so concurrent misses for one name
/// build a single decoder. Entries are never replaced except by
/// [`DecoderManager::register`] and [`DecoderManager::clear_cache`].
pub struct DecoderManager {
    registry: DecoderRegistry,
    cache: RwLock<HashMap<String, Arc<dyn TransferDecoder>>>,
}

impl DecoderManager {
    /// Creates a manager over the default RFC 2045 encodings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(DecoderRegistry::with_defaults())
    }

    /// Creates a manager over a custom registry.
    #[must_use]
    pub fn with_registry(registry: DecoderRegistry) -> Self {
        Self {
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Process-wide manager, created on first use.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// Registers a new encoding, evicting any cached decoder of that name.
    pub fn register<F>(&self, name: &str, constructor: F)
    where
        F: Fn() -> Arc<dyn TransferDecoder> + Send + Sync + 'static,
    {
        self.registry.register(name, constructor);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_encoding(name));
    }

    /// Returns the cached decoder for `encoding`, constructing it on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEncoding`] if no decoder is registered.
    pub fn decoder(&self, encoding: &str) -> Result<Arc<dyn TransferDecoder>> {
        let name = normalize_encoding(encoding);

        if let Some(decoder) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
        {
            trace!(encoding = %name, "decoder cache hit");
            return Ok(Arc::clone(decoder));
        }

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(decoder) = cache.get(&name) {
            return Ok(Arc::clone(decoder));
        }

        let decoder = self.registry.create(encoding)?;
        debug!(encoding = %name, "constructed transfer decoder");
        cache.insert(name, Arc::clone(&decoder));
        Ok(decoder)
    }

    /// Decodes `data` with the named encoding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEncoding`] for an unknown encoding and
    /// [`Error::MalformedContent`] for an invalid payload. Both carry the
    /// encoding name exactly as passed in.
    pub fn decode(&self, data: &[u8], encoding: &str) -> Result<Vec<u8>> {
        let decoder = self.decoder(encoding)?;
        decoder.decode(data).map_err(|source| Error::MalformedContent {
            encoding: encoding.to_string(),
            source,
        })
    }

    /// Decodes `data`, falling back to `7bit` on any failure and reporting
    /// the failure alongside the bytes.
    #[must_use]
    pub fn decode_lenient(&self, data: &[u8], encoding: &str) -> LenientDecode {
        match self.decode(data, encoding) {
            Ok(bytes) => LenientDecode {
                bytes,
                fallback: None,
            },
            Err(err) => {
                warn!(encoding, error = %err, "transfer decoding failed, using 7bit");
                let bytes = self
                    .decode(data, DEFAULT_ENCODING)
                    .unwrap_or_else(|_| data.to_vec());
                LenientDecode {
                    bytes,
                    fallback: Some(err),
                }
            }
        }
    }

    /// Decodes `data`, falling back to `7bit` on any failure. Never fails.
    #[must_use]
    pub fn decode_with_fallback(&self, data: &[u8], encoding: &str) -> Vec<u8> {
        self.decode_lenient(data, encoding).bytes
    }

    /// Drops every cached decoder.
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached decoders.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for DecoderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecoderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderManager")
            .field("registry", &self.registry)
            .field("cache_size", &self.cache_size())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use proptest::prelude::*;

    #[test]
    fn test_aliases_share_instance() {
        let manager = DecoderManager::new();
        let canonical = manager.decoder("base64").unwrap();
        for alias in ["Base-64", "BASE_64", " base64 "] {
            let decoder = manager.decoder(alias).unwrap();
            assert!(Arc::ptr_eq(&canonical, &decoder), "{alias}");
        }
        assert_eq!(manager.cache_size(), 1);
    }

    #[test]
    fn test_decode() {
        let manager = DecoderManager::new();
        assert_eq!(manager.decode(b"aGVsbG8=", "base64").unwrap(), b"hello");
        assert_eq!(manager.decode(b"caf=C3=A9", "Quoted-Printable").unwrap(), "café".as_bytes());
        assert_eq!(manager.decode(b"plain", "").unwrap(), b"plain");
    }

    #[test]
    fn test_decode_errors_carry_original_name() {
        let manager = DecoderManager::new();

        match manager.decode(b"abc", "X-Custom") {
            Err(Error::UnsupportedEncoding(name)) => assert_eq!(name, "X-Custom"),
            other => panic!("unexpected: {other:?}"),
        }

        match manager.decode(b"@@@@", "Base-64") {
            Err(Error::MalformedContent { encoding, .. }) => assert_eq!(encoding, "Base-64"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_fallback_on_unsupported() {
        let manager = DecoderManager::new();
        let result = manager.decode_lenient(b"begin 644 x", "x-uuencode");
        assert_eq!(result.bytes, b"begin 644 x");
        assert!(matches!(result.fallback, Some(Error::UnsupportedEncoding(_))));
    }

    #[test]
    fn test_fallback_on_malformed() {
        let manager = DecoderManager::new();
        let bytes = manager.decode_with_fallback(b"not*base64", "base64");
        assert_eq!(bytes, b"not*base64");
    }

    #[test]
    fn test_fallback_without_identity_returns_input() {
        let manager = DecoderManager::with_registry(DecoderRegistry::empty());
        assert_eq!(manager.decode_with_fallback(b"raw", "base64"), b"raw");
    }

    #[test]
    fn test_clear_cache() {
        let manager = DecoderManager::new();
        manager.decoder("7bit").unwrap();
        manager.decoder("quoted-printable").unwrap();
        assert_eq!(manager.cache_size(), 2);

        manager.clear_cache();
        assert_eq!(manager.cache_size(), 0);
    }

    #[test]
    fn test_unsupported_not_cached() {
        let manager = DecoderManager::new();
        assert!(manager.decoder("x-unknown").is_err());
        assert_eq!(manager.cache_size(), 0);
    }

    struct Upper;

    impl TransferDecoder for Upper {
        fn encoding_name(&self) -> &str {
            "x-upper"
        }

        fn transform(&self, input: &[u8]) -> std::result::Result<Vec<u8>, DecodeError> {
            Ok(input.to_ascii_uppercase())
        }
    }

    #[test]
    fn test_register_evicts_cached_entry() {
        let manager = DecoderManager::new();
        manager.decoder("base64").unwrap();
        assert_eq!(manager.cache_size(), 1);

        manager.register("base64", || Arc::new(Upper));
        assert_eq!(manager.cache_size(), 0);
        assert_eq!(manager.decode(b"abc", "base64").unwrap(), b"ABC");

        manager.register("x-upper", || Arc::new(Upper));
        assert_eq!(manager.decode(b"xyz", "X-Upper").unwrap(), b"XYZ");
    }

    #[test]
    fn test_global_is_shared() {
        let first = DecoderManager::global();
        let second = DecoderManager::global();
        assert!(std::ptr::eq(first, second));
        assert!(first.registry().is_supported("base64"));
    }

    proptest! {
        #[test]
        fn prop_fallback_never_fails(
            data in proptest::collection::vec(any::<u8>(), 0..256),
            encoding in "[A-Za-z0-9_-]{0,20}",
        ) {
            let manager = DecoderManager::new();
            let result = manager.decode_lenient(&data, &encoding);
            if result.fallback.is_some() {
                prop_assert_eq!(result.bytes, data);
            }
        }

        #[test]
        fn prop_empty_input_is_empty(encoding in prop_oneof![
            Just("7bit"), Just("8bit"), Just("binary"), Just("base64"), Just("quoted-printable"),
        ]) {
            let manager = DecoderManager::new();
            prop_assert!(manager.decode(b"", encoding).unwrap().is_empty());
        }
    }
}
