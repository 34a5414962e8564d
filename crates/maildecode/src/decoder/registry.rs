//! Encoding name to decoder constructor mapping.

use super::{Base64Decoder, IdentityDecoder, QuotedPrintableDecoder, TransferDecoder};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Encoding assumed when a part declares none.
pub const DEFAULT_ENCODING: &str = "7bit";

/// Separator variants that collapse onto a canonical name.
const ALIASES: &[(&str, &str)] = &[
    ("base-64", "base64"),
    ("base_64", "base64"),
    ("quoted_printable", "quoted-printable"),
    ("quotedprintable", "quoted-printable"),
    ("7-bit", "7bit"),
    ("7_bit", "7bit"),
    ("8-bit", "8bit"),
    ("8_bit", "8bit"),
];

/// Builds a decoder instance.
pub type Constructor = Arc<dyn Fn() -> Arc<dyn TransferDecoder> + Send + Sync>;

/// Normalizes a Content-Transfer-Encoding name.
///
/// Lowercases and trims the name, maps a blank name to `7bit`, and collapses
/// hyphen/underscore variants onto the canonical spelling.
#[must_use]
pub fn normalize_encoding(name: &str) -> String {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return DEFAULT_ENCODING.to_string();
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |(_, canonical)| (*canonical).to_string())
}

/// Registry of decoder constructors, open for runtime extension.
pub struct DecoderRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl DecoderRegistry {
    /// Creates a registry with no encodings.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry with the RFC 2045 encodings: `7bit`, `8bit`,
    /// `binary`, `base64` and `quoted-printable`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::empty();
        registry.register("7bit", || Arc::new(IdentityDecoder::seven_bit()));
        registry.register("8bit", || Arc::new(IdentityDecoder::eight_bit()));
        registry.register("binary", || Arc::new(IdentityDecoder::binary()));
        registry.register("base64", || Arc::new(Base64Decoder));
        registry.register("quoted-printable", || Arc::new(QuotedPrintableDecoder));
        registry
    }

    /// Registers (or replaces) the constructor for an encoding.
    pub fn register<F>(&self, name: &str, constructor: F)
    where
        F: Fn() -> Arc<dyn TransferDecoder> + Send + Sync + 'static,
    {
        let name = normalize_encoding(name);
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(constructor));
    }

    /// Constructs a decoder for the given encoding name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEncoding`] with the name as given if no
    /// constructor is registered.
    pub fn create(&self, encoding: &str) -> Result<Arc<dyn TransferDecoder>> {
        let name = normalize_encoding(encoding);
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::UnsupportedEncoding(encoding.to_string()))?;
        Ok(constructor())
    }

    /// Checks whether an encoding has a registered constructor.
    #[must_use]
    pub fn is_supported(&self, encoding: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&normalize_encoding(encoding))
    }

    /// Returns the registered encoding names.
    #[must_use]
    pub fn list_supported(&self) -> HashSet<String> {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.list_supported().into_iter().collect();
        names.sort();
        f.debug_struct("DecoderRegistry")
            .field("encodings", &names)
            .finish()
    }
}
