//! Message decoding configuration.

/// Default bound on multipart nesting.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Options for [`crate::MessageDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeConfig {
    /// Maximum multipart nesting depth. The root is depth 0.
    pub max_depth: usize,
    /// Convert text bodies from their declared charset.
    pub decode_charsets: bool,
    /// Record every fallback decode as an advisory warning.
    pub record_fallbacks: bool,
}

impl DecodeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            decode_charsets: true,
            record_fallbacks: true,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub const fn builder() -> DecodeConfigBuilder {
        DecodeConfigBuilder::new()
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`DecodeConfig`].
#[derive(Debug, Clone)]
pub struct DecodeConfigBuilder {
    config: DecodeConfig,
}

impl DecodeConfigBuilder {
    /// Creates a builder starting from the defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config: DecodeConfig::new(),
        }
    }

    /// Sets the maximum nesting depth.
    #[must_use]
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Enables or disables charset conversion of text bodies.
    #[must_use]
    pub const fn decode_charsets(mut self, enabled: bool) -> Self {
        self.config.decode_charsets = enabled;
        self
    }

    /// Enables or disables recording fallback warnings.
    #[must_use]
    pub const fn record_fallbacks(mut self, enabled: bool) -> Self {
        self.config.record_fallbacks = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub const fn build(self) -> DecodeConfig {
        self.config
    }
}

impl Default for DecodeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecodeConfig::default();
        assert_eq!(config.max_depth, 100);
        assert!(config.decode_charsets);
        assert!(config.record_fallbacks);
    }

    #[test]
    fn test_builder() {
        let config = DecodeConfig::builder()
            .max_depth(8)
            .decode_charsets(false)
            .record_fallbacks(false)
            .build();

        assert_eq!(config.max_depth, 8);
        assert!(!config.decode_charsets);
        assert!(!config.record_fallbacks);
    }
}
