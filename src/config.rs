//! Configuration types for building and ingesting.
//!
//! Plain structs without any CLI framework dependencies.
//!
//! - [`BuildConfig`] - word filtering, language detection and reply packing
//! - [`IngestConfig`] - how input files are read
//!
//! # Example
//!
//! ```rust
//! use chatdb::config::{BuildConfig, IngestConfig};
//! use chatdb::parse::Platform;
//!
//! let build = BuildConfig::new()
//!     .with_word_filter_threshold(50_000)
//!     .with_min_language_share(0.05);
//!
//! let ingest = IngestConfig::new(Platform::Telegram)
//!     .with_chunk_size(1024 * 1024);
//!
//! assert_eq!(ingest.chunk_size, 1024 * 1024);
//! ```

use serde::{Deserialize, Serialize};

use crate::parse::Platform;
use crate::process::Stopwords;
use crate::serialization::message::MAX_REPLY_OFFSET;

/// Configuration of the post-processing done by the database builder.
///
/// # Example
///
/// ```rust
/// use chatdb::config::BuildConfig;
/// use chatdb::process::Stopwords;
///
/// let stopwords = Stopwords::from_json_str(r#"{"en": ["the"]}"#)?;
/// let config = BuildConfig::new()
///     .with_min_word_count(3)
///     .with_stopwords(stopwords);
///
/// assert!(config.stopwords.is_some());
/// # Ok::<(), chatdb::ChatDbError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Rare words are only filtered when the vocabulary is larger than this
    /// (default: 100000)
    pub word_filter_threshold: usize,

    /// Minimum number of uses of a word to survive filtering (default: 2)
    pub min_word_count: u32,

    /// Minimum share of tagged messages for a language to be kept
    /// (default: 0.03)
    pub min_language_share: f64,

    /// Maximum distance, in messages, of a stored reply (default: 1023)
    ///
    /// Values above 1023 are clamped.
    pub reply_window: u32,

    /// Stopwords dropped for the detected languages (default: none)
    #[serde(skip)]
    pub stopwords: Option<Stopwords>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            word_filter_threshold: 100_000,
            min_word_count: 2,
            min_language_share: 0.03,
            reply_window: MAX_REPLY_OFFSET,
            stopwords: None,
        }
    }
}

impl BuildConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the vocabulary size above which rare words are dropped.
    #[must_use]
    pub fn with_word_filter_threshold(mut self, threshold: usize) -> Self {
        self.word_filter_threshold = threshold;
        self
    }

    /// Sets the minimum number of uses a word needs once filtering kicks in.
    #[must_use]
    pub fn with_min_word_count(mut self, count: u32) -> Self {
        self.min_word_count = count;
        self
    }

    /// Sets the minimum share for a language to be reported.
    #[must_use]
    pub fn with_min_language_share(mut self, share: f64) -> Self {
        self.min_language_share = share;
        self
    }

    /// Sets the reply window, clamped to what the reply field can hold.
    #[must_use]
    pub fn with_reply_window(mut self, window: u32) -> Self {
        self.reply_window = window.min(MAX_REPLY_OFFSET);
        self
    }

    /// Sets the stopwords to drop.
    #[must_use]
    pub fn with_stopwords(mut self, stopwords: Stopwords) -> Self {
        self.stopwords = Some(stopwords);
        self
    }

    /// Reply window actually used when packing.
    pub fn effective_reply_window(&self) -> u32 {
        self.reply_window.min(MAX_REPLY_OFFSET)
    }
}

/// Configuration of the ingestion driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Decoder used for every input file
    pub platform: Platform,

    /// Bytes read per step (default: 4MB)
    pub chunk_size: usize,
}

impl IngestConfig {
    /// Default chunk size, 4MB.
    pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

    /// Creates a configuration for `platform` with default values.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the chunk size. Zero is treated as one byte.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_default() {
        let config = BuildConfig::default();
        assert_eq!(config.word_filter_threshold, 100_000);
        assert_eq!(config.min_word_count, 2);
        assert!((config.min_language_share - 0.03).abs() < f64::EPSILON);
        assert_eq!(config.reply_window, 1023);
        assert!(config.stopwords.is_none());
    }

    #[test]
    fn test_build_config_builder() {
        let config = BuildConfig::new()
            .with_word_filter_threshold(10)
            .with_min_word_count(5)
            .with_min_language_share(0.1)
            .with_reply_window(5000);
        assert_eq!(config.word_filter_threshold, 10);
        assert_eq!(config.min_word_count, 5);
        assert_eq!(config.reply_window, 1023);
    }

    #[test]
    fn test_effective_reply_window_clamps_deserialized_values() {
        let config: BuildConfig = serde_json::from_str(
            r#"{"word_filter_threshold":1,"min_word_count":1,"min_language_share":0.0,"reply_window":99999}"#,
        )
        .unwrap();
        assert_eq!(config.effective_reply_window(), 1023);
        assert!(config.stopwords.is_none());
    }

    #[test]
    fn test_ingest_config() {
        let config = IngestConfig::new(Platform::Discord);
        assert_eq!(config.chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.with_chunk_size(0).chunk_size, 1);
    }

    #[test]
    fn test_config_serialization() {
        let config = IngestConfig::new(Platform::Telegram).with_chunk_size(16);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: IngestConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.platform, Platform::Telegram);
        assert_eq!(parsed.chunk_size, 16);
    }
}
