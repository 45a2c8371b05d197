//! Unified error types for chatdb.
//!
//! This module provides a single [`ChatDbError`] enum that covers every fatal
//! condition of an ingestion run. Errors propagate to the caller of the
//! ingestion entry point; there is no automatic retry, and a failed run leaves
//! the builder in a state that must be discarded (counts are cumulative across
//! files, so a half-consumed file cannot be replayed).
//!
//! # Silent conditions
//!
//! Some conditions are deliberately *not* errors:
//! - IndexCounts lists longer than their capped headers are truncated.
//! - BitStream writes never check that a value fits its configured width.
//! - Messages whose timestamp falls inside an already closed interval are
//!   dropped as duplicates.

use std::io;

use thiserror::Error;

/// A specialized [`Result`] type for chatdb operations.
///
/// # Example
///
/// ```rust
/// use chatdb::error::Result;
///
/// fn count_channels() -> Result<usize> {
///     Ok(0)
/// }
/// ```
pub type Result<T> = std::result::Result<T, ChatDbError>;

/// The error type for all chatdb operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChatDbError {
    /// An I/O error occurred while reading an input file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A value captured from a JSON export could not be deserialized into the
    /// record the decoder expected.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The input is malformed or truncated.
    ///
    /// This occurs when:
    /// - The top level of a JSON export is not an object
    /// - A token appears where the grammar does not allow it
    /// - The input ends before the root value is closed
    #[error("Malformed {format} input at byte {offset}: {message}")]
    Structural {
        /// The format being parsed (e.g. "JSON", "Discord")
        format: &'static str,
        /// Description of what's wrong
        message: String,
        /// Absolute byte offset in the input where the problem was detected
        offset: u64,
    },

    /// An event referenced an entity that was never declared.
    #[error("{kind} '{id}' was referenced before being declared")]
    MissingReference {
        /// Entity category ("guild", "channel", "author")
        kind: &'static str,
        /// Raw identifier as seen in the export
        id: String,
    },

    /// A message went back in time inside one file without a preceding
    /// `OutOfOrder` event.
    #[error("Message '{id}' in channel '{channel}' is older than the message before it")]
    OutOfOrder {
        /// Raw channel identifier
        channel: String,
        /// Raw message identifier
        id: String,
    },

    /// Ingestion finished without a single message.
    #[error(
        "No messages were found in the provided files. Make sure you selected the right platform for these exports"
    )]
    EmptyCorpus,

    /// The requested platform is unknown or has no built-in decoder.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A tokenizer pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl ChatDbError {
    /// Creates a structural parse error.
    pub fn structural(format: &'static str, message: impl Into<String>, offset: u64) -> Self {
        ChatDbError::Structural {
            format,
            message: message.into(),
            offset,
        }
    }

    /// Creates a missing reference error.
    pub fn missing_reference(kind: &'static str, id: impl ToString) -> Self {
        ChatDbError::MissingReference {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates an out-of-order error.
    pub fn out_of_order(channel: impl ToString, id: impl ToString) -> Self {
        ChatDbError::OutOfOrder {
            channel: channel.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns `true` if this is an IO error.
    pub fn is_io(&self) -> bool {
        matches!(self, ChatDbError::Io(_))
    }

    /// Returns `true` if the input was structurally invalid (malformed JSON
    /// or a record that does not match the expected shape).
    pub fn is_structural(&self) -> bool {
        matches!(self, ChatDbError::Structural { .. } | ChatDbError::Json(_))
    }

    /// Returns `true` if this is a missing reference error.
    pub fn is_missing_reference(&self) -> bool {
        matches!(self, ChatDbError::MissingReference { .. })
    }

    /// Returns `true` if a message went back in time unannounced.
    pub fn is_out_of_order(&self) -> bool {
        matches!(self, ChatDbError::OutOfOrder { .. })
    }

    /// Returns `true` if no messages were found.
    pub fn is_empty_corpus(&self) -> bool {
        matches!(self, ChatDbError::EmptyCorpus)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = ChatDbError::from(io_err);
        let display = err.to_string();
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
        assert!(err.is_io());
    }

    #[test]
    fn test_structural_display() {
        let err = ChatDbError::structural("JSON", "expected '{'", 17);
        let display = err.to_string();
        assert!(display.contains("JSON"));
        assert!(display.contains("17"));
        assert!(display.contains("expected '{'"));
        assert!(err.is_structural());
        assert!(!err.is_io());
    }

    #[test]
    fn test_json_error_is_structural() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ChatDbError = json_err.into();
        assert!(err.to_string().contains("JSON error"));
        assert!(err.is_structural());
    }

    #[test]
    fn test_missing_reference_display() {
        let err = ChatDbError::missing_reference("channel", "1234");
        let display = err.to_string();
        assert!(display.contains("channel"));
        assert!(display.contains("1234"));
        assert!(err.is_missing_reference());
    }

    #[test]
    fn test_out_of_order_display() {
        let err = ChatDbError::out_of_order("10", "12");
        let display = err.to_string();
        assert!(display.contains("'12'"));
        assert!(display.contains("'10'"));
        assert!(err.is_out_of_order());
        assert!(!err.is_structural());
    }

    #[test]
    fn test_empty_corpus_mentions_platform() {
        let err = ChatDbError::EmptyCorpus;
        assert!(err.is_empty_corpus());
        assert!(err.to_string().contains("platform"));
        assert!(!err.is_structural());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = ChatDbError::from(io_err);
        assert!(err.source().is_some());
        assert!(ChatDbError::EmptyCorpus.source().is_none());
    }

    #[test]
    fn test_pattern_error() {
        let err: ChatDbError = regex::Regex::new("(").unwrap_err().into();
        assert!(err.to_string().starts_with("Pattern error"));
        assert!(!err.is_structural());
    }

    #[test]
    fn test_error_debug() {
        let err = ChatDbError::UnsupportedPlatform("irc".into());
        let debug = format!("{:?}", err);
        assert!(debug.contains("UnsupportedPlatform"));
    }
}
