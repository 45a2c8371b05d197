//! From decoder events to a ranked, packed [`Database`](crate::Database).
//!
//! - [`channel_messages`] - per-channel ordering and deduplication
//! - [`indexed_map`] - dense indices with revisioned values
//! - [`enrich`] - extraction of words, emojis, mentions and domains
//! - [`languages`] - language table and stopwords
//! - [`rank`] - frequency ranking and remapping
//! - [`time`] - calendar days and time keys
//! - [`builder`] - the [`DatabaseBuilder`] tying everything together

pub mod builder;
pub mod channel_messages;
pub mod enrich;
pub mod indexed_map;
pub mod languages;
pub mod rank;
pub mod time;

pub use builder::{BuilderStats, DatabaseBuilder};
pub use channel_messages::{ChannelMessages, MessagesInterval};
pub use enrich::{BasicEnricher, EnrichedMessage, MessageEnricher};
pub use indexed_map::{IndexedMap, Revision};
pub use languages::{LANGUAGE_CODES, Stopwords, UNKNOWN_LANGUAGE, language_code, language_index};
pub use time::{Day, TimeKeys};
