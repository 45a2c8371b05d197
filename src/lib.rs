//! # chatdb
//!
//! A Rust library that turns chat exports into a compact, rank-indexed
//! database: small entity tables plus one bit-packed message stream.
//!
//! ## Overview
//!
//! chatdb reads exports from:
//! - **Discord** - JSON exports from DiscordChatExporter
//! - **Telegram** - JSON exports from Telegram Desktop
//!
//! Files are decoded incrementally in fixed-size chunks, so exports of any
//! size can be ingested with bounded buffering. Messages from many files are
//! merged per channel, deduplicated, enriched (words, emojis, mentions,
//! domains, language) and finally ranked so the most frequent entries get the
//! smallest indices and therefore the fewest bits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatdb::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let db = Ingestion::new(
//!         IngestConfig::new(Platform::Telegram),
//!         BuildConfig::default(),
//!         vec![Input::path("result.json")],
//!     )?
//!     .finish()?;
//!
//!     println!("{}: {} messages", db.title, db.num_messages());
//!     for (channel, message) in db.messages().take(10) {
//!         println!("#{} day {} author {}", channel, message.day_index, message.author_index);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`serialization`] - the bit-level codec
//!   - [`BitStream`](serialization::BitStream), [`IndexCounts`](serialization::IndexCounts)
//!   - [`MessageView`](serialization::MessageView) for lazy reads
//! - [`parse`] - incremental decoders emitting [`ParseEvent`](parse::ParseEvent)s
//! - [`process`] - merge engine, enrichment, ranking and the
//!   [`DatabaseBuilder`](process::DatabaseBuilder)
//! - [`ingest`] - the resumable [`Ingestion`](ingest::Ingestion) driver
//! - [`database`] - the finished [`Database`]
//! - [`config`] - [`BuildConfig`](config::BuildConfig), [`IngestConfig`](config::IngestConfig)
//! - [`progress`] - progress snapshots and callbacks
//! - [`error`] - unified error types ([`ChatDbError`], [`Result`])
//! - `cli` - clap arguments (feature `cli`)
//! - [`prelude`] - convenient re-exports

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod ingest;
pub mod parse;
pub mod process;
pub mod progress;
pub mod serialization;

pub use database::Database;
pub use error::{ChatDbError, Result};

/// Convenient re-exports for common usage.
///
/// ```rust
/// use chatdb::prelude::*;
/// ```
pub mod prelude {
    pub use crate::Database;

    pub use crate::error::{ChatDbError, Result};

    pub use crate::config::{BuildConfig, IngestConfig};

    pub use crate::parse::{Decoder, EventSink, ParseEvent, Platform, create_decoder};

    pub use crate::process::{DatabaseBuilder, MessageEnricher};

    pub use crate::ingest::{Ingestion, Input, Step};

    pub use crate::progress::{Progress, ProgressCallback};

    pub use crate::serialization::MessageView;
}
