//! The immutable result of a build.
//!
//! Every entity table is rank ordered: index 0 is the most active guild,
//! channel or author, and the most used word, emoji, mention or domain.
//! Messages live in one packed bit stream; each channel records where its run
//! starts and how many messages it holds.
//!
//! # Example
//!
//! ```rust
//! use chatdb::prelude::*;
//!
//! let export = br#"{
//!     "guild": {"id": "1", "name": "Rustaceans"},
//!     "channel": {"id": "10", "type": "GuildTextChat", "name": "general"},
//!     "messages": [{
//!         "id": "100", "type": "Default", "timestamp": "2021-06-01T10:00:00+00:00",
//!         "content": "hello world", "author": {"id": "7", "name": "ferris"}
//!     }]
//! }"#;
//!
//! let mut builder = DatabaseBuilder::new(BuildConfig::default())?;
//! let mut decoder = create_decoder(Platform::Discord);
//! decoder.push(export, &mut builder)?;
//! decoder.finish(&mut builder)?;
//! builder.mark_eof();
//!
//! let db = builder.build()?;
//! assert_eq!(db.num_messages(), 1);
//!
//! let (channel, message) = db.messages().next().unwrap();
//! assert_eq!(db.channels[channel].name, "general");
//! assert_eq!(db.authors[message.author_index as usize].name, "ferris");
//! assert_eq!(message.words().unwrap().len(), 2);
//! # Ok::<(), chatdb::ChatDbError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::parse::{ChannelType, RawId, Timestamp};
use crate::process::{Day, TimeKeys};
use crate::serialization::{BitConfig, BitStream, MessageView, MessageViews};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    pub guild_index: u32,
    pub avatar: Option<String>,
    /// Byte offset of the first message of the channel.
    pub msg_addr: u64,
    pub msg_count: u32,
    /// Authors who wrote in a direct message channel.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dm_author_indexes: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub bot: bool,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub name: String,
    /// Only custom emojis have an id.
    pub id: Option<RawId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub channel_index: u32,
    pub author_index: u32,
    pub start: Timestamp,
    pub duration_secs: u32,
}

/// Calendar span of the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Date key (`YYYY-M-D`) of the first day with messages.
    pub min_date: String,
    /// Date key of the last day with messages.
    pub max_date: String,
    pub num_days: usize,
    pub num_months: usize,
    pub num_years: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageShare {
    /// ISO 639 code.
    pub code: String,
    /// Fraction of the language tagged messages, in `[0, 1]`.
    pub share: f64,
}

/// Rank ordered entity tables plus the packed messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub title: String,
    pub bit_config: BitConfig,
    pub time: TimeRange,

    pub guilds: Vec<Guild>,
    pub channels: Vec<Channel>,
    pub authors: Vec<Author>,
    pub words: Vec<String>,
    pub emojis: Vec<Emoji>,
    pub mentions: Vec<String>,
    pub domains: Vec<String>,
    pub calls: Vec<Call>,
    pub languages: Vec<LanguageShare>,

    /// Author indices, humans first, each group by activity.
    pub authors_order: Vec<u32>,
    /// Position in `authors_order` of the first bot, if any.
    pub authors_bot_cutoff: Option<usize>,

    #[serde(with = "stream_bytes")]
    pub(crate) stream: BitStream,
}

impl Database {
    /// The packed messages, 4-byte aligned.
    pub fn serialized(&self) -> &[u8] {
        self.stream.as_bytes()
    }

    pub fn num_messages(&self) -> usize {
        self.channels.iter().map(|c| c.msg_count as usize).sum()
    }

    /// Lazily decoded messages of one channel, in chronological order.
    pub fn channel_messages(&self, channel_index: usize) -> Option<MessageViews<'_>> {
        let channel = self.channels.get(channel_index)?;
        Some(MessageViews::new(
            self.stream.words(),
            channel.msg_addr * 8,
            channel.msg_count as usize,
            &self.bit_config,
        ))
    }

    /// Every message with the index of its channel.
    pub fn messages(&self) -> impl Iterator<Item = (usize, MessageView<'_>)> + '_ {
        (0..self.channels.len()).flat_map(move |i| {
            self.channel_messages(i)
                .into_iter()
                .flatten()
                .map(move |view| (i, view))
        })
    }

    /// Date key of a stored day index.
    pub fn date_key(&self, day_index: u32) -> Option<String> {
        let first = Day::from_key(&self.time.min_date)?;
        let last = Day::from_key(&self.time.max_date)?;
        TimeKeys::between(first, last).date_keys.get(day_index as usize).cloned()
    }
}

/// Stores the stream as its byte view.
mod stream_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::serialization::{BitRead, BitStream};

    pub fn serialize<S: Serializer>(stream: &BitStream, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(stream.as_bytes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BitStream, D::Error> {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        let mut stream = BitStream::from_bytes(&bytes);
        stream.seek(bytes.len() as u64 * 8);
        Ok(stream)
    }
}
