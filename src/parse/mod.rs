//! Event contract between platform decoders and the database builder.
//!
//! A [`Decoder`] receives an export as a sequence of byte chunks and turns
//! it into [`ParseEvent`]s pushed into an [`EventSink`]. Decoders never see
//! the whole file at once; memory stays bounded by the largest single record.
//!
//! # Example
//!
//! ```rust
//! use chatdb::parse::{ParseEvent, Platform, Timestamp, create_decoder};
//!
//! let json = br#"{
//!     "guild": {"id": "1", "name": "Guild"},
//!     "channel": {"id": "2", "type": "GuildTextChat", "name": "general"},
//!     "messages": []
//! }"#;
//!
//! let mut decoder = create_decoder(Platform::Discord);
//! let mut events: Vec<(ParseEvent, Option<Timestamp>)> = Vec::new();
//! decoder.push(json, &mut events)?;
//! decoder.finish(&mut events)?;
//!
//! assert!(matches!(events[0].0, ParseEvent::Guild(_)));
//! # Ok::<(), chatdb::ChatDbError>(())
//! ```

pub mod attachments;
pub mod discord;
pub mod json_stream;
pub mod telegram;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{ChatDbError, Result};

pub use attachments::AttachmentType;
pub use discord::DiscordDecoder;
pub use json_stream::{JsonItem, JsonStream};
pub use telegram::TelegramDecoder;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Identifier of an entity as it appears in the export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawId::Number(n) => write!(f, "{}", n),
            RawId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RawId {
    fn from(value: u64) -> Self {
        RawId::Number(value)
    }
}

impl From<&str> for RawId {
    fn from(value: &str) -> Self {
        RawId::Text(value.to_string())
    }
}

impl From<String> for RawId {
    fn from(value: String) -> Self {
        RawId::Text(value)
    }
}

/// Kind of conversation a channel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// One to one conversation.
    Dm,
    /// Small group without a guild.
    Group,
    /// Channel inside a guild.
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PGuild {
    pub id: RawId,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PChannel {
    pub id: RawId,
    pub guild_id: RawId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelType,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PAuthor {
    pub id: RawId,
    pub name: String,
    pub bot: bool,
    pub avatar: Option<String>,
}

/// A custom or unicode emoji as referenced by a reaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PEmoji {
    /// Only custom emojis have an id.
    pub id: Option<RawId>,
    /// e.g. "pepe" or "😀"
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PMessage {
    pub id: RawId,
    pub channel_id: RawId,
    pub author_id: RawId,
    pub timestamp: Timestamp,
    pub timestamp_edit: Option<Timestamp>,
    pub reply_to: Option<RawId>,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentType>,
    #[serde(default)]
    pub reactions: Vec<(PEmoji, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PCall {
    pub id: RawId,
    pub channel_id: RawId,
    pub author_id: RawId,
    pub timestamp_start: Timestamp,
    pub timestamp_end: Timestamp,
}

/// Everything a decoder can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    Guild(PGuild),
    Channel(PChannel),
    Author(PAuthor),
    Message(PMessage),
    Call(PCall),
    /// Messages after this point may be older than the ones before
    /// (e.g. a daylight saving time jump).
    OutOfOrder,
}

/// Receiver of decoder events.
///
/// `at` tells how fresh the information is (for example when the export was
/// generated), so the newest name or avatar of an entity wins. It is *not*
/// the time a message was sent.
pub trait EventSink {
    fn emit(&mut self, event: ParseEvent, at: Option<Timestamp>) -> Result<()>;
}

impl EventSink for Vec<(ParseEvent, Option<Timestamp>)> {
    fn emit(&mut self, event: ParseEvent, at: Option<Timestamp>) -> Result<()> {
        self.push((event, at));
        Ok(())
    }
}

/// A platform specific export decoder.
///
/// One decoder handles one file: create a fresh one per input.
pub trait Decoder {
    fn platform(&self) -> Platform;

    /// Feeds the next chunk of the file.
    fn push(&mut self, chunk: &[u8], sink: &mut dyn EventSink) -> Result<()>;

    /// Signals the end of the file.
    fn finish(&mut self, sink: &mut dyn EventSink) -> Result<()>;
}

/// Platforms with a built-in decoder.
///
/// # Example
///
/// ```rust
/// use chatdb::parse::Platform;
/// use std::str::FromStr;
///
/// assert_eq!(Platform::from_str("tg").unwrap(), Platform::Telegram);
/// assert!(Platform::from_str("irc").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Platform {
    /// DiscordChatExporter JSON exports
    #[serde(alias = "dc")]
    Discord,

    /// Telegram Desktop JSON exports
    #[serde(alias = "tg")]
    Telegram,
}

impl Platform {
    /// Returns all platform names including aliases.
    pub fn all_names() -> &'static [&'static str] {
        &["discord", "dc", "telegram", "tg"]
    }

    /// Returns all available platforms.
    pub fn all() -> &'static [Platform] {
        &[Platform::Discord, Platform::Telegram]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Discord => write!(f, "Discord"),
            Platform::Telegram => write!(f, "Telegram"),
        }
    }
}

impl FromStr for Platform {
    type Err = ChatDbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "discord" | "dc" => Ok(Platform::Discord),
            "telegram" | "tg" => Ok(Platform::Telegram),
            _ => Err(ChatDbError::UnsupportedPlatform(format!(
                "'{}'. Expected one of: {}",
                s,
                Platform::all_names().join(", ")
            ))),
        }
    }
}

/// Creates a decoder for one file of `platform`.
pub fn create_decoder(platform: Platform) -> Box<dyn Decoder> {
    match platform {
        Platform::Discord => Box::new(DiscordDecoder::new()),
        Platform::Telegram => Box::new(TelegramDecoder::new()),
    }
}

/// Parses an RFC 3339 date into a [`Timestamp`].
pub(crate) fn parse_rfc3339(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Parses a date without offset (`2021-01-31T13:05:00`), assumed UTC.
pub(crate) fn parse_naive(value: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}
