//! Packed message records.
//!
//! Layout of one message:
//!
//! ```text
//! day_index:day_bits  second_of_day:17  author_index:author_index_bits  flags:9
//! [edited_after:varint]
//! [reply_offset:10]
//! [lang_index:8 sentiment+128:8]
//! [words] [emojis] [attachments] [reactions] [mentions] [domains]
//! ```
//!
//! Bracketed sections are only present when their flag is set. List sections
//! use the [index counts](super::index_counts) encoding.

use serde::{Deserialize, Serialize};

use super::bitstream::{BitRead, BitStream};
use super::index_counts::{IndexCounts, bits_for, read_index_counts, write_index_counts};

/// Width of the second-of-day field (0..=86399).
pub const SECOND_OF_DAY_BITS: u32 = 17;
/// Width of the flags word.
pub const FLAGS_BITS: u32 = 9;
/// Width of the reply offset field.
pub const REPLY_BITS: u32 = 10;
/// Largest reply offset that can be stored.
pub const MAX_REPLY_OFFSET: u32 = (1 << REPLY_BITS) - 1;
/// Index width of attachment lists (see [`AttachmentType`](crate::parse::AttachmentType)).
pub const ATTACHMENT_BITS: u32 = 3;

/// Which optional sections follow the fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageFlags(u16);

impl MessageFlags {
    pub const NONE: Self = Self(0);
    pub const REPLY: Self = Self(1 << 0);
    pub const EDITED: Self = Self(1 << 1);
    pub const TEXT: Self = Self(1 << 2);
    pub const WORDS: Self = Self(1 << 3);
    pub const EMOJIS: Self = Self(1 << 4);
    pub const ATTACHMENTS: Self = Self(1 << 5);
    pub const REACTIONS: Self = Self(1 << 6);
    pub const MENTIONS: Self = Self(1 << 7);
    pub const DOMAINS: Self = Self(1 << 8);

    pub fn from_bits(bits: u32) -> Self {
        Self((bits & ((1 << FLAGS_BITS) - 1)) as u16)
    }

    pub fn bits(self) -> u32 {
        u32::from(self.0)
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for MessageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Bit widths of the fields whose range depends on the corpus.
///
/// Every message of one database is written with the same config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitConfig {
    pub day_bits: u32,
    pub author_index_bits: u32,
    pub word_index_bits: u32,
    pub emoji_index_bits: u32,
    pub mention_index_bits: u32,
    pub domain_index_bits: u32,
}

impl Default for BitConfig {
    /// Wide enough for any realistic corpus; used before cardinalities are known.
    fn default() -> Self {
        Self {
            day_bits: 21, // 12 + 4 + 5, fits a binary day
            author_index_bits: 21,
            word_index_bits: 21,
            emoji_index_bits: 18,
            mention_index_bits: 20,
            domain_index_bits: 16,
        }
    }
}

impl BitConfig {
    /// Computes the narrowest config able to address every entity.
    pub fn from_cardinalities(
        num_days: usize,
        num_authors: usize,
        num_words: usize,
        num_emojis: usize,
        num_mentions: usize,
        num_domains: usize,
    ) -> Self {
        let bits = |n: usize| bits_for(u32::try_from(n).unwrap_or(u32::MAX));
        Self {
            day_bits: bits(num_days),
            author_index_bits: bits(num_authors),
            word_index_bits: bits(num_words),
            emoji_index_bits: bits(num_emojis),
            mention_index_bits: bits(num_mentions),
            domain_index_bits: bits(num_domains),
        }
    }
}

/// Language and sentiment of a message with text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStats {
    /// Index into the language table.
    pub lang_index: u8,
    /// Sentiment score in -128..=127.
    pub sentiment: i8,
}

/// A fully decoded message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub day_index: u32,
    /// Seconds since midnight UTC.
    pub second_of_day: u32,
    pub author_index: u32,
    /// Seconds between the message being sent and its last edit.
    pub edited_after: Option<u32>,
    /// How many messages back, in the same channel, the replied message is.
    pub reply_offset: Option<u32>,
    pub text: Option<TextStats>,
    pub words: Option<IndexCounts>,
    pub emojis: Option<IndexCounts>,
    pub attachments: Option<IndexCounts>,
    pub reactions: Option<IndexCounts>,
    pub mentions: Option<IndexCounts>,
    pub domains: Option<IndexCounts>,
}

fn non_empty(list: Option<&IndexCounts>) -> Option<&IndexCounts> {
    list.filter(|l| !l.is_empty())
}

impl Message {
    /// Flags describing the sections [`write_message`] will emit.
    pub fn flags(&self) -> MessageFlags {
        let mut flags = MessageFlags::NONE;
        if self.reply_offset.is_some() {
            flags.insert(MessageFlags::REPLY);
        }
        if self.edited_after.is_some() {
            flags.insert(MessageFlags::EDITED);
        }
        if self.text.is_some() {
            flags.insert(MessageFlags::TEXT);
        }
        let lists = [
            (self.words.as_ref(), MessageFlags::WORDS),
            (self.emojis.as_ref(), MessageFlags::EMOJIS),
            (self.attachments.as_ref(), MessageFlags::ATTACHMENTS),
            (self.reactions.as_ref(), MessageFlags::REACTIONS),
            (self.mentions.as_ref(), MessageFlags::MENTIONS),
            (self.domains.as_ref(), MessageFlags::DOMAINS),
        ];
        for (list, flag) in lists {
            if non_empty(list).is_some() {
                flags.insert(flag);
            }
        }
        flags
    }
}

/// Appends `message` to `stream`.
pub fn write_message(message: &Message, stream: &mut BitStream, config: &BitConfig) {
    stream.set_bits(config.day_bits, message.day_index);
    stream.set_bits(SECOND_OF_DAY_BITS, message.second_of_day);
    stream.set_bits(config.author_index_bits, message.author_index);

    let flags = message.flags();
    stream.set_bits(FLAGS_BITS, flags.bits());

    if let Some(edited_after) = message.edited_after {
        stream.write_varint(u64::from(edited_after), 32);
    }
    if let Some(reply_offset) = message.reply_offset {
        stream.set_bits(REPLY_BITS, reply_offset);
    }
    if let Some(text) = message.text {
        stream.set_bits(8, u32::from(text.lang_index));
        stream.set_bits(8, (i32::from(text.sentiment) + 128) as u32);
    }

    let lists = [
        (message.words.as_ref(), config.word_index_bits),
        (message.emojis.as_ref(), config.emoji_index_bits),
        (message.attachments.as_ref(), ATTACHMENT_BITS),
        (message.reactions.as_ref(), config.emoji_index_bits),
        (message.mentions.as_ref(), config.mention_index_bits),
        (message.domains.as_ref(), config.domain_index_bits),
    ];
    for (list, bits) in lists {
        if let Some(list) = non_empty(list) {
            write_index_counts(list, stream, bits);
        }
    }
}

/// Reads the message at the current offset of `stream`.
pub fn read_message<R: BitRead>(stream: &mut R, config: &BitConfig) -> Message {
    let day_index = stream.get_bits(config.day_bits);
    let second_of_day = stream.get_bits(SECOND_OF_DAY_BITS);
    let author_index = stream.get_bits(config.author_index_bits);
    let flags = MessageFlags::from_bits(stream.get_bits(FLAGS_BITS));

    let edited_after = flags
        .contains(MessageFlags::EDITED)
        .then(|| stream.read_varint(32) as u32);
    let reply_offset = flags
        .contains(MessageFlags::REPLY)
        .then(|| stream.get_bits(REPLY_BITS));
    let text = flags.contains(MessageFlags::TEXT).then(|| TextStats {
        lang_index: stream.get_bits(8) as u8,
        sentiment: (stream.get_bits(8) as i32 - 128) as i8,
    });

    let mut list = |flag: MessageFlags, bits: u32| {
        flags
            .contains(flag)
            .then(|| read_index_counts(stream, bits))
    };

    Message {
        day_index,
        second_of_day,
        author_index,
        edited_after,
        reply_offset,
        text,
        words: list(MessageFlags::WORDS, config.word_index_bits),
        emojis: list(MessageFlags::EMOJIS, config.emoji_index_bits),
        attachments: list(MessageFlags::ATTACHMENTS, ATTACHMENT_BITS),
        reactions: list(MessageFlags::REACTIONS, config.emoji_index_bits),
        mentions: list(MessageFlags::MENTIONS, config.mention_index_bits),
        domains: list(MessageFlags::DOMAINS, config.domain_index_bits),
    }
}
