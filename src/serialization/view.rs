//! Lazy message reader.
//!
//! Aggregations over millions of messages usually need two or three fields.
//! [`MessageView`] decodes the fixed header eagerly, remembers where each
//! list section starts, and only decodes a list when asked for it.

use super::bitstream::{BitAddress, BitRead, BitReader};
use super::index_counts::{IndexCounts, read_index_counts, skip_index_counts};
use super::message::{
    ATTACHMENT_BITS, BitConfig, FLAGS_BITS, Message, MessageFlags, REPLY_BITS, SECOND_OF_DAY_BITS,
    TextStats,
};

/// A message whose list sections are decoded on demand.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    words: &'a [u32],
    config: &'a BitConfig,

    pub day_index: u32,
    pub second_of_day: u32,
    pub author_index: u32,
    pub edited_after: Option<u32>,
    pub reply_offset: Option<u32>,
    pub text: Option<TextStats>,

    flags: MessageFlags,
    words_at: BitAddress,
    emojis_at: BitAddress,
    attachments_at: BitAddress,
    reactions_at: BitAddress,
    mentions_at: BitAddress,
    domains_at: BitAddress,
    end: BitAddress,
}

impl<'a> MessageView<'a> {
    /// Parses the header of the message starting at `offset`.
    pub fn new(words: &'a [u32], offset: BitAddress, config: &'a BitConfig) -> Self {
        let mut reader = BitReader::new(words, offset);

        let day_index = reader.get_bits(config.day_bits);
        let second_of_day = reader.get_bits(SECOND_OF_DAY_BITS);
        let author_index = reader.get_bits(config.author_index_bits);
        let flags = MessageFlags::from_bits(reader.get_bits(FLAGS_BITS));

        let edited_after = flags
            .contains(MessageFlags::EDITED)
            .then(|| reader.read_varint(32) as u32);
        let reply_offset = flags
            .contains(MessageFlags::REPLY)
            .then(|| reader.get_bits(REPLY_BITS));
        let text = flags.contains(MessageFlags::TEXT).then(|| TextStats {
            lang_index: reader.get_bits(8) as u8,
            sentiment: (reader.get_bits(8) as i32 - 128) as i8,
        });

        let mut section = |flag: MessageFlags, bits: u32| -> BitAddress {
            let at = reader.offset();
            if flags.contains(flag) {
                skip_index_counts(&mut reader, bits);
            }
            at
        };
        let words_at = section(MessageFlags::WORDS, config.word_index_bits);
        let emojis_at = section(MessageFlags::EMOJIS, config.emoji_index_bits);
        let attachments_at = section(MessageFlags::ATTACHMENTS, ATTACHMENT_BITS);
        let reactions_at = section(MessageFlags::REACTIONS, config.emoji_index_bits);
        let mentions_at = section(MessageFlags::MENTIONS, config.mention_index_bits);
        let domains_at = section(MessageFlags::DOMAINS, config.domain_index_bits);

        Self {
            words,
            config,
            day_index,
            second_of_day,
            author_index,
            edited_after,
            reply_offset,
            text,
            flags,
            words_at,
            emojis_at,
            attachments_at,
            reactions_at,
            mentions_at,
            domains_at,
            end: reader.offset(),
        }
    }

    /// Offset right after this message, where the next one starts.
    pub fn end(&self) -> BitAddress {
        self.end
    }

    pub fn flags(&self) -> MessageFlags {
        self.flags
    }

    fn section(&self, flag: MessageFlags, at: BitAddress, bits: u32) -> Option<IndexCounts> {
        if !self.flags.contains(flag) {
            return None;
        }
        let mut reader = BitReader::new(self.words, at);
        Some(read_index_counts(&mut reader, bits))
    }

    pub fn words(&self) -> Option<IndexCounts> {
        self.section(MessageFlags::WORDS, self.words_at, self.config.word_index_bits)
    }

    pub fn emojis(&self) -> Option<IndexCounts> {
        self.section(MessageFlags::EMOJIS, self.emojis_at, self.config.emoji_index_bits)
    }

    pub fn attachments(&self) -> Option<IndexCounts> {
        self.section(MessageFlags::ATTACHMENTS, self.attachments_at, ATTACHMENT_BITS)
    }

    pub fn reactions(&self) -> Option<IndexCounts> {
        self.section(MessageFlags::REACTIONS, self.reactions_at, self.config.emoji_index_bits)
    }

    pub fn mentions(&self) -> Option<IndexCounts> {
        self.section(MessageFlags::MENTIONS, self.mentions_at, self.config.mention_index_bits)
    }

    pub fn domains(&self) -> Option<IndexCounts> {
        self.section(MessageFlags::DOMAINS, self.domains_at, self.config.domain_index_bits)
    }

    /// Decodes every section.
    pub fn full_message(&self) -> Message {
        Message {
            day_index: self.day_index,
            second_of_day: self.second_of_day,
            author_index: self.author_index,
            edited_after: self.edited_after,
            reply_offset: self.reply_offset,
            text: self.text,
            words: self.words(),
            emojis: self.emojis(),
            attachments: self.attachments(),
            reactions: self.reactions(),
            mentions: self.mentions(),
            domains: self.domains(),
        }
    }
}

/// Iterates `count` consecutive messages starting at `offset`.
#[derive(Debug, Clone)]
pub struct MessageViews<'a> {
    words: &'a [u32],
    config: &'a BitConfig,
    offset: BitAddress,
    remaining: usize,
}

impl<'a> MessageViews<'a> {
    pub fn new(words: &'a [u32], offset: BitAddress, count: usize, config: &'a BitConfig) -> Self {
        Self {
            words,
            config,
            offset,
            remaining: count,
        }
    }
}

impl<'a> Iterator for MessageViews<'a> {
    type Item = MessageView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let view = MessageView::new(self.words, self.offset, self.config);
        self.offset = view.end();
        Some(view)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for MessageViews<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{BitStream, write_message};

    fn sample() -> Vec<Message> {
        vec![
            Message {
                day_index: 3,
                second_of_day: 100,
                author_index: 1,
                text: Some(TextStats {
                    lang_index: 2,
                    sentiment: 40,
                }),
                words: Some(vec![(1, 1), (2, 5)]),
                mentions: Some(vec![(0, 1)]),
                ..Message::default()
            },
            Message {
                day_index: 4,
                second_of_day: 200,
                author_index: 0,
                reply_offset: Some(1),
                edited_after: Some(90_000),
                attachments: Some(vec![(1, 1)]),
                domains: Some(vec![(3, 2)]),
                ..Message::default()
            },
            Message::default(),
        ]
    }

    #[test]
    fn test_view_matches_full_decode() {
        let config = BitConfig::default();
        let messages = sample();
        let mut stream = BitStream::new();
        for message in &messages {
            write_message(message, &mut stream, &config);
        }
        let end = stream.offset();

        let views: Vec<_> = MessageViews::new(stream.words(), 0, messages.len(), &config).collect();
        assert_eq!(views.len(), 3);
        for (view, message) in views.iter().zip(&messages) {
            assert_eq!(&view.full_message(), message);
        }
        assert_eq!(views[2].end(), end);
    }

    #[test]
    fn test_view_single_field() {
        let config = BitConfig::default();
        let messages = sample();
        let mut stream = BitStream::new();
        write_message(&messages[0], &mut stream, &config);

        let view = MessageView::new(stream.words(), 0, &config);
        assert_eq!(view.author_index, 1);
        assert_eq!(view.mentions(), Some(vec![(0, 1)]));
        assert_eq!(view.emojis(), None);
        // asking twice gives the same answer
        assert_eq!(view.words(), view.words());
    }
}
