//! Turning raw messages into countable entities.
//!
//! Real language processing (tokenization, language detection, sentiment)
//! lives outside this crate behind [`MessageEnricher`]. [`BasicEnricher`] is a
//! small regex tokenizer good enough to build a usable database without it.

use regex::Regex;

use crate::error::Result;
use crate::parse::{PEmoji, PMessage, RawId};

pub use crate::serialization::IndexCountsBuilder;

/// What an enricher extracted from one message.
///
/// Entities are raw references; the builder interns them into dense indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedMessage {
    /// Index into [`LANGUAGE_CODES`](super::languages::LANGUAGE_CODES).
    pub lang: Option<u8>,
    pub sentiment: Option<i8>,
    pub words: Vec<(String, u32)>,
    /// Emojis used inline in the text (reactions are taken from the message).
    pub emojis: Vec<(PEmoji, u32)>,
    pub mentions: Vec<(String, u32)>,
    pub domains: Vec<(String, u32)>,
}

/// Enrichment collaborator.
pub trait MessageEnricher {
    /// Returns one [`EnrichedMessage`] per message of `group`, in order.
    ///
    /// `group` holds consecutive messages of a single channel.
    fn enrich(&mut self, group: &[PMessage]) -> Vec<EnrichedMessage>;
}

impl<F> MessageEnricher for F
where
    F: FnMut(&[PMessage]) -> Vec<EnrichedMessage>,
{
    fn enrich(&mut self, group: &[PMessage]) -> Vec<EnrichedMessage> {
        self(group)
    }
}

/// Words outside this length range are ignored.
pub const MIN_WORD_LEN: usize = 2;
pub const MAX_WORD_LEN: usize = 30;

/// Regex based tokenizer.
///
/// Extracts words, `@mentions`, URL domains, unicode emojis and Discord
/// custom emojis (`<:name:id>`). It does not detect languages or sentiment.
///
/// # Example
///
/// ```rust
/// use chatdb::process::{BasicEnricher, MessageEnricher};
/// # use chatdb::parse::{PMessage, RawId};
/// # let message = PMessage {
/// #     id: RawId::Number(1), channel_id: RawId::Number(1), author_id: RawId::Number(1),
/// #     timestamp: 0, timestamp_edit: None, reply_to: None,
/// #     text: Some("see https://www.Example.com/x, @bob".into()),
/// #     attachments: vec![], reactions: vec![],
/// # };
/// let mut enricher = BasicEnricher::new()?;
/// let enriched = enricher.enrich(&[message]);
///
/// assert_eq!(enriched[0].words, vec![("see".to_string(), 1)]);
/// assert_eq!(enriched[0].domains, vec![("www.example.com".to_string(), 1)]);
/// assert_eq!(enriched[0].mentions, vec![("bob".to_string(), 1)]);
/// # Ok::<(), chatdb::ChatDbError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BasicEnricher {
    url: Regex,
    custom_emoji: Regex,
    mention: Regex,
    emoji: Regex,
    word: Regex,
}

impl BasicEnricher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            url: Regex::new(r"(?i)\bhttps?://([^\s/:?#]+)[^\s]*")?,
            custom_emoji: Regex::new(r"<a?:(\w+):(\d+)>")?,
            mention: Regex::new(r"@(\w+)")?,
            emoji: Regex::new(r"\p{Extended_Pictographic}")?,
            word: Regex::new(r"[\p{L}\p{N}_']+")?,
        })
    }

    /// Tokenizes a single text.
    pub fn enrich_text(&self, text: &str) -> EnrichedMessage {
        let mut out = EnrichedMessage::default();
        // matched spans are blanked so words are not extracted from them
        let mut rest = text.to_string();

        for caps in self.url.captures_iter(text) {
            tally(&mut out.domains, caps[1].to_lowercase());
        }
        rest = self.url.replace_all(&rest, " ").into_owned();

        for caps in self.custom_emoji.captures_iter(&rest) {
            let emoji = PEmoji {
                id: Some(RawId::from(&caps[2])),
                name: caps[1].to_string(),
            };
            tally(&mut out.emojis, emoji);
        }
        rest = self.custom_emoji.replace_all(&rest, " ").into_owned();

        for caps in self.mention.captures_iter(&rest) {
            tally(&mut out.mentions, caps[1].to_string());
        }
        rest = self.mention.replace_all(&rest, " ").into_owned();

        for m in self.emoji.find_iter(&rest) {
            let emoji = PEmoji {
                id: None,
                name: m.as_str().to_string(),
            };
            tally(&mut out.emojis, emoji);
        }

        for m in self.word.find_iter(&rest) {
            let word = m.as_str().trim_matches('\'');
            let len = word.chars().count();
            if (MIN_WORD_LEN..=MAX_WORD_LEN).contains(&len) {
                tally(&mut out.words, word.to_lowercase());
            }
        }
        out
    }
}

impl MessageEnricher for BasicEnricher {
    fn enrich(&mut self, group: &[PMessage]) -> Vec<EnrichedMessage> {
        group
            .iter()
            .map(|m| match &m.text {
                Some(text) => self.enrich_text(text),
                None => EnrichedMessage::default(),
            })
            .collect()
    }
}

/// Adds one occurrence of `item`, keeping first-seen order.
fn tally<T: PartialEq>(list: &mut Vec<(T, u32)>, item: T) {
    match list.iter_mut().find(|(existing, _)| *existing == item) {
        Some((_, count)) => *count += 1,
        None => list.push((item, 1)),
    }
}
