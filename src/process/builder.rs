//! Assembles a [`Database`] out of decoder events.
//!
//! The builder is an [`EventSink`]: decoders push events straight into it.
//! Entities get dense indices on first sight and messages are queued per
//! channel. [`DatabaseBuilder::process`] hands the pending queues to the
//! [`MessageEnricher`] and interns what it extracts; [`DatabaseBuilder::build`]
//! then ranks every table by activity and packs the messages.
//!
//! Build phases:
//!
//! 1. Language detection from per-message language counts
//! 2. Word filtering (rare words on huge vocabularies, stopwords)
//! 3. Ranking of every category, most frequent first
//! 4. Remapping of the tables and of every message reference
//! 5. Packing of the messages, channel by channel

use std::collections::{BTreeSet, HashMap};

use log::{debug, info, warn};

use super::channel_messages::ChannelMessages;
use super::enrich::{BasicEnricher, EnrichedMessage, MessageEnricher};
use super::indexed_map::IndexedMap;
use super::languages::{UNKNOWN_LANGUAGE, detect_languages, language_code};
use super::rank::{FILTERED, inverse, rank, remap, remap_index_counts};
use super::time::{Day, TimeKeys};
use crate::config::BuildConfig;
use crate::database::{Author, Call, Channel, Database, Emoji, Guild, LanguageShare, TimeRange};
use crate::error::{ChatDbError, Result};
use crate::parse::{
    ChannelType, EventSink, PAuthor, PCall, PChannel, PEmoji, PGuild, PMessage, ParseEvent, RawId,
    Timestamp,
};
use crate::serialization::{
    BitConfig, BitRead, BitStream, IndexCounts, IndexCountsBuilder, Message, TextStats,
    write_message,
};

/// Name DiscordChatExporter gives to the pseudo guild holding DMs.
const DIRECT_MESSAGES: &str = "Direct Messages";

/// Only the most active authors keep their avatar.
const MAX_AUTHOR_AVATARS: usize = 1000;

/// Corpora spanning more days than this get their bulk range logged.
const LONG_SPAN_DAYS: i64 = 100 * 366;

/// A message after enrichment, still pointing to pre-rank indices.
#[derive(Debug, Clone)]
struct IntermediateMessage {
    /// [`Day::to_binary`]
    day: u32,
    second_of_day: u32,
    author_index: usize,
    edited_after: Option<u32>,
    reply_to: Option<RawId>,
    text: Option<TextStats>,
    words: IndexCounts,
    emojis: IndexCounts,
    attachments: IndexCounts,
    reactions: IndexCounts,
    mentions: IndexCounts,
    domains: IndexCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EmojiKey {
    Custom(RawId),
    Unicode(String),
}

impl EmojiKey {
    fn of(emoji: &PEmoji) -> Self {
        match &emoji.id {
            Some(id) => EmojiKey::Custom(id.clone()),
            None => EmojiKey::Unicode(emoji.name.to_lowercase()),
        }
    }
}

/// Adds `by` to `counts[index]`, growing the vector as needed.
fn bump(counts: &mut Vec<i64>, index: usize, by: u32) {
    if counts.len() <= index {
        counts.resize(index + 1, 0);
    }
    counts[index] += i64::from(by);
}

/// Entities extracted by the enricher, with their occurrence counts.
#[derive(Debug, Default)]
struct Vocabulary {
    words: IndexedMap<String, String>,
    word_counts: Vec<i64>,
    emojis: IndexedMap<EmojiKey, PEmoji>,
    emoji_counts: Vec<i64>,
    mentions: IndexedMap<String, String>,
    mention_counts: Vec<i64>,
    domains: IndexedMap<String, String>,
    domain_counts: Vec<i64>,

    author_counts: Vec<i64>,
    language_counts: Vec<u64>,
    min_day: Option<Day>,
    max_day: Option<Day>,
}

impl Vocabulary {
    fn intern(
        &mut self,
        message: PMessage,
        enriched: EnrichedMessage,
        author_index: usize,
    ) -> IntermediateMessage {
        // timestamps were validated when the message was queued
        let (day, second_of_day) = Day::from_timestamp(message.timestamp)
            .unwrap_or((Day::new(1970, 1, 1), 0));
        self.min_day = Some(self.min_day.map_or(day, |d| d.min(day)));
        self.max_day = Some(self.max_day.map_or(day, |d| d.max(day)));
        bump(&mut self.author_counts, author_index, 1);

        let has_text = message.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        let text = has_text.then(|| {
            if let Some(lang) = enriched.lang {
                let counts = &mut self.language_counts;
                if counts.len() <= lang as usize {
                    counts.resize(lang as usize + 1, 0);
                }
                counts[lang as usize] += 1;
            }
            TextStats {
                lang_index: enriched.lang.unwrap_or(UNKNOWN_LANGUAGE),
                sentiment: enriched.sentiment.unwrap_or(0),
            }
        });

        let mut words = IndexCountsBuilder::new();
        for (word, count) in enriched.words {
            let index = self.words.set(word.clone(), word, None);
            bump(&mut self.word_counts, index, count);
            words.add(index as u32, count);
        }

        let mut emojis = IndexCountsBuilder::new();
        for (emoji, count) in enriched.emojis {
            let index = self.emojis.set(EmojiKey::of(&emoji), emoji, None);
            bump(&mut self.emoji_counts, index, count);
            emojis.add(index as u32, count);
        }

        let mut reactions = IndexCountsBuilder::new();
        for (emoji, count) in message.reactions {
            let index = self.emojis.set(EmojiKey::of(&emoji), emoji, None);
            bump(&mut self.emoji_counts, index, count);
            reactions.add(index as u32, count);
        }

        let mut mentions = IndexCountsBuilder::new();
        for (mention, count) in enriched.mentions {
            let index = self.mentions.set(mention.clone(), mention, None);
            bump(&mut self.mention_counts, index, count);
            mentions.add(index as u32, count);
        }

        let mut domains = IndexCountsBuilder::new();
        for (domain, count) in enriched.domains {
            let index = self.domains.set(domain.clone(), domain, None);
            bump(&mut self.domain_counts, index, count);
            domains.add(index as u32, count);
        }

        let mut attachments = IndexCountsBuilder::new();
        for attachment in &message.attachments {
            attachments.add(attachment.index(), 1);
        }

        IntermediateMessage {
            day: day.to_binary(),
            second_of_day,
            author_index,
            edited_after: message.timestamp_edit.and_then(|edit| {
                let Some(delta) = edit.checked_sub(message.timestamp) else {
                    warn!("Ignoring out of range edit time of message {}", message.id);
                    return None;
                };
                u32::try_from(delta / 1000).ok()
            }),
            reply_to: message.reply_to,
            text,
            words: words.build(),
            emojis: emojis.build(),
            attachments: attachments.build(),
            reactions: reactions.build(),
            mentions: mentions.build(),
            domains: domains.build(),
        }
    }
}

/// Entity and message counters, for progress reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderStats {
    pub guilds: usize,
    pub channels: usize,
    pub authors: usize,
    /// Messages accepted so far (duplicates excluded).
    pub messages: usize,
    pub calls: usize,
}

/// Accumulates events from any number of files and builds the database.
///
/// # Example
///
/// ```rust
/// use chatdb::config::BuildConfig;
/// use chatdb::parse::{EventSink, PAuthor, PChannel, PGuild, PMessage, ParseEvent, ChannelType, RawId};
/// use chatdb::process::DatabaseBuilder;
///
/// let mut builder = DatabaseBuilder::new(BuildConfig::default())?;
/// let id = RawId::Number;
/// builder.emit(ParseEvent::Guild(PGuild { id: id(1), name: "guild".into(), avatar: None }), None)?;
/// builder.emit(ParseEvent::Channel(PChannel {
///     id: id(2), guild_id: id(1), name: "chat".into(), kind: ChannelType::Text, avatar: None,
/// }), None)?;
/// builder.emit(ParseEvent::Author(PAuthor { id: id(3), name: "ann".into(), bot: false, avatar: None }), None)?;
/// builder.emit(ParseEvent::Message(PMessage {
///     id: id(4), channel_id: id(2), author_id: id(3), timestamp: 1_600_000_000_000,
///     timestamp_edit: None, reply_to: None, text: Some("hello there".into()),
///     attachments: vec![], reactions: vec![],
/// }), None)?;
/// builder.mark_eof();
///
/// let db = builder.build()?;
/// assert_eq!(db.words, vec!["hello", "there"]);
/// assert_eq!(db.time.min_date, "2020-9-13");
/// # Ok::<(), chatdb::ChatDbError>(())
/// ```
pub struct DatabaseBuilder {
    config: BuildConfig,
    enricher: Box<dyn MessageEnricher>,

    guilds: IndexedMap<RawId, PGuild>,
    channels: IndexedMap<RawId, PChannel>,
    authors: IndexedMap<RawId, PAuthor>,
    calls: IndexedMap<RawId, PCall>,

    /// Indexed like `channels`.
    channel_messages: Vec<ChannelMessages<IntermediateMessage>>,
    vocabulary: Vocabulary,
    messages_accepted: usize,
}

impl std::fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl DatabaseBuilder {
    /// Creates a builder using the [`BasicEnricher`].
    pub fn new(config: BuildConfig) -> Result<Self> {
        Ok(Self::with_enricher(config, BasicEnricher::new()?))
    }

    /// Creates a builder delegating enrichment to `enricher`.
    pub fn with_enricher(config: BuildConfig, enricher: impl MessageEnricher + 'static) -> Self {
        Self {
            config,
            enricher: Box::new(enricher),
            guilds: IndexedMap::new(),
            channels: IndexedMap::new(),
            authors: IndexedMap::new(),
            calls: IndexedMap::new(),
            channel_messages: Vec::new(),
            vocabulary: Vocabulary::default(),
            messages_accepted: 0,
        }
    }

    pub fn stats(&self) -> BuilderStats {
        BuilderStats {
            guilds: self.guilds.len(),
            channels: self.channels.len(),
            authors: self.authors.len(),
            messages: self.messages_accepted,
            calls: self.calls.len(),
        }
    }

    /// Marks the end of an input file on every channel.
    pub fn mark_eof(&mut self) {
        for cm in &mut self.channel_messages {
            cm.mark_eof();
        }
    }

    /// Enriches every pending message.
    pub fn process(&mut self) {
        let Self {
            enricher,
            authors,
            channel_messages,
            vocabulary,
            ..
        } = self;

        for cm in channel_messages.iter_mut() {
            cm.process(|group| {
                let enriched = enricher.enrich(&group);
                group
                    .into_iter()
                    .zip(enriched.into_iter().chain(std::iter::repeat_with(EnrichedMessage::default)))
                    .map(|(message, enriched)| {
                        // authors are checked when the message is queued
                        let author = authors.get_index(&message.author_id).unwrap_or_default();
                        vocabulary.intern(message, enriched, author)
                    })
                    .collect()
            });
        }
    }

    fn on_message(&mut self, message: PMessage) -> Result<()> {
        let channel = self
            .channels
            .get_index(&message.channel_id)
            .ok_or_else(|| ChatDbError::missing_reference("channel", &message.channel_id))?;
        if self.authors.get_index(&message.author_id).is_none() {
            return Err(ChatDbError::missing_reference("author", &message.author_id));
        }
        if Day::from_timestamp(message.timestamp).is_none() {
            warn!("Skipping message {} with timestamp {} out of range", message.id, message.timestamp);
            return Ok(());
        }
        let cm = &mut self.channel_messages[channel];
        if cm.open_end().is_some_and(|end| message.timestamp < end) {
            return Err(ChatDbError::out_of_order(&message.channel_id, &message.id));
        }
        if cm.add_message(message) {
            self.messages_accepted += 1;
        }
        Ok(())
    }

    fn on_call(&mut self, call: PCall) -> Result<()> {
        if self.channels.get_index(&call.channel_id).is_none() {
            return Err(ChatDbError::missing_reference("channel", &call.channel_id));
        }
        if self.authors.get_index(&call.author_id).is_none() {
            return Err(ChatDbError::missing_reference("author", &call.author_id));
        }
        if call.timestamp_end.checked_sub(call.timestamp_start).is_none() {
            warn!("Skipping call {} with out of range duration", call.id);
            return Ok(());
        }
        self.calls.set(call.id.clone(), call, None);
        Ok(())
    }

    /// Consumes the builder and produces the database.
    ///
    /// Pending messages are processed first.
    pub fn build(mut self) -> Result<Database> {
        self.mark_eof();
        self.process();

        for (channel, cm) in self.channels.values().iter().zip(&self.channel_messages) {
            if cm.num_dropped() > 0 {
                debug!("Dropped {} duplicate messages in #{}", cm.num_dropped(), channel.name);
            }
        }

        let vocabulary = &self.vocabulary;
        let (Some(min_day), Some(max_day)) = (vocabulary.min_day, vocabulary.max_day) else {
            return Err(ChatDbError::EmptyCorpus);
        };
        info!(
            "Building database: {} messages, {} channels, {} authors",
            self.messages_accepted,
            self.channels.len(),
            self.authors.len()
        );

        let mut days: Vec<u32> = self
            .channel_messages
            .iter()
            .flat_map(|cm| cm.processed_messages().map(|m| m.day))
            .collect();
        if let Some((span, bulk_start, bulk_end)) = long_span(min_day, max_day, &mut days) {
            warn!(
                "Messages span {} days from {} to {} but 98% of them fall between {} and {}; \
                 a corrupt timestamp is stretching the day table",
                span, min_day, max_day, bulk_start, bulk_end
            );
        }
        let time_keys = TimeKeys::between(min_day, max_day);

        // 1. languages
        let languages = detect_languages(&vocabulary.language_counts, self.config.min_language_share);
        let language_codes: Vec<&str> = languages
            .iter()
            .filter(|&&(index, _)| index != UNKNOWN_LANGUAGE)
            .filter_map(|&(index, _)| language_code(index))
            .collect();
        info!("Detected languages: {:?}", language_codes);

        // 2. words
        let word_counts = self.filter_words(&language_codes);

        // 3. ranks
        let mut author_counts = vocabulary.author_counts.clone();
        author_counts.resize(self.authors.len(), 0);
        let channel_counts: Vec<i64> = self
            .channel_messages
            .iter()
            .map(|cm| cm.num_messages() as i64)
            .collect();
        let mut guild_counts = vec![0i64; self.guilds.len()];
        for (channel, count) in self.channels.values().iter().zip(&channel_counts) {
            if let Some(guild) = self.guilds.get_index(&channel.guild_id) {
                guild_counts[guild] += count;
            }
        }

        let guild_ranks = rank(&guild_counts);
        let channel_ranks = rank(&channel_counts);
        let author_ranks = rank(&author_counts);
        let word_ranks = rank(&word_counts);
        let emoji_ranks = rank(&vocabulary.emoji_counts);
        let mention_ranks = rank(&vocabulary.mention_counts);
        let domain_ranks = rank(&vocabulary.domain_counts);
        info!(
            "Ranked {} words, {} emojis, {} mentions, {} domains",
            word_ranks.len(),
            emoji_ranks.len(),
            mention_ranks.len(),
            domain_ranks.len()
        );

        // 4. tables
        let guilds = remap(self.guilds.values(), &guild_ranks, |g, _| Guild {
            name: g.name.clone(),
            avatar: g.avatar.clone(),
        });
        let mut channels = remap(self.channels.values(), &channel_ranks, |c, _| Channel {
            name: c.name.clone(),
            kind: c.kind,
            guild_index: self
                .guilds
                .get_index(&c.guild_id)
                .and_then(|g| guild_ranks[g])
                .unwrap_or(0),
            avatar: c.avatar.clone(),
            msg_addr: 0,
            msg_count: 0,
            dm_author_indexes: Vec::new(),
        });
        let mut authors = remap(self.authors.values(), &author_ranks, |a, _| Author {
            name: a.name.clone(),
            bot: a.bot,
            avatar: a.avatar.clone(),
        });
        for author in authors.iter_mut().skip(MAX_AUTHOR_AVATARS) {
            author.avatar = None;
        }
        let words = remap(vocabulary.words.values(), &word_ranks, |w, _| w.clone());
        let emojis = remap(vocabulary.emojis.values(), &emoji_ranks, |e, _| Emoji {
            name: e.name.clone(),
            id: e.id.clone(),
        });
        let mentions = remap(vocabulary.mentions.values(), &mention_ranks, |m, _| m.clone());
        let domains = remap(vocabulary.domains.values(), &domain_ranks, |d, _| d.clone());

        // 5. pack
        let bit_config = BitConfig::from_cardinalities(
            time_keys.num_days(),
            authors.len(),
            words.len(),
            emojis.len(),
            mentions.len(),
            domains.len(),
        );
        let day_lookup: HashMap<u32, u32> = time_keys
            .date_keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| Day::from_key(key).map(|d| (d.to_binary(), i as u32)))
            .collect();
        let reply_window = self.config.effective_reply_window() as usize;
        let non_empty = |counts: IndexCounts| (!counts.is_empty()).then_some(counts);

        let mut stream = BitStream::new();
        let mut dropped_replies = 0usize;
        for (new_index, &old_index) in inverse(&channel_ranks).iter().enumerate() {
            stream.align_to_byte();
            let cm = &self.channel_messages[old_index];
            let channel = &mut channels[new_index];
            channel.msg_addr = stream.offset() / 8;

            let mut dm_authors = BTreeSet::new();
            for (position, msg) in cm.processed_messages().enumerate() {
                let author_index = author_ranks[msg.author_index].unwrap_or(0);
                dm_authors.insert(author_index);

                let reply_offset = msg.reply_to.as_ref().and_then(|id| {
                    let distance = cm
                        .index_of(id)
                        .and_then(|target| position.checked_sub(target))
                        .filter(|d| (1..=reply_window).contains(d));
                    if distance.is_none() {
                        dropped_replies += 1;
                    }
                    distance.map(|d| d as u32)
                });

                let message = Message {
                    day_index: day_lookup.get(&msg.day).copied().unwrap_or(0),
                    second_of_day: msg.second_of_day,
                    author_index,
                    edited_after: msg.edited_after,
                    reply_offset,
                    text: msg.text,
                    words: non_empty(remap_index_counts(&msg.words, &word_ranks)),
                    emojis: non_empty(remap_index_counts(&msg.emojis, &emoji_ranks)),
                    attachments: non_empty(msg.attachments.clone()),
                    reactions: non_empty(remap_index_counts(&msg.reactions, &emoji_ranks)),
                    mentions: non_empty(remap_index_counts(&msg.mentions, &mention_ranks)),
                    domains: non_empty(remap_index_counts(&msg.domains, &domain_ranks)),
                };
                write_message(&message, &mut stream, &bit_config);
                channel.msg_count += 1;
            }

            if channel.kind == ChannelType::Dm && !dm_authors.is_empty() {
                channel.dm_author_indexes = dm_authors.into_iter().collect();
                channel.name = channel
                    .dm_author_indexes
                    .iter()
                    .map(|&i| authors[i as usize].name.as_str())
                    .collect::<Vec<_>>()
                    .join(" & ");
            }
        }
        if dropped_replies > 0 {
            debug!("Dropped {} reply references outside of the reply window", dropped_replies);
        }
        info!("Packed messages into {} bytes", stream.byte_len());

        let mut calls: Vec<Call> = self
            .calls
            .values()
            .iter()
            .filter_map(|call| {
                let channel = self.channels.get_index(&call.channel_id)?;
                let author = self.authors.get_index(&call.author_id)?;
                Some(Call {
                    channel_index: channel_ranks[channel]?,
                    author_index: author_ranks[author]?,
                    start: call.timestamp_start,
                    duration_secs: call_duration(call.timestamp_start, call.timestamp_end),
                })
            })
            .collect();
        calls.sort_by_key(|c| c.start);

        let (authors_order, authors_bot_cutoff) = sort_authors(&authors);

        Ok(Database {
            title: build_title(&guilds, &channels),
            bit_config,
            time: TimeRange {
                min_date: min_day.date_key(),
                max_date: max_day.date_key(),
                num_days: time_keys.num_days(),
                num_months: time_keys.month_keys.len(),
                num_years: time_keys.year_keys.len(),
            },
            guilds,
            channels,
            authors,
            words,
            emojis,
            mentions,
            domains,
            calls,
            languages: languages
                .into_iter()
                .filter_map(|(index, share)| {
                    Some(LanguageShare {
                        code: language_code(index)?.to_string(),
                        share,
                    })
                })
                .collect(),
            authors_order,
            authors_bot_cutoff,
            stream,
        })
    }

    /// Word counts with filtered words set to [`FILTERED`].
    fn filter_words(&self, languages: &[&str]) -> Vec<i64> {
        let vocabulary = &self.vocabulary;
        let mut counts = vocabulary.word_counts.clone();
        counts.resize(vocabulary.words.len(), 0);

        if counts.len() > self.config.word_filter_threshold {
            let min = i64::from(self.config.min_word_count);
            for count in counts.iter_mut().filter(|c| **c < min) {
                *count = FILTERED;
            }
        }
        if let Some(stopwords) = &self.config.stopwords {
            for (count, word) in counts.iter_mut().zip(vocabulary.words.values()) {
                if stopwords.is_stopword(word, languages) {
                    *count = FILTERED;
                }
            }
        }

        let kept = counts.iter().filter(|c| **c >= 0).count();
        info!("Kept {} of {} words", kept, counts.len());
        counts
    }
}

impl EventSink for DatabaseBuilder {
    fn emit(&mut self, event: ParseEvent, at: Option<Timestamp>) -> Result<()> {
        match event {
            ParseEvent::Guild(guild) => {
                self.guilds.set(guild.id.clone(), guild, at);
            }
            ParseEvent::Channel(channel) => {
                if self.guilds.get_index(&channel.guild_id).is_none() {
                    return Err(ChatDbError::missing_reference("guild", &channel.guild_id));
                }
                let index = self.channels.set(channel.id.clone(), channel, at);
                if index == self.channel_messages.len() {
                    self.channel_messages.push(ChannelMessages::new());
                }
            }
            ParseEvent::Author(author) => {
                self.authors.set(author.id.clone(), author, at);
            }
            ParseEvent::Message(message) => self.on_message(message)?,
            ParseEvent::Call(call) => self.on_call(call)?,
            ParseEvent::OutOfOrder => {
                debug!("Out of order signal, closing every open interval");
                self.mark_eof();
            }
        }
        Ok(())
    }
}

/// Span in days, plus the range holding the middle 98% of `days`, when the
/// corpus covers more than [`LONG_SPAN_DAYS`].
///
/// `days` are [`Day::to_binary`] values and get sorted.
fn long_span(min_day: Day, max_day: Day, days: &mut [u32]) -> Option<(i64, Day, Day)> {
    let span = min_day.days_until(max_day)?;
    if span <= LONG_SPAN_DAYS {
        return None;
    }
    days.sort_unstable();
    let last = days.len().checked_sub(1)?;
    let low = days[last / 100];
    let high = days[last - last / 100];
    Some((span, Day::from_binary(low), Day::from_binary(high)))
}

fn call_duration(start: Timestamp, end: Timestamp) -> u32 {
    u32::try_from(end.saturating_sub(start).max(0) / 1000).unwrap_or(u32::MAX)
}

/// Humans first, then bots; each group keeps the activity order.
fn sort_authors(authors: &[Author]) -> (Vec<u32>, Option<usize>) {
    let humans = (0..authors.len()).filter(|&i| !authors[i].bot);
    let bots = (0..authors.len()).filter(|&i| authors[i].bot);
    let order: Vec<u32> = humans.chain(bots).map(|i| i as u32).collect();
    let cutoff = order.iter().position(|&i| authors[i as usize].bot);
    (order, cutoff)
}

fn build_title(guilds: &[Guild], channels: &[Channel]) -> String {
    if let [channel] = channels {
        return channel.name.clone();
    }
    match guilds {
        [guild] if guild.name != DIRECT_MESSAGES => guild.name.clone(),
        [_] if channels.iter().all(|c| c.kind == ChannelType::Dm) => "Direct Messages".to_string(),
        [_] if channels.iter().all(|c| c.kind == ChannelType::Group) => "Group Chats".to_string(),
        _ => "Chats".to_string(),
    }
}
