//! Decoder for DiscordChatExporter JSON exports.
//!
//! Expected layout (extra keys are ignored):
//!
//! ```json
//! {
//!   "guild": { "id": "...", "name": "...", "iconUrl": "..." },
//!   "channel": { "id": "...", "type": "GuildTextChat", "name": "..." },
//!   "exportedAt": "2022-01-01T00:00:00+00:00",
//!   "messages": [ { "id": "...", "type": "Default", ... } ]
//! }
//! ```

use log::{debug, warn};
use serde::Deserialize;

use super::{
    AttachmentType, ChannelType, Decoder, EventSink, JsonItem, JsonStream, PAuthor, PCall,
    PChannel, PEmoji, PGuild, PMessage, ParseEvent, Platform, RawId, Timestamp, parse_rfc3339,
};
use crate::error::{ChatDbError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscordGuild {
    id: String,
    name: String,
    icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscordChannel {
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscordAuthor {
    id: String,
    name: String,
    nickname: Option<String>,
    #[serde(default)]
    is_bot: bool,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscordReference {
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscordAttachment {
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct DiscordEmoji {
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct DiscordReaction {
    count: u32,
    emoji: DiscordEmoji,
}

#[derive(Debug, Deserialize)]
struct DiscordMention {
    name: String,
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscordMessage {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
    timestamp_edited: Option<String>,
    call_ended_timestamp: Option<String>,
    #[serde(default)]
    content: String,
    author: DiscordAuthor,
    reference: Option<DiscordReference>,
    #[serde(default)]
    attachments: Vec<DiscordAttachment>,
    #[serde(default)]
    stickers: Vec<serde::de::IgnoredAny>,
    #[serde(default)]
    reactions: Vec<DiscordReaction>,
    #[serde(default)]
    mentions: Vec<DiscordMention>,
}

/// Per-file state updated by the listened keys.
#[derive(Debug, Default)]
struct DiscordState {
    guild_id: Option<RawId>,
    channel_id: Option<RawId>,
    exported_at: Option<Timestamp>,
    last_timestamp: Option<Timestamp>,
}

/// Decoder for one DiscordChatExporter JSON file.
#[derive(Debug)]
pub struct DiscordDecoder {
    stream: JsonStream,
    state: DiscordState,
}

impl Default for DiscordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscordDecoder {
    pub fn new() -> Self {
        let mut stream = JsonStream::new();
        stream
            .listen_object("guild")
            .listen_object("channel")
            .listen_object("exportedAt")
            .listen_array("messages");
        Self {
            stream,
            state: DiscordState::default(),
        }
    }
}

fn channel_type(kind: &str) -> ChannelType {
    match kind {
        "DirectTextChat" => ChannelType::Dm,
        "DirectGroupTextChat" => ChannelType::Group,
        _ => ChannelType::Text,
    }
}

/// Replaces `@name` mentions by `@nickname` so the text matches what users saw.
fn resolve_mentions(content: &str, mentions: &[DiscordMention]) -> String {
    let mut content = content.to_string();
    for mention in mentions {
        if let Some(nickname) = &mention.nickname {
            let from = format!("@{}", mention.name);
            let to = format!("@{}", nickname.replace(' ', "_"));
            content = content.replace(&from, &to);
        }
    }
    content
}

impl DiscordState {
    fn on_item(&mut self, item: JsonItem<'_>, sink: &mut dyn EventSink) -> Result<()> {
        match item.key {
            "guild" => {
                let guild: DiscordGuild = item.parse()?;
                let id = RawId::from(guild.id);
                self.guild_id = Some(id.clone());
                sink.emit(
                    ParseEvent::Guild(PGuild {
                        id,
                        name: guild.name,
                        avatar: guild.icon_url,
                    }),
                    self.exported_at,
                )
            }
            "channel" => {
                let channel: DiscordChannel = item.parse()?;
                let guild_id = self
                    .guild_id
                    .clone()
                    .ok_or_else(|| ChatDbError::missing_reference("guild", "<absent>"))?;
                let id = RawId::from(channel.id);
                self.channel_id = Some(id.clone());
                sink.emit(
                    ParseEvent::Channel(PChannel {
                        id,
                        guild_id,
                        name: channel.name,
                        kind: channel_type(&channel.kind),
                        avatar: None,
                    }),
                    self.exported_at,
                )
            }
            "exportedAt" => {
                let exported_at: String = item.parse()?;
                self.exported_at = parse_rfc3339(&exported_at);
                Ok(())
            }
            "messages" => {
                let message: DiscordMessage = item.parse()?;
                self.on_message(message, sink)
            }
            _ => Ok(()),
        }
    }

    fn on_message(&mut self, message: DiscordMessage, sink: &mut dyn EventSink) -> Result<()> {
        let channel_id = self
            .channel_id
            .clone()
            .ok_or_else(|| ChatDbError::missing_reference("channel", "<absent>"))?;

        let Some(timestamp) = parse_rfc3339(&message.timestamp) else {
            warn!("Skipping Discord message {} with invalid timestamp", message.id);
            return Ok(());
        };
        if self.last_timestamp.is_some_and(|last| timestamp < last) {
            debug!("Discord message {} goes back in time", message.id);
            sink.emit(ParseEvent::OutOfOrder, None)?;
        }
        self.last_timestamp = Some(timestamp);

        let author_id = RawId::from(message.author.id);
        sink.emit(
            ParseEvent::Author(PAuthor {
                id: author_id.clone(),
                name: message.author.nickname.unwrap_or(message.author.name),
                bot: message.author.is_bot,
                avatar: message.author.avatar_url,
            }),
            Some(self.exported_at.unwrap_or(timestamp)),
        )?;

        match message.kind.as_str() {
            "Default" | "Reply" => {
                let content = resolve_mentions(&message.content, &message.mentions);

                let mut attachments: Vec<AttachmentType> = message
                    .attachments
                    .iter()
                    .map(|a| AttachmentType::from_file_name(&a.file_name))
                    .collect();
                attachments.extend(message.stickers.iter().map(|_| AttachmentType::Sticker));

                let reactions = message
                    .reactions
                    .into_iter()
                    .map(|r| {
                        let emoji = PEmoji {
                            id: r.emoji.id.filter(|id| !id.is_empty()).map(RawId::from),
                            name: r.emoji.name,
                        };
                        (emoji, r.count)
                    })
                    .collect();

                sink.emit(
                    ParseEvent::Message(PMessage {
                        id: RawId::from(message.id),
                        channel_id,
                        author_id,
                        timestamp,
                        timestamp_edit: message.timestamp_edited.as_deref().and_then(parse_rfc3339),
                        reply_to: message
                            .reference
                            .and_then(|r| r.message_id)
                            .map(RawId::from),
                        text: (!content.is_empty()).then_some(content),
                        attachments,
                        reactions,
                    }),
                    None,
                )
            }
            "Call" => {
                let timestamp_end = message
                    .call_ended_timestamp
                    .as_deref()
                    .and_then(parse_rfc3339)
                    .unwrap_or(timestamp);
                sink.emit(
                    ParseEvent::Call(PCall {
                        id: RawId::from(message.id),
                        channel_id,
                        author_id,
                        timestamp_start: timestamp,
                        timestamp_end,
                    }),
                    None,
                )
            }
            other => {
                debug!("Ignoring Discord message of type {}", other);
                Ok(())
            }
        }
    }
}

impl Decoder for DiscordDecoder {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    fn push(&mut self, chunk: &[u8], sink: &mut dyn EventSink) -> Result<()> {
        let Self { stream, state } = self;
        stream.push(chunk, |item| state.on_item(item, sink))
    }

    fn finish(&mut self, _sink: &mut dyn EventSink) -> Result<()> {
        self.stream.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "guild": {"id": "10", "name": "Rust", "iconUrl": "https://cdn/icon.png"},
        "channel": {"id": "20", "type": "GuildTextChat", "categoryId": "1", "name": "general"},
        "exportedAt": "2022-06-01T00:00:00+00:00",
        "messages": [
            {
                "id": "100", "type": "Default", "timestamp": "2022-01-01T10:00:00+00:00",
                "timestampEdited": "2022-01-01T10:05:00+00:00", "isPinned": false,
                "content": "hi @alice", "author": {"id": "1", "name": "bob", "discriminator": "0001",
                "nickname": "Bobby", "isBot": false, "avatarUrl": "https://cdn/a.png"},
                "attachments": [{"id": "5", "url": "u", "fileName": "cat.png", "fileSizeBytes": 1}],
                "stickers": [{"id": "6", "name": "wave", "format": "Png"}],
                "reactions": [{"emoji": {"id": "", "name": "😀", "isAnimated": false}, "count": 3},
                              {"emoji": {"id": "77", "name": "pepe", "isAnimated": false}, "count": 1}],
                "mentions": [{"id": "2", "name": "alice", "discriminator": "0002", "nickname": "Alice A", "isBot": false}]
            },
            {
                "id": "101", "type": "Reply", "timestamp": "2022-01-01T10:01:00+00:00",
                "content": "", "author": {"id": "2", "name": "alice", "isBot": false},
                "reference": {"messageId": "100", "channelId": "20", "guildId": "10"}
            },
            {
                "id": "102", "type": "GuildMemberJoin", "timestamp": "2022-01-01T10:02:00+00:00",
                "content": "", "author": {"id": "3", "name": "carol", "isBot": false}
            },
            {
                "id": "103", "type": "Call", "timestamp": "2022-01-01T11:00:00+00:00",
                "callEndedTimestamp": "2022-01-01T11:30:00+00:00",
                "content": "", "author": {"id": "1", "name": "bob", "isBot": false}
            }
        ],
        "messageCount": 4
    }"#;

    fn decode(chunk_size: usize) -> Result<Vec<(ParseEvent, Option<Timestamp>)>> {
        let mut decoder = DiscordDecoder::new();
        let mut events = Vec::new();
        for chunk in EXPORT.as_bytes().chunks(chunk_size) {
            decoder.push(chunk, &mut events)?;
        }
        decoder.finish(&mut events)?;
        Ok(events)
    }

    #[test]
    fn test_decode_events() {
        let events = decode(EXPORT.len()).unwrap();
        let kinds: Vec<&str> = events
            .iter()
            .map(|(e, _)| match e {
                ParseEvent::Guild(_) => "guild",
                ParseEvent::Channel(_) => "channel",
                ParseEvent::Author(_) => "author",
                ParseEvent::Message(_) => "message",
                ParseEvent::Call(_) => "call",
                ParseEvent::OutOfOrder => "ooo",
            })
            .collect();
        assert_eq!(
            kinds,
            ["guild", "channel", "author", "message", "author", "message", "author", "author", "call"]
        );

        let ParseEvent::Message(first) = &events[3].0 else {
            panic!("expected message");
        };
        assert_eq!(first.text.as_deref(), Some("hi @Alice_A"));
        assert_eq!(first.timestamp_edit, Some(first.timestamp + 5 * 60 * 1000));
        assert_eq!(first.attachments, vec![AttachmentType::Image, AttachmentType::Sticker]);
        assert_eq!(first.reactions.len(), 2);
        assert_eq!(first.reactions[0].0.id, None);
        assert_eq!(first.reactions[1].0.id, Some(RawId::from("77")));

        let ParseEvent::Message(reply) = &events[5].0 else {
            panic!("expected message");
        };
        assert_eq!(reply.text, None);
        assert_eq!(reply.reply_to, Some(RawId::from("100")));

        let ParseEvent::Call(call) = &events[8].0 else {
            panic!("expected call");
        };
        assert_eq!(call.timestamp_end - call.timestamp_start, 30 * 60 * 1000);
    }

    #[test]
    fn test_author_freshness_is_export_date() {
        let events = decode(EXPORT.len()).unwrap();
        let (ParseEvent::Author(author), at) = &events[2] else {
            panic!("expected author");
        };
        assert_eq!(author.name, "Bobby");
        assert_eq!(*at, parse_rfc3339("2022-06-01T00:00:00+00:00"));
    }

    #[test]
    fn test_chunking_does_not_matter() {
        let whole = decode(EXPORT.len()).unwrap();
        for size in [1, 5, 100] {
            assert_eq!(decode(size).unwrap(), whole);
        }
    }

    #[test]
    fn test_messages_without_channel() {
        let mut decoder = DiscordDecoder::new();
        let mut events: Vec<(ParseEvent, Option<Timestamp>)> = Vec::new();
        let err = decoder
            .push(
                br#"{"messages": [{"id": "1", "type": "Default", "timestamp": "2022-01-01T00:00:00Z",
                    "author": {"id": "1", "name": "x"}}]}"#,
                &mut events,
            )
            .unwrap_err();
        assert!(err.is_missing_reference());
    }

    #[test]
    fn test_truncated_export() {
        let mut decoder = DiscordDecoder::new();
        let mut events: Vec<(ParseEvent, Option<Timestamp>)> = Vec::new();
        decoder.push(&EXPORT.as_bytes()[..200], &mut events).unwrap();
        assert!(decoder.finish(&mut events).unwrap_err().is_structural());
    }

    #[test]
    fn test_time_going_back() {
        let export = br#"{"guild": {"id": "1", "name": "g"}, "channel": {"id": "2", "type": "GuildTextChat", "name": "c"},
            "messages": [
                {"id": "1", "type": "Default", "timestamp": "2022-03-27T02:30:00+00:00", "author": {"id": "1", "name": "x"}},
                {"id": "2", "type": "Default", "timestamp": "2022-03-27T01:45:00+00:00", "author": {"id": "1", "name": "x"}},
                {"id": "3", "type": "Default", "timestamp": "2022-03-27T02:00:00+00:00", "author": {"id": "1", "name": "x"}}
            ]}"#;
        let mut decoder = DiscordDecoder::new();
        let mut events = Vec::new();
        decoder.push(export, &mut events).unwrap();
        decoder.finish(&mut events).unwrap();

        let positions: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, (e, _))| *e == ParseEvent::OutOfOrder)
            .map(|(i, _)| i)
            .collect();
        // signalled once, before the author of the older message
        assert_eq!(positions, [4]);
        assert!(matches!(events[5].0, ParseEvent::Author(_)));
    }

    #[test]
    fn test_channel_types() {
        assert_eq!(channel_type("DirectTextChat"), ChannelType::Dm);
        assert_eq!(channel_type("DirectGroupTextChat"), ChannelType::Group);
        assert_eq!(channel_type("GuildTextChat"), ChannelType::Text);
    }
}
