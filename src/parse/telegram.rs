//! Decoder for Telegram Desktop JSON exports (single chat).
//!
//! ```json
//! {
//!   "name": "Chat name",
//!   "type": "private_group",
//!   "id": 123456,
//!   "messages": [ { "id": 1, "type": "message", "date_unixtime": "1609495200", ... } ]
//! }
//! ```
//!
//! Telegram has no guilds: every chat is placed in one synthetic guild.

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;

use super::{
    AttachmentType, ChannelType, Decoder, EventSink, JsonItem, JsonStream, PAuthor, PCall,
    PChannel, PGuild, PMessage, ParseEvent, Platform, RawId, Timestamp, parse_naive,
};
use crate::error::{ChatDbError, Result};

/// Id of the synthetic guild holding every Telegram chat.
pub const TELEGRAM_GUILD_ID: u64 = 0;

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    date: Option<String>,
    date_unixtime: Option<String>,
    edited_unixtime: Option<String>,
    from: Option<String>,
    from_id: Option<Value>,
    actor: Option<String>,
    actor_id: Option<Value>,
    action: Option<String>,
    duration_seconds: Option<i64>,
    reply_to_message_id: Option<i64>,
    #[serde(default)]
    text: Value,
    media_type: Option<String>,
    mime_type: Option<String>,
    photo: Option<String>,
    file: Option<String>,
}

/// Extracts the text of a message.
///
/// The `text` field is either a plain string or an array mixing strings and
/// `{"type": "link", "text": "..."}` entities.
pub fn extract_telegram_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect(),
        _ => String::new(),
    }
}

/// `from_id` is `"user123"` in recent exports and a number in old ones.
fn raw_id(value: &Value) -> Option<RawId> {
    match value {
        Value::String(s) => Some(RawId::from(s.as_str())),
        Value::Number(n) => n.as_u64().map(RawId::Number),
        _ => None,
    }
}

/// Seconds since the epoch as a string, in milliseconds.
fn unixtime(value: Option<&str>) -> Option<Timestamp> {
    value?.parse::<i64>().ok()?.checked_mul(1000)
}

fn channel_type(kind: &str) -> ChannelType {
    match kind {
        "personal_chat" | "bot_chat" | "saved_messages" => ChannelType::Dm,
        "private_group" | "private_supergroup" | "public_supergroup" => ChannelType::Group,
        _ => ChannelType::Text,
    }
}

impl TelegramMessage {
    fn timestamp(&self) -> Option<Timestamp> {
        unixtime(self.date_unixtime.as_deref()).or_else(|| self.date.as_deref().and_then(parse_naive))
    }

    fn attachments(&self) -> Vec<AttachmentType> {
        let kind = match self.media_type.as_deref() {
            Some("sticker") => Some(AttachmentType::Sticker),
            Some("animation") => Some(AttachmentType::ImageAnimated),
            Some("video_file" | "video_message") => Some(AttachmentType::Video),
            Some("voice_message" | "audio_file") => Some(AttachmentType::Audio),
            Some(_) => Some(
                self.mime_type
                    .as_deref()
                    .map_or(AttachmentType::Other, AttachmentType::from_mime_type),
            ),
            None if self.photo.is_some() => Some(AttachmentType::Image),
            None => self.file.as_deref().map(|file| {
                self.mime_type
                    .as_deref()
                    .map_or_else(|| AttachmentType::from_file_name(file), AttachmentType::from_mime_type)
            }),
        };
        kind.into_iter().collect()
    }
}

#[derive(Debug, Default)]
struct TelegramState {
    name: Option<String>,
    kind: Option<ChannelType>,
    channel_id: Option<RawId>,
    guild_emitted: bool,
    last_timestamp: Option<Timestamp>,
}

/// Decoder for one Telegram Desktop JSON file.
#[derive(Debug)]
pub struct TelegramDecoder {
    stream: JsonStream,
    state: TelegramState,
}

impl Default for TelegramDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramDecoder {
    pub fn new() -> Self {
        let mut stream = JsonStream::new();
        stream
            .listen_object("name")
            .listen_object("type")
            .listen_object("id")
            .listen_array("messages");
        Self {
            stream,
            state: TelegramState::default(),
        }
    }
}

impl TelegramState {
    fn ensure_guild(&mut self, sink: &mut dyn EventSink) -> Result<()> {
        if !self.guild_emitted {
            self.guild_emitted = true;
            sink.emit(
                ParseEvent::Guild(PGuild {
                    id: RawId::Number(TELEGRAM_GUILD_ID),
                    name: "Telegram Chats".to_string(),
                    avatar: None,
                }),
                None,
            )?;
        }
        Ok(())
    }

    fn on_item(&mut self, item: JsonItem<'_>, sink: &mut dyn EventSink) -> Result<()> {
        match item.key {
            "name" => {
                self.name = item.parse::<Option<String>>()?;
                Ok(())
            }
            "type" => {
                let kind: String = item.parse()?;
                self.kind = Some(channel_type(&kind));
                Ok(())
            }
            "id" => {
                let value: Value = item.parse()?;
                let id = raw_id(&value).ok_or_else(|| {
                    ChatDbError::structural("Telegram", "chat id must be a number or a string", 0)
                })?;
                self.ensure_guild(sink)?;
                self.channel_id = Some(id.clone());
                sink.emit(
                    ParseEvent::Channel(PChannel {
                        id,
                        guild_id: RawId::Number(TELEGRAM_GUILD_ID),
                        name: self.name.clone().unwrap_or_else(|| "Saved Messages".to_string()),
                        kind: self.kind.unwrap_or(ChannelType::Group),
                        avatar: None,
                    }),
                    None,
                )
            }
            "messages" => {
                let message: TelegramMessage = item.parse()?;
                self.on_message(message, sink)
            }
            _ => Ok(()),
        }
    }

    fn on_message(&mut self, message: TelegramMessage, sink: &mut dyn EventSink) -> Result<()> {
        let channel_id = self
            .channel_id
            .clone()
            .ok_or_else(|| ChatDbError::missing_reference("channel", "<absent>"))?;

        let Some(timestamp) = message.timestamp() else {
            warn!("Skipping Telegram message {} without a usable date", message.id);
            return Ok(());
        };

        // exports written across a DST change can go back in time
        if self.last_timestamp.is_some_and(|last| timestamp < last) {
            sink.emit(ParseEvent::OutOfOrder, None)?;
        }
        self.last_timestamp = Some(timestamp);

        let (name, id) = match message.kind.as_str() {
            "service" => (message.actor.as_ref(), message.actor_id.as_ref()),
            _ => (message.from.as_ref(), message.from_id.as_ref()),
        };
        let (Some(name), Some(author_id)) = (name, id.and_then(raw_id)) else {
            debug!("Skipping Telegram message {} without author", message.id);
            return Ok(());
        };

        sink.emit(
            ParseEvent::Author(PAuthor {
                id: author_id.clone(),
                name: name.clone(),
                bot: false,
                avatar: None,
            }),
            Some(timestamp),
        )?;

        let id = RawId::from(message.id.to_string());
        match message.kind.as_str() {
            "message" => {
                let text = extract_telegram_text(&message.text);
                let timestamp_edit = unixtime(message.edited_unixtime.as_deref());
                if timestamp_edit.is_none() && message.edited_unixtime.is_some() {
                    warn!("Ignoring invalid edit date of Telegram message {}", message.id);
                }
                sink.emit(
                    ParseEvent::Message(PMessage {
                        id,
                        channel_id,
                        author_id,
                        timestamp,
                        timestamp_edit,
                        reply_to: message.reply_to_message_id.map(|r| RawId::from(r.to_string())),
                        text: (!text.is_empty()).then_some(text),
                        attachments: message.attachments(),
                        reactions: Vec::new(),
                    }),
                    None,
                )
            }
            "service" if matches!(message.action.as_deref(), Some("phone_call" | "group_call")) => {
                let duration = message.duration_seconds.unwrap_or(0).max(0);
                let Some(timestamp_end) = duration
                    .checked_mul(1000)
                    .and_then(|ms| timestamp.checked_add(ms))
                else {
                    warn!("Skipping Telegram call {} with out of range duration", message.id);
                    return Ok(());
                };
                sink.emit(
                    ParseEvent::Call(PCall {
                        id,
                        channel_id,
                        author_id,
                        timestamp_start: timestamp,
                        timestamp_end,
                    }),
                    None,
                )
            }
            _ => Ok(()),
        }
    }
}

impl Decoder for TelegramDecoder {
    fn platform(&self) -> Platform {
        Platform::Telegram
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
    use serde_json::json;

    const EXPORT: &str = r#"{
        "name": "Friends",
        "type": "private_supergroup",
        "id": 4242,
        "messages": [
            {"id": 1, "type": "message", "date": "2021-01-01T10:00:00", "date_unixtime": "1609495200",
             "from": "Alice", "from_id": "user1", "text": "Hello there"},
            {"id": 2, "type": "message", "date": "2021-01-01T10:01:00", "date_unixtime": "1609495260",
             "edited": "2021-01-01T10:02:00", "edited_unixtime": "1609495320",
             "from": "Bob", "from_id": "user2", "reply_to_message_id": 1,
             "text": ["see ", {"type": "link", "text": "https://example.com"}]},
            {"id": 3, "type": "service", "date_unixtime": "1609495300", "actor": "Bob",
             "actor_id": "user2", "action": "phone_call", "duration_seconds": 60, "text": ""},
            {"id": 4, "type": "message", "date_unixtime": "1609495000",
             "from": "Alice", "from_id": "user1", "text": "", "photo": "photos/1.jpg"},
            {"id": 5, "type": "message", "date_unixtime": "1609495400",
             "from": null, "from_id": "user9", "text": "ghost"}
        ]
    }"#;

    fn decode() -> Vec<(ParseEvent, Option<Timestamp>)> {
        let mut decoder = TelegramDecoder::new();
        let mut events = Vec::new();
        decoder.push(EXPORT.as_bytes(), &mut events).unwrap();
        decoder.finish(&mut events).unwrap();
        events
    }

    #[test]
    fn test_channel_and_guild() {
        let events = decode();
        assert!(matches!(&events[0].0, ParseEvent::Guild(g) if g.id == RawId::Number(0)));
        let ParseEvent::Channel(channel) = &events[1].0 else {
            panic!("expected channel");
        };
        assert_eq!(channel.id, RawId::Number(4242));
        assert_eq!(channel.name, "Friends");
        assert_eq!(channel.kind, ChannelType::Group);
    }

    #[test]
    fn test_messages() {
        let messages: Vec<PMessage> = decode()
            .into_iter()
            .filter_map(|(e, _)| match e {
                ParseEvent::Message(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 3);

        assert_eq!(messages[0].text.as_deref(), Some("Hello there"));
        assert_eq!(messages[0].timestamp, 1_609_495_200_000);
        assert_eq!(messages[0].author_id, RawId::from("user1"));

        assert_eq!(messages[1].text.as_deref(), Some("see https://example.com"));
        assert_eq!(messages[1].reply_to, Some(RawId::from("1")));
        assert_eq!(messages[1].timestamp_edit, Some(1_609_495_320_000));

        assert_eq!(messages[2].text, None);
        assert_eq!(messages[2].attachments, vec![AttachmentType::Image]);
    }

    #[test]
    fn test_call_and_out_of_order() {
        let events = decode();
        let call = events
            .iter()
            .find_map(|(e, _)| match e {
                ParseEvent::Call(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.timestamp_end - call.timestamp_start, 60_000);
        assert_eq!(call.author_id, RawId::from("user2"));

        // message 4 goes back in time
        assert_eq!(
            events.iter().filter(|(e, _)| *e == ParseEvent::OutOfOrder).count(),
            1
        );
    }

    #[test]
    fn test_overflowing_unixtimes_are_skipped() {
        let export = br#"{"name": "Huge", "type": "personal_chat", "id": 1, "messages": [
            {"id": 1, "type": "message", "date_unixtime": "99999999999999999",
             "from": "Alice", "from_id": "user1", "text": "lost"},
            {"id": 2, "type": "message", "date_unixtime": "1609495200",
             "edited_unixtime": "99999999999999999",
             "from": "Alice", "from_id": "user1", "text": "kept"},
            {"id": 3, "type": "service", "date_unixtime": "1609495300", "actor": "Alice",
             "actor_id": "user1", "action": "phone_call", "duration_seconds": 9223372036854775807}
        ]}"#;
        let mut decoder = TelegramDecoder::new();
        let mut events = Vec::new();
        decoder.push(export, &mut events).unwrap();
        decoder.finish(&mut events).unwrap();

        let messages: Vec<&PMessage> = events
            .iter()
            .filter_map(|(e, _)| match e {
                ParseEvent::Message(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text.as_deref(), Some("kept"));
        assert_eq!(messages[0].timestamp_edit, None);
        assert!(!events.iter().any(|(e, _)| matches!(e, ParseEvent::Call(_))));
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(extract_telegram_text(&json!("plain")), "plain");
        assert_eq!(
            extract_telegram_text(&json!(["a ", {"type": "bold", "text": "b"}, 3])),
            "a b"
        );
        assert_eq!(extract_telegram_text(&json!(null)), "");
    }

    #[test]
    fn test_numeric_from_id() {
        assert_eq!(raw_id(&json!(12)), Some(RawId::Number(12)));
        assert_eq!(raw_id(&json!("user12")), Some(RawId::from("user12")));
        assert_eq!(raw_id(&json!(null)), None);
    }
}
