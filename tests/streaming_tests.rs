//! Integration tests for incremental decoding.

use std::io::{Cursor, Write};

use chatdb::config::{BuildConfig, IngestConfig};
use chatdb::ingest::{Ingestion, Input, Step};
use chatdb::parse::{ParseEvent, Platform, Timestamp, create_decoder};
use tempfile::NamedTempFile;

/// Helper to create a Telegram export with `count` messages.
fn telegram_export(count: usize) -> String {
    let mut messages = Vec::with_capacity(count);
    for i in 0..count {
        let (sender, sender_id) = if i % 2 == 0 { ("Alice", "user1") } else { ("Bob", "user2") };
        let timestamp = 1705314600 + (i as i64 * 60);
        messages.push(format!(
            r#"    {{"id": {}, "type": "message", "date_unixtime": "{}", "from": "{}", "from_id": "{}", "text": "Message number {}"}}"#,
            i, timestamp, sender, sender_id, i
        ));
    }
    format!(
        r#"{{
  "name": "Test Chat",
  "type": "private_group",
  "id": 77,
  "messages": [
{}
  ]
}}"#,
        messages.join(",\n")
    )
}

fn discord_export(count: usize) -> String {
    let messages: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"id": "{}", "type": "Default", "timestamp": "2024-01-15T{:02}:{:02}:00+00:00",
                    "content": "line {} \"quoted\" {{braces}}", "author": {{"id": "{}", "name": "user{}"}}}}"#,
                1000 + i,
                i / 60,
                i % 60,
                i,
                i % 3,
                i % 3
            )
        })
        .collect();
    format!(
        r#"{{"guild": {{"id": "1", "name": "g"}}, "channel": {{"id": "2", "type": "GuildTextChat", "name": "c"}}, "messages": [{}]}}"#,
        messages.join(",")
    )
}

fn decode(platform: Platform, data: &[u8], chunk_size: usize) -> Vec<(ParseEvent, Option<Timestamp>)> {
    let mut decoder = create_decoder(platform);
    let mut events = Vec::new();
    for chunk in data.chunks(chunk_size) {
        decoder.push(chunk, &mut events).unwrap();
    }
    decoder.finish(&mut events).unwrap();
    events
}

fn count_messages(events: &[(ParseEvent, Option<Timestamp>)]) -> usize {
    events
        .iter()
        .filter(|(e, _)| matches!(e, ParseEvent::Message(_)))
        .count()
}

#[test]
fn test_telegram_events_do_not_depend_on_chunking() {
    let export = telegram_export(50);
    let whole = decode(Platform::Telegram, export.as_bytes(), export.len());
    assert_eq!(count_messages(&whole), 50);

    for chunk_size in [1, 2, 7, 64, 1000] {
        assert_eq!(decode(Platform::Telegram, export.as_bytes(), chunk_size), whole);
    }
}

#[test]
fn test_discord_events_do_not_depend_on_chunking() {
    let export = discord_export(120);
    let whole = decode(Platform::Discord, export.as_bytes(), export.len());
    assert_eq!(count_messages(&whole), 120);

    for chunk_size in [1, 3, 13, 256] {
        assert_eq!(decode(Platform::Discord, export.as_bytes(), chunk_size), whole);
    }
}

#[test]
fn test_multibyte_text_split_across_chunks() {
    let export = telegram_export(1).replace("Message number 0", "Привет 🎉 мир");
    let events = decode(Platform::Telegram, export.as_bytes(), 1);
    let text = events.iter().find_map(|(e, _)| match e {
        ParseEvent::Message(m) => m.text.clone(),
        _ => None,
    });
    assert_eq!(text.as_deref(), Some("Привет 🎉 мир"));
}

#[test]
fn test_streaming_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(telegram_export(1000).as_bytes()).unwrap();
    file.flush().unwrap();

    let mut ingestion = Ingestion::new(
        IngestConfig::new(Platform::Telegram).with_chunk_size(4096),
        BuildConfig::default(),
        vec![Input::path(file.path())],
    )
    .unwrap();

    let mut last_bytes = 0;
    let mut progress_steps = 0;
    for step in ingestion.by_ref() {
        if let Step::Progress(progress) = step.unwrap() {
            assert!(progress.bytes_processed > last_bytes);
            last_bytes = progress.bytes_processed;
            progress_steps += 1;
        }
    }
    assert!(progress_steps > 1);
    assert_eq!(Some(last_bytes), ingestion.progress().total_bytes);

    let db = ingestion.finish().unwrap();
    assert_eq!(db.num_messages(), 1000);
    assert_eq!(db.authors.len(), 2);
}

#[test]
fn test_streaming_from_reader_of_unknown_size() {
    let export = discord_export(10);
    let ingestion = Ingestion::new(
        IngestConfig::new(Platform::Discord).with_chunk_size(16),
        BuildConfig::default(),
        vec![Input::reader("stdin", Cursor::new(export.into_bytes()), None)],
    )
    .unwrap();
    assert_eq!(ingestion.progress().percentage(), None);

    let db = ingestion.finish().unwrap();
    assert_eq!(db.num_messages(), 10);
    assert_eq!(db.authors.len(), 3);
}

#[test]
fn test_truncated_stream_fails_at_finish() {
    let export = telegram_export(5);
    let data = &export.as_bytes()[..export.len() / 2];
    let mut decoder = create_decoder(Platform::Telegram);
    let mut events = Vec::new();
    decoder.push(data, &mut events).unwrap();
    assert!(decoder.finish(&mut events).unwrap_err().is_structural());
}
