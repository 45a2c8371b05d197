//! Property-based tests for chatdb.
//!
//! These tests generate random inputs to find edge cases in the bit codec,
//! the ranking and the incremental JSON scanner.

use proptest::prelude::*;

use chatdb::parse::JsonStream;
use chatdb::process::rank::{inverse, rank};
use chatdb::serialization::{
    BitConfig, BitRead, BitStream, IndexCounts, Message, TextStats, read_index_counts,
    read_message, write_index_counts, write_message,
};

const CONFIG: BitConfig = BitConfig {
    day_bits: 12,
    author_index_bits: 9,
    word_index_bits: 14,
    emoji_index_bits: 6,
    mention_index_bits: 5,
    domain_index_bits: 4,
};

/// Sorted, unique indices below `2^bits` with positive counts.
fn arb_index_counts(bits: u32, max_len: usize) -> impl Strategy<Value = IndexCounts> {
    prop::collection::btree_map(0..(1u32 << bits), 1..20u32, 1..max_len)
        .prop_map(|map| map.into_iter().collect())
}

fn arb_list(bits: u32) -> impl Strategy<Value = Option<IndexCounts>> {
    prop::option::of(arb_index_counts(bits, 8))
}

fn arb_message() -> impl Strategy<Value = Message> {
    (
        (0..(1u32 << CONFIG.day_bits), 0..86_400u32, 0..(1u32 << CONFIG.author_index_bits)),
        (prop::option::of(any::<u32>()), prop::option::of(1..1024u32)),
        prop::option::of((any::<u8>(), any::<i8>())),
        (arb_list(CONFIG.word_index_bits), arb_list(CONFIG.emoji_index_bits), arb_list(3)),
        (
            arb_list(CONFIG.emoji_index_bits),
            arb_list(CONFIG.mention_index_bits),
            arb_list(CONFIG.domain_index_bits),
        ),
    )
        .prop_map(
            |(
                (day_index, second_of_day, author_index),
                (edited_after, reply_offset),
                text,
                (words, emojis, attachments),
                (reactions, mentions, domains),
            )| Message {
                day_index,
                second_of_day,
                author_index,
                edited_after,
                reply_offset,
                text: text.map(|(lang_index, sentiment)| TextStats { lang_index, sentiment }),
                words,
                emojis,
                attachments,
                reactions,
                mentions,
                domains,
            },
        )
}

proptest! {
    #[test]
    fn prop_bits_read_back(values in prop::collection::vec((1..=32u32, any::<u32>()), 1..64)) {
        let mut stream = BitStream::new();
        for &(bits, value) in &values {
            stream.set_bits(bits, value);
        }
        let written: u64 = values.iter().map(|&(bits, _)| u64::from(bits)).sum();
        prop_assert_eq!(stream.offset(), written);

        stream.seek(0);
        for &(bits, value) in &values {
            let masked = if bits == 32 { value } else { value & ((1 << bits) - 1) };
            prop_assert_eq!(stream.get_bits(bits), masked);
        }
    }

    #[test]
    fn prop_varint_read_back(values in prop::collection::vec(any::<u32>(), 1..32)) {
        let mut stream = BitStream::new();
        for &value in &values {
            stream.write_varint(u64::from(value), 32);
        }
        stream.seek(0);
        for &value in &values {
            prop_assert_eq!(stream.read_varint(32), u64::from(value));
        }
    }

    #[test]
    fn prop_bytes_survive(values in prop::collection::vec(any::<u32>(), 1..32), tail in 1..32u32) {
        let mut stream = BitStream::new();
        for &value in &values {
            stream.set_bits(32, value);
        }
        stream.set_bits(tail, 1);
        prop_assert_eq!(stream.as_bytes().len() % 4, 0);

        let mut copy = BitStream::from_bytes(stream.as_bytes());
        for &value in &values {
            prop_assert_eq!(copy.get_bits(32), value);
        }
        prop_assert_eq!(copy.get_bits(tail), 1);
    }

    #[test]
    fn prop_index_counts_read_back(counts in arb_index_counts(12, 40), prefix in 0..32u32) {
        let mut stream = BitStream::new();
        stream.set_bits(prefix.max(1), 0);
        write_index_counts(&counts, &mut stream, 12);
        let end = stream.offset();

        stream.seek(u64::from(prefix.max(1)));
        prop_assert_eq!(read_index_counts(&mut stream, 12), counts);
        prop_assert_eq!(stream.offset(), end);
    }

    #[test]
    fn prop_messages_read_back(messages in prop::collection::vec(arb_message(), 1..16)) {
        let mut stream = BitStream::new();
        for message in &messages {
            write_message(message, &mut stream, &CONFIG);
        }
        stream.seek(0);
        for message in &messages {
            prop_assert_eq!(&read_message(&mut stream, &CONFIG), message);
        }
    }

    #[test]
    fn prop_rank_is_descending_permutation(counts in prop::collection::vec(-1..50i64, 0..64)) {
        let ranks = rank(&counts);
        let order = inverse(&ranks);
        prop_assert_eq!(order.len(), counts.iter().filter(|&&c| c >= 0).count());
        for pair in order.windows(2) {
            prop_assert!(counts[pair[0]] > counts[pair[1]]
                || (counts[pair[0]] == counts[pair[1]] && pair[0] < pair[1]));
        }
        for (old, r) in ranks.iter().enumerate() {
            prop_assert_eq!(r.is_none(), counts[old] < 0);
        }
    }

    #[test]
    fn prop_json_chunking_is_invisible(split in 1..64usize) {
        let json = br#"{"skip": {"a": [1, "}"]}, "items": [{"k": "v\"}"}, 2, [3, {}], null]}"#;

        let collect = |chunk_size: usize| {
            let mut stream = JsonStream::new();
            stream.listen_array("items");
            let mut items = Vec::new();
            for chunk in json.chunks(chunk_size) {
                stream
                    .push(chunk, |item| {
                        items.push(item.parse::<serde_json::Value>()?);
                        Ok(())
                    })
                    .unwrap();
            }
            stream.finish().unwrap();
            items
        };

        prop_assert_eq!(collect(split), collect(json.len()));
    }
}
