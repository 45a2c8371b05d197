//! Encoding of `(index, count)` lists.
//!
//! Almost every list field of a message (words, emojis, mentions...) is a
//! small multiset of dense indices. Most of them hold one or two occurrences,
//! a few hold long runs. Each list is prefixed by a 2-bit tag choosing one of
//! four layouts:
//!
//! | Tag  | Layout | When |
//! |------|--------|------|
//! | `00` | `[index]` | total == 1 |
//! | `01` | `[index, index]` | total == 2 |
//! | `10` | `[total:10, Δindex, Δindex, ...]` one entry per occurrence | cheaper than RLE |
//! | `11` | `[len:7, bits_per_count-1:5, (index, count), ...]` | otherwise |
//!
//! Headers are capped (1023 occurrences for serial, 127 pairs for RLE).
//! Lists that do not fit are truncated without error.

use super::bitstream::{BitRead, BitStream};

/// A list of `(index, count)` pairs sorted ascending by index, counts > 0.
pub type IndexCounts = Vec<(u32, u32)>;

const TAG_SINGLE: u32 = 0b00;
const TAG_DOUBLE: u32 = 0b01;
const TAG_SERIAL: u32 = 0b10;
const TAG_RLE: u32 = 0b11;

/// Largest total a serial header can hold.
pub const MAX_SERIAL_TOTAL: u32 = (1 << 10) - 1;
/// Largest number of pairs an RLE header can hold.
pub const MAX_RLE_LEN: usize = (1 << 7) - 1;

/// Number of bits needed to represent `value` (at least 1).
#[inline]
pub fn bits_for(value: u32) -> u32 {
    (32 - value.leading_zeros()).max(1)
}

/// Encoding picked for a list, exposed mostly for tests and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Single,
    Double,
    Serial,
    Rle,
}

/// Decides which strategy [`write_index_counts`] will use for `counts`.
pub fn choose_strategy(counts: &[(u32, u32)], bits_per_index: u32) -> Strategy {
    let (total, max_count) = totals(counts);
    match total {
        1 => Strategy::Single,
        2 => Strategy::Double,
        _ => {
            let real_total = total.min(u64::from(MAX_SERIAL_TOTAL));
            let real_len = counts.len().min(MAX_RLE_LEN) as u64;
            let bits_per_count = u64::from(bits_for(max_count));
            let bits_per_index = u64::from(bits_per_index);

            let serial_bits = 10 + bits_per_index * real_total;
            let rle_bits = 7 + 5 + (bits_per_index + bits_per_count) * real_len;

            if serial_bits < rle_bits {
                Strategy::Serial
            } else {
                Strategy::Rle
            }
        }
    }
}

fn totals(counts: &[(u32, u32)]) -> (u64, u32) {
    counts.iter().fold((0u64, 0u32), |(total, max), &(_, count)| {
        (total + u64::from(count), max.max(count))
    })
}

/// Writes `counts` using `bits_per_index` bits for each index.
///
/// `counts` must be sorted ascending by index and non-empty.
pub fn write_index_counts(counts: &[(u32, u32)], stream: &mut BitStream, bits_per_index: u32) {
    debug_assert!(!counts.is_empty(), "empty lists are not written");
    debug_assert!(
        counts.windows(2).all(|w| w[0].0 < w[1].0),
        "index counts must be sorted ascending"
    );

    match choose_strategy(counts, bits_per_index) {
        Strategy::Single => {
            stream.set_bits(2, TAG_SINGLE);
            stream.set_bits(bits_per_index, counts[0].0);
        }
        Strategy::Double => {
            stream.set_bits(2, TAG_DOUBLE);
            let first = counts[0].0;
            // [A, 2] is written as A twice
            let second = counts.get(1).map_or(first, |&(index, _)| index);
            stream.set_bits(bits_per_index, first);
            stream.set_bits(bits_per_index, second);
        }
        Strategy::Serial => {
            let (total, _) = totals(counts);
            let real_total = total.min(u64::from(MAX_SERIAL_TOTAL)) as u32;
            stream.set_bits(2, TAG_SERIAL);
            stream.set_bits(10, real_total);

            let mut written = 0;
            let mut last = 0;
            'outer: for &(index, count) in counts {
                for _ in 0..count {
                    if written == real_total {
                        break 'outer;
                    }
                    stream.set_bits(bits_per_index, index - last);
                    last = index;
                    written += 1;
                }
            }
        }
        Strategy::Rle => {
            let (_, max_count) = totals(counts);
            let bits_per_count = bits_for(max_count);
            let real_len = counts.len().min(MAX_RLE_LEN);
            stream.set_bits(2, TAG_RLE);
            stream.set_bits(7, real_len as u32);
            // a count width of 0 is impossible, so store it minus one
            stream.set_bits(5, bits_per_count - 1);

            for &(index, count) in &counts[..real_len] {
                stream.set_bits(bits_per_index, index);
                stream.set_bits(bits_per_count, count);
            }
        }
    }
}

/// Reads a list written by [`write_index_counts`] with the same `bits_per_index`.
pub fn read_index_counts<R: BitRead>(stream: &mut R, bits_per_index: u32) -> IndexCounts {
    let mut counts = IndexCounts::new();
    match stream.get_bits(2) {
        TAG_SINGLE => counts.push((stream.get_bits(bits_per_index), 1)),
        TAG_DOUBLE => {
            let a = stream.get_bits(bits_per_index);
            let b = stream.get_bits(bits_per_index);
            if a == b {
                counts.push((a, 2));
            } else {
                counts.push((a, 1));
                counts.push((b, 1));
            }
        }
        TAG_SERIAL => {
            let total = stream.get_bits(10);
            let mut last = 0;
            for i in 0..total {
                let diff = stream.get_bits(bits_per_index);
                match counts.last_mut() {
                    Some(entry) if diff == 0 && i > 0 => entry.1 += 1,
                    _ => {
                        last += diff;
                        counts.push((last, 1));
                    }
                }
            }
        }
        _ => {
            let len = stream.get_bits(7);
            let bits_per_count = stream.get_bits(5) + 1;
            counts.reserve(len as usize);
            for _ in 0..len {
                let index = stream.get_bits(bits_per_index);
                let count = stream.get_bits(bits_per_count);
                counts.push((index, count));
            }
        }
    }
    counts
}

/// Advances `stream` past one encoded list without decoding it.
pub fn skip_index_counts<R: BitRead>(stream: &mut R, bits_per_index: u32) {
    let bits_per_index = u64::from(bits_per_index);
    match stream.get_bits(2) {
        TAG_SINGLE => stream.skip(bits_per_index),
        TAG_DOUBLE => stream.skip(2 * bits_per_index),
        TAG_SERIAL => {
            let total = u64::from(stream.get_bits(10));
            stream.skip(bits_per_index * total);
        }
        _ => {
            let len = u64::from(stream.get_bits(7));
            let bits_per_count = u64::from(stream.get_bits(5) + 1);
            stream.skip((bits_per_index + bits_per_count) * len);
        }
    }
}

/// Accumulates occurrences and produces a sorted [`IndexCounts`].
#[derive(Debug, Default, Clone)]
pub struct IndexCountsBuilder {
    counts: std::collections::BTreeMap<u32, u32>,
}

impl IndexCountsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` occurrences of `index`.
    pub fn add(&mut self, index: u32, count: u32) {
        if count > 0 {
            *self.counts.entry(index).or_insert(0) += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns the pairs sorted ascending by index.
    pub fn build(self) -> IndexCounts {
        self.counts.into_iter().collect()
    }
}
