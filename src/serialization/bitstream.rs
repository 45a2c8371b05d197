//! Bit-addressable buffer over 32-bit words.
//!
//! Values are stored MSB first inside each word. A value either fits in the
//! word that holds its first bit, or it straddles two consecutive words:
//!
//! ```text
//!  [00000000000000000000000000000000] [00000000000000000000000000000000]
//!              ↑ offset                         ↑ offset + bits
//!              |             VALUE              |
//!  |-- delta --|------------- bits -------------|
//! ```
//!
//! Both cases are handled by loading the two words as one 64-bit window.
//!
//! Reads are not bounds checked against the written region: reading past the
//! last written bit returns zeros (or garbage if the offset was moved back and
//! forth). Writes never check that `value` fits in `bits`; extra high bits
//! are masked away.

/// Offset in bits inside a bit buffer.
///
/// 64 bits wide: big corpora go past 2^32 bits.
pub type BitAddress = u64;

const INITIAL_WORDS: usize = 1024; // 4KB

/// Masks `value` to its lowest `bits` bits.
#[inline]
fn mask(bits: u32) -> u32 {
    if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 }
}

/// Reads `bits` bits starting at `offset` from `words`.
#[inline]
fn read_bits(words: &[u32], offset: BitAddress, bits: u32) -> u32 {
    debug_assert!(bits <= 32);
    if bits == 0 {
        return 0;
    }
    let word = (offset >> 5) as usize;
    let delta = (offset & 31) as u32;
    let hi = words.get(word).copied().unwrap_or(0) as u64;
    let lo = words.get(word + 1).copied().unwrap_or(0) as u64;
    let window = (hi << 32) | lo;
    ((window >> (64 - delta - bits)) as u32) & mask(bits)
}

/// Common reading interface of [`BitStream`] and [`BitReader`].
pub trait BitRead {
    /// Reads `bits` (≤ 32) bits at the current offset and advances it.
    fn get_bits(&mut self, bits: u32) -> u32;

    /// Current offset in bits.
    fn offset(&self) -> BitAddress;

    /// Moves the offset to an arbitrary position.
    fn seek(&mut self, offset: BitAddress);

    /// Advances the offset without reading.
    fn skip(&mut self, bits: u64) {
        let offset = self.offset();
        self.seek(offset + bits);
    }

    /// Reads a variable length integer written by [`BitStream::write_varint`]
    /// with the same `max_bits`.
    fn read_varint(&mut self, max_bits: u32) -> u64 {
        if max_bits < 10 {
            return u64::from(self.get_bits(max_bits));
        }

        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.get_bits(8);
            if shift < 64 {
                value |= u64::from(byte & 0x7f) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
        }
        value
    }
}

/// A growable stream where arbitrary amounts of bits can be written and read.
///
/// # Example
///
/// ```
/// use chatdb::serialization::{BitRead, BitStream};
///
/// let mut stream = BitStream::new();
/// stream.set_bits(3, 0b101);
/// stream.set_bits(17, 86_399);
/// stream.seek(0);
/// assert_eq!(stream.get_bits(3), 0b101);
/// assert_eq!(stream.get_bits(17), 86_399);
/// ```
#[derive(Debug, Clone)]
pub struct BitStream {
    words: Vec<u32>,
    offset: BitAddress,
}

impl Default for BitStream {
    fn default() -> Self {
        Self::new()
    }
}

impl BitStream {
    /// Creates an empty stream with a 4KB buffer.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_WORDS)
    }

    /// Creates an empty stream with room for `words` 32-bit words.
    pub fn with_capacity(words: usize) -> Self {
        Self {
            words: vec![0; words.max(2)],
            offset: 0,
        }
    }

    /// Wraps bytes previously obtained from [`as_bytes`](Self::as_bytes).
    ///
    /// Trailing bytes that do not complete a word are zero padded.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut words: Vec<u32> = bytes
            .chunks(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_ne_bytes(word)
            })
            .collect();
        if words.len() < 2 {
            words.resize(2, 0);
        }
        Self { words, offset: 0 }
    }

    /// Grows the backing buffer by 1.5x until `word + 1` is addressable.
    fn grow_to(&mut self, word: usize) {
        let mut len = self.words.len();
        while word + 1 >= len {
            len += (len / 2).max(1);
        }
        self.words.resize(len, 0);
    }

    /// Writes the lowest `bits` (≤ 32) bits of `value` at the current offset
    /// and advances the offset by `bits`.
    pub fn set_bits(&mut self, bits: u32, value: u32) {
        debug_assert!(bits <= 32);
        let offset = self.offset;
        self.offset += u64::from(bits);
        if bits == 0 {
            return;
        }

        let word = (offset >> 5) as usize;
        if word + 1 >= self.words.len() {
            self.grow_to(word);
        }

        let delta = (offset & 31) as u32;
        let shift = 64 - delta - bits;
        let field = u64::from(mask(bits)) << shift;

        let window = (u64::from(self.words[word]) << 32) | u64::from(self.words[word + 1]);
        let window = (window & !field) | ((u64::from(value & mask(bits))) << shift);
        self.words[word] = (window >> 32) as u32;
        self.words[word + 1] = window as u32;
    }

    /// Writes a variable length integer.
    ///
    /// Knowing `max_bits` lets us skip the varint when it would not pay off:
    /// below 10 bits the value is written with a fixed width.
    pub fn write_varint(&mut self, mut value: u64, max_bits: u32) {
        if max_bits < 10 {
            self.set_bits(max_bits, value as u32);
            return;
        }

        while value > 127 {
            self.set_bits(8, ((value & 127) | 128) as u32);
            value >>= 7;
        }
        self.set_bits(8, value as u32);
    }

    /// Moves the offset forward to the next multiple of 8.
    pub fn align_to_byte(&mut self) {
        let rem = self.offset % 8;
        if rem != 0 {
            self.offset += 8 - rem;
            let word = (self.offset >> 5) as usize;
            if word + 1 >= self.words.len() {
                self.grow_to(word);
            }
        }
    }

    /// Number of bytes covering everything up to the current offset,
    /// rounded up to a 4-byte boundary.
    pub fn byte_len(&self) -> usize {
        (self.offset.div_ceil(32) * 4) as usize
    }

    /// The written region as bytes, rounded up to a 4-byte boundary.
    ///
    /// No copy is made; the slice borrows the word buffer. The byte order of
    /// each word is the native one, so the bytes round trip through
    /// [`from_bytes`](Self::from_bytes) on the same architecture.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words[..self.byte_len() / 4])
    }

    /// The backing words, including capacity past the current offset.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Returns a read-only cursor positioned at `offset`.
    pub fn reader_at(&self, offset: BitAddress) -> BitReader<'_> {
        BitReader::new(&self.words, offset)
    }
}

impl BitRead for BitStream {
    #[inline]
    fn get_bits(&mut self, bits: u32) -> u32 {
        let value = read_bits(&self.words, self.offset, bits);
        self.offset += u64::from(bits);
        value
    }

    fn offset(&self) -> BitAddress {
        self.offset
    }

    fn seek(&mut self, offset: BitAddress) {
        self.offset = offset;
    }
}

/// A cheap, copyable read cursor over borrowed words.
///
/// Used by lazy readers that need to seek around without owning the buffer.
#[derive(Debug, Clone, Copy)]
pub struct BitReader<'a> {
    words: &'a [u32],
    offset: BitAddress,
}

impl<'a> BitReader<'a> {
    /// Creates a cursor over `words` starting at `offset`.
    pub fn new(words: &'a [u32], offset: BitAddress) -> Self {
        Self { words, offset }
    }

    /// The underlying words.
    pub fn words(&self) -> &'a [u32] {
        self.words
    }
}

impl BitRead for BitReader<'_> {
    #[inline]
    fn get_bits(&mut self, bits: u32) -> u32 {
        let value = read_bits(self.words, self.offset, bits);
        self.offset += u64::from(bits);
        value
    }

    fn offset(&self) -> BitAddress {
        self.offset
    }

    fn seek(&mut self, offset: BitAddress) {
        self.offset = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_every_width() {
        for bits in 1..=32u32 {
            let value = 0xDEAD_BEEFu32;
            let mut stream = BitStream::new();
            stream.set_bits(bits, value);
            stream.seek(0);
            assert_eq!(stream.get_bits(bits), value & mask(bits), "bits = {}", bits);
        }
    }

    #[test]
    fn test_cross_word_boundary() {
        let mut stream = BitStream::new();
        stream.set_bits(30, 0);
        stream.set_bits(7, 0b1011011);
        stream.set_bits(32, u32::MAX);
        stream.set_bits(1, 0);
        stream.seek(30);
        assert_eq!(stream.get_bits(7), 0b1011011);
        assert_eq!(stream.get_bits(32), u32::MAX);
        assert_eq!(stream.get_bits(1), 0);
    }

    #[test]
    fn test_overwrite_keeps_neighbours() {
        let mut stream = BitStream::new();
        stream.set_bits(8, 0xFF);
        stream.set_bits(8, 0xFF);
        stream.set_bits(8, 0xFF);
        stream.seek(8);
        stream.set_bits(8, 0x00);
        stream.seek(0);
        assert_eq!(stream.get_bits(24), 0xFF00FF);
    }

    #[test]
    fn test_value_is_masked() {
        let mut stream = BitStream::new();
        stream.set_bits(4, 0xFF);
        stream.set_bits(4, 0);
        stream.seek(0);
        assert_eq!(stream.get_bits(8), 0xF0);
    }

    #[test]
    fn test_grows() {
        let mut stream = BitStream::with_capacity(2);
        for i in 0..10_000u32 {
            stream.set_bits(32, i);
        }
        assert!(stream.words().len() >= 10_000);
        stream.seek(0);
        for i in 0..10_000u32 {
            assert_eq!(stream.get_bits(32), i);
        }
    }

    #[test]
    fn test_varint_small_max_bits_is_fixed_width() {
        let mut stream = BitStream::new();
        stream.write_varint(5, 4);
        assert_eq!(stream.offset(), 4);
        stream.seek(0);
        assert_eq!(stream.read_varint(4), 5);
    }

    #[test]
    fn test_varint_wide_values() {
        let values = [0u64, 1, 127, 128, 300, 1 << 31, (1 << 35) + 7, u64::from(u32::MAX) * 3];
        let mut stream = BitStream::new();
        for v in values {
            stream.write_varint(v, 64);
        }
        stream.seek(0);
        for v in values {
            assert_eq!(stream.read_varint(64), v);
        }
    }

    #[test]
    fn test_byte_view_is_word_aligned() {
        let mut stream = BitStream::new();
        assert_eq!(stream.as_bytes().len(), 0);
        stream.set_bits(1, 1);
        assert_eq!(stream.as_bytes().len(), 4);
        stream.set_bits(31, 0);
        assert_eq!(stream.as_bytes().len(), 4);
        stream.set_bits(1, 1);
        assert_eq!(stream.as_bytes().len(), 8);
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut stream = BitStream::new();
        for i in 0..100u32 {
            stream.set_bits(13, i * 7);
        }
        let mut copy = BitStream::from_bytes(stream.as_bytes());
        for i in 0..100u32 {
            assert_eq!(copy.get_bits(13), i * 7);
        }
    }

    #[test]
    fn test_align_to_byte() {
        let mut stream = BitStream::new();
        stream.set_bits(3, 1);
        stream.align_to_byte();
        assert_eq!(stream.offset(), 8);
        stream.align_to_byte();
        assert_eq!(stream.offset(), 8);
    }

    #[test]
    fn test_reader_seeks_independently() {
        let mut stream = BitStream::new();
        stream.set_bits(10, 1000);
        stream.set_bits(10, 999);
        let mut reader = stream.reader_at(10);
        assert_eq!(reader.get_bits(10), 999);
        reader.seek(0);
        assert_eq!(reader.get_bits(10), 1000);
        assert_eq!(stream.offset(), 20);
    }

    #[test]
    fn test_offset_past_u32_bits() {
        let mut stream = BitStream::new();
        stream.set_bits(8, 0xAB);
        let mut reader = stream.reader_at((1u64 << 32) + 5);
        assert_eq!(reader.get_bits(8), 0);
        assert_eq!(reader.offset(), (1u64 << 32) + 13);
        reader.skip(1u64 << 33);
        assert_eq!(reader.offset(), (3u64 << 32) + 13);
        // a wrapped offset would land back on the written byte
        reader.seek(1u64 << 32);
        assert_eq!(reader.get_bits(8), 0);
        reader.seek(0);
        assert_eq!(reader.get_bits(8), 0xAB);
    }

    #[test]
    fn test_byte_view_borrows_words() {
        let mut stream = BitStream::new();
        stream.set_bits(32, 0x0102_0304);
        stream.set_bits(4, 0xF);
        let expected: Vec<u8> = stream.words()[..2].iter().flat_map(|w| w.to_ne_bytes()).collect();
        assert_eq!(stream.as_bytes(), expected.as_slice());
        assert_eq!(stream.as_bytes().as_ptr(), stream.words().as_ptr().cast::<u8>());
    }
}
