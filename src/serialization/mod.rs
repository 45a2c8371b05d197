//! Bit-level codec for the packed message stream.
//!
//! - [`bitstream`] - growable bit buffer and read cursors
//! - [`index_counts`] - adaptive `(index, count)` list encoding
//! - [`message`] - one message record and its [`BitConfig`]
//! - [`view`] - lazy, per-field message access

pub mod bitstream;
pub mod index_counts;
pub mod message;
pub mod view;

pub use bitstream::{BitAddress, BitRead, BitReader, BitStream};
pub use index_counts::{
    IndexCounts, IndexCountsBuilder, Strategy, bits_for, choose_strategy, read_index_counts,
    skip_index_counts, write_index_counts,
};
pub use message::{BitConfig, Message, MessageFlags, TextStats, read_message, write_message};
pub use view::{MessageView, MessageViews};
