//! Command-line interface definition using clap.
//!
//! Only compiled with the `cli` feature. The binary in `src/main.rs` turns
//! [`Args`] into an [`IngestConfig`] and a [`BuildConfig`]:
//!
//! ```rust
//! use chatdb::cli::Args;
//! use clap::Parser;
//!
//! let args = Args::parse_from(["chatdb", "discord", "general.json", "--reply-window", "64"]);
//! assert_eq!(args.build_config().unwrap().reply_window, 64);
//! ```

use std::fs;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{BuildConfig, IngestConfig};
use crate::error::Result;
use crate::parse::Platform;
use crate::process::Stopwords;

/// Build a compact, rank-indexed database from Discord or Telegram exports.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatdb")]
#[command(version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    chatdb discord general.json random.json
    chatdb tg result.json -o telegram.json
    chatdb dc dm_*.json --stopwords stopwords.json --reply-window 255")]
pub struct Args {
    /// Export platform (discord, dc, telegram, tg)
    pub platform: Platform,

    /// Export files, read in order
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Path of the database JSON to write
    #[arg(short, long, default_value = "chatdb.json")]
    pub output: PathBuf,

    /// Bytes fed to the decoder per step
    #[arg(long, value_name = "BYTES", default_value_t = IngestConfig::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// JSON file mapping language codes to stopword lists
    #[arg(long, value_name = "FILE")]
    pub stopwords: Option<PathBuf>,

    /// Maximum reply distance stored, in messages
    #[arg(long, value_name = "N")]
    pub reply_window: Option<u32>,

    /// Vocabulary size above which rare words are dropped
    #[arg(long, value_name = "N")]
    pub word_filter_threshold: Option<usize>,

    /// Hide progress and summary output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig::new(self.platform).with_chunk_size(self.chunk_size)
    }

    /// Reads the stopwords file, if any, into a [`BuildConfig`].
    pub fn build_config(&self) -> Result<BuildConfig> {
        let mut config = BuildConfig::new();
        if let Some(window) = self.reply_window {
            config = config.with_reply_window(window);
        }
        if let Some(threshold) = self.word_filter_threshold {
            config = config.with_word_filter_threshold(threshold);
        }
        if let Some(path) = &self.stopwords {
            let json = fs::read_to_string(path)?;
            config = config.with_stopwords(Stopwords::from_json_str(&json)?);
        }
        Ok(config)
    }
}
