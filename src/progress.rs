//! Ingestion progress.
//!
//! [`Ingestion::step`](crate::ingest::Ingestion::step) yields a [`Progress`]
//! after every decoded chunk inside [`Step::Progress`](crate::ingest::Step::Progress).
//! For push-style reporting hand a [`ProgressCallback`] to
//! [`Ingestion::run_with_progress`](crate::ingest::Ingestion::run_with_progress).
//!
//! ```rust
//! use chatdb::progress::{Progress, ProgressCallback};
//! use std::sync::Arc;
//!
//! let report: ProgressCallback = Arc::new(|p: &Progress| eprintln!("{p}"));
//!
//! // two files of 400 bytes, the first one done
//! let p = Progress::new(600, Some(800), 1_250).with_files(1, 2);
//! assert_eq!(p.fraction(), Some(0.75));
//! assert!(!p.is_complete());
//! report(&p);
//! ```

use std::fmt;
use std::sync::Arc;

/// Where an ingestion run stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Bytes fed to decoders, summed over files.
    pub bytes_processed: u64,
    /// Size of every input together; `None` once any size is unknown.
    pub total_bytes: Option<u64>,
    /// Messages accepted by the builder, duplicates excluded.
    pub messages: usize,
    pub files_processed: usize,
    pub total_files: usize,
}

impl Progress {
    pub fn new(bytes_processed: u64, total_bytes: Option<u64>, messages: usize) -> Self {
        Self {
            bytes_processed,
            total_bytes,
            messages,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_files(self, files_processed: usize, total_files: usize) -> Self {
        Self {
            files_processed,
            total_files,
            ..self
        }
    }

    /// Share of the input bytes already decoded, in `0.0..=1.0`.
    ///
    /// An empty input counts as fully read.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.bytes_processed as f64 / total as f64).min(1.0))
    }

    /// [`fraction`](Self::fraction) scaled to `0.0..=100.0`.
    pub fn percentage(&self) -> Option<f64> {
        self.fraction().map(|f| f * 100.0)
    }

    /// Every input file has been read to its end.
    pub fn is_complete(&self) -> bool {
        self.files_processed >= self.total_files
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] ", self.files_processed, self.total_files)?;
        match self.percentage() {
            Some(pct) => write!(f, "{:.1}%", pct)?,
            None => write!(f, "{} bytes", self.bytes_processed)?,
        }
        write!(f, ", {} messages", self.messages)
    }
}

/// Receives a snapshot after every chunk.
pub type ProgressCallback = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Ignores every snapshot.
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_: &Progress| {})
}

/// Prints every snapshot on stderr, overwriting the previous line.
pub fn stderr_progress() -> ProgressCallback {
    Arc::new(|progress: &Progress| eprint!("\r{progress}"))
}
