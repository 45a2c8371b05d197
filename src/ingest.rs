//! Resumable, chunk-by-chunk ingestion of export files.
//!
//! [`Ingestion`] is a state machine: every call to [`Ingestion::step`] does a
//! bounded amount of work (open a file, feed one chunk, close a file) and
//! reports what happened as a [`Step`]. The caller owns the loop, so it can
//! report progress or stop between any two steps; cancelling is simply not
//! calling `step` again.
//!
//! Files are read one after the other with a fresh decoder each. Every file
//! boundary is an EOF mark for the merge engine, so files may cover any time
//! span in any order.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatdb::config::{BuildConfig, IngestConfig};
//! use chatdb::ingest::{Ingestion, Input, Step};
//! use chatdb::parse::Platform;
//!
//! let mut ingestion = Ingestion::new(
//!     IngestConfig::new(Platform::Discord),
//!     BuildConfig::default(),
//!     vec![Input::path("general.json"), Input::path("random.json")],
//! )?;
//!
//! loop {
//!     match ingestion.step()? {
//!         Step::Progress(p) => println!("{:?}%", p.percentage()),
//!         Step::Finished => break,
//!         _ => {}
//!     }
//! }
//! let db = ingestion.finish()?;
//! println!("{} messages", db.num_messages());
//! # Ok::<(), chatdb::ChatDbError>(())
//! ```

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::PathBuf;

use log::info;

use crate::Database;
use crate::config::{BuildConfig, IngestConfig};
use crate::error::Result;
use crate::parse::{Decoder, create_decoder};
use crate::process::{DatabaseBuilder, MessageEnricher};
use crate::progress::{Progress, ProgressCallback};

enum Source {
    Path(PathBuf),
    Reader(Box<dyn Read>),
}

/// One export file.
pub struct Input {
    name: String,
    size: Option<u64>,
    source: Source,
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Input")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Input {
    /// A file on disk, opened when its turn comes.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            size: fs::metadata(&path).ok().map(|m| m.len()),
            source: Source::Path(path),
        }
    }

    /// Any byte source, e.g. an in-memory buffer or a network stream.
    pub fn reader(name: impl Into<String>, reader: impl Read + 'static, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size,
            source: Source::Reader(Box::new(reader)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    fn open(self) -> io::Result<Box<dyn Read>> {
        match self.source {
            Source::Path(path) => Ok(Box::new(File::open(path)?)),
            Source::Reader(reader) => Ok(reader),
        }
    }
}

/// Outcome of one [`Ingestion::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A file was opened.
    FileStarted { index: usize, name: String },
    /// A chunk was decoded.
    Progress(Progress),
    /// A file was fully read.
    FileDone { index: usize },
    /// Every file was read; call [`Ingestion::finish`].
    Finished,
}

struct OpenFile {
    index: usize,
    reader: Box<dyn Read>,
    decoder: Box<dyn Decoder>,
}

enum State {
    /// Waiting to open the next file.
    Idle,
    Reading(OpenFile),
    Finished,
}

/// Drives the decoders over a list of inputs into a [`DatabaseBuilder`].
pub struct Ingestion {
    config: IngestConfig,
    builder: DatabaseBuilder,
    /// Inputs not opened yet, in reverse order.
    pending: Vec<Input>,
    total_files: usize,
    total_bytes: Option<u64>,
    bytes_processed: u64,
    files_processed: usize,
    buffer: Vec<u8>,
    state: State,
}

impl Ingestion {
    /// Prepares an ingestion with the default enricher.
    pub fn new(config: IngestConfig, build: BuildConfig, inputs: Vec<Input>) -> Result<Self> {
        Ok(Self::with_builder(config, DatabaseBuilder::new(build)?, inputs))
    }

    /// Prepares an ingestion enriching messages with `enricher`.
    pub fn with_enricher(
        config: IngestConfig,
        build: BuildConfig,
        enricher: impl MessageEnricher + 'static,
        inputs: Vec<Input>,
    ) -> Self {
        Self::with_builder(config, DatabaseBuilder::with_enricher(build, enricher), inputs)
    }

    fn with_builder(config: IngestConfig, builder: DatabaseBuilder, mut inputs: Vec<Input>) -> Self {
        let total_bytes = inputs.iter().map(Input::size).sum::<Option<u64>>();
        let total_files = inputs.len();
        inputs.reverse();
        Self {
            buffer: vec![0; config.chunk_size.max(1)],
            config,
            builder,
            pending: inputs,
            total_files,
            total_bytes,
            bytes_processed: 0,
            files_processed: 0,
            state: State::Idle,
        }
    }

    /// Current progress.
    pub fn progress(&self) -> Progress {
        Progress::new(self.bytes_processed, self.total_bytes, self.builder.stats().messages)
            .with_files(self.files_processed, self.total_files)
    }

    pub fn builder(&self) -> &DatabaseBuilder {
        &self.builder
    }

    /// Does the next unit of work.
    ///
    /// Once [`Step::Finished`] is returned, further calls keep returning it.
    /// Errors are fatal: the builder holds partial counts of the failing file
    /// and the ingestion must be discarded.
    pub fn step(&mut self) -> Result<Step> {
        let file = match &mut self.state {
            State::Finished => return Ok(Step::Finished),
            State::Idle => return self.open_next(),
            State::Reading(file) => file,
        };

        let read = fill(&mut file.reader, &mut self.buffer)?;
        if read == 0 {
            file.decoder.finish(&mut self.builder)?;
            let index = file.index;
            self.builder.mark_eof();
            self.builder.process();
            self.files_processed += 1;
            self.state = State::Idle;
            info!("Finished file {}/{}", index + 1, self.total_files);
            return Ok(Step::FileDone { index });
        }

        file.decoder.push(&self.buffer[..read], &mut self.builder)?;
        self.builder.process();
        self.bytes_processed += read as u64;
        Ok(Step::Progress(self.progress()))
    }

    fn open_next(&mut self) -> Result<Step> {
        let Some(input) = self.pending.pop() else {
            self.state = State::Finished;
            return Ok(Step::Finished);
        };
        let index = self.total_files - self.pending.len() - 1;
        let name = input.name.clone();
        info!("Reading {} as {}", name, self.config.platform);

        self.state = State::Reading(OpenFile {
            index,
            reader: input.open()?,
            decoder: create_decoder(self.config.platform),
        });
        Ok(Step::FileStarted { index, name })
    }

    /// Runs the remaining steps and builds the database.
    pub fn finish(self) -> Result<Database> {
        self.run_with_progress(&crate::progress::no_progress())
    }

    /// Like [`finish`](Self::finish), calling `callback` after every chunk.
    pub fn run_with_progress(mut self, callback: &ProgressCallback) -> Result<Database> {
        loop {
            match self.step()? {
                Step::Progress(progress) => callback(&progress),
                Step::Finished => break,
                Step::FileStarted { .. } | Step::FileDone { .. } => {}
            }
        }
        self.builder.build()
    }
}

impl Iterator for Ingestion {
    type Item = Result<Step>;

    /// Yields steps until [`Step::Finished`] (not included) or an error.
    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Step::Finished) => None,
            Err(e) => {
                self.state = State::Finished;
                Some(Err(e))
            }
            step => Some(step),
        }
    }
}

/// Reads until `buffer` is full or the reader is exhausted.
fn fill(reader: &mut dyn Read, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
