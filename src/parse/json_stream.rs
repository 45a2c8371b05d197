//! Push-based JSON scanner for exports too big to hold in memory.
//!
//! The root must be an object. Callers register the root keys they care
//! about, either as whole values ([`JsonStream::listen_object`]) or element by
//! element ([`JsonStream::listen_array`]), then push chunks of bytes. Only the
//! bytes of a value that is being captured are buffered; everything else is
//! scanned and forgotten.
//!
//! Chunks can be split anywhere: inside strings, escapes, multi-byte UTF-8
//! sequences or numbers. Feeding the same bytes in any chunking produces the
//! same items.
//!
//! ```
//! use chatdb::parse::json_stream::JsonStream;
//!
//! let mut stream = JsonStream::new();
//! stream.listen_object("title").listen_array("items");
//!
//! let mut seen = Vec::new();
//! stream
//!     .push(br#"{"title":"hi","items":[1,2],"other":{}}"#, |item| {
//!         seen.push((item.key.to_string(), item.parse::<serde_json::Value>()?));
//!         Ok(())
//!     })
//!     .unwrap();
//! stream.finish().unwrap();
//! assert_eq!(seen.len(), 3);
//! ```

use std::collections::HashSet;

use serde::de::{DeserializeOwned, IgnoredAny};

use crate::error::{ChatDbError, Result};

const FORMAT: &str = "JSON";

/// A value captured under a listened root key.
#[derive(Debug, Clone, Copy)]
pub struct JsonItem<'a> {
    /// The root key the value belongs to.
    pub key: &'a str,
    /// Raw JSON bytes of the value.
    pub raw: &'a [u8],
    /// Whether this is one element of a listened array.
    pub from_array: bool,
}

impl JsonItem<'_> {
    /// Deserializes the captured value.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(self.raw)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the root `{`.
    Start,
    /// After `{`: a key or `}`.
    FirstKey,
    /// After `,`: a key.
    NextKey,
    /// Inside a key string.
    Key,
    /// After a key: `:`.
    Colon,
    /// Expecting the `[` of a listened array.
    ArrayStart,
    /// After `[`: an element or `]`.
    ArrayFirst,
    /// After an element: `,` or `]`.
    ArrayNext,
    /// Scanning a value.
    Value { in_array: bool },
    /// After a root value: `,` or `}`.
    AfterValue,
    /// Root object closed.
    Done,
}

#[derive(Debug, PartialEq, Eq)]
enum Scan {
    /// Whitespace before the value started.
    Skip,
    /// Byte belongs to the value, value continues.
    More,
    /// Byte belongs to the value and completes it.
    Complete,
    /// Byte terminates a literal but is not part of it.
    CompleteBefore,
}

#[inline]
fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// What the innermost open container accepts next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// After `{`: a key or `}`.
    FirstKey,
    /// After `,` in an object.
    Key,
    /// After a key.
    Colon,
    /// After `[`: a value or `]`.
    FirstValue,
    /// After `:` or `,` in an array.
    Value,
    /// After a member: `,` or the closing bracket.
    Separator,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    object: bool,
    expect: Expect,
}

/// Tracks where a single JSON value ends and checks its grammar on the way.
///
/// Literals (numbers, `true`, `false`, `null`) are buffered until their end
/// and validated at every depth.
#[derive(Debug, Default)]
struct ValueScanner {
    started: bool,
    in_string: bool,
    escaped: bool,
    in_literal: bool,
    literal: Vec<u8>,
    frames: Vec<Frame>,
}

impl ValueScanner {
    fn reset(&mut self) {
        self.started = false;
        self.in_string = false;
        self.escaped = false;
        self.in_literal = false;
        self.literal.clear();
        self.frames.clear();
    }

    fn feed(&mut self, b: u8) -> std::result::Result<Scan, &'static str> {
        if !self.started {
            if is_whitespace(b) {
                return Ok(Scan::Skip);
            }
            self.started = true;
            return self.begin_value(b);
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
                if self.frames.is_empty() {
                    return Ok(Scan::Complete);
                }
            }
            return Ok(Scan::More);
        }

        if self.in_literal {
            if !is_whitespace(b) && !matches!(b, b',' | b':' | b'"' | b'{' | b'}' | b'[' | b']') {
                self.literal.push(b);
                return Ok(Scan::More);
            }
            self.in_literal = false;
            if serde_json::from_slice::<IgnoredAny>(&self.literal).is_err() {
                return Err("invalid literal");
            }
            if self.frames.is_empty() {
                return Ok(Scan::CompleteBefore);
            }
        }

        if is_whitespace(b) {
            return Ok(Scan::More);
        }
        let Some(frame) = self.frames.last_mut() else {
            return Err("unexpected data after a value");
        };
        match (frame.expect, b) {
            (Expect::FirstKey | Expect::Key, b'"') => {
                frame.expect = Expect::Colon;
                self.in_string = true;
                Ok(Scan::More)
            }
            (Expect::FirstKey, b'}') | (Expect::FirstValue, b']') => Ok(self.close()),
            (Expect::FirstKey | Expect::Key, _) => Err("expected a key"),
            (Expect::Colon, b':') => {
                frame.expect = Expect::Value;
                Ok(Scan::More)
            }
            (Expect::Colon, _) => Err("expected ':'"),
            (Expect::FirstValue | Expect::Value, _) => {
                frame.expect = Expect::Separator;
                self.begin_value(b)
            }
            (Expect::Separator, b',') => {
                frame.expect = if frame.object { Expect::Key } else { Expect::Value };
                Ok(Scan::More)
            }
            (Expect::Separator, b'}') if frame.object => Ok(self.close()),
            (Expect::Separator, b']') if !frame.object => Ok(self.close()),
            (Expect::Separator, b'}' | b']') => Err("mismatched bracket"),
            (Expect::Separator, _) => Err("expected ',' or a closing bracket"),
        }
    }

    fn begin_value(&mut self, b: u8) -> std::result::Result<Scan, &'static str> {
        match b {
            b'{' | b'[' => self.frames.push(Frame {
                object: b == b'{',
                expect: if b == b'{' { Expect::FirstKey } else { Expect::FirstValue },
            }),
            b'"' => self.in_string = true,
            b'-' | b'0'..=b'9' | b't' | b'f' | b'n' => {
                self.in_literal = true;
                self.literal.clear();
                self.literal.push(b);
            }
            _ => return Err("expected a value"),
        }
        Ok(Scan::More)
    }

    fn close(&mut self) -> Scan {
        self.frames.pop();
        if self.frames.is_empty() { Scan::Complete } else { Scan::More }
    }
}

/// Incremental JSON scanner emitting values under listened root keys.
#[derive(Debug)]
pub struct JsonStream {
    objects: HashSet<String>,
    arrays: HashSet<String>,

    state: State,
    offset: u64,

    key_raw: Vec<u8>,
    key_escaped: bool,
    key: String,

    scanner: ValueScanner,
    capturing: bool,
    value: Vec<u8>,
}

impl Default for JsonStream {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonStream {
    pub fn new() -> Self {
        Self {
            objects: HashSet::new(),
            arrays: HashSet::new(),
            state: State::Start,
            offset: 0,
            key_raw: Vec::new(),
            key_escaped: false,
            key: String::new(),
            scanner: ValueScanner::default(),
            capturing: false,
            value: Vec::new(),
        }
    }

    /// Emits the whole value under root key `key`.
    pub fn listen_object(&mut self, key: impl Into<String>) -> &mut Self {
        self.objects.insert(key.into());
        self
    }

    /// Emits each element of the array under root key `key`.
    ///
    /// A listened key holding anything but an array is a structural error.
    pub fn listen_array(&mut self, key: impl Into<String>) -> &mut Self {
        self.arrays.insert(key.into());
        self
    }

    /// Total bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the root object has been closed.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Feeds the next chunk, calling `emit` for every completed item.
    ///
    /// Errors returned by `emit` abort the push and are propagated.
    pub fn push<F>(&mut self, chunk: &[u8], mut emit: F) -> Result<()>
    where
        F: FnMut(JsonItem<'_>) -> Result<()>,
    {
        let mut i = 0;
        while i < chunk.len() {
            if self.step(chunk[i], &mut emit)? {
                i += 1;
                self.offset += 1;
            }
        }
        Ok(())
    }

    /// Checks that the input ended right after the root object.
    pub fn finish(&self) -> Result<()> {
        if self.state == State::Done {
            Ok(())
        } else {
            Err(self.error("unexpected end of input"))
        }
    }

    fn error(&self, message: impl Into<String>) -> ChatDbError {
        ChatDbError::structural(FORMAT, message, self.offset)
    }

    /// Processes one byte. Returns `false` when the byte must be fed again.
    fn step<F>(&mut self, b: u8, emit: &mut F) -> Result<bool>
    where
        F: FnMut(JsonItem<'_>) -> Result<()>,
    {
        match self.state {
            State::Start => match b {
                b'{' => self.state = State::FirstKey,
                b if is_whitespace(b) => {}
                _ => return Err(self.error("expected '{' at top level")),
            },
            State::FirstKey | State::NextKey => match b {
                b'"' => {
                    self.key_raw.clear();
                    self.key_raw.push(b);
                    self.key_escaped = false;
                    self.state = State::Key;
                }
                b'}' if self.state == State::FirstKey => self.state = State::Done,
                b if is_whitespace(b) => {}
                _ => return Err(self.error("expected a key")),
            },
            State::Key => {
                self.key_raw.push(b);
                if self.key_escaped {
                    self.key_escaped = false;
                } else if b == b'\\' {
                    self.key_escaped = true;
                } else if b == b'"' {
                    self.key = serde_json::from_slice(&self.key_raw)
                        .map_err(|e| self.error(format!("invalid key: {e}")))?;
                    self.state = State::Colon;
                }
            }
            State::Colon => match b {
                b':' => {
                    self.scanner.reset();
                    self.value.clear();
                    if self.arrays.contains(&self.key) {
                        self.state = State::ArrayStart;
                    } else {
                        self.capturing = self.objects.contains(&self.key);
                        self.state = State::Value { in_array: false };
                    }
                }
                b if is_whitespace(b) => {}
                _ => return Err(self.error("expected ':'")),
            },
            State::ArrayStart => match b {
                b'[' => self.state = State::ArrayFirst,
                b if is_whitespace(b) => {}
                _ => return Err(self.error(format!("expected an array for \"{}\"", self.key))),
            },
            State::ArrayFirst => match b {
                b']' => self.state = State::AfterValue,
                b if is_whitespace(b) => {}
                _ => {
                    self.begin_array_item();
                    return Ok(false);
                }
            },
            State::ArrayNext => match b {
                b',' => self.begin_array_item(),
                b']' => self.state = State::AfterValue,
                b if is_whitespace(b) => {}
                _ => return Err(self.error("expected ',' or ']'")),
            },
            State::Value { in_array } => {
                let scan = self.scanner.feed(b).map_err(|msg| self.error(msg))?;
                match scan {
                    Scan::Skip => {}
                    Scan::More => self.capture(b),
                    Scan::Complete => {
                        self.capture(b);
                        self.end_value(in_array, emit)?;
                    }
                    Scan::CompleteBefore => {
                        self.end_value(in_array, emit)?;
                        return Ok(false);
                    }
                }
            }
            State::AfterValue => match b {
                b',' => self.state = State::NextKey,
                b'}' => self.state = State::Done,
                b if is_whitespace(b) => {}
                _ => return Err(self.error("expected ',' or '}'")),
            },
            State::Done => {
                if !is_whitespace(b) {
                    return Err(self.error("unexpected data after the root object"));
                }
            }
        }
        Ok(true)
    }

    fn begin_array_item(&mut self) {
        self.scanner.reset();
        self.value.clear();
        self.capturing = true;
        self.state = State::Value { in_array: true };
    }

    #[inline]
    fn capture(&mut self, b: u8) {
        if self.capturing {
            self.value.push(b);
        }
    }

    fn end_value<F>(&mut self, in_array: bool, emit: &mut F) -> Result<()>
    where
        F: FnMut(JsonItem<'_>) -> Result<()>,
    {
        if self.capturing {
            emit(JsonItem {
                key: &self.key,
                raw: &self.value,
                from_array: in_array,
            })?;
        }

        self.value.clear();
        self.scanner.reset();
        self.state = if in_array {
            State::ArrayNext
        } else {
            State::AfterValue
        };
        Ok(())
    }
}
