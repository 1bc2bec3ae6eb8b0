//! Incremental request framing.
//!
//! Bytes arrive from the socket in chunks of arbitrary size. The framer keeps
//! everything it has been given and reports a frame once the end-of-headers
//! terminator has been seen in the cumulative buffer. After that first frame it
//! can be switched into length mode to drain a fixed-size body.
//!
//! ```text
//!   Terminator ──"\r\n\r\n" found──► Disabled
//!        │                              │ expect_length(n)
//!        │                              ▼
//!        │                          Length(n) ──n bytes buffered──► Disabled
//! ```

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// End of the header block: the blank line after the last header.
pub const TERMINATOR: &[u8] = b"\r\n\r\n";

const INITIAL_CAPACITY: usize = 4096;

/// Result of feeding bytes to the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// The frame boundary has not been reached yet.
    NeedMore,
    /// A complete frame. In terminator mode this is everything before the
    /// terminator; in length mode it is exactly the requested number of bytes.
    Complete(Bytes),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("header block exceeds {limit} bytes without a terminator")]
    TooLarge { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Searching for [`TERMINATOR`]. `scanned` is where the next search starts.
    Terminator { scanned: usize },
    /// Waiting until this many bytes are buffered.
    Length(usize),
    /// Never completes; bytes are only collected.
    Disabled,
}

/// Buffers inbound bytes for one connection until a frame boundary is seen.
#[derive(Debug)]
pub struct RequestFramer {
    buffer: BytesMut,
    mode: Mode,
    limit: Option<usize>,
}

impl RequestFramer {
    /// A framer looking for the header terminator with no size limit.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            mode: Mode::Terminator { scanned: 0 },
            limit: None,
        }
    }

    /// A framer that fails once `limit` bytes have been buffered without
    /// finding the terminator.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Appends `chunk` and checks whether the current frame is complete.
    ///
    /// The terminator may be split across any number of calls: the search
    /// resumes a few bytes before the end of what was already scanned, so a
    /// boundary straddling two chunks is still found.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Framing, FramingError> {
        self.buffer.extend_from_slice(chunk);

        match self.mode {
            Mode::Terminator { scanned } => self.scan_for_terminator(scanned),
            Mode::Length(n) if self.buffer.len() >= n => {
                self.mode = Mode::Disabled;
                Ok(Framing::Complete(self.buffer.split_to(n).freeze()))
            }
            Mode::Length(_) | Mode::Disabled => Ok(Framing::NeedMore),
        }
    }

    fn scan_for_terminator(&mut self, scanned: usize) -> Result<Framing, FramingError> {
        let found = self.buffer[scanned..]
            .windows(TERMINATOR.len())
            .position(|w| w == TERMINATOR)
            .map(|pos| scanned + pos);

        match found {
            Some(end) => {
                if let Some(limit) = self.limit.filter(|&limit| end > limit) {
                    return Err(FramingError::TooLarge { limit });
                }
                let frame = self.buffer.split_to(end).freeze();
                self.buffer.advance(TERMINATOR.len());
                self.mode = Mode::Disabled;
                Ok(Framing::Complete(frame))
            }
            None => {
                if let Some(limit) = self.limit.filter(|&limit| self.buffer.len() > limit) {
                    return Err(FramingError::TooLarge { limit });
                }
                let resume = self.buffer.len().saturating_sub(TERMINATOR.len() - 1);
                self.mode = Mode::Terminator { scanned: resume };
                Ok(Framing::NeedMore)
            }
        }
    }

    /// Switches to length mode. Bytes already buffered past the terminator
    /// count toward `n`, so this may complete immediately; callers should
    /// follow it with `push(&[])`.
    pub fn expect_length(&mut self, n: usize) {
        self.mode = Mode::Length(n);
    }

    /// Stops looking for any boundary. Later pushes only accumulate bytes.
    pub fn clear_terminator(&mut self) {
        self.mode = Mode::Disabled;
    }

    /// Whether the framer is still searching for the header terminator.
    pub fn awaiting_terminator(&self) -> bool {
        matches!(self.mode, Mode::Terminator { .. })
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Removes and returns everything currently buffered.
    pub fn take_buffered(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}

impl Default for RequestFramer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_on_single_chunk() {
        let mut framer = RequestFramer::new();
        let out = framer.push(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(out, Framing::Complete(Bytes::from_static(b"GET / HTTP/1.1")));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn never_retriggers_after_completion() {
        let mut framer = RequestFramer::new();
        framer.push(b"A\r\n\r\n").unwrap();
        assert_eq!(framer.push(b"B\r\n\r\n").unwrap(), Framing::NeedMore);
        assert_eq!(framer.buffered(), 5);
    }

    #[test]
    fn keeps_bytes_after_terminator_for_body() {
        let mut framer = RequestFramer::new();
        framer.push(b"POST / HTTP/1.1\r\n\r\nhel").unwrap();
        framer.expect_length(5);
        assert_eq!(framer.push(&[]).unwrap(), Framing::NeedMore);
        assert_eq!(
            framer.push(b"lo!").unwrap(),
            Framing::Complete(Bytes::from_static(b"hello"))
        );
        assert_eq!(framer.take_buffered(), Bytes::from_static(b"!"));
    }

    #[test]
    fn limit_applies_before_terminator() {
        let mut framer = RequestFramer::with_limit(8);
        assert_eq!(framer.push(b"GET / HT").unwrap(), Framing::NeedMore);
        assert_eq!(
            framer.push(b"TP/1.1").unwrap_err(),
            FramingError::TooLarge { limit: 8 }
        );
    }
}
