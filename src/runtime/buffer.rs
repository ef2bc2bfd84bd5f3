//! Per-connection buffered line reader.
//!
//! Accumulates raw bytes from a non-blocking stream and hands them out one
//! newline-terminated record at a time.
//!
//! ## Record Boundaries
//!
//! A record is, in order of precedence:
//! - the bytes up to and including the first `\n` found in the first
//!   `max_line` buffered bytes;
//! - the first `max_line` bytes, when that many are buffered without a
//!   newline (long lines are split into `max_line`-sized records);
//! - whatever is left once the peer has closed its side (a trailing partial
//!   line is still delivered).
//!
//! `has_pending` reports work the OS will not signal again, which matters
//! for edge-triggered pollers.

use bytes::{Bytes, BytesMut};
use std::io::{self, Read};

/// Outcome of a single `read_record` call.
#[derive(Debug, PartialEq, Eq)]
pub enum Record {
    /// One complete record.
    Line(Bytes),
    /// No complete record is buffered and the stream has nothing more right now.
    Incomplete,
    /// Peer closed the stream and the buffer is drained.
    Eof,
}

/// Buffered reader bound to one stream.
#[derive(Debug)]
pub struct LineReader<S> {
    stream: S,
    buf: BytesMut,
    /// Upper bound on the buffered bytes (always >= `max_line`).
    capacity: usize,
    max_line: usize,
    eof: bool,
    /// Reading stopped on a full buffer, so the OS may hold more.
    maybe_more: bool,
}

impl<S: Read> LineReader<S> {
    /// Create a reader with `capacity` bytes of buffering.
    ///
    /// `capacity` is raised to `max_line` if smaller, so a full buffer always
    /// contains at least one record.
    pub fn new(stream: S, max_line: usize, capacity: usize) -> Self {
        let max_line = max_line.max(1);
        let capacity = capacity.max(max_line);
        Self {
            stream,
            buf: BytesMut::with_capacity(capacity),
            capacity,
            max_line,
            eof: false,
            maybe_more: false,
        }
    }

    /// Yield the next record, reading from the stream only when none is
    /// already buffered. The stream must be non-blocking.
    pub fn read_record(&mut self) -> io::Result<Record> {
        if let Some(record) = self.take_record() {
            return Ok(Record::Line(record));
        }
        if self.eof {
            return Ok(Record::Eof);
        }

        self.fill()?;

        if let Some(record) = self.take_record() {
            return Ok(Record::Line(record));
        }
        if self.eof {
            Ok(Record::Eof)
        } else {
            Ok(Record::Incomplete)
        }
    }

    /// Read until the stream would block, reports end-of-stream, or the
    /// buffer is full. Edge-triggered pollers only signal new arrivals, so
    /// anything left in the socket here would otherwise go unnoticed.
    fn fill(&mut self) -> io::Result<()> {
        loop {
            let start = self.buf.len();
            if start == self.capacity {
                self.maybe_more = true;
                return Ok(());
            }

            self.buf.resize(self.capacity, 0);
            match self.stream.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    self.eof = true;
                    self.maybe_more = false;
                    return Ok(());
                }
                Ok(n) => self.buf.truncate(start + n),
                Err(e) => {
                    self.buf.truncate(start);
                    match e.kind() {
                        io::ErrorKind::Interrupted => {}
                        io::ErrorKind::WouldBlock => {
                            self.maybe_more = false;
                            return Ok(());
                        }
                        _ => return Err(e),
                    }
                }
            }
        }
    }

    fn record_len(&self) -> Option<usize> {
        let window = self.buf.len().min(self.max_line);
        if let Some(pos) = self.buf[..window].iter().position(|&b| b == b'\n') {
            return Some(pos + 1);
        }
        if self.buf.len() >= self.max_line {
            return Some(self.max_line);
        }
        if self.eof && !self.buf.is_empty() {
            return Some(self.buf.len());
        }
        None
    }

    fn take_record(&mut self) -> Option<Bytes> {
        let len = self.record_len()?;
        Some(self.buf.split_to(len).freeze())
    }

    /// Whether this reader has work the poller will not report again:
    /// a buffered record, an observed end-of-stream, or a read that stopped
    /// on a full buffer.
    pub fn has_pending(&self) -> bool {
        self.eof || self.maybe_more || self.record_len().is_some()
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Maximum record length.
    pub fn max_line(&self) -> usize {
        self.max_line
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}
