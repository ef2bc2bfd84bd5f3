//! Echo protocol handler for the reactor.

use crate::runtime::buffer::Record;
use crate::runtime::connection::Connection;
use std::io::{self, Read, Write};

/// Result of servicing one readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// A record of this many bytes was written back in full.
    Echoed(usize),
    /// A record of this many bytes was taken, but part of it is still queued
    /// for a full socket. The caller should wait for writability.
    Queued(usize),
    /// Queued output finished draining; reads may resume.
    Drained,
    /// Queued output is still waiting for socket space.
    Blocked,
    /// No complete record yet; nothing written.
    Idle,
    /// Orderly end-of-stream; the caller should close the connection.
    Closed,
}

/// Reads one record per call and writes it back unchanged.
///
/// Writes never wait: whatever the socket does not take stays queued on the
/// connection, and later calls drain it before any further read.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }

    /// Service one readiness event on `conn`.
    ///
    /// Any error is a connection-level failure; the caller closes the
    /// connection.
    pub fn handle<S>(&self, conn: &mut Connection<S>) -> io::Result<Echo>
    where
        S: Read + Write,
    {
        if conn.has_output() {
            return Ok(if conn.flush()? {
                Echo::Drained
            } else {
                Echo::Blocked
            });
        }

        let record = match conn.reader_mut().read_record()? {
            Record::Line(bytes) => bytes,
            Record::Incomplete => return Ok(Echo::Idle),
            Record::Eof => return Ok(Echo::Closed),
        };

        if conn.send(&record)? {
            Ok(Echo::Echoed(record.len()))
        } else {
            Ok(Echo::Queued(record.len()))
        }
    }
}
