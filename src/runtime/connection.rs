//! Fixed-capacity connection pool.
//!
//! Slots are handed out lowest-index first and never move while occupied, so
//! an ascending scan services older connections before newer ones. The pool
//! is also the sole owner of the interest set: every add or remove updates
//! the slot table, the interest set and the poller together.
//!
//! A connection whose echo did not fit in the socket keeps the rest in its
//! output buffer and is watched for writability until it drains. It is not
//! read from in the meantime.

use crate::runtime::buffer::LineReader;
use crate::runtime::poller::{InterestSet, Poller, ReadySet};
use bytes::{Buf, BytesMut};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

/// Sizing for the pool and each connection's reader.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Maximum number of concurrent connections.
    pub capacity: usize,
    /// Maximum record length, newline included.
    pub max_line: usize,
    /// Per-connection read buffer size.
    pub buffer_size: usize,
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    fd: RawFd,
    reader: LineReader<S>,
    /// Echoed bytes the socket has not accepted yet.
    output: BytesMut,
    /// Registered for writability rather than reads.
    writable: bool,
}

impl<S> Connection<S> {
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn reader_mut(&mut self) -> &mut LineReader<S> {
        &mut self.reader
    }

    /// Whether echoed bytes are still waiting for socket space.
    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    /// Bytes waiting for socket space.
    pub fn queued(&self) -> usize {
        self.output.len()
    }
}

impl<S: Read> Connection<S> {
    /// Readable work the poller will not report again. Reads are paused
    /// while output is queued, so such a connection never counts.
    fn has_pending(&self) -> bool {
        self.output.is_empty() && self.reader.has_pending()
    }
}

impl<S: Read + Write> Connection<S> {
    /// Write `data` without blocking and queue whatever the socket does not
    /// take. Returns `true` when nothing is left queued.
    ///
    /// Only called with an empty queue, so bytes never go out of order.
    pub fn send(&mut self, data: &[u8]) -> io::Result<bool> {
        debug_assert!(self.output.is_empty());
        let written = write_nonblocking(self.reader.get_mut(), data)?;
        self.output.extend_from_slice(&data[written..]);
        Ok(self.output.is_empty())
    }

    /// Write as much queued output as the socket takes. Returns `true` once
    /// the queue is empty.
    pub fn flush(&mut self) -> io::Result<bool> {
        let written = write_nonblocking(self.reader.get_mut(), &self.output)?;
        self.output.advance(written);
        Ok(self.output.is_empty())
    }
}

/// Write until `buf` is exhausted or the stream would block. Returns the
/// number of bytes written.
fn write_nonblocking<W: Write>(stream: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        match stream.write(&buf[written..]) {
            Ok(0) => {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
            }
            Ok(n) => written += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

/// Pool errors
#[derive(Debug)]
pub enum PoolError {
    /// Every slot is occupied.
    Exhausted { capacity: usize },
    /// The poller refused to watch the descriptor.
    Register(io::Error),
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::Exhausted { capacity } => {
                write!(f, "connection pool exhausted ({capacity} slots in use)")
            }
            PoolError::Register(e) => write!(f, "failed to register connection: {e}"),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::Register(e) => Some(e),
            PoolError::Exhausted { .. } => None,
        }
    }
}

/// Registry of active connections plus the interest set watching them.
pub struct ConnectionPool<S, P> {
    settings: PoolSettings,
    listener_fd: RawFd,
    slots: BTreeMap<usize, Connection<S>>,
    /// Vacated indices below `next_fresh`.
    free: BTreeSet<usize>,
    /// First index never handed out.
    next_fresh: usize,
    interest: InterestSet,
    poller: P,
}

impl<S, P> ConnectionPool<S, P>
where
    S: Read + AsRawFd,
    P: Poller,
{
    /// Create an empty pool watching only the listener.
    pub fn new(listener_fd: RawFd, settings: PoolSettings, mut poller: P) -> io::Result<Self> {
        poller.register(listener_fd)?;
        let mut interest = InterestSet::new();
        interest.insert(listener_fd);

        Ok(Self {
            settings,
            listener_fd,
            slots: BTreeMap::new(),
            free: BTreeSet::new(),
            next_fresh: 0,
            interest,
            poller,
        })
    }

    fn lowest_free_slot(&self) -> Option<usize> {
        match self.free.first() {
            Some(&slot) => Some(slot),
            None if self.next_fresh < self.settings.capacity => Some(self.next_fresh),
            None => None,
        }
    }

    /// Place `stream` in the lowest empty slot and start watching it.
    ///
    /// On error the stream is dropped, which closes it.
    pub fn add_connection(&mut self, stream: S) -> Result<usize, PoolError> {
        let slot = self.lowest_free_slot().ok_or(PoolError::Exhausted {
            capacity: self.settings.capacity,
        })?;

        let fd = stream.as_raw_fd();
        self.poller.register(fd).map_err(PoolError::Register)?;
        self.interest.insert(fd);

        if !self.free.remove(&slot) {
            self.next_fresh += 1;
        }

        let reader = LineReader::new(stream, self.settings.max_line, self.settings.buffer_size);
        self.slots.insert(
            slot,
            Connection {
                fd,
                reader,
                output: BytesMut::new(),
                writable: false,
            },
        );
        Ok(slot)
    }

    /// Watch the connection in `slot` for writability (`true`) or for reads
    /// (`false`). A no-op when it is already watched that way.
    pub fn watch_writable(&mut self, slot: usize, writable: bool) -> io::Result<()> {
        let conn = self
            .slots
            .get_mut(&slot)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "empty slot"))?;
        if conn.writable != writable {
            self.poller.reregister(conn.fd, writable)?;
            conn.writable = writable;
        }
        Ok(())
    }

    /// Stop watching the connection in `slot`, free the slot and close it.
    ///
    /// Returns the closed descriptor, or `None` if the slot was empty.
    pub fn remove_connection(&mut self, slot: usize) -> Option<RawFd> {
        let conn = self.slots.remove(&slot)?;
        let fd = conn.fd;

        // Deregister while the descriptor is still open
        let _ = self.poller.deregister(fd);
        self.interest.remove(fd);
        self.free.insert(slot);
        drop(conn);

        Some(fd)
    }

    /// Cursor over occupied slots in ascending order.
    pub fn slots(&self) -> Slots {
        Slots { next: 0 }
    }

    /// Wait for readiness on the interest set.
    pub fn poll(&mut self, ready: &mut ReadySet, timeout: Option<Duration>) -> io::Result<usize> {
        self.poller.poll(&self.interest, ready, timeout)
    }

    /// Add every connection with buffered work to `ready`.
    ///
    /// Returns how many descriptors were newly added.
    pub fn collect_pending(&self, ready: &mut ReadySet) -> usize {
        self.slots
            .values()
            .filter(|conn| conn.has_pending())
            .filter(|conn| ready.insert(conn.fd))
            .count()
    }

    /// Whether any connection has buffered work.
    pub fn has_pending(&self) -> bool {
        self.slots.values().any(Connection::has_pending)
    }

    pub fn get(&self, slot: usize) -> Option<&Connection<S>> {
        self.slots.get(&slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Connection<S>> {
        self.slots.get_mut(&slot)
    }

    /// Descriptor of the connection in `slot`.
    pub fn fd(&self, slot: usize) -> Option<RawFd> {
        self.slots.get(&slot).map(|conn| conn.fd)
    }

    pub fn interest(&self) -> &InterestSet {
        &self.interest
    }

    /// Highest descriptor across the listener and all connections.
    pub fn max_fd(&self) -> RawFd {
        self.interest.max_fd().unwrap_or(self.listener_fd)
    }

    /// Highest occupied slot index.
    pub fn high_water(&self) -> Option<usize> {
        self.slots.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.settings.capacity
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    #[cfg(test)]
    pub(crate) fn poller_mut(&mut self) -> &mut P {
        &mut self.poller
    }
}

/// Live cursor over occupied slots.
///
/// Each step looks at the pool as it is now, so slots removed during a scan
/// are skipped. Call `ConnectionPool::slots` again to restart from slot 0.
#[derive(Debug, Clone)]
pub struct Slots {
    next: usize,
}

impl Slots {
    /// Next occupied slot index at or after the cursor.
    pub fn next<S, P>(&mut self, pool: &ConnectionPool<S, P>) -> Option<usize> {
        let (&slot, _) = pool.slots.range(self.next..).next()?;
        self.next = slot + 1;
        Some(slot)
    }
}
