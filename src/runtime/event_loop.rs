//! Single-threaded reactor loop.
//!
//! Each wakeup:
//! 1. Poll the pool's interest set (zero timeout if buffered work is waiting).
//! 2. Start a budget at the reported ready count, plus one per connection
//!    with pending buffered work that the poller did not report.
//! 3. Listener ready: spend one, accept exactly one connection.
//! 4. Scan slots in ascending order while budget remains, spending one per
//!    ready connection and running the echo handler on it.
//!
//! A reply that does not fit in the socket is queued on its connection, which
//! is then watched for writability instead of reads. The loop never waits on
//! a single client; it only ever blocks in the poll call.
//!
//! The scan stops as soon as the budget is spent, so a wakeup costs
//! O(ready) handler calls rather than O(capacity).

use crate::config::Config;
use crate::protocols::echo::{Echo, EchoHandler};
use crate::runtime::connection::{ConnectionPool, PoolError, PoolSettings};
use crate::runtime::listener::Acceptor;
use crate::runtime::poller::{Poller, ReadySet};
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Counters owned by one reactor instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EchoStats {
    /// Total bytes of echoed records, including any still queued for a
    /// full socket.
    pub bytes: u64,
    /// Records echoed.
    pub records: u64,
    /// Connections admitted to the pool.
    pub accepted: u64,
    /// Connections closed because the pool was full or refused them.
    pub rejected: u64,
    /// Admitted connections that have since been closed.
    pub closed: u64,
}

pub struct Reactor<A: Acceptor, P: Poller> {
    listener: A,
    listener_fd: RawFd,
    /// The last accept succeeded, so more connections may be queued.
    listener_pending: bool,
    pool: ConnectionPool<A::Stream, P>,
    handler: EchoHandler,
    ready: ReadySet,
    stats: EchoStats,
}

impl<A: Acceptor, P: Poller> Reactor<A, P> {
    /// Build a reactor serving `listener` with the limits in `config`.
    pub fn new(listener: A, poller: P, config: &Config) -> io::Result<Self> {
        let settings = PoolSettings {
            capacity: config.max_connections,
            max_line: config.max_line,
            buffer_size: config.buffer_size,
        };
        Self::with_parts(listener, poller, settings, EchoHandler::new())
    }

    pub fn with_parts(
        listener: A,
        poller: P,
        settings: PoolSettings,
        handler: EchoHandler,
    ) -> io::Result<Self> {
        let listener_fd = listener.as_raw_fd();
        let pool = ConnectionPool::new(listener_fd, settings, poller)?;

        Ok(Self {
            listener,
            listener_fd,
            listener_pending: false,
            pool,
            handler,
            ready: ReadySet::with_capacity(settings.capacity + 1),
            stats: EchoStats::default(),
        })
    }

    /// Serve until the poller fails.
    pub fn run(&mut self) -> io::Result<()> {
        info!(
            listener_fd = self.listener_fd,
            capacity = self.pool.capacity(),
            "Reactor started"
        );
        loop {
            self.turn(None)?;
        }
    }

    /// Run one wakeup, waiting at most `timeout` for readiness.
    ///
    /// Returns the number of ready events dispatched. A poller error is
    /// returned as-is and should be treated as fatal.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout = if self.listener_pending || self.pool.has_pending() {
            Some(Duration::ZERO)
        } else {
            timeout
        };

        let polled = self.pool.poll(&mut self.ready, timeout)?;
        let mut budget = polled + self.pool.collect_pending(&mut self.ready);
        if self.listener_pending && self.ready.insert(self.listener_fd) {
            budget += 1;
        }
        trace!(polled, budget, "Wakeup");

        let mut dispatched = 0;

        if budget > 0 && self.ready.contains(self.listener_fd) {
            budget -= 1;
            dispatched += 1;
            self.accept_one();
        }

        let mut cursor = self.pool.slots();
        while budget > 0 {
            let Some(slot) = cursor.next(&self.pool) else {
                break;
            };
            let Some(fd) = self.pool.fd(slot) else {
                continue;
            };
            if !self.ready.contains(fd) {
                continue;
            }
            budget -= 1;
            dispatched += 1;
            self.service(slot, fd);
        }

        Ok(dispatched)
    }

    fn accept_one(&mut self) {
        let (stream, peer) = match self.listener.accept_one() {
            Ok(accepted) => accepted,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.listener_pending = false;
                return;
            }
            Err(ref e) if is_transient_accept_error(e) => {
                // The backlog may still hold connections behind the failed one
                debug!(error = %e, "Transient accept error");
                self.listener_pending = true;
                return;
            }
            Err(e) => {
                error!("Accept error: {}", e);
                self.listener_pending = false;
                return;
            }
        };
        self.listener_pending = true;

        let fd = stream.as_raw_fd();
        match self.pool.add_connection(stream) {
            Ok(slot) => {
                self.stats.accepted += 1;
                debug!(slot, fd, peer = %peer, "Accepted connection");
            }
            Err(PoolError::Exhausted { capacity }) => {
                self.stats.rejected += 1;
                warn!(peer = %peer, capacity, "Connection limit reached, rejecting connection");
            }
            Err(e) => {
                self.stats.rejected += 1;
                warn!(peer = %peer, error = %e, "Rejecting connection");
            }
        }
    }

    fn service(&mut self, slot: usize, fd: RawFd) {
        let Some(conn) = self.pool.get_mut(slot) else {
            return;
        };

        let result = match self.handler.handle(conn) {
            Ok(Echo::Echoed(n)) => {
                self.record_echoed(slot, fd, n);
                Ok(())
            }
            Ok(Echo::Queued(n)) => {
                self.record_echoed(slot, fd, n);
                trace!(slot, fd, "Socket full, waiting for writability");
                self.pool.watch_writable(slot, true)
            }
            Ok(Echo::Drained) => self.pool.watch_writable(slot, false),
            Ok(Echo::Blocked) | Ok(Echo::Idle) => Ok(()),
            Ok(Echo::Closed) => {
                self.close(slot);
                Ok(())
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            debug!(slot, fd, error = %e, "Connection error");
            self.close(slot);
        }
    }

    fn record_echoed(&mut self, slot: usize, fd: RawFd, n: usize) {
        self.stats.bytes += n as u64;
        self.stats.records += 1;
        info!(fd, slot, bytes = n, total = self.stats.bytes, "Echoed record");
    }

    fn close(&mut self, slot: usize) {
        if let Some(fd) = self.pool.remove_connection(slot) {
            self.stats.closed += 1;
            debug!(slot, fd, "Connection closed");
        }
    }

    pub fn stats(&self) -> EchoStats {
        self.stats
    }

    /// Running total of echoed bytes.
    pub fn bytes_echoed(&self) -> u64 {
        self.stats.bytes
    }

    pub fn pool(&self) -> &ConnectionPool<A::Stream, P> {
        &self.pool
    }
}

/// Accept failures that leave the rest of the backlog intact.
fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}
