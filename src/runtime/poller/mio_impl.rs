//! mio-backed poller.
//!
//! Readiness-based model over epoll (Linux) or kqueue (macOS). Descriptors are
//! keyed by their fd number and stay registered until the pool deregisters
//! them; switching direction is a `reregister`, which also re-arms the edge.
//! Notifications are edge-triggered, so the reactor re-checks buffered work
//! itself (see `LineReader::has_pending`).

use super::{is_interrupted, InterestSet, Poller, ReadySet};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

const DEFAULT_EVENTS: usize = 1024;

pub struct MioPoller {
    poll: Poll,
    events: Events,
}

impl MioPoller {
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(DEFAULT_EVENTS)
    }

    /// Create a poller collecting up to `capacity` events per wakeup.
    pub fn with_capacity(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity.max(1)),
        })
    }
}

impl Poller for MioPoller {
    fn register(&mut self, fd: RawFd) -> io::Result<()> {
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), Token(fd as usize), Interest::READABLE)
    }

    fn reregister(&mut self, fd: RawFd, writable: bool) -> io::Result<()> {
        let interest = if writable {
            Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        self.poll
            .registry()
            .reregister(&mut SourceFd(&fd), Token(fd as usize), interest)
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.poll.registry().deregister(&mut SourceFd(&fd))
    }

    fn poll(
        &mut self,
        _interest: &InterestSet,
        ready: &mut ReadySet,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        ready.clear();

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(ref e) if is_interrupted(e) => return Ok(0),
            Err(e) => return Err(e),
        }

        let mut count = 0;
        for event in self.events.iter() {
            let Token(fd) = event.token();
            if ready.insert(fd as RawFd) {
                count += 1;
            }
        }
        Ok(count)
    }
}
