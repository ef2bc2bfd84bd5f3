//! Test doubles for driving the reactor without real readiness.

use crate::runtime::listener::Acceptor;
use crate::runtime::poller::{InterestSet, Poller, ReadySet};
use std::collections::{BTreeSet, VecDeque};
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Poller that reports scripted wakeups instead of asking the OS.
#[derive(Debug, Default)]
pub struct FakePoller {
    pub registered: BTreeSet<RawFd>,
    /// Registered descriptors currently watched for writability.
    pub writable: BTreeSet<RawFd>,
    pub fail_register: bool,
    pub fail_poll: bool,
    /// Pending wakeups: ready descriptors and the count to report.
    pub wakeups: VecDeque<(Vec<RawFd>, usize)>,
    /// Timeout passed to each poll call.
    pub timeouts: Vec<Option<Duration>>,
    /// Highest interest descriptor seen by each poll call.
    pub max_fds: Vec<Option<RawFd>>,
}

impl FakePoller {
    /// Queue a wakeup reporting every descriptor in `ready`.
    pub fn script(&mut self, ready: Vec<RawFd>) {
        let count = ready.len();
        self.wakeups.push_back((ready, count));
    }

    /// Queue a wakeup whose reported count differs from the ready subset.
    pub fn script_with_count(&mut self, ready: Vec<RawFd>, count: usize) {
        self.wakeups.push_back((ready, count));
    }
}

impl Poller for FakePoller {
    fn register(&mut self, fd: RawFd) -> io::Result<()> {
        if self.fail_register {
            return Err(io::Error::new(io::ErrorKind::Other, "register refused"));
        }
        self.registered.insert(fd);
        Ok(())
    }

    fn reregister(&mut self, fd: RawFd, writable: bool) -> io::Result<()> {
        if !self.registered.contains(&fd) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "fd not registered"));
        }
        if writable {
            self.writable.insert(fd);
        } else {
            self.writable.remove(&fd);
        }
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.registered.remove(&fd);
        self.writable.remove(&fd);
        Ok(())
    }

    fn poll(
        &mut self,
        interest: &InterestSet,
        ready: &mut ReadySet,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        ready.clear();
        self.timeouts.push(timeout);
        self.max_fds.push(interest.max_fd());

        if self.fail_poll {
            return Err(io::Error::new(io::ErrorKind::Other, "poll failed"));
        }

        // An unscripted wakeup behaves like an expired timeout
        let Some((fds, count)) = self.wakeups.pop_front() else {
            return Ok(0);
        };
        for fd in fds {
            if interest.contains(fd) {
                ready.insert(fd);
            }
        }
        Ok(count)
    }
}

/// Acceptor handing out pre-queued Unix socket pairs and accept errors.
pub struct QueueAcceptor {
    /// Only provides a real descriptor number for the listener.
    anchor: UnixStream,
    _anchor_peer: UnixStream,
    queue: VecDeque<io::Result<UnixStream>>,
}

impl QueueAcceptor {
    pub fn new() -> Self {
        let (anchor, anchor_peer) = UnixStream::pair().expect("socketpair");
        Self {
            anchor,
            _anchor_peer: anchor_peer,
            queue: VecDeque::new(),
        }
    }

    /// Queue a pending connection and return the client end.
    pub fn push(&mut self) -> UnixStream {
        let (server, client) = UnixStream::pair().expect("socketpair");
        server.set_nonblocking(true).expect("nonblocking");
        self.queue.push_back(Ok(server));
        client
    }

    /// Queue an accept failure of `kind`.
    pub fn push_error(&mut self, kind: io::ErrorKind) {
        self.queue.push_back(Err(kind.into()));
    }
}

impl AsRawFd for QueueAcceptor {
    fn as_raw_fd(&self) -> RawFd {
        self.anchor.as_raw_fd()
    }
}

impl Acceptor for QueueAcceptor {
    type Stream = UnixStream;

    fn accept_one(&mut self) -> io::Result<(UnixStream, String)> {
        match self.queue.pop_front() {
            Some(accepted) => accepted.map(|stream| (stream, "queued".to_string())),
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// Write into a non-blocking `stream` until its send buffer is full.
/// Returns the number of bytes written.
pub fn fill_send_buffer<W: Write>(stream: &mut W) -> usize {
    let chunk = [b'x'; 4096];
    let mut total = 0;
    loop {
        match stream.write(&chunk) {
            Ok(n) => total += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return total,
            Err(e) => panic!("filling send buffer failed: {e}"),
        }
    }
}
