//! Readiness polling.
//!
//! The reactor talks to the OS through the `Poller` trait so the same loop
//! runs on:
//! - `MioPoller`: epoll on Linux, kqueue on macOS (edge-triggered)
//! - `SelectPoller`: POSIX `select(2)` (level-triggered, fds < `FD_SETSIZE`)
//!
//! The interest set itself lives in `ConnectionPool`; pollers that need
//! per-descriptor registration get `register`/`deregister` calls whenever the
//! pool changes it. A descriptor is watched for one direction at a time:
//! readable by default, writable while a connection has queued output.

mod mio_impl;
mod select;

pub use mio_impl::MioPoller;
pub use select::SelectPoller;

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// OS readiness facility.
pub trait Poller {
    /// Start watching `fd` for readability.
    fn register(&mut self, fd: RawFd) -> io::Result<()>;

    /// Switch `fd` between watching for readability and for writability.
    fn reregister(&mut self, fd: RawFd, writable: bool) -> io::Result<()>;

    /// Stop watching `fd`. Must be called while `fd` is still open.
    fn deregister(&mut self, fd: RawFd) -> io::Result<()>;

    /// Block until at least one descriptor in `interest` is ready in its
    /// watched direction or `timeout` expires. Clears `ready`, fills it with
    /// the ready subset and returns the ready count. An interrupted wait is
    /// an empty wakeup.
    fn poll(
        &mut self,
        interest: &InterestSet,
        ready: &mut ReadySet,
        timeout: Option<Duration>,
    ) -> io::Result<usize>;
}

/// Descriptors the poller should watch, kept ordered so the highest
/// descriptor is always at hand.
#[derive(Debug, Default, Clone)]
pub struct InterestSet {
    fds: BTreeSet<RawFd>,
}

impl InterestSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, fd: RawFd) -> bool {
        self.fds.insert(fd)
    }

    pub(crate) fn remove(&mut self, fd: RawFd) -> bool {
        self.fds.remove(&fd)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.fds.contains(&fd)
    }

    /// Highest watched descriptor.
    pub fn max_fd(&self) -> Option<RawFd> {
        self.fds.last().copied()
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Watched descriptors in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.fds.iter().copied()
    }
}

/// Descriptors reported ready by one wakeup.
#[derive(Debug, Default)]
pub struct ReadySet {
    fds: HashSet<RawFd>,
}

impl ReadySet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fds: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `true` if `fd` was not already present.
    pub fn insert(&mut self, fd: RawFd) -> bool {
        self.fds.insert(fd)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.fds.contains(&fd)
    }

    pub fn clear(&mut self) {
        self.fds.clear();
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
}

fn is_interrupted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;

    fn exercise<P: Poller>(mut poller: P) {
        let (a, mut a_peer) = UnixStream::pair().unwrap();
        let (b, _b_peer) = UnixStream::pair().unwrap();

        let mut interest = InterestSet::new();
        for fd in [a.as_raw_fd(), b.as_raw_fd()] {
            poller.register(fd).unwrap();
            interest.insert(fd);
        }
        let mut ready = ReadySet::with_capacity(4);

        // Nothing readable yet
        let n = poller
            .poll(&interest, &mut ready, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(n, 0);
        assert!(ready.is_empty());

        a_peer.write_all(b"ping\n").unwrap();
        let n = poller
            .poll(&interest, &mut ready, Some(Duration::from_millis(1000)))
            .unwrap();
        assert_eq!(n, 1);
        assert!(ready.contains(a.as_raw_fd()));
        assert!(!ready.contains(b.as_raw_fd()));

        poller.deregister(a.as_raw_fd()).unwrap();
        interest.remove(a.as_raw_fd());
        let n = poller
            .poll(&interest, &mut ready, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(n, 0);
    }

    fn switch_direction<P: Poller>(mut poller: P) {
        let (a, mut a_peer) = UnixStream::pair().unwrap();
        let fd = a.as_raw_fd();
        let mut interest = InterestSet::new();
        poller.register(fd).unwrap();
        interest.insert(fd);
        let mut ready = ReadySet::with_capacity(2);

        // An idle fresh socket has room to write but nothing to read
        let n = poller
            .poll(&interest, &mut ready, Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(n, 0);

        poller.reregister(fd, true).unwrap();
        let n = poller
            .poll(&interest, &mut ready, Some(Duration::from_millis(1000)))
            .unwrap();
        assert_eq!(n, 1);
        assert!(ready.contains(fd));

        // Back to reads: incoming data is reported again
        poller.reregister(fd, false).unwrap();
        a_peer.write_all(b"x\n").unwrap();
        let n = poller
            .poll(&interest, &mut ready, Some(Duration::from_millis(1000)))
            .unwrap();
        assert_eq!(n, 1);
        assert!(ready.contains(fd));
    }

    #[test]
    fn test_mio_poller_reports_readable() {
        exercise(MioPoller::new().unwrap());
    }

    #[test]
    fn test_select_poller_reports_readable() {
        exercise(SelectPoller::new());
    }

    #[test]
    fn test_mio_poller_switches_direction() {
        switch_direction(MioPoller::new().unwrap());
    }

    #[test]
    fn test_select_poller_switches_direction() {
        switch_direction(SelectPoller::new());
    }

    #[test]
    fn test_interest_set_tracks_max_fd() {
        let mut interest = InterestSet::new();
        assert_eq!(interest.max_fd(), None);
        interest.insert(5);
        interest.insert(9);
        interest.insert(7);
        assert_eq!(interest.max_fd(), Some(9));
        interest.remove(9);
        assert_eq!(interest.max_fd(), Some(7));
        assert_eq!(interest.iter().collect::<Vec<_>>(), vec![5, 7]);
    }
}
