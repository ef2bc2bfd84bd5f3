//! `select(2)` poller.
//!
//! Level-triggered. The read and write sets are rebuilt from the interest
//! set on every call and `nfds` is derived from its highest descriptor. Each
//! descriptor sits in exactly one of the two sets, so the count `select`
//! returns is the number of distinct ready descriptors.

use super::{is_interrupted, InterestSet, Poller, ReadySet};
use std::collections::HashSet;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct SelectPoller {
    /// Descriptors currently watched for writability instead of reads.
    writers: HashSet<RawFd>,
}

impl SelectPoller {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_fd(fd: RawFd) -> io::Result<()> {
    if fd < 0 || fd as usize >= libc::FD_SETSIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("fd {fd} outside select range (FD_SETSIZE = {})", libc::FD_SETSIZE),
        ));
    }
    Ok(())
}

impl Poller for SelectPoller {
    fn register(&mut self, fd: RawFd) -> io::Result<()> {
        check_fd(fd)
    }

    fn reregister(&mut self, fd: RawFd, writable: bool) -> io::Result<()> {
        check_fd(fd)?;
        if writable {
            self.writers.insert(fd);
        } else {
            self.writers.remove(&fd);
        }
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
        self.writers.remove(&fd);
        Ok(())
    }

    fn poll(
        &mut self,
        interest: &InterestSet,
        ready: &mut ReadySet,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        ready.clear();

        let max_fd = match interest.max_fd() {
            Some(fd) => fd,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "select called with an empty interest set",
                ))
            }
        };

        let mut read_set = empty_set();
        let mut write_set = empty_set();
        for fd in interest.iter() {
            check_fd(fd)?;
            let set = if self.writers.contains(&fd) {
                &mut write_set
            } else {
                &mut read_set
            };
            // SAFETY: fd is within [0, FD_SETSIZE).
            unsafe { libc::FD_SET(fd, set) };
        }

        let mut tv = timeout.map(|t| libc::timeval {
            tv_sec: t.as_secs() as libc::time_t,
            tv_usec: t.subsec_micros() as libc::suseconds_t,
        });
        let tv_ptr = match tv.as_mut() {
            Some(tv) => tv as *mut libc::timeval,
            None => std::ptr::null_mut(),
        };

        // SAFETY: both sets and tv outlive the call; the except set is null.
        let rc = unsafe {
            libc::select(
                max_fd + 1,
                &mut read_set,
                &mut write_set,
                std::ptr::null_mut(),
                tv_ptr,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if is_interrupted(&err) {
                return Ok(0);
            }
            return Err(err);
        }

        for fd in interest.iter() {
            // SAFETY: both sets were filled by select and fd is in range.
            if unsafe { libc::FD_ISSET(fd, &read_set) || libc::FD_ISSET(fd, &write_set) } {
                ready.insert(fd);
            }
        }
        Ok(rc as usize)
    }
}

fn empty_set() -> libc::fd_set {
    // SAFETY: FD_ZERO fully initializes the set before any other use.
    unsafe {
        let mut set = MaybeUninit::<libc::fd_set>::uninit();
        libc::FD_ZERO(set.as_mut_ptr());
        set.assume_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_fd() {
        let mut poller = SelectPoller::new();
        assert!(poller.register(-1).is_err());
        assert!(poller.register(libc::FD_SETSIZE as RawFd).is_err());
        assert!(poller.register(3).is_ok());
    }

    #[test]
    fn test_deregister_forgets_write_interest() {
        let mut poller = SelectPoller::new();
        poller.reregister(5, true).unwrap();
        assert!(poller.writers.contains(&5));
        poller.deregister(5).unwrap();
        assert!(poller.writers.is_empty());
        assert!(poller.reregister(libc::FD_SETSIZE as RawFd, true).is_err());
    }

    #[test]
    fn test_empty_interest_is_an_error() {
        let mut poller = SelectPoller::new();
        let mut ready = ReadySet::default();
        let err = poller
            .poll(&InterestSet::new(), &mut ready, Some(Duration::ZERO))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
