//! The per-direction wait primitive.
//!
//! An eventfd stands in for the driver-visible event object: the producer
//! writes to it after publishing new data, the consumer polls it with an
//! optional timeout. Reading drains the counter, so the event behaves as
//! auto-reset and a single signal wakes a single wait.

use std::io;
use std::os::fd::{AsRawFd as _, FromRawFd as _, OwnedFd, RawFd};
use std::time::Duration;

/// Outcome of a bounded wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

pub struct Event {
    fd: OwnedFd,
}

impl Event {
    pub fn new() -> io::Result<Event> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Event {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// The identity handed to the peer in the registration descriptor.
    pub fn raw_handle(&self) -> isize {
        self.fd.as_raw_fd() as isize
    }

    pub fn signal(&self) -> io::Result<()> {
        signal_raw(self.raw_handle())
    }

    /// Blocks until the event is signaled or the timeout elapses. `None`
    /// waits indefinitely.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<WaitOutcome> {
        let millis = timeout.map_or(-1, |t| t.as_millis().min(i32::MAX as u128) as libc::c_int);
        loop {
            let mut fds = [libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            }];
            let n = unsafe { libc::poll(fds.as_mut_ptr(), 1, millis) };
            if n < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e);
            }
            if n == 0 {
                return Ok(WaitOutcome::TimedOut);
            }
            if fds[0].revents & libc::POLLIN != 0 {
                let mut counter = 0u64;
                // drain so the event resets; a racing signal is not lost, it
                // just lands in the next wait
                unsafe {
                    libc::read(
                        self.fd.as_raw_fd(),
                        (&mut counter as *mut u64).cast::<libc::c_void>(),
                        size_of::<u64>(),
                    );
                }
                return Ok(WaitOutcome::Signaled);
            }
        }
    }
}

/// Signals an event known only by the raw identity from a registration
/// descriptor. This is the producer half of the primitive, usable without an
/// [`Event`] instance.
pub fn signal_raw(handle: isize) -> io::Result<()> {
    let one = 1u64;
    let n = unsafe {
        libc::write(
            handle as RawFd,
            (&one as *const u64).cast::<libc::c_void>(),
            size_of::<u64>(),
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
