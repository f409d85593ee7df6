//! Blocking wait for inbound data.
//!
//! The producer only signals the inbound event when it observes the ring's
//! `alertable` flag set, so the waiter raises the flag before blocking and
//! re-checks for data in between; a packet published in that window is seen
//! by the re-check instead of being lost.

use crate::event::WaitOutcome;
use crate::session::{RingError, Session};
use std::time::Duration;

impl Session {
    /// Blocks until the peer publishes new inbound data or the timeout
    /// elapses. `None` waits indefinitely; session teardown signals the same
    /// event, so a waiter observes shutdown instead of hanging.
    ///
    /// A `Signaled` outcome means a receive is worth attempting, nothing
    /// stronger: the data may already have been consumed by another thread,
    /// or the ring may have been shut down.
    pub fn wait(&self, timeout: Option<Duration>) -> Result<WaitOutcome, RingError> {
        self.rx.ring.set_alertable(true);
        if self.is_data_available() {
            self.rx.ring.set_alertable(false);
            return Ok(WaitOutcome::Signaled);
        }
        let outcome = self.rx.event.wait(timeout)?;
        self.rx.ring.set_alertable(false);
        Ok(outcome)
    }
}
