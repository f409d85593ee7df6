//
// session.rs - Session State and Lifecycle
//
// Purpose:
//   Owns everything one packet session is made of: the mapped region holding
//   both rings, the per-direction wait events, the driver channel, and the
//   process-local shadow state (cursors, pending-release counts, locks) that
//   the driver never sees.
//
// Main components:
//   - Session: start/end lifecycle and the shared-state wiring.
//   - Half/HalfState: one direction's ring view, event, and locked local state.
//   - RingError: the error taxonomy of every packet operation.
//

use crate::device::{Adapter, DeviceChannel, RegisterRings, RingDescriptor};
use crate::event::Event;
use crate::mmap::OwnedMmap;
use crate::ring::{self, Ring};
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/*
   The shared region is laid out as two rings back to back:

       | RingHdr | data + slack |  RingHdr | data + slack |
       |<------ inbound ------->|<------ outbound ------->|

   The driver produces into the inbound ring and consumes from the outbound
   ring. Each direction keeps two local cursors next to the shared pair:
   `cursor` runs ahead over packets handed out to callers, `release` lags at
   the oldest packet not yet returned. Only `release` is ever published to the
   shared header, so the peer never observes a gap in front of a packet that
   is still in use.
*/

/// Errors of the packet operations.
///
/// `NoData` and `BufferFull` are expected traffic conditions, not faults.
/// `EndOfStream` is terminal for the direction. `CorruptData` means the ring
/// invariant was violated and the header cannot be trusted.
#[derive(Debug, Error)]
pub enum RingError {
    #[error("no packets buffered")]
    NoData,
    #[error("ring has been shut down")]
    EndOfStream,
    #[error("inconsistent ring content")]
    CorruptData,
    #[error("not enough free ring space")]
    BufferFull,
    #[error("length exceeds the maximum packet size")]
    InvalidLength,
    #[error("i/o: {0}")]
    Io(#[from] io::Error),
}

/// Session tuning knobs.
#[derive(Debug, Copy, Clone, Default)]
pub struct SessionConfig {
    /// Back the ring region with 2 MiB huge pages.
    ///
    /// - `Some(true)`: required, fail if unavailable.
    /// - `Some(false)`: never.
    /// - `None`: used when the system has free huge pages.
    pub huge_page: Option<bool>,
}

pub(crate) struct HalfState {
    /// Next offset to hand out: consume from (inbound) or allocate at
    /// (outbound). Runs ahead of the shared cursor.
    pub cursor: u32,
    /// Oldest offset not yet returned by a caller; the value published to
    /// the shared header.
    pub release: u32,
    /// Packets handed out and not yet coalesced by the release walk.
    pub pending: u32,
}

pub(crate) struct Half {
    pub ring: Ring,
    pub event: Event,
    state: Mutex<HalfState>,
}

impl Half {
    fn new(ring: Ring, event: Event) -> Half {
        Half {
            ring,
            event,
            state: Mutex::new(HalfState {
                cursor: 0,
                release: 0,
                pending: 0,
            }),
        }
    }

    /// Local lock acquisition never fails; a poisoning panic cannot leave
    /// the guarded cursors half-written.
    pub fn lock(&self) -> MutexGuard<'_, HalfState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One open packet session over a registered ring pair.
///
/// All packet operations take `&self` and may be called concurrently from
/// any number of threads; each direction serializes its own callers and the
/// two directions never contend. Ending the session consumes it, so no
/// operation can still be in flight.
pub struct Session {
    capacity: u32,
    device: Box<dyn DeviceChannel>,
    pub(crate) rx: Half,
    pub(crate) tx: Half,
    region: OwnedMmap,
}

// The raw pointers inside reach only into `region`, which lives as long as
// the session; cross-boundary fields are atomics and local state is behind
// the per-direction locks.
unsafe impl Send for Session {}
unsafe impl Sync for Session {}

impl Session {
    /// Starts a session on `adapter` with rings of `capacity` bytes each.
    ///
    /// Allocates the shared region and both wait events, opens the device
    /// channel, and performs the one-shot ring registration. Any failure
    /// releases whatever was already acquired, in reverse order, and no
    /// session is returned.
    pub fn start(adapter: &dyn Adapter, capacity: u32) -> io::Result<Session> {
        Session::start_with(adapter, capacity, None)
    }

    pub fn start_with(
        adapter: &dyn Adapter,
        capacity: u32,
        config: Option<SessionConfig>,
    ) -> io::Result<Session> {
        if !ring::valid_capacity(capacity) {
            log::error!("invalid ring capacity {capacity:#x}");
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let ring_size = ring::ring_size(capacity) as usize;
        let region = OwnedMmap::mmap(ring_size * 2, config.and_then(|cfg| cfg.huge_page))
            .map_err(|e| {
                log::error!("failed to allocate ring memory: {e}");
                e
            })?;
        let base = region.as_u8_ptr();
        let rx_ring = unsafe { Ring::from_raw(base, capacity) };
        let tx_ring = unsafe { Ring::from_raw(base.add(ring_size), capacity) };

        let rx_event = Event::new().map_err(|e| {
            log::error!("failed to create inbound event: {e}");
            e
        })?;
        let tx_event = Event::new().map_err(|e| {
            log::error!("failed to create outbound event: {e}");
            e
        })?;

        let device = adapter.open_device().map_err(|e| {
            log::error!("failed to open adapter device: {e}");
            e
        })?;
        let rings = RegisterRings {
            rx: RingDescriptor {
                ring_size: ring_size as u32,
                ring: rx_ring.hdr_ptr(),
                tail_moved: rx_event.raw_handle(),
            },
            tx: RingDescriptor {
                ring_size: ring_size as u32,
                ring: tx_ring.hdr_ptr(),
                tail_moved: tx_event.raw_handle(),
            },
        };
        device.register_rings(&rings).map_err(|e| {
            log::error!("failed to register rings: {e}");
            e
        })?;

        Ok(Session {
            capacity,
            device,
            rx: Half::new(rx_ring, rx_event),
            tx: Half::new(tx_ring, tx_event),
            region,
        })
    }

    /// Ends the session. Equivalent to dropping it; taking `self` by value
    /// is what rules out concurrent in-flight operations.
    pub fn end(self) {}

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The driver channel the rings were registered over.
    pub fn device(&self) -> &dyn DeviceChannel {
        &*self.device
    }

    /// Whether a receive would find at least one buffered packet right now.
    pub fn is_data_available(&self) -> bool {
        self.rx.lock().cursor != self.rx.ring.tail()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // wake the reader if it's sleeping
        if let Err(e) = self.rx.event.signal() {
            log::warn!("failed to signal session end: {e}");
        }
        // device channel, events and region are released by their own drops,
        // in reverse acquisition order
        log::debug!("session ended, releasing {} ring bytes", self.region.len());
    }
}
