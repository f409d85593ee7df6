//! # In-Process Driver Peer
//!
//! ## Purpose
//!
//! Test support for the session transport: a stand-in for the kernel driver
//! that accepts ring registration and then drives the driver half of the
//! protocol from inside the test process, so both ends of a ring pair can be
//! exercised without a device.
//!
//! ## How it works
//!
//! `DriverPeer` implements the session's `Adapter`/`DeviceChannel` seams.
//! Registration hands it the ring descriptors; from then on it produces into
//! the session's inbound ring (`inject`) and consumes from the outbound ring
//! (`extract`) with the same cursor, mark, and alertable rules the driver
//! follows, publishing immediately and in order. It can also tear the rings
//! down (`shutdown`) and inject malformed headers for corruption tests.
//!
//! The peer's ring views point into the registering session's memory and are
//! only valid while that session is alive.

use anyhow::{Context as _, Result, ensure};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tun_ring::device::{Adapter, DeviceChannel, RegisterRings};
use tun_ring::event::signal_raw;
use tun_ring::packet::{self, PacketHeader};
use tun_ring::ring::{self, MAX_IP_PACKET_SIZE, RING_ALIGNMENT, Ring};

struct Registered {
    /// The session's inbound ring; the peer is its producer.
    inbound: Ring,
    /// The session's outbound ring; the peer is its consumer.
    outbound: Ring,
    inbound_event: isize,
    capacity: u32,
}

#[derive(Default)]
struct PeerState {
    rings: Option<Registered>,
    /// Peer-owned tail on the inbound ring.
    produce: u32,
    /// Peer-owned head on the outbound ring.
    consume: u32,
}

// Ring views reach into the registering session's mapping; every access goes
// through the peer lock.
unsafe impl Send for PeerState {}

/// The driver half of a ring pair, living in the test process.
#[derive(Clone, Default)]
pub struct DriverPeer {
    state: Arc<Mutex<PeerState>>,
}

struct PeerChannel {
    state: Arc<Mutex<PeerState>>,
}

impl DriverPeer {
    pub fn new() -> DriverPeer {
        DriverPeer::default()
    }

    fn lock(&self) -> MutexGuard<'_, PeerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_registered(&self) -> bool {
        self.lock().rings.is_some()
    }

    /// Produces one packet into the session's inbound ring and publishes it,
    /// signalling the wait event if the ring was left alertable.
    pub fn inject(&self, payload: &[u8]) -> Result<()> {
        ensure!(
            payload.len() <= MAX_IP_PACKET_SIZE as usize,
            "payload of {} bytes exceeds the maximum packet size",
            payload.len()
        );
        let size = payload.len() as u32;
        let mut st = self.lock();
        let (inbound, capacity, event) = {
            let regs = st.rings.as_ref().context("no rings registered")?;
            (regs.inbound, regs.capacity, regs.inbound_event)
        };
        let head = inbound.head();
        ensure!(head < capacity, "inbound ring is shut down");
        let footprint = packet::footprint(size);
        let space = ring::wrap(
            head.wrapping_sub(st.produce).wrapping_sub(RING_ALIGNMENT),
            capacity,
        );
        ensure!(footprint <= space, "inbound ring is full");
        inbound.write_header(
            st.produce,
            PacketHeader {
                size,
                marked: false,
            },
        );
        inbound.payload_mut(st.produce, size).copy_from_slice(payload);
        st.produce = ring::wrap(st.produce + footprint, capacity);
        inbound.publish_tail(st.produce);
        if inbound.alertable() {
            signal_raw(event).context("failed to signal inbound event")?;
        }
        Ok(())
    }

    /// Publishes a header whose declared size exceeds the maximum packet
    /// size. The consumer must reject it without advancing.
    pub fn inject_oversized_header(&self) -> Result<()> {
        self.inject_bad_header(MAX_IP_PACKET_SIZE + 1)
    }

    /// Publishes a header that claims more payload than the ring content
    /// behind it actually holds.
    pub fn inject_truncated(&self) -> Result<()> {
        self.inject_bad_header(512)
    }

    /// Publishes a bare header and advances the tail over it alone, leaving
    /// the claimed payload unbacked.
    fn inject_bad_header(&self, claimed_size: u32) -> Result<()> {
        let mut st = self.lock();
        let (inbound, capacity) = {
            let regs = st.rings.as_ref().context("no rings registered")?;
            (regs.inbound, regs.capacity)
        };
        inbound.write_header(
            st.produce,
            PacketHeader {
                size: claimed_size,
                marked: false,
            },
        );
        st.produce = ring::wrap(st.produce + packet::HEADER_SIZE, capacity);
        inbound.publish_tail(st.produce);
        Ok(())
    }

    /// Consumes one committed packet from the session's outbound ring,
    /// returning an owned copy, or `None` when the ring is empty.
    pub fn extract(&self) -> Result<Option<Vec<u8>>> {
        let mut st = self.lock();
        let (outbound, capacity) = {
            let regs = st.rings.as_ref().context("no rings registered")?;
            (regs.outbound, regs.capacity)
        };
        let tail = outbound.tail();
        ensure!(tail < capacity, "outbound ring is shut down");
        if st.consume == tail {
            return Ok(None);
        }
        let content = ring::wrap(tail.wrapping_sub(st.consume), capacity);
        ensure!(content >= packet::HEADER_SIZE, "torn outbound ring");
        let hdr = outbound.read_header(st.consume);
        ensure!(!hdr.marked, "extracted packet is still held");
        ensure!(
            hdr.size <= MAX_IP_PACKET_SIZE && hdr.footprint() <= content,
            "bad outbound header"
        );
        let data = outbound.payload(st.consume, hdr.size).to_vec();
        st.consume = ring::wrap(st.consume + hdr.footprint(), capacity);
        outbound.publish_head(st.consume);
        Ok(Some(data))
    }

    /// Tears both rings down by publishing the shutdown sentinel into the
    /// peer-owned cursors, then wakes any blocked waiter.
    pub fn shutdown(&self) -> Result<()> {
        let st = self.lock();
        let regs = st.rings.as_ref().context("no rings registered")?;
        regs.inbound.publish_tail(u32::MAX);
        regs.outbound.publish_head(u32::MAX);
        signal_raw(regs.inbound_event).context("failed to signal inbound event")?;
        Ok(())
    }

    /// The inbound `head` as last published by the session's release walk.
    pub fn inbound_head(&self) -> Result<u32> {
        let st = self.lock();
        let regs = st.rings.as_ref().context("no rings registered")?;
        Ok(regs.inbound.head())
    }

    /// The outbound `tail` as last published by the session's commit walk.
    pub fn outbound_tail(&self) -> Result<u32> {
        let st = self.lock();
        let regs = st.rings.as_ref().context("no rings registered")?;
        Ok(regs.outbound.tail())
    }
}

impl Adapter for DriverPeer {
    fn open_device(&self) -> io::Result<Box<dyn DeviceChannel>> {
        Ok(Box::new(PeerChannel {
            state: self.state.clone(),
        }))
    }
}

impl DeviceChannel for PeerChannel {
    fn register_rings(&self, rings: &RegisterRings) -> io::Result<()> {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if st.rings.is_some() {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        let capacity = ring::ring_capacity(rings.rx.ring_size);
        if rings.tx.ring_size != rings.rx.ring_size || !ring::valid_capacity(capacity) {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let inbound = unsafe { Ring::from_raw(rings.rx.ring.cast(), capacity) };
        let outbound = unsafe { Ring::from_raw(rings.tx.ring.cast(), capacity) };
        st.rings = Some(Registered {
            inbound,
            outbound,
            inbound_event: rings.rx.tail_moved,
            capacity,
        });
        st.produce = 0;
        st.consume = 0;
        log::debug!("rings registered, capacity {capacity:#x}");
        Ok(())
    }
}
