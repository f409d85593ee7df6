//! # Outbound Path: Allocate and Commit
//!
//! The session is the producer of the outbound ring. Allocation claims ring
//! space and hands the caller a writable payload region; commit marks the
//! packet ready and publishes the shared `tail` over the contiguous run of
//! ready packets, mirroring the inbound release walk with the mark sense
//! inverted: a marked outbound packet is still held by its allocator.

use crate::packet::{self, PacketHeader};
use crate::ring::{self, MAX_IP_PACKET_SIZE, RING_ALIGNMENT};
use crate::session::{RingError, Session};
use std::ops::{Deref, DerefMut};

/*
   Outbound ring, producer view:

     | ... head ..>.. release ..>.. cursor ... |
           (shared,     (local)     (local)
            peer-owned)

   `release..cursor` are packets allocated to callers and possibly committed
   out of order. The free-space check reserves one alignment quantum so the
   cursor can never catch up with `head` and make a full ring look empty.
*/

/// One allocated outbound packet: a writable payload region plus the ring
/// offset commit needs to find the header again.
pub struct SendPacket<'a> {
    data: &'a mut [u8],
    start: u32,
}

impl SendPacket<'_> {
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Deref for SendPacket<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl DerefMut for SendPacket<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data
    }
}

impl Session {
    /// Allocates space for one outbound packet of `size` payload bytes.
    ///
    /// Fails with [`RingError::BufferFull`] when the ring has no room (an
    /// expected backpressure condition; retry after the peer drains) and
    /// with [`RingError::EndOfStream`] once the peer has shut the ring down.
    /// The caller fills the returned region and passes it to
    /// [`commit_send`](Session::commit_send); until then the packet is held
    /// and blocks the publish walk.
    pub fn allocate_send(&self, size: u32) -> Result<SendPacket<'_>, RingError> {
        if size > MAX_IP_PACKET_SIZE {
            return Err(RingError::InvalidLength);
        }
        let capacity = self.capacity();
        let mut state = self.tx.lock();
        if state.cursor >= capacity {
            return Err(RingError::EndOfStream);
        }
        let head = self.tx.ring.head();
        if head >= capacity {
            return Err(RingError::EndOfStream);
        }
        let footprint = packet::footprint(size);
        let space = ring::wrap(
            head.wrapping_sub(state.cursor).wrapping_sub(RING_ALIGNMENT),
            capacity,
        );
        if footprint > space {
            return Err(RingError::BufferFull);
        }
        let start = state.cursor;
        self.tx.ring.write_header(
            start,
            PacketHeader {
                size,
                marked: true,
            },
        );
        let data = self.tx.ring.payload_mut(start, size);
        state.cursor = ring::wrap(state.cursor + footprint, capacity);
        state.pending += 1;
        Ok(SendPacket { data, start })
    }

    /// Commits an allocated packet for transmission.
    ///
    /// Clears the packet's held mark, advances the release cursor over the
    /// contiguous run of ready packets, publishes it as the shared `tail`,
    /// and signals the peer's wait event if the ring was left alertable.
    pub fn commit_send(&self, packet: SendPacket<'_>) {
        let capacity = self.capacity();
        let mut state = self.tx.lock();
        let hdr = self.tx.ring.read_header(packet.start);
        self.tx.ring.write_header(
            packet.start,
            PacketHeader {
                size: hdr.size,
                marked: false,
            },
        );
        while state.pending > 0 {
            let hdr = self.tx.ring.read_header(state.release);
            if hdr.marked {
                break;
            }
            state.release = ring::wrap(state.release + hdr.footprint(), capacity);
            state.pending -= 1;
        }
        self.tx.ring.publish_tail(state.release);
        if self.tx.ring.alertable() {
            if let Err(e) = self.tx.event.signal() {
                log::warn!("failed to signal outbound data: {e}");
            }
        }
    }
}
