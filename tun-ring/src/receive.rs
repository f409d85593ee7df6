//! # Inbound Path: Retrieve and Release
//!
//! The session is the consumer of the inbound ring. Retrieval validates and
//! hands out one buffered packet at a time; release returns packets in any
//! order and publishes the shared `head` only over a contiguous run of
//! released packets.

use crate::packet::{self, PacketHeader};
use crate::ring::{self, MAX_IP_PACKET_SIZE};
use crate::session::{RingError, Session};
use std::ops::Deref;

/*
   Inbound ring, consumer view:

     | ... head ..>.. release ..>.. cursor ..>.. tail ... |
           (shared)   (local)       (local)     (shared, peer-owned)

   `release..cursor` are packets in flight to callers. Releasing a packet
   marks its header; the walk then advances `release` over every marked
   packet in order and publishes it as the shared `head`. An unreleased
   packet stops the walk, so out-of-order completion never exposes a gap to
   the producer.
*/

/// One retrieved packet: a validated view of the payload bytes, plus the
/// ring offset release needs to find the header again.
pub struct RecvPacket<'a> {
    data: &'a [u8],
    start: u32,
}

impl RecvPacket<'_> {
    pub fn data(&self) -> &[u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Deref for RecvPacket<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

impl Session {
    /// Retrieves one buffered packet from the inbound ring.
    ///
    /// Returns [`RingError::NoData`] when the ring is simply empty (poll
    /// again or [`wait`](Session::wait)), [`RingError::EndOfStream`] once the
    /// peer has shut the ring down, and [`RingError::CorruptData`] if the
    /// header at the cursor violates the ring invariant. On corruption the
    /// cursor does not advance past the bad packet.
    ///
    /// The packet stays on the ring until passed to
    /// [`release_received`](Session::release_received); until then its bytes
    /// are owned by the caller.
    pub fn receive(&self) -> Result<RecvPacket<'_>, RingError> {
        let capacity = self.capacity();
        let mut state = self.rx.lock();
        if state.cursor >= capacity {
            return Err(RingError::EndOfStream);
        }
        let tail = self.rx.ring.tail();
        if tail >= capacity {
            return Err(RingError::EndOfStream);
        }
        if state.cursor == tail {
            return Err(RingError::NoData);
        }
        let content = ring::wrap(tail.wrapping_sub(state.cursor), capacity);
        if content < packet::HEADER_SIZE {
            return Err(RingError::CorruptData);
        }
        let hdr = self.rx.ring.read_header(state.cursor);
        if hdr.size > MAX_IP_PACKET_SIZE {
            return Err(RingError::CorruptData);
        }
        let footprint = hdr.footprint();
        if footprint > content {
            return Err(RingError::CorruptData);
        }
        let start = state.cursor;
        let data = self.rx.ring.payload(start, hdr.size);
        state.cursor = ring::wrap(state.cursor + footprint, capacity);
        state.pending += 1;
        Ok(RecvPacket { data, start })
    }

    /// Releases a retrieved packet back to the ring.
    ///
    /// Marks the packet's header released, then advances the release cursor
    /// over the contiguous run of released packets and publishes it as the
    /// shared `head`.
    pub fn release_received(&self, packet: RecvPacket<'_>) {
        let capacity = self.capacity();
        let mut state = self.rx.lock();
        let hdr = self.rx.ring.read_header(packet.start);
        self.rx.ring.write_header(
            packet.start,
            PacketHeader {
                size: hdr.size,
                marked: true,
            },
        );
        while state.pending > 0 {
            let hdr = self.rx.ring.read_header(state.release);
            if !hdr.marked {
                break;
            }
            state.release = ring::wrap(state.release + hdr.footprint(), capacity);
            state.pending -= 1;
        }
        self.rx.ring.publish_head(state.release);
    }
}
