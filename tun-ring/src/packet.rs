//! Packet header codec.
//!
//! On the wire a packet is a 4-byte size field followed by the payload,
//! padded to the alignment quantum. The top bit of the size field is not part
//! of the length: it marks the packet for the coalesce walk. On the inbound
//! ring a set mark means the consumer has released the packet; on the
//! outbound ring a set mark means the producer still holds it (allocated but
//! not yet committed). Keeping the mark separate from the numeric size here
//! avoids every caller re-deriving the masking.

use crate::ring;

/// Byte size of the on-ring packet header.
pub const HEADER_SIZE: u32 = size_of::<u32>() as u32;

const MARK: u32 = 0x8000_0000;

/// Decoded packet header: payload length plus the release/held mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length in bytes, mark excluded. Never exceeds
    /// [`ring::MAX_IP_PACKET_SIZE`] in a well-formed ring.
    pub size: u32,
    /// The stolen top bit. Meaning depends on the ring direction, see the
    /// module docs.
    pub marked: bool,
}

impl PacketHeader {
    pub fn decode(raw: u32) -> PacketHeader {
        PacketHeader {
            size: raw & !MARK,
            marked: raw & MARK != 0,
        }
    }

    pub fn encode(self) -> u32 {
        self.size | if self.marked { MARK } else { 0 }
    }

    /// On-ring footprint of this packet: header plus payload, aligned.
    pub fn footprint(self) -> u32 {
        footprint(self.size)
    }
}

/// On-ring footprint of a packet carrying `size` payload bytes.
pub const fn footprint(size: u32) -> u32 {
    ring::align(HEADER_SIZE + size)
}
