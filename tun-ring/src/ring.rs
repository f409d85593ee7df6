//! # Shared Ring Layout and Cursor Access
//!
//! ## Purpose
//!
//! This module defines the wire layout of one directional packet ring as the
//! driver expects it: a fixed header holding the `head` and `tail` cursors and
//! the `alertable` flag, followed by a contiguous data region of back-to-back
//! length-prefixed packets. The layout is a binary contract with the driver
//! and must not change.
//!
//! ## How it works
//!
//! `Ring` is a borrowed view over a ring living inside a larger mapped region.
//! It does not own the memory; the session owns the mapping and hands the
//! driver a pointer to the very same bytes at registration time. Cursor reads
//! go through acquire loads and cursor publications through release stores,
//! since the peer advances its cursor from another execution context and no
//! lock spans the boundary. Everything else is plain offset arithmetic with
//! bounds checks, so callers only ever see validated slices.
//!
//! ## Main components
//!
//! - `RingHdr`: the shared `{head, tail, alertable}` header, `#[repr(C)]`.
//! - `Ring`: accessor over one ring's header and data region.
//! - Size/alignment arithmetic: `align`, `wrap`, `ring_size`, `ring_capacity`.

use crate::packet::{self, PacketHeader};
use static_assertions::const_assert_eq;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::{ptr, slice};

/// Every packet starts at a multiple of this quantum.
pub const RING_ALIGNMENT: u32 = size_of::<u32>() as u32;

/// Largest payload a single packet may carry.
pub const MAX_IP_PACKET_SIZE: u32 = 0xFFFF;

/// On-ring footprint of a maximum-size packet.
pub const MAX_PACKET_FOOTPRINT: u32 = align(packet::HEADER_SIZE + MAX_IP_PACKET_SIZE);

/// Smallest ring capacity the driver accepts, 128 KiB.
pub const MIN_RING_CAPACITY: u32 = 0x2_0000;

/// Largest ring capacity the driver accepts, 64 MiB.
pub const MAX_RING_CAPACITY: u32 = 0x400_0000;

/// Rounds `size` up to the next alignment quantum.
pub const fn align(size: u32) -> u32 {
    (size + (RING_ALIGNMENT - 1)) & !(RING_ALIGNMENT - 1)
}

pub const fn is_aligned(size: u32) -> bool {
    size & (RING_ALIGNMENT - 1) == 0
}

/// Reduces a cursor modulo `capacity`. Valid because capacities are powers
/// of two.
pub const fn wrap(value: u32, capacity: u32) -> u32 {
    value & (capacity - 1)
}

/// Total byte size of one ring: header, data region, and the trailing slack
/// that lets a packet starting just below `capacity` stay contiguous instead
/// of wrapping mid-packet.
pub const fn ring_size(capacity: u32) -> u32 {
    size_of::<RingHdr>() as u32 + capacity + (MAX_PACKET_FOOTPRINT - RING_ALIGNMENT)
}

/// Inverse of [`ring_size`]: the usable capacity of a ring of `ring_size`
/// bytes.
pub const fn ring_capacity(ring_size: u32) -> u32 {
    ring_size - size_of::<RingHdr>() as u32 - (MAX_PACKET_FOOTPRINT - RING_ALIGNMENT)
}

/// Capacity must be a power of two so cursors wrap with a mask, and must stay
/// inside the range the driver registers.
pub const fn valid_capacity(capacity: u32) -> bool {
    capacity.is_power_of_two() && capacity >= MIN_RING_CAPACITY && capacity <= MAX_RING_CAPACITY
}

/// The shared ring header. `head` is advanced only by the consumer, `tail`
/// only by the producer; each party reads the other's cursor. A cursor value
/// at or beyond the capacity means the channel has been torn down.
#[repr(C)]
pub struct RingHdr {
    head: AtomicU32,
    tail: AtomicU32,
    alertable: AtomicI32,
}

const_assert_eq!(size_of::<RingHdr>(), 12);

/// Borrowed view over one ring inside the shared region.
///
/// Copyable on purpose: the session and the driver-side test peer each build
/// their own view over the same bytes, exactly as user mode and the driver do
/// across the real boundary.
#[derive(Clone, Copy)]
pub struct Ring {
    hdr: *mut RingHdr,
    data: *mut u8,
    data_len: usize,
    capacity: u32,
}

impl Ring {
    /// Builds a view over a ring at `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to at least `ring_size(capacity)` bytes that stay
    /// valid for the lifetime of the view, and all parties accessing the ring
    /// must follow the cursor-ownership protocol.
    pub unsafe fn from_raw(base: *mut u8, capacity: u32) -> Ring {
        debug_assert!(valid_capacity(capacity));
        Ring {
            hdr: base.cast::<RingHdr>(),
            data: unsafe { base.add(size_of::<RingHdr>()) },
            data_len: capacity as usize + (MAX_PACKET_FOOTPRINT - RING_ALIGNMENT) as usize,
            capacity,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Pointer to the shared header, as handed to the driver at registration.
    pub fn hdr_ptr(&self) -> *mut RingHdr {
        self.hdr
    }

    fn hdr(&self) -> &RingHdr {
        unsafe { &*self.hdr }
    }

    pub fn head(&self) -> u32 {
        self.hdr().head.load(Ordering::Acquire)
    }

    pub fn tail(&self) -> u32 {
        self.hdr().tail.load(Ordering::Acquire)
    }

    pub fn publish_head(&self, value: u32) {
        self.hdr().head.store(value, Ordering::Release);
    }

    pub fn publish_tail(&self, value: u32) {
        self.hdr().tail.store(value, Ordering::Release);
    }

    pub fn alertable(&self) -> bool {
        self.hdr().alertable.load(Ordering::Acquire) != 0
    }

    pub fn set_alertable(&self, on: bool) {
        self.hdr().alertable.store(on as i32, Ordering::Release);
    }

    /// Reads the packet header at `offset`. The caller must know the offset
    /// holds a packet it is allowed to look at.
    pub fn read_header(&self, offset: u32) -> PacketHeader {
        debug_assert!(is_aligned(offset) && offset < self.capacity);
        PacketHeader::decode(unsafe { ptr::read(self.data.add(offset as usize).cast::<u32>()) })
    }

    pub fn write_header(&self, offset: u32, hdr: PacketHeader) {
        debug_assert!(is_aligned(offset) && offset < self.capacity);
        unsafe { ptr::write(self.data.add(offset as usize).cast::<u32>(), hdr.encode()) }
    }

    /// Payload bytes of the packet whose header sits at `offset`. A packet
    /// starting below `capacity` may extend into the trailing slack; it never
    /// exceeds `data_len`.
    pub fn payload(&self, offset: u32, len: u32) -> &[u8] {
        let start = (offset + packet::HEADER_SIZE) as usize;
        debug_assert!(offset < self.capacity && start + len as usize <= self.data_len);
        unsafe { slice::from_raw_parts(self.data.add(start), len as usize) }
    }

    /// Mutable variant of [`payload`](Self::payload), used by the producer to
    /// fill a freshly allocated packet.
    ///
    /// Returned regions for distinct offsets are disjoint; the per-direction
    /// lock keeps allocation offsets distinct.
    #[allow(clippy::mut_from_ref)]
    pub fn payload_mut(&self, offset: u32, len: u32) -> &mut [u8] {
        let start = (offset + packet::HEADER_SIZE) as usize;
        debug_assert!(offset < self.capacity && start + len as usize <= self.data_len);
        unsafe { slice::from_raw_parts_mut(self.data.add(start), len as usize) }
    }
}
