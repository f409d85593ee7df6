//! # Driver Boundary and Ring Registration
//!
//! ## Purpose
//!
//! This module is the seam between the session and the driver that owns the
//! other end of the rings. The session never enumerates or creates adapters;
//! it only needs two things from the outside world: a way to obtain a device
//! channel from an adapter, and a one-shot control transfer that hands the
//! driver both ring descriptors before any packet traffic starts.
//!
//! ## How it works
//!
//! `RegisterRings` is the fixed-layout record the control transfer carries.
//! Its byte layout is a compatibility contract with the driver binary and is
//! pinned with compile-time asserts. `Adapter` and `DeviceChannel` are the
//! trait seams; `TunAdapter`/`CtlChannel` implement them over a device node
//! with an ioctl, and the test harness implements them in-process.
//!
//! ## Main components
//!
//! - `RegisterRings`, `RingDescriptor`: the registration ABI.
//! - `Adapter`, `DeviceChannel`: the collaborator traits.
//! - `TunAdapter`, `CtlChannel`: the device-node implementation.

use crate::ring::RingHdr;
use static_assertions::const_assert_eq;
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsRawFd as _, OwnedFd};
use std::path::{Path, PathBuf};

const METHOD_BUFFERED: u32 = 0;
const FILE_READ_DATA: u32 = 0x0001;
const FILE_WRITE_DATA: u32 = 0x0002;

const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// Control code of the one-shot ring registration transfer. The value is
/// part of the driver contract.
pub const REGISTER_RINGS_CODE: u32 =
    ctl_code(51820, 0x970, METHOD_BUFFERED, FILE_READ_DATA | FILE_WRITE_DATA);

/// One ring as described to the driver: total byte size, base address of the
/// shared header, and the identity of the wait primitive the producer
/// signals on new data.
#[repr(C)]
pub struct RingDescriptor {
    pub ring_size: u32,
    pub ring: *mut RingHdr,
    pub tail_moved: isize,
}

/// The registration record. Field order is the wire order: the ring the
/// driver produces into (session inbound) comes first, the ring the session
/// produces into second.
#[repr(C)]
pub struct RegisterRings {
    pub rx: RingDescriptor,
    pub tx: RingDescriptor,
}

const_assert_eq!(size_of::<RingDescriptor>(), 3 * size_of::<usize>());
const_assert_eq!(size_of::<RegisterRings>(), 6 * size_of::<usize>());

/// The control channel to the driver's device object.
pub trait DeviceChannel: Send {
    /// Hands both ring descriptors to the driver. Must succeed before any
    /// packet operation; a failure leaves no shared state behind.
    fn register_rings(&self, rings: &RegisterRings) -> io::Result<()>;
}

/// An already-created virtual adapter, as far as the session cares: something
/// that can open a device channel.
pub trait Adapter {
    fn open_device(&self) -> io::Result<Box<dyn DeviceChannel>>;
}

/// Device channel over an open device node, registering rings with the
/// driver's ioctl.
pub struct CtlChannel {
    fd: OwnedFd,
}

impl CtlChannel {
    pub fn open(path: &Path) -> io::Result<CtlChannel> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(CtlChannel { fd: file.into() })
    }
}

impl DeviceChannel for CtlChannel {
    fn register_rings(&self, rings: &RegisterRings) -> io::Result<()> {
        let ret = unsafe {
            libc::ioctl(
                self.fd.as_raw_fd(),
                REGISTER_RINGS_CODE as libc::c_ulong,
                rings as *const RegisterRings,
            )
        };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Adapter known by its device node path.
pub struct TunAdapter {
    path: PathBuf,
}

impl TunAdapter {
    pub fn new(path: impl Into<PathBuf>) -> TunAdapter {
        TunAdapter { path: path.into() }
    }
}

impl Adapter for TunAdapter {
    fn open_device(&self) -> io::Result<Box<dyn DeviceChannel>> {
        Ok(Box::new(CtlChannel::open(&self.path)?))
    }
}
