// Public modules and re-exports
pub mod device;
pub mod mmap;
pub mod packet;
pub mod ring;
pub mod session;

pub use device::{Adapter, CtlChannel, DeviceChannel, RegisterRings, RingDescriptor, TunAdapter};
pub use session::{RingError, Session, SessionConfig};

// Internal modules, hidden from documentation
#[doc(hidden)]
pub mod event;
#[doc(hidden)]
pub mod receive;
#[doc(hidden)]
pub mod send;
#[doc(hidden)]
pub mod wait;

pub use event::WaitOutcome;
pub use receive::RecvPacket;
pub use send::SendPacket;
