//! Link-layer I/O abstraction.
//!
//! The relay loops depend on these traits rather than on a concrete socket
//! implementation, so they can run against the pnet datalink backend in
//! production and against in-memory fakes in tests.

mod pnet_link;

pub use pnet_link::{list_interfaces, open, InterfaceInfo, LinkEndpoints, PnetReceiver, PnetTransmitter};

use crate::error::LinkError;

/// Receives raw Ethernet frames.
pub trait FrameReceiver: Send {
    /// Block until a frame arrives and copy up to `buf.len()` bytes of it.
    ///
    /// Returns the number of bytes copied. [`LinkError::Timeout`] means the
    /// wait elapsed without a frame; every other error is fatal.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;
}

/// Transmits raw Ethernet frames toward the next hop.
pub trait FrameTransmitter: Send {
    /// Send one complete frame.
    ///
    /// [`LinkError::FrameTooLarge`] means the frame was dropped by the link;
    /// every other error is fatal.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), LinkError>;
}

impl<R: FrameReceiver + ?Sized> FrameReceiver for Box<R> {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        (**self).receive(buf)
    }
}

impl<T: FrameTransmitter + ?Sized> FrameTransmitter for Box<T> {
    fn transmit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        (**self).transmit(frame)
    }
}
