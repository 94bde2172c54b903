//! Domain models for the relay.

mod frame;

pub use frame::{Frame, FrameSummary, FRAME_BUFFER_SIZE};
