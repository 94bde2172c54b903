//! Slowrelay - link-layer frame relay.
//!
//! Captures Ethernet frames in promiscuous mode, keeps those whose IPv4
//! source matches a target host, holds each for a fixed delay, rewrites its
//! link-layer addresses and retransmits it toward a gateway MAC.
//!
//! The capture and forwarding sides run on separate threads joined by a
//! [`BoundedQueue`](queue::BoundedQueue) built from counting
//! [`Semaphore`](sync::Semaphore)s. Capture never blocks on the queue: when
//! it is full, the frame is dropped.

pub mod config;
pub mod domain;
pub mod error;
pub mod link;
pub mod queue;
pub mod relay;
pub mod sync;

pub use config::{RelayConfig, Settings};
pub use domain::Frame;
pub use error::{ConfigError, LinkError, QueueError, RelayError};
pub use link::{FrameReceiver, FrameTransmitter};
pub use queue::BoundedQueue;
pub use relay::{Relay, RelayStats, StatsSnapshot};
pub use sync::Semaphore;
