//! Capture, filter and enqueue.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{FrameQueue, RelayStats};
use crate::domain::Frame;
use crate::error::LinkError;
use crate::link::FrameReceiver;

/// What one capture iteration did with the frame it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The receive wait elapsed without a frame.
    Idle,
    /// The frame's source did not match the target.
    Filtered,
    /// The frame was queued for forwarding.
    Enqueued,
    /// The queue was full and the frame was dropped.
    DroppedQueueFull,
}

/// Receives frames, keeps those sent from the target address, and queues
/// them without ever blocking on the queue.
pub struct CaptureLoop<R> {
    receiver: R,
    queue: Arc<FrameQueue>,
    target: Ipv4Addr,
    stats: Arc<RelayStats>,
    running: Arc<AtomicBool>,
    /// A frame that was filtered or dropped, reused for the next receive.
    spare: Option<Frame>,
}

impl<R: FrameReceiver> CaptureLoop<R> {
    pub fn new(
        receiver: R,
        queue: Arc<FrameQueue>,
        target: Ipv4Addr,
        stats: Arc<RelayStats>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            receiver,
            queue,
            target,
            stats,
            running,
            spare: None,
        }
    }

    /// Loop until the running flag clears or a fatal link error occurs.
    pub fn run(mut self) -> Result<(), LinkError> {
        info!("Capturing frames from {}", self.target);
        while self.running.load(Ordering::SeqCst) {
            self.step()?;
        }
        info!("Capture loop stopped");
        Ok(())
    }

    /// Receive and dispatch a single frame.
    pub fn step(&mut self) -> Result<CaptureOutcome, LinkError> {
        let mut frame = self.spare.take().unwrap_or_default();

        let len = match self.receiver.receive(frame.buffer_mut()) {
            Ok(len) => len,
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => {
                self.spare = Some(frame);
                return Ok(CaptureOutcome::Idle);
            }
        };
        frame.set_len(len);
        self.stats.record_received();

        if !frame.matches_source(self.target) {
            self.spare = Some(frame);
            return Ok(CaptureOutcome::Filtered);
        }
        self.stats.record_matched();
        debug!("Matched frame: {}", frame.summary());

        match self.queue.put_nonblocking(frame) {
            Ok(()) => {
                self.stats.record_enqueued();
                Ok(CaptureOutcome::Enqueued)
            }
            Err(frame) => {
                warn!("Queue full, dropping {} byte frame", frame.len());
                self.stats.record_dropped_queue_full();
                self.spare = Some(frame);
                Ok(CaptureOutcome::DroppedQueueFull)
            }
        }
    }
}
