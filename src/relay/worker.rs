//! Delay and retransmit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use macaddr::MacAddr6;
use tracing::{debug, info, warn};

use super::{FrameQueue, RelayStats};
use crate::domain::Frame;
use crate::error::LinkError;
use crate::link::FrameTransmitter;

/// What happened to a dequeued frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Sent,
    /// The link refused the frame as too large.
    TooLarge,
    /// The frame was shorter than an Ethernet header.
    Malformed,
}

/// Takes frames off the queue, holds each for the configured delay,
/// readdresses it to the gateway and sends it.
pub struct DelayWorker<T> {
    transmitter: T,
    queue: Arc<FrameQueue>,
    delay: Duration,
    local_mac: MacAddr6,
    gateway_mac: MacAddr6,
    poll_interval: Duration,
    stats: Arc<RelayStats>,
    running: Arc<AtomicBool>,
}

impl<T: FrameTransmitter> DelayWorker<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transmitter: T,
        queue: Arc<FrameQueue>,
        delay: Duration,
        local_mac: MacAddr6,
        gateway_mac: MacAddr6,
        poll_interval: Duration,
        stats: Arc<RelayStats>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            transmitter,
            queue,
            delay,
            local_mac,
            gateway_mac,
            poll_interval,
            stats,
            running,
        }
    }

    /// Loop until the running flag clears or a fatal link error occurs.
    ///
    /// Each dequeue waits at most one poll interval so the flag is checked
    /// regularly. Frames still queued at shutdown are not sent.
    pub fn run(mut self) -> Result<(), LinkError> {
        info!(
            "Forwarding to {} with {:?} delay",
            self.gateway_mac, self.delay
        );
        while self.running.load(Ordering::SeqCst) {
            if let Some(frame) = self.queue.get_timeout(self.poll_interval) {
                self.forward(frame)?;
            }
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Delay, readdress and transmit one frame. The frame is freed on return.
    pub fn forward(&mut self, mut frame: Frame) -> Result<ForwardOutcome, LinkError> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        if !frame.rewrite_addresses(self.local_mac, self.gateway_mac) {
            debug!("Dropping malformed {} byte frame", frame.len());
            return Ok(ForwardOutcome::Malformed);
        }

        match self.transmitter.transmit(frame.as_bytes()) {
            Ok(()) => {
                self.stats.record_forwarded();
                Ok(ForwardOutcome::Sent)
            }
            Err(LinkError::FrameTooLarge(len)) => {
                warn!("Link refused {} byte frame as too large, dropping", len);
                self.stats.record_dropped_too_large();
                Ok(ForwardOutcome::TooLarge)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::BoundedQueue;
    use std::io;
    use std::time::Instant;

    fn local() -> MacAddr6 {
        MacAddr6::new(0x02, 0, 0, 0, 0, 0x01)
    }

    fn gateway() -> MacAddr6 {
        MacAddr6::new(0xcc, 0xce, 0x1e, 0x3a, 0x40, 0xe8)
    }

    #[derive(Default)]
    struct Sink {
        sent: Vec<Vec<u8>>,
        max_len: Option<usize>,
        fail: bool,
    }

    impl FrameTransmitter for Sink {
        fn transmit(&mut self, frame: &[u8]) -> Result<(), LinkError> {
            if self.fail {
                return Err(LinkError::Io(io::Error::other("link down")));
            }
            if self.max_len.is_some_and(|max| frame.len() > max) {
                return Err(LinkError::FrameTooLarge(frame.len()));
            }
            self.sent.push(frame.to_vec());
            Ok(())
        }
    }

    fn worker(sink: Sink, delay: Duration) -> (DelayWorker<Sink>, Arc<FrameQueue>, Arc<RelayStats>) {
        let queue = Arc::new(BoundedQueue::new(4).unwrap());
        let stats = Arc::new(RelayStats::new());
        let worker = DelayWorker::new(
            sink,
            queue.clone(),
            delay,
            local(),
            gateway(),
            Duration::from_millis(10),
            stats.clone(),
            Arc::new(AtomicBool::new(true)),
        );
        (worker, queue, stats)
    }

    fn frame(len: usize) -> Frame {
        let mut bytes = vec![0xffu8; len];
        bytes[12] = 0x08;
        bytes[13] = 0x00;
        Frame::from_bytes(&bytes)
    }

    #[test]
    fn test_forward_rewrites_addresses() {
        let (mut worker, _queue, stats) = worker(Sink::default(), Duration::ZERO);
        assert_eq!(worker.forward(frame(60)).unwrap(), ForwardOutcome::Sent);

        let sent = &worker.transmitter.sent[0];
        assert_eq!(&sent[..6], gateway().as_bytes());
        assert_eq!(&sent[6..12], local().as_bytes());
        assert_eq!(&sent[12..14], &[0x08u8, 0x00]);
        assert_eq!(stats.snapshot().forwarded, 1);
    }

    #[test]
    fn test_forward_waits_for_delay() {
        let delay = Duration::from_millis(40);
        let (mut worker, _queue, _stats) = worker(Sink::default(), delay);
        let start = Instant::now();
        worker.forward(frame(60)).unwrap();
        assert!(start.elapsed() >= delay);
    }

    #[test]
    fn test_too_large_frame_is_dropped_quietly() {
        let sink = Sink {
            max_len: Some(100),
            ..Sink::default()
        };
        let (mut worker, _queue, stats) = worker(sink, Duration::ZERO);
        assert_eq!(worker.forward(frame(200)).unwrap(), ForwardOutcome::TooLarge);
        assert_eq!(worker.forward(frame(60)).unwrap(), ForwardOutcome::Sent);
        assert_eq!(worker.transmitter.sent.len(), 1);

        let snapshot = stats.snapshot();
        assert_eq!((snapshot.forwarded, snapshot.dropped_too_large), (1, 1));
    }

    #[test]
    fn test_malformed_frame_is_not_sent() {
        let (mut worker, _queue, _stats) = worker(Sink::default(), Duration::ZERO);
        let outcome = worker.forward(Frame::from_bytes(&[0u8; 6])).unwrap();
        assert_eq!(outcome, ForwardOutcome::Malformed);
        assert!(worker.transmitter.sent.is_empty());
    }

    #[test]
    fn test_fatal_send_error_is_returned() {
        let sink = Sink {
            fail: true,
            ..Sink::default()
        };
        let (mut worker, _queue, _stats) = worker(sink, Duration::ZERO);
        assert!(matches!(worker.forward(frame(60)), Err(LinkError::Io(_))));
    }

    #[test]
    fn test_run_drains_in_order_until_stopped() {
        let (worker, queue, stats) = worker(Sink::default(), Duration::ZERO);
        let running = worker.running.clone();
        for marker in 1..=3u8 {
            let mut f = frame(60);
            f.buffer_mut()[59] = marker;
            queue.put_nonblocking(f).unwrap();
        }

        let handle = thread::spawn(move || {
            let mut worker = worker;
            while stats.snapshot().forwarded < 3 {
                if let Some(frame) = worker.queue.get_timeout(worker.poll_interval) {
                    worker.forward(frame).unwrap();
                }
            }
            worker
        });
        let worker = handle.join().unwrap();
        let markers: Vec<u8> = worker.transmitter.sent.iter().map(|f| f[59]).collect();
        assert_eq!(markers, vec![1, 2, 3]);

        running.store(false, Ordering::SeqCst);
        assert!(worker.run().is_ok());
    }
}
