//! The frame relay pipeline.
//!
//! Two threads share one [`BoundedQueue`]: the capture thread receives
//! frames, keeps those from the target address and queues them without
//! blocking, dropping frames when the queue is full. The worker thread takes
//! frames off the queue, holds each for the configured delay, rewrites its
//! link addresses and transmits it. Nothing else is shared between them
//! except the counters and the running flag.

mod capture;
mod stats;
mod worker;

pub use capture::{CaptureLoop, CaptureOutcome};
pub use stats::{RelayStats, StatsSnapshot};
pub use worker::{DelayWorker, ForwardOutcome};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use macaddr::MacAddr6;
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::domain::Frame;
use crate::error::{LinkError, RelayError};
use crate::link::{FrameReceiver, FrameTransmitter};
use crate::queue::BoundedQueue;

/// Queue of frames waiting for the worker.
pub type FrameQueue = BoundedQueue<Frame>;

/// Owns both link halves and runs the capture and worker threads.
pub struct Relay<R, T> {
    config: RelayConfig,
    receiver: R,
    transmitter: T,
    local_mac: MacAddr6,
    running: Arc<AtomicBool>,
    stats: Arc<RelayStats>,
}

impl<R, T> Relay<R, T>
where
    R: FrameReceiver + 'static,
    T: FrameTransmitter + 'static,
{
    /// Create a relay. `local_mac` becomes the source address of every
    /// forwarded frame unless the config overrides it.
    pub fn new(config: RelayConfig, receiver: R, transmitter: T, local_mac: MacAddr6) -> Self {
        let local_mac = config.local_mac.unwrap_or(local_mac);
        Self {
            config,
            receiver,
            transmitter,
            local_mac,
            running: Arc::new(AtomicBool::new(true)),
            stats: Arc::new(RelayStats::new()),
        }
    }

    /// Get a handle to stop the relay.
    ///
    /// Clearing the flag makes both loops exit within one poll interval
    /// (plus the delay of a frame already being held).
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }

    /// Run both loops until the running flag clears or one of them fails.
    ///
    /// A fatal error in either loop stops the other one. Frames still queued
    /// when the relay stops are dropped.
    pub fn run(self) -> Result<StatsSnapshot, RelayError> {
        let queue = Arc::new(FrameQueue::new(self.config.capacity)?);

        info!(
            "Relaying {} from {} to {} via {} (delay {:?}, queue capacity {})",
            self.config.target,
            self.config.interface,
            self.config.gateway_mac,
            self.config.egress_interface(),
            self.config.delay,
            self.config.capacity
        );

        let capture = CaptureLoop::new(
            self.receiver,
            queue.clone(),
            self.config.target,
            self.stats.clone(),
            self.running.clone(),
        );
        let worker = DelayWorker::new(
            self.transmitter,
            queue,
            self.config.delay,
            self.local_mac,
            self.config.gateway_mac,
            self.config.poll_interval,
            self.stats.clone(),
            self.running.clone(),
        );

        let worker_handle = spawn("worker", self.running.clone(), move || worker.run())?;
        let capture_handle = match spawn("capture", self.running.clone(), move || capture.run()) {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                // The spawn error matters more than the worker's shutdown result.
                let _ = join("worker", worker_handle);
                return Err(e);
            }
        };

        let capture_result = join("capture", capture_handle);
        let worker_result = join("worker", worker_handle);

        let snapshot = self.stats.snapshot();
        info!("Relay stopped: {}", snapshot);

        capture_result?;
        worker_result?;
        Ok(snapshot)
    }
}

/// Spawn a named pipeline thread that clears `running` when it fails.
fn spawn<F>(
    name: &'static str,
    running: Arc<AtomicBool>,
    body: F,
) -> Result<JoinHandle<Result<(), LinkError>>, RelayError>
where
    F: FnOnce() -> Result<(), LinkError> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _stop = StopOnPanic(running.clone());
            let result = body();
            if let Err(e) = &result {
                error!("{} thread failed: {}", name, e);
                running.store(false, Ordering::SeqCst);
            }
            result
        })
        .map_err(|source| RelayError::ThreadSpawn { name, source })
}

/// Clears the running flag if the owning thread unwinds.
struct StopOnPanic(Arc<AtomicBool>);

impl Drop for StopOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(false, Ordering::SeqCst);
        }
    }
}

fn join(
    name: &'static str,
    handle: JoinHandle<Result<(), LinkError>>,
) -> Result<(), RelayError> {
    match handle.join() {
        Ok(result) => result.map_err(RelayError::from),
        Err(_) => Err(RelayError::WorkerPanicked(name)),
    }
}
