//! Error types.

use std::io;

use thiserror::Error;

/// Errors from creating a bounded queue.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("queue capacity {0} is too large")]
    TooLarge(usize),
}

/// Errors from the link layer (interface lookup, capture and transmission).
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Network interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("Network interface {0} has no hardware address")]
    NoHardwareAddress(String),

    #[error("Insufficient permissions for raw capture (requires root or CAP_NET_RAW)")]
    InsufficientPermissions,

    #[error("Failed to create datalink channel: {0}")]
    ChannelCreation(String),

    /// The receive wait elapsed without a frame. Not fatal.
    #[error("Timed out waiting for a frame")]
    Timeout,

    /// The frame does not fit the outbound link. Not fatal; the frame is dropped.
    #[error("Frame of {0} bytes is too large for the link")]
    FrameTooLarge(usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl LinkError {
    /// Whether the pipeline must stop on this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LinkError::Timeout | LinkError::FrameTooLarge(_))
    }
}

/// Errors in the relay configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid MAC address for {key}: {value}")]
    InvalidMac { key: &'static str, value: String },

    #[error("Invalid IPv4 address for {key}: {value}")]
    InvalidAddress { key: &'static str, value: String },

    #[error("Invalid number for {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("Queue capacity must be at least 1")]
    ZeroCapacity,

    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),
}

/// Top-level relay errors.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("The {0} thread panicked")]
    WorkerPanicked(&'static str),
}
