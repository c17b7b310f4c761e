use crate::frame::assembler::DEFAULT_EXPIRE_DISTANCE;
use crate::frame::fragment::FragmentOptions;
use std::net::SocketAddr;
use thiserror::Error;

pub const MIN_FRAGMENT_PAYLOAD: u16 = 64;
pub const MAX_FRAGMENT_PAYLOAD: u16 = 65000;

/// Large enough for any FD the fragmenter can legally emit plus slack for
/// jumbo-frame senders.
pub const DEFAULT_RECV_BUFFER_BYTES: usize = 65536;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("fragment payload {0} outside {MIN_FRAGMENT_PAYLOAD}..={MAX_FRAGMENT_PAYLOAD}")]
    FragmentPayload(u16),
    #[error("{1} percentage {0} outside 0..=100")]
    Percentage(f64, &'static str),
}

/// Sender-side configuration: where datagrams go and how frames are sliced.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub destination: SocketAddr,
    pub fragment: FragmentOptions,
}

impl SenderConfig {
    pub fn new(destination: SocketAddr) -> Self {
        Self { destination, fragment: FragmentOptions::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fragment.validate()
    }
}

/// Receiver-side configuration for the ingest service.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub listen: SocketAddr,
    /// Binding to a non-loopback address requires this override.
    pub allow_non_local_bind: bool,
    /// `max_distance` handed to the expiry sweep after each completed frame.
    pub expire_distance: u32,
    /// Completed-frame channel depth before the pump backpressures.
    pub channel_capacity: usize,
    pub recv_buffer_bytes: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 10000)),
            allow_non_local_bind: false,
            expire_distance: DEFAULT_EXPIRE_DISTANCE,
            channel_capacity: 64,
            recv_buffer_bytes: DEFAULT_RECV_BUFFER_BYTES,
        }
    }
}
