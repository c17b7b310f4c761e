pub mod config;
pub mod fixtures;
pub mod frame;
pub mod generator;
pub mod metrics;
pub mod preview;
pub mod service;
pub mod time;

pub use config::{ConfigError, ReceiverConfig, SenderConfig};
pub use frame::{
    fragment_frame, BayerPattern, CompletedFrame, FragmentOptions, FrameInfo, FramePacket, FrameReassembler, FrameStats,
    ReorderBuffer, SampleFormat,
};
pub use metrics::{RxMetrics, StatsSnapshot, ThroughputWindow};
pub use service::{FrameIngestService, FrameSender, IngestError, SenderError};
