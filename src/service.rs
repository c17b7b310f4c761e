use crate::config::{ReceiverConfig, SenderConfig};
use crate::frame::assembler::{CompletedFrame, FrameReassembler};
use crate::frame::fragment::{fragment_frame, FragmentOptions, ReorderBuffer};
use crate::frame::header::FD_HEADER_LEN;
use crate::frame::FrameInfo;
use crate::metrics::RxMetrics;
use crate::time::monotonic_us;
use log::{info, trace, warn};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("non-loopback bind attempted for {0} without override")]
    NonLocalBind(String),
    #[error("ingest io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receive side: binds a UDP socket, pumps datagrams through a
/// [`FrameReassembler`] and delivers completed frames over an mpsc channel.
/// After each completion the stale-frame sweep runs with that frame's
/// sequence number, which bounds pending-table memory.
pub struct FrameIngestService {
    config: ReceiverConfig,
    reassembler: Arc<FrameReassembler>,
    metrics: Arc<RxMetrics>,
    frames: mpsc::Sender<CompletedFrame>,
    shutdown: watch::Sender<bool>,
}

impl FrameIngestService {
    pub fn new(config: ReceiverConfig) -> (Self, mpsc::Receiver<CompletedFrame>) {
        let (frames, frames_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let service = Self {
            config,
            reassembler: Arc::new(FrameReassembler::new()),
            metrics: Arc::new(RxMetrics::new()),
            frames,
            shutdown,
        };
        (service, frames_rx)
    }

    pub fn reassembler(&self) -> Arc<FrameReassembler> {
        self.reassembler.clone()
    }

    pub fn metrics(&self) -> Arc<RxMetrics> {
        self.metrics.clone()
    }

    pub async fn run(&self) -> Result<(), IngestError> {
        let socket = self.bind_listener().await?;
        let bind_desc = socket.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());
        info!("rawcast.event=bind_ok addr={bind_desc}");
        self.pump(socket).await
    }

    pub async fn bind_listener(&self) -> Result<UdpSocket, IngestError> {
        self.ensure_loopback(self.config.listen)?;
        Ok(UdpSocket::bind(self.config.listen).await?)
    }

    fn ensure_loopback(&self, addr: SocketAddr) -> Result<(), IngestError> {
        if self.config.allow_non_local_bind || addr.ip().is_loopback() {
            Ok(())
        } else {
            Err(IngestError::NonLocalBind(addr.to_string()))
        }
    }

    pub async fn pump(&self, socket: UdpSocket) -> Result<(), IngestError> {
        let mut shutdown = self.shutdown.subscribe();
        let mut buf = vec![0u8; self.config.recv_buffer_bytes.max(FD_HEADER_LEN)];
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    break;
                }
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, peer)) => {
                            self.metrics.record_datagram(len);
                            trace!("rawcast.event=datagram bytes={len} peer={peer}");
                            for frame in self.reassembler.ingest(&buf[..len]) {
                                self.reassembler.expire_older_than(frame.fseq32, self.config.expire_distance);
                                if self.frames.send(frame).await.is_err() {
                                    info!("rawcast.event=consumer_gone");
                                    return Ok(());
                                }
                            }
                        }
                        Err(err) => {
                            self.metrics.record_recv_error();
                            warn!("rawcast.event=recv_error reason={err}");
                            break;
                        }
                    }
                }
            }
        }
        info!("rawcast.event=listener_stopped");
        Ok(())
    }

    pub fn signal_exit(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[derive(Debug, Error)]
pub enum SenderError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
    #[error("sender io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Send side: owns the socket, the fragment options, the shared reorder
/// window and the running frame sequence number.
#[derive(Debug)]
pub struct FrameSender {
    socket: UdpSocket,
    options: FragmentOptions,
    reorder: ReorderBuffer,
    fseq: u32,
}

impl FrameSender {
    pub async fn connect(config: SenderConfig) -> Result<Self, SenderError> {
        config.validate()?;
        let local: SocketAddr = match config.destination {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(config.destination).await?;
        Ok(Self { socket, options: config.fragment, reorder: ReorderBuffer::new(), fseq: 0 })
    }

    /// Fragments and transmits one frame; returns the number of datagrams put
    /// on the wire. The frame sequence number advances (and wraps) per call.
    pub async fn send_frame(&mut self, info: &FrameInfo, payload: &[u8]) -> Result<usize, SenderError> {
        let fseq32 = self.fseq;
        self.fseq = self.fseq.wrapping_add(1);
        let packets = fragment_frame(info, fseq32, monotonic_us(), payload, &self.options, &mut self.reorder);
        for packet in &packets {
            self.socket.send(&packet.data).await?;
        }
        trace!("rawcast.event=frame_sent fseq={fseq32} packets={}", packets.len());
        Ok(packets.len())
    }

    pub fn next_fseq(&self) -> u32 {
        self.fseq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> ReceiverConfig {
        ReceiverConfig { listen: "127.0.0.1:0".parse().expect("loopback addr"), ..Default::default() }
    }

    #[tokio::test]
    async fn rejects_non_loopback_without_override() {
        let mut config = loopback_config();
        config.listen = "0.0.0.0:0".parse().unwrap();
        let (service, _frames) = FrameIngestService::new(config);
        let err = service.bind_listener().await.expect_err("expected bind failure");
        assert!(matches!(err, IngestError::NonLocalBind(_)));
    }

    #[tokio::test]
    async fn non_loopback_allowed_with_override() {
        let mut config = loopback_config();
        config.listen = "0.0.0.0:0".parse().unwrap();
        config.allow_non_local_bind = true;
        let (service, _frames) = FrameIngestService::new(config);
        service.bind_listener().await.expect("bind with override");
    }

    #[tokio::test]
    async fn sender_rejects_invalid_options() {
        let mut config = SenderConfig::new("127.0.0.1:10000".parse().unwrap());
        config.fragment.fragment_payload = 10;
        let err = FrameSender::connect(config).await.expect_err("invalid options");
        assert!(matches!(err, SenderError::Config(_)));
    }
}
