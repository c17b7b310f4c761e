use crate::config::{ConfigError, MAX_FRAGMENT_PAYLOAD, MIN_FRAGMENT_PAYLOAD};
use crate::frame::header::{FdHeader, FhHeader, FD_HEADER_LEN};
use crate::frame::FrameInfo;
use bytes::{Bytes, BytesMut};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Knobs for slicing a frame into datagrams, including the fault-injection
/// controls used to exercise receivers.
#[derive(Debug, Clone)]
pub struct FragmentOptions {
    pub flow_id: u32,
    /// Target FD payload size in bytes, 64..=65000.
    pub fragment_payload: u16,
    pub loss_percent: f64,
    pub duplicate_percent: f64,
    /// FIFO depth for simulated out-of-order delivery; 0 disables reordering.
    pub reorder_window: u32,
}

impl Default for FragmentOptions {
    fn default() -> Self {
        Self { flow_id: 1, fragment_payload: 1400, loss_percent: 0.0, duplicate_percent: 0.0, reorder_window: 0 }
    }
}

impl FragmentOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fragment_payload < MIN_FRAGMENT_PAYLOAD || self.fragment_payload > MAX_FRAGMENT_PAYLOAD {
            return Err(ConfigError::FragmentPayload(self.fragment_payload));
        }
        for (value, what) in [(self.loss_percent, "loss"), (self.duplicate_percent, "dup")] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Percentage(value, what));
            }
        }
        Ok(())
    }
}

/// Deferred-packet FIFO shared across `fragment_frame` calls so a multi-frame
/// stream sees one reorder window. Reset between independent streams.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    pending: VecDeque<Bytes>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// One encoded datagram ready for the wire.
#[derive(Debug, Clone)]
pub struct FramePacket {
    pub data: Bytes,
    pub is_fh: bool,
}

/// Slices `payload` into one FH datagram followed by MTU-bounded FD datagrams.
///
/// The per-packet loss/duplication roll is seeded from
/// `timestamp_us ^ payload.len()`, so identical inputs fragment identically.
/// The FH is never subject to injection. With a nonzero reorder window,
/// packets pass through `reorder` and the FIFO is drained at end of frame.
pub fn fragment_frame(
    info: &FrameInfo,
    fseq32: u32,
    timestamp_us: u64,
    payload: &[u8],
    options: &FragmentOptions,
    reorder: &mut ReorderBuffer,
) -> Vec<FramePacket> {
    let mut packets = Vec::new();
    if payload.is_empty() {
        return packets;
    }

    let fh = FhHeader {
        flow_id: options.flow_id,
        fseq32,
        timestamp_us,
        width: info.width,
        height: info.height,
        format: info.format,
        frame_bytes: payload.len() as u32,
    };
    packets.push(FramePacket { data: Bytes::copy_from_slice(&fh.encode()), is_fh: true });

    let mut rng = SmallRng::seed_from_u64(timestamp_us ^ payload.len() as u64);
    // step stays nonzero even for options outside the validated range
    let step = (options.fragment_payload as usize).max(1);
    let mut offset = 0usize;
    while offset < payload.len() {
        let chunk = step.min(payload.len() - offset);
        let fd = FdHeader {
            flow_id: options.flow_id,
            pattern: info.pattern,
            fseq8: (fseq32 & 0xFF) as u8,
            payload_len: chunk as u16,
            width: info.width,
            height: info.height,
            format: info.format,
            offset: offset as u32,
        };
        let mut buf = BytesMut::with_capacity(FD_HEADER_LEN + chunk);
        buf.extend_from_slice(&fd.encode());
        buf.extend_from_slice(&payload[offset..offset + chunk]);
        let pkt = buf.freeze();
        offset += chunk;

        let roll: f64 = rng.gen_range(0.0..100.0);
        if roll < options.loss_percent {
            continue;
        }
        if roll < options.loss_percent + options.duplicate_percent {
            packets.push(FramePacket { data: pkt.clone(), is_fh: false });
        }

        if options.reorder_window > 0 {
            reorder.pending.push_back(pkt);
            if reorder.pending.len() > options.reorder_window as usize {
                if let Some(front) = reorder.pending.pop_front() {
                    packets.push(FramePacket { data: front, is_fh: false });
                }
            }
        } else {
            packets.push(FramePacket { data: pkt, is_fh: false });
        }
    }

    if options.reorder_window > 0 {
        while let Some(front) = reorder.pending.pop_front() {
            packets.push(FramePacket { data: front, is_fh: false });
        }
    }

    packets
}
