use crate::frame::header::{BayerPattern, FdHeader, FhHeader, LID_TYPE, MAX_FRAME_BYTES};
use crate::frame::{header::peek_lid, FrameInfo};
use crate::time::monotonic_us;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Default `max_distance` for [`FrameReassembler::expire_older_than`].
pub const DEFAULT_EXPIRE_DISTANCE: u32 = 4;

/// Coverage bitmap granularity.
const BLOCK_BYTES: usize = 1024;

/// Running reassembly counters. `reorder_depth` is the peak number of frames
/// ever pending at once. `frames_dropped` counts rejected headers, discarded
/// overrun fragments and expired entries; an overrun frame that later expires
/// is counted twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_completed: u64,
    pub frames_dropped: u64,
    pub fd_packets: u64,
    pub fh_packets: u64,
    pub bytes: u64,
    pub reorder_depth: u32,
}

/// A fully reassembled frame handed to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    pub info: FrameInfo,
    pub fseq32: u32,
    /// Sender FH timestamp when present, otherwise local receive time.
    pub timestamp_us: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct PendingFrame {
    info: FrameInfo,
    fseq32: u32,
    fseq8: u8,
    ts: u64,
    data: Vec<u8>,
    received: Vec<bool>,
    /// Fragment start offsets already written, so duplicates do not count
    /// toward completion.
    seen_offsets: HashSet<u32>,
    expected: usize,
    /// Raw bytes written, duplicates included.
    received_bytes: usize,
    /// Bytes written exactly once per fragment offset; drives completion.
    covered_bytes: usize,
    has_fh: bool,
}

impl PendingFrame {
    fn new(info: FrameInfo, fseq32: u32, ts: u64, expected: usize, has_fh: bool) -> Self {
        Self {
            info,
            fseq32,
            fseq8: (fseq32 & 0xFF) as u8,
            ts,
            data: vec![0; expected],
            received: vec![false; expected.div_ceil(BLOCK_BYTES)],
            seen_offsets: HashSet::new(),
            expected,
            received_bytes: 0,
            covered_bytes: 0,
            has_fh,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    frames: HashMap<u32, PendingFrame>,
    stats: FrameStats,
}

/// Multi-frame reassembly state machine. Ingests FH/FD datagrams in arbitrary
/// order, tolerates loss, duplication and reordering, and emits each completed
/// frame exactly once. Every method serializes on one internal mutex, so a
/// shared instance may be driven from multiple threads.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    inner: Mutex<Inner>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes one datagram. Returns the frames completed by this packet
    /// (at most one). Malformed input is dropped in place; nothing panics on
    /// wire data.
    pub fn ingest(&self, packet: &[u8]) -> Vec<CompletedFrame> {
        let mut out = Vec::new();
        let Some(lid) = peek_lid(packet) else {
            return out;
        };
        if lid & LID_TYPE != 0 {
            self.handle_fh(packet);
        } else if let Some(frame) = self.handle_fd(packet) {
            out.push(frame);
        }
        out
    }

    pub fn stats(&self) -> FrameStats {
        self.inner.lock().expect("reassembler poisoned").stats
    }

    /// Drops every pending frame more than `max_distance` behind `recent_fseq`,
    /// counting each in `frames_dropped`. Distance is signed-modular so the
    /// sweep stays correct across `fseq32` wrap.
    pub fn expire_older_than(&self, recent_fseq: u32, max_distance: u32) {
        let mut guard = self.inner.lock().expect("reassembler poisoned");
        let inner = &mut *guard;
        let before = inner.frames.len();
        inner.frames.retain(|_, pending| {
            let distance = recent_fseq.wrapping_sub(pending.fseq32) as i32;
            distance <= 0 || (distance as u32) <= max_distance
        });
        inner.stats.frames_dropped += (before - inner.frames.len()) as u64;
    }

    fn handle_fh(&self, packet: &[u8]) {
        let Ok(header) = FhHeader::parse(packet) else {
            return;
        };
        let expected = header.frame_bytes as usize;

        let mut guard = self.inner.lock().expect("reassembler poisoned");
        let inner = &mut *guard;
        if expected == 0 || expected > MAX_FRAME_BYTES {
            inner.stats.frames_dropped += 1;
            return;
        }

        let info = FrameInfo {
            width: header.width,
            height: header.height,
            format: header.format,
            // FH does not carry the mosaic; the first FD refines this
            pattern: BayerPattern::Mono,
            flow_id: header.flow_id,
        };
        let mut pending = PendingFrame::new(info, header.fseq32, header.timestamp_us, expected, true);

        // A late FH promotes the entry synthesized from earlier FDs: the
        // accumulated buffer moves under the full fseq32 key when the sizes
        // agree, otherwise the guess is discarded.
        let synthesized = inner
            .frames
            .iter()
            .find(|(_, p)| !p.has_fh && p.fseq8 == pending.fseq8 && p.info.flow_id == pending.info.flow_id)
            .map(|(key, _)| *key);
        if let Some(key) = synthesized {
            if let Some(old) = inner.frames.remove(&key) {
                if old.expected == pending.expected {
                    pending.data = old.data;
                    pending.received = old.received;
                    pending.seen_offsets = old.seen_offsets;
                    pending.received_bytes = old.received_bytes;
                    pending.covered_bytes = old.covered_bytes;
                    pending.info.pattern = old.info.pattern;
                }
            }
        }

        inner.frames.insert(pending.fseq32, pending);
        inner.stats.fh_packets += 1;
        let depth = inner.frames.len() as u32;
        if depth > inner.stats.reorder_depth {
            inner.stats.reorder_depth = depth;
        }
    }

    fn handle_fd(&self, packet: &[u8]) -> Option<CompletedFrame> {
        let parsed = FdHeader::parse(packet).ok()?;
        let header = parsed.header;
        let payload = parsed.payload;

        let mut guard = self.inner.lock().expect("reassembler poisoned");
        let inner = &mut *guard;
        inner.stats.fd_packets += 1;
        inner.stats.bytes += payload.len() as u64;
        let depth = inner.frames.len() as u32;
        if depth > inner.stats.reorder_depth {
            inner.stats.reorder_depth = depth;
        }

        // Linear scan: the table holds at most a few in-flight frames, and
        // fseq8 alone is not a key (it collides every 256 frames and the flow
        // id must participate).
        let key = inner
            .frames
            .iter()
            .find(|(_, p)| p.fseq8 == header.fseq8 && p.info.flow_id == header.flow_id)
            .map(|(key, _)| *key);
        let key = match key {
            Some(key) => key,
            None => {
                // No FH seen yet: synthesize an entry from the FD's geometry
                // with the truncated sequence number as a best-effort key.
                let expected = header.width as usize * header.height as usize * header.format.bytes_per_pixel();
                if expected == 0 || expected > MAX_FRAME_BYTES {
                    inner.stats.frames_dropped += 1;
                    return None;
                }
                let info = FrameInfo {
                    width: header.width,
                    height: header.height,
                    format: header.format,
                    pattern: BayerPattern::Mono,
                    flow_id: header.flow_id,
                };
                let pending = PendingFrame::new(info, header.fseq8 as u32, 0, expected, false);
                // a colliding key keeps its existing entry; the write below is
                // bounds-checked against whichever buffer is installed
                let key = pending.fseq32;
                inner.frames.entry(key).or_insert(pending);
                key
            }
        };

        let pending = inner.frames.get_mut(&key)?;
        let offset = header.offset as usize;
        if offset + payload.len() > pending.data.len() {
            inner.stats.frames_dropped += 1;
            return None;
        }

        pending.data[offset..offset + payload.len()].copy_from_slice(payload);
        if let Some(block) = pending.received.get_mut(offset / BLOCK_BYTES) {
            *block = true;
        }
        pending.received_bytes += payload.len();
        // received_bytes over-counts under duplication, which would complete a
        // frame before its tail arrives; covered_bytes counts each fragment
        // offset once and is the completion signal
        if pending.seen_offsets.insert(header.offset) {
            pending.covered_bytes += payload.len();
        }
        // The FD is authoritative for the mosaic; dims and format agree with
        // the FH on well-formed streams.
        pending.info.format = header.format;
        pending.info.width = header.width;
        pending.info.height = header.height;
        pending.info.pattern = header.pattern;

        if pending.expected == 0 || pending.covered_bytes < pending.expected {
            return None;
        }

        let done = inner.frames.remove(&key)?;
        inner.stats.frames_completed += 1;
        let timestamp_us = if done.ts != 0 { done.ts } else { monotonic_us() };
        Some(CompletedFrame { info: done.info, fseq32: done.fseq32, timestamp_us, payload: done.data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::fragment::{fragment_frame, FragmentOptions, ReorderBuffer};
    use crate::frame::header::SampleFormat;

    fn info(width: u16, height: u16, format: SampleFormat, pattern: BayerPattern) -> FrameInfo {
        FrameInfo { width, height, format, pattern, flow_id: 1 }
    }

    fn ingest_all(reassembler: &FrameReassembler, packets: &[crate::frame::fragment::FramePacket]) -> Vec<CompletedFrame> {
        let mut out = Vec::new();
        for packet in packets {
            out.extend(reassembler.ingest(&packet.data));
        }
        out
    }

    #[test]
    fn in_order_roundtrip() {
        let info = info(8, 4, SampleFormat::Raw8, BayerPattern::Mono);
        let payload = vec![0x5Au8; 32];
        let mut reorder = ReorderBuffer::new();
        let packets =
            fragment_frame(&info, 1, 55, &payload, &FragmentOptions { fragment_payload: 64, ..Default::default() }, &mut reorder);

        let reassembler = FrameReassembler::new();
        let completed = ingest_all(&reassembler, &packets);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].payload, payload);
        assert_eq!(completed[0].info, info);
        assert_eq!(completed[0].fseq32, 1);
        assert_eq!(completed[0].timestamp_us, 55);

        let stats = reassembler.stats();
        assert_eq!(stats.frames_completed, 1);
        assert_eq!(stats.fh_packets, 1);
        assert_eq!(stats.fd_packets, 1);
        assert_eq!(stats.bytes, 32);
    }

    #[test]
    fn short_and_garbage_packets_are_ignored() {
        let reassembler = FrameReassembler::new();
        assert!(reassembler.ingest(&[]).is_empty());
        assert!(reassembler.ingest(&[0x80, 0x00]).is_empty());
        // FH lid with a truncated header body
        assert!(reassembler.ingest(&[0x80, 0, 0, 1, 9, 9]).is_empty());
        // FD lid with a truncated header body
        assert!(reassembler.ingest(&[0x00, 0, 0, 1, 9, 9]).is_empty());
        assert_eq!(reassembler.stats(), FrameStats::default());
    }

    #[test]
    fn fh_size_cap_rejected_and_counted() {
        let oversize = FhHeader {
            flow_id: 1,
            fseq32: 9,
            timestamp_us: 1,
            width: 0,
            height: 0,
            format: SampleFormat::Raw8,
            frame_bytes: 0,
        };
        let reassembler = FrameReassembler::new();
        assert!(reassembler.ingest(&oversize.encode()).is_empty());
        assert_eq!(reassembler.stats().frames_dropped, 1);
        assert_eq!(reassembler.stats().fh_packets, 0);
    }

    #[test]
    fn duplicate_fh_overwrites_entry() {
        let info = info(16, 4, SampleFormat::Raw8, BayerPattern::Mono);
        let payload = vec![0xA5u8; 64];
        let mut reorder = ReorderBuffer::new();
        let packets =
            fragment_frame(&info, 7, 99, &payload, &FragmentOptions { fragment_payload: 32, ..Default::default() }, &mut reorder);

        let reassembler = FrameReassembler::new();
        reassembler.ingest(&packets[0].data);
        reassembler.ingest(&packets[1].data);
        // second FH resets the accumulated entry
        reassembler.ingest(&packets[0].data);
        assert!(reassembler.ingest(&packets[2].data).is_empty(), "half the bytes are gone again");
        let completed = reassembler.ingest(&packets[1].data);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].payload, payload);
    }

    #[test]
    fn expiration_uses_wrapping_distance() {
        let info = info(16, 4, SampleFormat::Raw8, BayerPattern::Mono);
        let payload = vec![1u8; 64];
        let reassembler = FrameReassembler::new();
        let mut reorder = ReorderBuffer::new();
        for fseq in [u32::MAX - 1, u32::MAX] {
            let packets = fragment_frame(
                &info,
                fseq,
                77,
                &payload,
                &FragmentOptions { fragment_payload: 32, ..Default::default() },
                &mut reorder,
            );
            reassembler.ingest(&packets[0].data);
            reassembler.ingest(&packets[1].data);
        }

        // just past the wrap: distance 3 and 4, both within the window
        reassembler.expire_older_than(2, DEFAULT_EXPIRE_DISTANCE);
        assert_eq!(reassembler.stats().frames_dropped, 0);

        // distance 9 and 10
        reassembler.expire_older_than(8, DEFAULT_EXPIRE_DISTANCE);
        assert_eq!(reassembler.stats().frames_dropped, 2);
    }
}
