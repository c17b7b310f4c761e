//! Hand-built datagram vectors for tests and tooling. Each builder encodes a
//! well-formed packet and then applies a caller tweak so adverse cases are one
//! closure away from the golden bytes.

use crate::frame::header::{FdHeader, FhHeader, FD_HEADER_LEN};
use crate::frame::FrameInfo;

/// Flow id used by the canonical vectors.
pub const DEFAULT_FLOW_ID: u32 = 1;

/// Shorthand for a test geometry.
pub fn test_info(
    width: u16,
    height: u16,
    format: crate::frame::header::SampleFormat,
    pattern: crate::frame::header::BayerPattern,
) -> FrameInfo {
    FrameInfo { width, height, format, pattern, flow_id: DEFAULT_FLOW_ID }
}

/// Encodes an FH datagram for `info`, then lets `tweak` mangle the bytes.
pub fn build_fh_datagram(
    info: &FrameInfo,
    fseq32: u32,
    timestamp_us: u64,
    frame_bytes: u32,
    tweak: impl FnOnce(&mut Vec<u8>),
) -> Vec<u8> {
    let header = FhHeader {
        flow_id: info.flow_id,
        fseq32,
        timestamp_us,
        width: info.width,
        height: info.height,
        format: info.format,
        frame_bytes,
    };
    let mut buf = header.encode().to_vec();
    tweak(&mut buf);
    buf
}

/// Encodes an FD datagram carrying `payload` at `offset`, then lets `tweak`
/// mangle the bytes.
pub fn build_fd_datagram(
    info: &FrameInfo,
    fseq8: u8,
    offset: u32,
    payload: &[u8],
    tweak: impl FnOnce(&mut Vec<u8>),
) -> Vec<u8> {
    let header = FdHeader {
        flow_id: info.flow_id,
        pattern: info.pattern,
        fseq8,
        payload_len: payload.len() as u16,
        width: info.width,
        height: info.height,
        format: info.format,
        offset,
    };
    let mut buf = Vec::with_capacity(FD_HEADER_LEN + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    tweak(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::header::{BayerPattern, FhHeader, SampleFormat, LID_TYPE};

    #[test]
    fn builders_produce_parseable_packets() {
        let info = test_info(16, 4, SampleFormat::Raw8, BayerPattern::Mono);
        let fh = build_fh_datagram(&info, 2, 77, 64, |_| {});
        let parsed = FhHeader::parse(&fh).expect("fh parses");
        assert_eq!(parsed.fseq32, 2);
        assert_eq!(parsed.frame_bytes, 64);

        let fd = build_fd_datagram(&info, 2, 12, &[9, 9, 9], |_| {});
        let parsed = FdHeader::parse(&fd).expect("fd parses");
        assert_eq!(parsed.header.offset, 12);
        assert_eq!(parsed.payload, &[9, 9, 9]);
    }

    #[test]
    fn tweak_runs_after_encoding() {
        let info = test_info(16, 4, SampleFormat::Raw8, BayerPattern::Mono);
        let fh = build_fh_datagram(&info, 2, 77, 64, |buf| buf[0] &= !(LID_TYPE >> 24) as u8);
        assert_eq!(fh[0] & 0x80, 0, "tweak cleared the FH bit");
    }
}
