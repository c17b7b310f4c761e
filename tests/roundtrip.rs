use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rawcast::frame::{
    fragment_frame, BayerPattern, CompletedFrame, FragmentOptions, FrameInfo, FramePacket, FrameReassembler,
    ReorderBuffer, SampleFormat, FD_HEADER_LEN, LID_TYPE,
};

fn info(width: u16, height: u16, format: SampleFormat, pattern: BayerPattern) -> FrameInfo {
    FrameInfo { width, height, format, pattern, flow_id: 1 }
}

fn fragment(info: &FrameInfo, fseq32: u32, payload: &[u8], options: FragmentOptions) -> Vec<FramePacket> {
    let mut reorder = ReorderBuffer::new();
    fragment_frame(info, fseq32, 123_456, payload, &options, &mut reorder)
}

fn ingest_all(reassembler: &FrameReassembler, packets: &[FramePacket]) -> Vec<CompletedFrame> {
    let mut out = Vec::new();
    for packet in packets {
        out.extend(reassembler.ingest(&packet.data));
    }
    out
}

fn be32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(buf[at..at + 4].try_into().unwrap())
}

fn be16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes(buf[at..at + 2].try_into().unwrap())
}

#[test]
fn single_fragment_mono_frame() {
    let info = info(8, 4, SampleFormat::Raw8, BayerPattern::Mono);
    let payload = vec![0x5Au8; 32];
    let packets = fragment(&info, 0, &payload, FragmentOptions { fragment_payload: 64, ..Default::default() });

    assert_eq!(packets.len(), 2, "one FH and one FD");
    assert!(packets[0].is_fh);
    assert!(!packets[1].is_fh);

    let reassembler = FrameReassembler::new();
    let completed = ingest_all(&reassembler, &packets);
    assert_eq!(completed.len(), 1);
    let frame = &completed[0];
    assert_eq!(frame.payload, payload);
    assert_eq!(frame.info.width, 8);
    assert_eq!(frame.info.height, 4);
    assert_eq!(frame.info.format, SampleFormat::Raw8);
    assert_eq!(frame.info.pattern, BayerPattern::Mono);
}

#[test]
fn reversed_fragments_still_complete_once() {
    let info = info(16, 4, SampleFormat::Raw8, BayerPattern::Mono);
    let payload = vec![0x5Au8; 64];
    let packets = fragment(&info, 2, &payload, FragmentOptions { fragment_payload: 12, ..Default::default() });
    assert_eq!(packets.len(), 1 + 6);

    let reassembler = FrameReassembler::new();
    let mut completed = Vec::new();
    completed.extend(reassembler.ingest(&packets[0].data));
    for packet in packets[1..].iter().rev() {
        completed.extend(reassembler.ingest(&packet.data));
    }
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].payload, payload);
    assert_eq!(reassembler.stats().frames_completed, 1);
}

#[test]
fn headers_carry_format_and_bayer_bit_exactly() {
    let info = info(64, 32, SampleFormat::Raw10, BayerPattern::Rggb);
    let payload = vec![0xAAu8; 64 * 32 * 2];
    assert_eq!(payload.len(), 4096);
    let packets = fragment(&info, 42, &payload, FragmentOptions { fragment_payload: 100, ..Default::default() });

    let mut saw_fh = false;
    let mut fd_count = 0;
    for packet in &packets {
        let lid = be32(&packet.data, 0);
        if lid & LID_TYPE != 0 {
            saw_fh = true;
            assert!(packet.is_fh);
            assert_eq!(lid & 0x7FFF_FFFF, 1, "flow id lives in the low 31 bits");
            assert_eq!(be16(&packet.data, 16), 64);
            assert_eq!(be16(&packet.data, 18), 32);
            let fsize = be32(&packet.data, 20);
            assert_eq!(fsize & 0xF000_0000, SampleFormat::Raw10.encoded());
            assert_eq!(fsize & 0x0FFF_FFFF, 4096);
        } else {
            fd_count += 1;
            assert_eq!(packet.data[4] & 0x1F, BayerPattern::Rggb.flag());
            assert_eq!(packet.data[5], 42);
            let offs = be32(&packet.data, 12);
            assert_eq!(offs & 0xF000_0000, SampleFormat::Raw10.encoded());
            let size = be16(&packet.data, 6) as usize;
            assert_eq!(packet.data.len(), FD_HEADER_LEN + size);
        }
    }
    assert!(saw_fh);
    assert_eq!(fd_count, 41, "4096 bytes at 100 per fragment");

    let reassembler = FrameReassembler::new();
    let completed = ingest_all(&reassembler, &packets);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].info.format, SampleFormat::Raw10);
    assert_eq!(completed[0].info.pattern, BayerPattern::Rggb);
    assert_eq!(completed[0].payload, payload);
}

#[test]
fn any_fd_permutation_after_fh_completes() {
    let info = info(32, 8, SampleFormat::Raw12, BayerPattern::Gbrg);
    let payload: Vec<u8> = (0..32u32 * 8 * 2).map(|i| (i * 7) as u8).collect();
    let packets = fragment(&info, 5, &payload, FragmentOptions { fragment_payload: 48, ..Default::default() });

    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    for _ in 0..8 {
        let mut fds: Vec<_> = packets[1..].to_vec();
        fds.shuffle(&mut rng);

        let reassembler = FrameReassembler::new();
        let mut completed = Vec::new();
        completed.extend(reassembler.ingest(&packets[0].data));
        for packet in &fds {
            completed.extend(reassembler.ingest(&packet.data));
        }
        assert_eq!(completed.len(), 1, "exactly one emission per frame");
        assert_eq!(completed[0].payload, payload);
    }
}

#[test]
fn full_duplication_reassembles_identically() {
    let info = info(16, 8, SampleFormat::Raw8, BayerPattern::Bggr);
    let payload: Vec<u8> = (0..128u32).map(|i| i as u8).collect();
    let packets =
        fragment(&info, 9, &payload, FragmentOptions { fragment_payload: 32, duplicate_percent: 100.0, ..Default::default() });

    let reassembler = FrameReassembler::new();
    let completed = ingest_all(&reassembler, &packets);
    assert_eq!(completed.len(), 1, "duplicates never cause a second emission");
    assert_eq!(completed[0].payload, payload);
    assert_eq!(completed[0].info.pattern, BayerPattern::Bggr);
}

#[test]
fn reorder_window_stream_reassembles() {
    // Three frames through one shared reorder window, the way a sender
    // carries the FIFO across fragment_frame calls.
    let info = info(16, 8, SampleFormat::Raw8, BayerPattern::Mono);
    let options = FragmentOptions { fragment_payload: 32, reorder_window: 2, ..Default::default() };
    let mut reorder = ReorderBuffer::new();
    let reassembler = FrameReassembler::new();

    let mut completed = Vec::new();
    for fseq in 0..3u32 {
        let payload = vec![fseq as u8; 128];
        let packets = fragment_frame(&info, fseq, 1000 + fseq as u64, &payload, &options, &mut reorder);
        for packet in &packets {
            completed.extend(reassembler.ingest(&packet.data));
        }
    }

    assert_eq!(completed.len(), 3);
    for (fseq, frame) in completed.iter().enumerate() {
        assert_eq!(frame.fseq32, fseq as u32);
        assert!(frame.payload.iter().all(|&b| b == fseq as u8));
    }
}
