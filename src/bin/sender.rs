use anyhow::{bail, Context, Result};
use clap::Parser;
use rawcast::config::SenderConfig;
use rawcast::frame::{BayerPattern, FragmentOptions, FrameInfo, SampleFormat};
use rawcast::generator::{pack_samples, GeneratorOptions, Pattern, RawFrameGenerator};
use rawcast::service::FrameSender;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(name = "rawcast-sender")]
#[command(about = "Stream synthetic or recorded raw frames as fragmented datagrams.")]
struct Args {
    /// Destination IP address.
    #[arg(long, default_value = "127.0.0.1")]
    dest: IpAddr,

    /// Destination UDP port.
    #[arg(long, default_value_t = 10000)]
    port: u16,

    #[arg(long, default_value_t = 640)]
    width: u16,

    #[arg(long, default_value_t = 480)]
    height: u16,

    /// Frames per second; 0 sends as fast as possible.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Sample depth in bits (8, 10, 12, 14 or 16).
    #[arg(long, default_value_t = 12)]
    bit_depth: u32,

    /// Bayer pattern: g1rg2b/grbg, rg1bg2/rggb, g1bg2r/gbrg, bg1rg2/bggr, mono.
    #[arg(long, default_value = "rg1bg2")]
    bayer: BayerPattern,

    /// Number of frames to send; 0 streams forever.
    #[arg(long, default_value_t = 0)]
    frames: u32,

    /// Test pattern: bars, ramp, checker, box, slanted.
    #[arg(long, default_value = "bars")]
    pattern: Pattern,

    /// Maximum FD payload bytes per datagram.
    #[arg(long, default_value_t = 1400)]
    fragment: u16,

    /// Flow identifier carried in every packet.
    #[arg(long, default_value_t = 1)]
    flow: u32,

    /// Simulated packet loss percentage.
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// Simulated packet duplication percentage.
    #[arg(long, default_value_t = 0.0)]
    dup: f64,

    /// Simulated reorder window depth; 0 disables reordering.
    #[arg(long, default_value_t = 0)]
    reorder: u32,

    /// Replay this raw u16 frame file instead of generating patterns.
    #[arg(long)]
    raw_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let format = match SampleFormat::from_bit_depth(args.bit_depth) {
        Some(format) => format,
        None => bail!("unsupported bit depth {} (expected 8/10/12/14/16)", args.bit_depth),
    };
    let info =
        FrameInfo { width: args.width, height: args.height, format, pattern: args.bayer, flow_id: args.flow };

    let options = FragmentOptions {
        flow_id: args.flow,
        fragment_payload: args.fragment,
        loss_percent: args.loss,
        duplicate_percent: args.dup,
        reorder_window: args.reorder,
    };

    let generator = RawFrameGenerator::new(info, GeneratorOptions { pattern: args.pattern, ..Default::default() });
    let replay = match &args.raw_file {
        Some(path) => Some(RawFrameGenerator::load_from_file(path, &info).context("load --raw-file")?),
        None => None,
    };

    let destination = SocketAddr::new(args.dest, args.port);
    let mut sender =
        FrameSender::connect(SenderConfig { destination, fragment: options }).await.context("connect sender")?;
    log::info!(
        "rawcast.event=sender_start dest={destination} geometry={}x{} depth={} bayer={} pattern={}",
        args.width,
        args.height,
        args.bit_depth,
        args.bayer.as_str(),
        args.pattern.as_str()
    );

    let mut pacing = (args.fps > 0).then(|| {
        let mut interval = tokio::time::interval(Duration::from_micros(1_000_000 / args.fps as u64));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let mut fseq = 0u32;
    while args.frames == 0 || fseq < args.frames {
        let samples = match &replay {
            Some(frame) => frame.clone(),
            None => generator.next_frame(fseq),
        };
        let payload = pack_samples(&samples, info.format);
        let packets = sender.send_frame(&info, &payload).await.context("send frame")?;
        log::debug!("rawcast.event=frame_out fseq={fseq} packets={packets} bytes={}", payload.len());
        fseq = fseq.wrapping_add(1);
        if let Some(interval) = pacing.as_mut() {
            interval.tick().await;
        }
    }

    log::info!("rawcast.event=sender_done frames={fseq}");
    Ok(())
}
