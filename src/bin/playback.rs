use anyhow::{bail, Context, Result};
use clap::Parser;
use rawcast::config::SenderConfig;
use rawcast::frame::{BayerPattern, FragmentOptions, FrameInfo, SampleFormat};
use rawcast::generator::{pack_samples, RawFrameGenerator};
use rawcast::service::FrameSender;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Parser, Debug)]
#[command(name = "rawcast-playback")]
#[command(about = "Replay one recorded raw frame file in a paced loop.")]
struct Args {
    /// Raw u16 frame file to replay.
    #[arg(long)]
    file: PathBuf,

    #[arg(long)]
    width: u16,

    #[arg(long)]
    height: u16,

    /// Sample depth in bits (8, 10, 12, 14 or 16).
    #[arg(long, default_value_t = 12)]
    bit_depth: u32,

    /// Bayer pattern: g1rg2b/grbg, rg1bg2/rggb, g1bg2r/gbrg, bg1rg2/bggr, mono.
    #[arg(long, default_value = "rg1bg2")]
    bayer: BayerPattern,

    /// Destination IP address.
    #[arg(long, default_value = "127.0.0.1")]
    dest: IpAddr,

    /// Destination UDP port.
    #[arg(long, default_value_t = 10000)]
    port: u16,

    /// Frames per second; 0 sends as fast as possible.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Number of repetitions; 0 sends the frame once.
    #[arg(long, default_value_t = 0)]
    repeat: u32,

    /// Maximum FD payload bytes per datagram.
    #[arg(long, default_value_t = 1400)]
    fragment: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.width == 0 || args.height == 0 {
        bail!("--width and --height must be nonzero");
    }
    let format = match SampleFormat::from_bit_depth(args.bit_depth) {
        Some(format) => format,
        None => bail!("unsupported bit depth {} (expected 8/10/12/14/16)", args.bit_depth),
    };
    let info = FrameInfo { width: args.width, height: args.height, format, pattern: args.bayer, flow_id: 1 };

    let samples = RawFrameGenerator::load_from_file(&args.file, &info).context("load --file")?;
    let payload = pack_samples(&samples, info.format);

    let destination = SocketAddr::new(args.dest, args.port);
    let options = FragmentOptions { fragment_payload: args.fragment, ..Default::default() };
    let mut sender =
        FrameSender::connect(SenderConfig { destination, fragment: options }).await.context("connect sender")?;
    log::info!("rawcast.event=playback_start dest={destination} bytes={}", payload.len());

    let mut pacing = (args.fps > 0).then(|| {
        let mut interval = tokio::time::interval(Duration::from_micros(1_000_000 / args.fps as u64));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let loops = args.repeat.max(1);
    for _ in 0..loops {
        sender.send_frame(&info, &payload).await.context("send frame")?;
        if let Some(interval) = pacing.as_mut() {
            interval.tick().await;
        }
    }

    log::info!("rawcast.event=playback_done frames={loops}");
    Ok(())
}
