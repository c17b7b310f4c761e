use anyhow::{Context, Result};
use clap::Parser;
use rawcast::config::ReceiverConfig;
use rawcast::metrics::ThroughputWindow;
use rawcast::preview::{render_preview, IspConfig, ViewMode};
use rawcast::service::FrameIngestService;
use rawcast::time::monotonic_us;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rawcast-receiver")]
#[command(about = "Reassemble fragmented raw frames from the network, with stats, recording and preview.")]
struct Args {
    /// UDP port to listen on.
    #[arg(long, default_value_t = 10000)]
    port: u16,

    /// Bind address; non-loopback requires --allow-non-local.
    #[arg(long, default_value = "127.0.0.1")]
    bind: std::net::IpAddr,

    /// Permit binding to a non-loopback address.
    #[arg(long)]
    allow_non_local: bool,

    /// Preview mode: mono, green, half, bilinear.
    #[arg(long, default_value = "half")]
    view: ViewMode,

    /// Black level subtracted before normalization.
    #[arg(long, default_value_t = 0)]
    black: u16,

    /// White balance gains as r,g,b.
    #[arg(long, default_value = "1.0,1.0,1.0")]
    wb: String,

    /// Display gamma.
    #[arg(long, default_value_t = 2.2)]
    gamma: f32,

    /// Write the latest rendered preview to this PPM file after every frame.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Record every completed frame to <prefix>_<fseq>.raw.
    #[arg(long)]
    record: Option<String>,

    /// Pending frames further than this behind the newest completion expire.
    #[arg(long, default_value_t = 4)]
    expire: u32,
}

fn parse_wb(value: &str) -> Result<(f32, f32, f32)> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 3 {
        anyhow::bail!("--wb expects r,g,b");
    }
    let r = parts[0].trim().parse().context("--wb red gain")?;
    let g = parts[1].trim().parse().context("--wb green gain")?;
    let b = parts[2].trim().parse().context("--wb blue gain")?;
    Ok((r, g, b))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (wb_r, wb_g, wb_b) = parse_wb(&args.wb)?;
    let isp = IspConfig { black_level: args.black, wb_r, wb_g, wb_b, gamma: args.gamma };

    let config = ReceiverConfig {
        listen: SocketAddr::new(args.bind, args.port),
        allow_non_local_bind: args.allow_non_local,
        expire_distance: args.expire,
        ..Default::default()
    };
    let (service, mut frames) = FrameIngestService::new(config);
    let service = Arc::new(service);
    let reassembler = service.reassembler();
    let pump = {
        let service = service.clone();
        tokio::spawn(async move { service.run().await })
    };

    let mut window = ThroughputWindow::new(Duration::from_secs(1));
    while let Some(frame) = frames.recv().await {
        let latency_ms = {
            let now = monotonic_us();
            if now > frame.timestamp_us { (now - frame.timestamp_us) as f64 / 1000.0 } else { 0.0 }
        };
        window.record_frame(frame.payload.len(), latency_ms);

        if let Some(prefix) = &args.record {
            let path = format!("{prefix}_{:08}.raw", frame.fseq32);
            tokio::fs::write(&path, &frame.payload).await.with_context(|| format!("write {path}"))?;
        }
        if let Some(path) = &args.preview {
            let rendered = render_preview(&frame, &isp, args.view);
            tokio::fs::write(path, rendered.encode_ppm()).await.context("write preview")?;
        }

        if let Some(snapshot) = window.tick(&reassembler.stats()) {
            log::info!(
                "rawcast.event=stats fps={:.1} mbps={:.2} dropped={} drop_rate={:.3} reorder={} latency_ms={:.1}",
                snapshot.fps,
                snapshot.mbps,
                snapshot.frames_dropped,
                snapshot.drop_rate,
                snapshot.reorder_depth,
                snapshot.latency_ms
            );
        }
    }

    service.signal_exit();
    pump.await.context("join pump")?.context("ingest service")?;
    Ok(())
}
