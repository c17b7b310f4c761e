use anyhow::{Context, Result};
use clap::Parser;
use rawcast::config::ReceiverConfig;
use rawcast::service::FrameIngestService;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "rawcast-record")]
#[command(about = "Headless capture of reassembled raw frames to disk.")]
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

    /// Output path prefix; frames land in <prefix>_<fseq>.raw.
    #[arg(long, default_value = "capture")]
    prefix: String,

    /// Stop after this many frames; 0 records forever.
    #[arg(long, default_value_t = 0)]
    frames: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = ReceiverConfig {
        listen: SocketAddr::new(args.bind, args.port),
        allow_non_local_bind: args.allow_non_local,
        ..Default::default()
    };
    let (service, mut frames) = FrameIngestService::new(config);
    let service = Arc::new(service);
    let pump = {
        let service = service.clone();
        tokio::spawn(async move { service.run().await })
    };

    let mut written = 0u32;
    while args.frames == 0 || written < args.frames {
        let Some(frame) = frames.recv().await else {
            break;
        };
        let path = format!("{}_{:08}.raw", args.prefix, frame.fseq32);
        tokio::fs::write(&path, &frame.payload).await.with_context(|| format!("write {path}"))?;
        written += 1;
        log::info!("rawcast.event=frame_saved path={path} bytes={}", frame.payload.len());
    }

    service.signal_exit();
    pump.await.context("join pump")?.context("ingest service")?;
    log::info!("rawcast.event=record_done frames={written}");
    Ok(())
}
