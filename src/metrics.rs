use crate::frame::assembler::FrameStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Socket-level counters shared between the pump loop and observers.
#[derive(Debug, Default)]
pub struct RxMetrics {
    datagrams_total: AtomicU64,
    bytes_total: AtomicU64,
    recv_errors: AtomicU64,
}

impl RxMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_datagram(&self, bytes: usize) {
        self.datagrams_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_recv_error(&self) {
        self.recv_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// (datagrams, bytes, recv errors)
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.datagrams_total.load(Ordering::Relaxed),
            self.bytes_total.load(Ordering::Relaxed),
            self.recv_errors.load(Ordering::Relaxed),
        )
    }
}

/// Receiver-facing rate summary, refreshed once per window.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub fps: f64,
    pub mbps: f64,
    pub drop_rate: f64,
    pub reorder_depth: u32,
    pub latency_ms: f64,
    pub frames_completed: u64,
    pub frames_dropped: u64,
}

/// Accumulates completed-frame sizes and emits a [`StatsSnapshot`] once per
/// interval. Single-consumer, driven from the receive loop.
#[derive(Debug)]
pub struct ThroughputWindow {
    interval: Duration,
    window_start: Instant,
    frames: u64,
    bytes: u64,
    latency_ms: f64,
}

impl ThroughputWindow {
    pub fn new(interval: Duration) -> Self {
        Self { interval, window_start: Instant::now(), frames: 0, bytes: 0, latency_ms: 0.0 }
    }

    pub fn record_frame(&mut self, payload_bytes: usize, latency_ms: f64) {
        self.frames += 1;
        self.bytes += payload_bytes as u64;
        self.latency_ms = latency_ms;
    }

    /// Returns a snapshot and resets the window once `interval` has elapsed.
    pub fn tick(&mut self, stats: &FrameStats) -> Option<StatsSnapshot> {
        let elapsed = self.window_start.elapsed();
        if elapsed < self.interval {
            return None;
        }
        let secs = elapsed.as_secs_f64();
        let total = stats.frames_completed + stats.frames_dropped;
        let snapshot = StatsSnapshot {
            fps: self.frames as f64 / secs,
            mbps: (self.bytes as f64 * 8.0) / (secs * 1e6),
            drop_rate: if total > 0 { stats.frames_dropped as f64 / total as f64 } else { 0.0 },
            reorder_depth: stats.reorder_depth,
            latency_ms: self.latency_ms,
            frames_completed: stats.frames_completed,
            frames_dropped: stats.frames_dropped,
        };
        self.window_start = Instant::now();
        self.frames = 0;
        self.bytes = 0;
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx_metrics_accumulate() {
        let metrics = RxMetrics::new();
        metrics.record_datagram(100);
        metrics.record_datagram(28);
        metrics.record_recv_error();
        assert_eq!(metrics.snapshot(), (2, 128, 1));
    }

    #[test]
    fn window_holds_until_interval_elapses() {
        let mut window = ThroughputWindow::new(Duration::from_secs(3600));
        window.record_frame(4096, 1.5);
        assert!(window.tick(&FrameStats::default()).is_none());
    }

    #[test]
    fn window_reports_rates_and_resets() {
        let mut window = ThroughputWindow::new(Duration::ZERO);
        window.record_frame(1_000_000, 2.0);
        window.record_frame(1_000_000, 3.0);
        let stats = FrameStats { frames_completed: 8, frames_dropped: 2, ..Default::default() };
        let snapshot = window.tick(&stats).expect("interval elapsed");
        assert!(snapshot.fps > 0.0);
        assert!(snapshot.mbps > 0.0);
        assert!((snapshot.drop_rate - 0.2).abs() < 1e-9);
        assert_eq!(snapshot.latency_ms, 3.0);
        assert_eq!(window.frames, 0);
    }
}
