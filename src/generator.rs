use crate::frame::header::{BayerPattern, SampleFormat};
use crate::frame::FrameInfo;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Synthetic test pattern families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    ColorBars,
    Ramp,
    Checker,
    MovingBox,
    SlantedEdge,
}

impl Pattern {
    pub fn as_str(self) -> &'static str {
        match self {
            Pattern::ColorBars => "bars",
            Pattern::Ramp => "ramp",
            Pattern::Checker => "checker",
            Pattern::MovingBox => "box",
            Pattern::SlantedEdge => "slanted",
        }
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bars" => Ok(Pattern::ColorBars),
            "ramp" => Ok(Pattern::Ramp),
            "checker" => Ok(Pattern::Checker),
            "box" => Ok(Pattern::MovingBox),
            "slanted" => Ok(Pattern::SlantedEdge),
            other => Err(format!("unknown pattern `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub pattern: Pattern,
    pub box_size: u16,
    /// Write the frame index into the first samples for visual sanity checks.
    pub embed_counter: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self { pattern: Pattern::ColorBars, box_size: 64, embed_counter: true }
    }
}

/// Produces raw sensor frames as `u16` sample planes scaled to the frame's
/// bit depth. Every pattern is a pure function of the frame index.
pub struct RawFrameGenerator {
    info: FrameInfo,
    opts: GeneratorOptions,
}

impl RawFrameGenerator {
    pub fn new(info: FrameInfo, opts: GeneratorOptions) -> Self {
        Self { info, opts }
    }

    pub fn next_frame(&self, frame_index: u32) -> Vec<u16> {
        let mut buf = vec![0u16; self.info.width as usize * self.info.height as usize];
        match self.opts.pattern {
            Pattern::ColorBars => self.fill_color_bars(&mut buf),
            Pattern::Ramp => self.fill_ramp(&mut buf, frame_index),
            Pattern::Checker => self.fill_checker(&mut buf, frame_index),
            Pattern::MovingBox => self.fill_box(&mut buf, frame_index),
            Pattern::SlantedEdge => self.fill_slanted(&mut buf, frame_index),
        }

        if self.opts.embed_counter && !buf.is_empty() {
            let counter = (frame_index as u16) & self.max_val();
            let embed = buf.len().min(64);
            for sample in &mut buf[..embed] {
                *sample = counter;
            }
        }

        buf
    }

    /// Loads one frame of `u16` samples (little-endian) from a raw file.
    pub fn load_from_file(path: &Path, info: &FrameInfo) -> io::Result<Vec<u16>> {
        let sample_count = info.width as usize * info.height as usize;
        let raw = fs::read(path)?;
        if raw.len() < sample_count * 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("raw file holds {} bytes, frame needs {}", raw.len(), sample_count * 2),
            ));
        }
        Ok(raw[..sample_count * 2].chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect())
    }

    fn max_val(&self) -> u16 {
        self.info.format.max_sample()
    }

    fn fill_color_bars(&self, buf: &mut [u16]) {
        let mv = self.max_val();
        let colors = [mv, mv / 4 * 3, mv / 2, mv / 4, mv / 8, 0];
        let width = self.info.width as usize;
        for y in 0..self.info.height as usize {
            for x in 0..width {
                let bar = x * 6 / width;
                let val = colors[bar % 6];
                let idx = y * width + x;
                if self.info.pattern == BayerPattern::Mono {
                    buf[idx] = val;
                    continue;
                }
                let red_row = match self.info.pattern {
                    BayerPattern::Rggb | BayerPattern::Grbg => y % 2 == 0,
                    _ => y % 2 != 0,
                };
                let red_col = match self.info.pattern {
                    BayerPattern::Rggb | BayerPattern::Bggr => x % 2 == 0,
                    _ => x % 2 != 0,
                };
                buf[idx] = if red_row && red_col {
                    val
                } else if !red_row && !red_col {
                    val / 2
                } else {
                    val / 4 * 3
                };
            }
        }
    }

    fn fill_ramp(&self, buf: &mut [u16], frame_index: u32) {
        let mv = self.max_val() as u32;
        let width = self.info.width as usize;
        for y in 0..self.info.height as usize {
            for x in 0..width {
                buf[y * width + x] = ((x as u32 + y as u32 + frame_index) % mv) as u16;
            }
        }
    }

    fn fill_checker(&self, buf: &mut [u16], frame_index: u32) {
        let mv = self.max_val();
        let bright = mv;
        let dark = mv / 16;
        let width = self.info.width as usize;
        for y in 0..self.info.height as usize {
            for x in 0..width {
                let block = ((x / 8) ^ (y / 8) ^ (frame_index as usize / 8)) & 1 != 0;
                buf[y * width + x] = if block { bright } else { dark };
            }
        }
    }

    fn fill_slanted(&self, buf: &mut [u16], frame_index: u32) {
        let mv = self.max_val() as u32;
        let width = self.info.width as usize;
        for y in 0..self.info.height as usize {
            for x in 0..width {
                let v = (x as u32 + frame_index) % width as u32;
                let diag = (v + y as u32 / 2) % width as u32;
                buf[y * width + x] = ((diag * mv) / width as u32) as u16;
            }
        }
    }

    fn fill_box(&self, buf: &mut [u16], frame_index: u32) {
        let mv = self.max_val();
        buf.fill(mv / 8);
        let width = self.info.width as usize;
        let height = self.info.height as usize;
        if width == 0 || height == 0 {
            return;
        }
        let size = (self.opts.box_size as usize).min(width.min(height));
        let x_center = frame_index as usize * 5 % width;
        let y_center = frame_index as usize * 3 % height;
        let x0 = (x_center + width - size / 2) % width;
        let y0 = (y_center + height - size / 2) % height;
        for dy in 0..size {
            let y = (y0 + dy) % height;
            for dx in 0..size {
                let x = (x0 + dx) % width;
                buf[y * width + x] = mv;
            }
        }
    }
}

/// Converts `u16` samples to wire payload bytes: one low byte per pixel for
/// 8-bit, otherwise two bytes little-endian with the value in the low bits.
pub fn pack_samples(samples: &[u16], format: SampleFormat) -> Vec<u8> {
    if format.bytes_per_pixel() == 1 {
        samples.iter().map(|&s| (s & 0xFF) as u8).collect()
    } else {
        let mut out = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
        out
    }
}
