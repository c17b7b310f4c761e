use crate::frame::assembler::CompletedFrame;
use crate::frame::header::BayerPattern;
use std::str::FromStr;

/// How a raw mosaic is turned into a viewable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Every sample as grayscale.
    Mono,
    /// Grayscale with non-green sites attenuated.
    Green,
    /// One RGB pixel per 2x2 bayer cell.
    HalfRes,
    /// Full-resolution bilinear demosaic.
    Bilinear,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Mono => "mono",
            ViewMode::Green => "green",
            ViewMode::HalfRes => "half",
            ViewMode::Bilinear => "bilinear",
        }
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mono" => Ok(ViewMode::Mono),
            "green" => Ok(ViewMode::Green),
            "half" => Ok(ViewMode::HalfRes),
            "bilinear" => Ok(ViewMode::Bilinear),
            other => Err(format!("unknown view mode `{other}`")),
        }
    }
}

/// Minimal ISP controls applied during preview rendering.
#[derive(Debug, Clone, Copy)]
pub struct IspConfig {
    pub black_level: u16,
    pub wb_r: f32,
    pub wb_g: f32,
    pub wb_b: f32,
    pub gamma: f32,
}

impl Default for IspConfig {
    fn default() -> Self {
        Self { black_level: 0, wb_r: 1.0, wb_g: 1.0, wb_b: 1.0, gamma: 2.2 }
    }
}

/// 8-bit RGB render of a completed frame.
#[derive(Debug, Clone, Default)]
pub struct PreviewFrame {
    pub rgb: Vec<u8>,
    pub width: u16,
    pub height: u16,
}

impl PreviewFrame {
    /// Binary PPM (P6) encoding of the image.
    pub fn encode_ppm(&self) -> Vec<u8> {
        let mut out = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.rgb);
        out
    }
}

struct Lut {
    values: [u8; 256],
}

fn build_gamma_lut(gamma: f32) -> Lut {
    let gamma = if gamma <= 0.01 { 1.0 } else { gamma };
    let mut values = [0u8; 256];
    for (i, slot) in values.iter_mut().enumerate() {
        let corrected = (i as f32 / 255.0).powf(1.0 / gamma);
        *slot = (corrected * 255.0).clamp(0.0, 255.0) as u8;
    }
    Lut { values }
}

fn read_sample(frame: &CompletedFrame, x: usize, y: usize) -> u16 {
    let idx = y * frame.info.width as usize + x;
    match frame.info.format.bytes_per_pixel() {
        1 => frame.payload.get(idx).copied().map(u16::from).unwrap_or(0),
        _ => match frame.payload.get(idx * 2..idx * 2 + 2) {
            Some(pair) => u16::from_le_bytes([pair[0], pair[1]]),
            None => 0,
        },
    }
}

fn read_clamped(frame: &CompletedFrame, x: i32, y: i32) -> u16 {
    let x = x.clamp(0, frame.info.width as i32 - 1) as usize;
    let y = y.clamp(0, frame.info.height as i32 - 1) as usize;
    read_sample(frame, x, y)
}

fn normalize(v: u16, max_sample: u16, black: u16, lut: &Lut) -> u8 {
    let clipped = v.min(max_sample);
    let shifted = clipped.saturating_sub(black);
    let range = max_sample.saturating_sub(black);
    let norm = if range > 0 { shifted as f32 / range as f32 } else { 0.0 };
    let base = (norm * 255.0).clamp(0.0, 255.0) as usize;
    lut.values[base]
}

fn assign_pixel(rgb: &mut [u8], idx: usize, r: u8, g: u8, b: u8) {
    rgb[idx * 3] = r;
    rgb[idx * 3 + 1] = g;
    rgb[idx * 3 + 2] = b;
}

fn gain(base: u8, gain: f32) -> u8 {
    (base as f32 * gain).clamp(0.0, 255.0) as u8
}

pub fn render_preview(frame: &CompletedFrame, cfg: &IspConfig, mode: ViewMode) -> PreviewFrame {
    let lut = build_gamma_lut(cfg.gamma);
    match mode {
        ViewMode::Mono => mono_view(frame, cfg, &lut, false),
        ViewMode::Green => mono_view(frame, cfg, &lut, true),
        ViewMode::HalfRes => half_res(frame, cfg, &lut),
        ViewMode::Bilinear => bilinear(frame, cfg, &lut),
    }
}

fn mono_view(frame: &CompletedFrame, cfg: &IspConfig, lut: &Lut, green_only: bool) -> PreviewFrame {
    let width = frame.info.width;
    let height = frame.info.height;
    let max_sample = frame.info.format.max_sample();
    let mut rgb = vec![0u8; width as usize * height as usize * 3];
    for y in 0..height as usize {
        for x in 0..width as usize {
            let mut raw = read_sample(frame, x, y);
            if green_only && frame.info.pattern != BayerPattern::Mono {
                let is_green = (x ^ y) & 1 == 1;
                if !is_green {
                    raw /= 4;
                }
            }
            let v = normalize(raw, max_sample, cfg.black_level, lut);
            assign_pixel(&mut rgb, y * width as usize + x, v, v, v);
        }
    }
    PreviewFrame { rgb, width, height }
}

fn half_res(frame: &CompletedFrame, cfg: &IspConfig, lut: &Lut) -> PreviewFrame {
    let width = frame.info.width / 2;
    let height = frame.info.height / 2;
    let max_sample = frame.info.format.max_sample();
    let mut rgb = vec![0u8; width as usize * height as usize * 3];
    let mut y = 0usize;
    while y + 1 < frame.info.height as usize {
        let mut x = 0usize;
        while x + 1 < frame.info.width as usize {
            let r = read_sample(frame, x + 1, y);
            let g1 = read_sample(frame, x, y);
            let g2 = read_sample(frame, x + 1, y + 1);
            let b = read_sample(frame, x, y + 1);
            let idx = (y / 2) * width as usize + x / 2;
            assign_pixel(
                &mut rgb,
                idx,
                normalize(r, max_sample, cfg.black_level, lut),
                normalize(((g1 as u32 + g2 as u32) / 2) as u16, max_sample, cfg.black_level, lut),
                normalize(b, max_sample, cfg.black_level, lut),
            );
            x += 2;
        }
        y += 2;
    }
    PreviewFrame { rgb, width, height }
}

fn bilinear(frame: &CompletedFrame, cfg: &IspConfig, lut: &Lut) -> PreviewFrame {
    let width = frame.info.width;
    let height = frame.info.height;
    let max_sample = frame.info.format.max_sample();
    let mut rgb = vec![0u8; width as usize * height as usize * 3];
    for y in 0..height as usize {
        for x in 0..width as usize {
            let top = y % 2 == 0;
            let left = x % 2 == 0;
            let base = normalize(read_sample(frame, x, y), max_sample, cfg.black_level, lut);
            let pattern = frame.info.pattern;
            if pattern == BayerPattern::Mono {
                assign_pixel(&mut rgb, y * width as usize + x, base, base, base);
                continue;
            }
            let (red_pos, blue_pos) = match pattern {
                BayerPattern::Rggb => (top && left, !top && !left),
                BayerPattern::Bggr => (!top && !left, top && left),
                BayerPattern::Grbg => (top && !left, !top && left),
                BayerPattern::Gbrg => (!top && left, top && !left),
                BayerPattern::Mono => (false, false),
            };

            let (r, g, b);
            let xi = x as i32;
            let yi = y as i32;
            if red_pos {
                r = gain(base, cfg.wb_r);
                let g1 = read_clamped(frame, xi + 1, yi);
                let g2 = read_clamped(frame, xi, yi + 1);
                let b1 = read_clamped(frame, xi + 1, yi + 1);
                g = normalize(((g1 as u32 + g2 as u32) / 2) as u16, max_sample, cfg.black_level, lut);
                b = normalize(b1, max_sample, cfg.black_level, lut);
            } else if blue_pos {
                b = gain(base, cfg.wb_b);
                let g1 = read_clamped(frame, xi + 1, yi);
                let g2 = read_clamped(frame, xi, yi + 1);
                let r1 = read_clamped(frame, xi + 1, yi + 1);
                g = normalize(((g1 as u32 + g2 as u32) / 2) as u16, max_sample, cfg.black_level, lut);
                r = normalize(r1, max_sample, cfg.black_level, lut);
            } else {
                g = gain(base, cfg.wb_g);
                let horiz = read_clamped(frame, xi + if left { 1 } else { -1 }, yi);
                let vert = read_clamped(frame, xi, yi + if top { 1 } else { -1 });
                if y % 2 == x % 2 {
                    r = normalize(horiz, max_sample, cfg.black_level, lut);
                    b = normalize(vert, max_sample, cfg.black_level, lut);
                } else {
                    b = normalize(horiz, max_sample, cfg.black_level, lut);
                    r = normalize(vert, max_sample, cfg.black_level, lut);
                }
            }
            assign_pixel(&mut rgb, y * width as usize + x, r, g, b);
        }
    }
    PreviewFrame { rgb, width, height }
}
