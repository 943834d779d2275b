//! Pixel-space post-processing applied to every synthesized frame.
//!
//! The chain runs in a fixed order: contrast, saturation, brightness, grain, vignette, chromatic
//! aberration. Parameters outside their range are clamped, never rejected, so post-processing
//! cannot fail a frame. Grain noise is seeded by frame index, which keeps the chain a pure
//! function of `(pixels, frame index)`.

use crate::foundation::core::FrameIndex;
use crate::foundation::math::{SplitMix64, clamp_u8};
use crate::synth::contract::FrameBuffer;

const GRAIN_SEED: u64 = 0x5eed_9a17_c0de_f00d;

/// User-facing post-processing parameters. Identity by default.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Contrast factor, clamped to `[0.5, 2]`.
    pub contrast: f32,
    /// Saturation factor, clamped to `[0, 2]`.
    pub saturation: f32,
    /// Brightness factor, clamped to `[0.5, 2]`.
    pub brightness: f32,
    /// Film grain strength, clamped to `[0, 1]`.
    pub grain: f32,
    /// Vignette strength, clamped to `[0, 1]`.
    pub vignette: f32,
    /// Chromatic aberration strength, clamped to `[0, 5]`.
    pub chromatic_aberration: f32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            saturation: 1.0,
            brightness: 1.0,
            grain: 0.0,
            vignette: 0.0,
            chromatic_aberration: 0.0,
        }
    }
}

fn clamp_param(v: f32, lo: f32, hi: f32, default: f32) -> f32 {
    if v.is_nan() { default } else { v.clamp(lo, hi) }
}

impl PostProcessConfig {
    /// Copy with every parameter clamped into its valid range (NaN falls back to the default).
    pub fn clamped(&self) -> Self {
        let d = Self::default();
        Self {
            contrast: clamp_param(self.contrast, 0.5, 2.0, d.contrast),
            saturation: clamp_param(self.saturation, 0.0, 2.0, d.saturation),
            brightness: clamp_param(self.brightness, 0.5, 2.0, d.brightness),
            grain: clamp_param(self.grain, 0.0, 1.0, d.grain),
            vignette: clamp_param(self.vignette, 0.0, 1.0, d.vignette),
            chromatic_aberration: clamp_param(
                self.chromatic_aberration,
                0.0,
                5.0,
                d.chromatic_aberration,
            ),
        }
    }
}

/// One transform in the chain.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PostOp {
    /// Blend against the mean luma.
    Contrast(f32),
    /// Blend against per-pixel luma.
    Saturation(f32),
    /// Scale toward black.
    Brightness(f32),
    /// Additive gaussian noise with standard deviation `strength * 50`.
    Grain(f32),
    /// Radial darkening toward the corners.
    Vignette(f32),
    /// Red shifted left and blue shifted right by `int(strength * 3)` pixels.
    ChromaticAberration(f32),
}

/// Ordered, clamped transform list with per-resolution scratch state.
#[derive(Clone, Debug, Default)]
pub struct PostProcessChain {
    ops: Vec<PostOp>,
    vignette_mask: Option<(u32, u32, Vec<f32>)>,
    scratch: Vec<u8>,
}

impl PostProcessChain {
    /// Chain that leaves frames untouched.
    pub fn identity() -> Self {
        Self::default()
    }

    /// Build from a config, clamping parameters and omitting identity transforms.
    pub fn from_config(cfg: &PostProcessConfig) -> Self {
        let c = cfg.clamped();
        let mut ops = Vec::new();
        if c.contrast != 1.0 {
            ops.push(PostOp::Contrast(c.contrast));
        }
        if c.saturation != 1.0 {
            ops.push(PostOp::Saturation(c.saturation));
        }
        if c.brightness != 1.0 {
            ops.push(PostOp::Brightness(c.brightness));
        }
        if c.grain > 0.0 {
            ops.push(PostOp::Grain(c.grain));
        }
        if c.vignette > 0.0 {
            ops.push(PostOp::Vignette(c.vignette));
        }
        if (c.chromatic_aberration * 3.0) as u32 > 0 {
            ops.push(PostOp::ChromaticAberration(c.chromatic_aberration));
        }
        Self {
            ops,
            ..Self::default()
        }
    }

    /// Transforms in application order.
    pub fn ops(&self) -> &[PostOp] {
        &self.ops
    }

    /// `true` when no transform will run.
    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every transform to `frame` in place.
    pub fn apply(&mut self, idx: FrameIndex, frame: &mut FrameBuffer) {
        for i in 0..self.ops.len() {
            match self.ops[i] {
                PostOp::Contrast(f) => contrast(frame, f),
                PostOp::Saturation(f) => saturation(frame, f),
                PostOp::Brightness(f) => brightness(frame, f),
                PostOp::Grain(g) => grain(frame, g, idx),
                PostOp::Vignette(v) => self.vignette(frame, v),
                PostOp::ChromaticAberration(c) => self.chromatic(frame, c),
            }
        }
    }

    fn vignette(&mut self, frame: &mut FrameBuffer, strength: f32) {
        let (w, h) = (frame.width, frame.height);
        let stale = !matches!(&self.vignette_mask, Some((mw, mh, _)) if *mw == w && *mh == h);
        if stale {
            self.vignette_mask = Some((w, h, vignette_mask(w, h, strength)));
        }
        let Some((_, _, mask)) = &self.vignette_mask else {
            return;
        };
        for (px, m) in frame.data.chunks_exact_mut(3).zip(mask) {
            for c in px {
                *c = (f32::from(*c) * m) as u8;
            }
        }
    }

    fn chromatic(&mut self, frame: &mut FrameBuffer, strength: f32) {
        let shift = (strength * 3.0) as usize;
        let w = frame.width as usize;
        if shift == 0 || shift >= w {
            return;
        }
        let row_bytes = w * 3;
        for row in frame.data.chunks_exact_mut(row_bytes) {
            self.scratch.clear();
            self.scratch.extend_from_slice(row);
            for x in 0..w - shift {
                row[x * 3] = self.scratch[(x + shift) * 3];
            }
            for x in shift..w {
                row[x * 3 + 2] = self.scratch[(x - shift) * 3 + 2];
            }
        }
    }
}

fn luma(px: &[u8]) -> f32 {
    (u32::from(px[0]) * 299 + u32::from(px[1]) * 587 + u32::from(px[2]) * 114) as f32 / 1000.0
}

fn contrast(frame: &mut FrameBuffer, factor: f32) {
    let n = frame.data.len() / 3;
    if n == 0 {
        return;
    }
    let sum: f64 = frame
        .data
        .chunks_exact(3)
        .map(|px| f64::from(luma(px).floor()))
        .sum();
    let mean = (sum / n as f64 + 0.5).floor() as f32;
    for c in &mut frame.data {
        *c = clamp_u8(mean + (f32::from(*c) - mean) * factor);
    }
}

fn saturation(frame: &mut FrameBuffer, factor: f32) {
    for px in frame.data.chunks_exact_mut(3) {
        let l = luma(px).floor();
        for c in px {
            *c = clamp_u8(l + (f32::from(*c) - l) * factor);
        }
    }
}

fn brightness(frame: &mut FrameBuffer, factor: f32) {
    for c in &mut frame.data {
        *c = clamp_u8(f32::from(*c) * factor);
    }
}

fn grain(frame: &mut FrameBuffer, strength: f32, idx: FrameIndex) {
    let sigma = f64::from(strength) * 50.0;
    let mut rng = SplitMix64::new(GRAIN_SEED ^ idx.0.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    for c in &mut frame.data {
        let v = f64::from(*c) + rng.next_normal() * sigma;
        *c = v.clamp(0.0, 255.0) as u8;
    }
}

fn vignette_mask(w: u32, h: u32, strength: f32) -> Vec<f32> {
    let (cx, cy) = (f64::from(w / 2), f64::from(h / 2));
    let max_dist = (cx * cx + cy * cy).sqrt();
    let mut mask = Vec::with_capacity(w as usize * h as usize);
    for y in 0..h {
        for x in 0..w {
            let m = if max_dist > 0.0 {
                let d = ((f64::from(x) - cx).powi(2) + (f64::from(y) - cy).powi(2)).sqrt();
                (1.0 - d / max_dist * f64::from(strength)).clamp(0.3, 1.0)
            } else {
                1.0
            };
            mask.push(m as f32);
        }
    }
    mask
}

#[cfg(test)]
#[path = "../tests/unit/postprocess.rs"]
mod tests;
