use std::path::Path;
use std::sync::Arc;

use crate::analysis::features::AudioFeatureSet;
use crate::foundation::core::{FrameIndex, Resolution, Rgb8};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::fs::ensure_parent_dir;

/// A frame as tightly packed RGB8 bytes, row-major, `height * width * 3` long.
///
/// Buffers are reused frame to frame; a synthesizer overwrites every byte it is handed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel bytes.
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Black buffer of the given resolution.
    pub fn new(res: Resolution) -> Self {
        Self::filled(res, Rgb8::BLACK)
    }

    /// Buffer uniformly filled with `color`.
    pub fn filled(res: Resolution, color: Rgb8) -> Self {
        let mut buf = Self::default();
        buf.reset(res, color);
        buf
    }

    /// Overwrite every pixel with `color`.
    pub fn fill(&mut self, color: Rgb8) {
        let px = color.to_array();
        for chunk in self.data.chunks_exact_mut(3) {
            chunk.copy_from_slice(&px);
        }
    }

    /// Resize to `res` (reusing the allocation) and fill with `color`.
    pub fn reset(&mut self, res: Resolution, color: Rgb8) {
        self.width = res.width;
        self.height = res.height;
        self.data.resize(res.frame_bytes(), 0);
        self.fill(color);
    }

    /// Pixel at `(x, y)`, `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data
            .get(i..i + 3)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Reject buffers whose shape does not match `expected`.
    pub fn validate(&self, expected: Resolution) -> BeatvizResult<()> {
        if self.width != expected.width || self.height != expected.height {
            return Err(BeatvizError::validation(format!(
                "frame size mismatch: got {}x{}, expected {expected}",
                self.width, self.height
            )));
        }
        if self.data.len() != expected.frame_bytes() {
            return Err(BeatvizError::validation(format!(
                "frame data length {} does not match {expected}x3 = {}",
                self.data.len(),
                expected.frame_bytes()
            )));
        }
        Ok(())
    }

    /// `true` when every pixel equals `color`.
    pub fn is_uniform(&self, color: Rgb8) -> bool {
        let px = color.to_array();
        self.data.chunks_exact(3).all(|p| p == px)
    }

    /// Write the buffer as a PNG file.
    pub fn save_png(&self, path: &Path) -> BeatvizResult<()> {
        use anyhow::Context as _;
        ensure_parent_dir(path)?;
        image::save_buffer_with_format(
            path,
            &self.data,
            self.width,
            self.height,
            image::ColorType::Rgb8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

/// Colors handed to synthesizers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Palette {
    /// Main accent color; synthesizers derive one from the audio when unset.
    pub primary: Option<Rgb8>,
    /// Secondary accent color.
    pub secondary: Option<Rgb8>,
    /// Background color.
    pub background: Rgb8,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            primary: None,
            secondary: None,
            background: Rgb8::new(10, 10, 10),
        }
    }
}

/// Everything a synthesizer sees during `setup`.
#[derive(Clone, Debug)]
pub struct SynthContext {
    /// Output resolution.
    pub resolution: Resolution,
    /// Shared, immutable audio features.
    pub features: Arc<AudioFeatureSet>,
    /// Configured colors.
    pub palette: Palette,
    /// Free-form synthesizer parameters (a JSON object or `null`).
    pub params: serde_json::Value,
}

impl SynthContext {
    /// Context with default palette and no parameters.
    pub fn new(resolution: Resolution, features: Arc<AudioFeatureSet>) -> Self {
        Self {
            resolution,
            features,
            palette: Palette::default(),
            params: serde_json::Value::Null,
        }
    }

    /// Numeric parameter `key`, or `default` when missing or not a number.
    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.params
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(default)
    }

    /// Integer parameter `key`, or `default` when missing or not a non-negative integer.
    pub fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.params
            .get(key)
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(default)
    }

    /// Color parameter `key` given as a hex string.
    pub fn param_color(&self, key: &str) -> anyhow::Result<Option<Rgb8>> {
        match self.params.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(Rgb8::from_hex(s)?)),
            Some(other) => anyhow::bail!("param '{key}' must be a hex color string, got {other}"),
        }
    }
}

/// Pluggable frame renderer.
///
/// `setup` runs once per instance before any frame. `render_frame` must overwrite `out` with a
/// frame of the context resolution and must be a pure function of the frame index and the
/// features given at setup: rendering the same index twice yields the same bytes.
///
/// Instances are never shared between threads; each worker builds its own from the registry.
pub trait FrameSynthesizer: Send {
    /// One-time initialization.
    fn setup(&mut self, ctx: &SynthContext) -> anyhow::Result<()>;

    /// Render frame `idx` into `out`.
    fn render_frame(&mut self, idx: FrameIndex, out: &mut FrameBuffer) -> anyhow::Result<()>;
}

#[cfg(test)]
#[path = "../../tests/unit/synth/contract.rs"]
mod tests;
