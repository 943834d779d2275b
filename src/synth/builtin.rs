use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use anyhow::Context as _;
use vello_cpu::kurbo::Shape as _;

use crate::analysis::features::AudioFeatureSet;
use crate::foundation::core::{FrameIndex, Resolution, Rgb8};
use crate::foundation::math::hsv_to_rgb8;
use crate::synth::contract::{FrameBuffer, FrameSynthesizer, Palette, SynthContext};
use crate::synth::registry::SynthesizerFactory;

/// Built-in synthesizer ids and their factories.
pub(crate) fn factories() -> Vec<(&'static str, SynthesizerFactory)> {
    vec![
        ("pulsing_core", SynthesizerFactory::of::<PulsingCore>()),
        ("solid_color", SynthesizerFactory::of::<SolidColor>()),
        ("spectrum_bars", SynthesizerFactory::of::<SpectrumBars>()),
    ]
}

/// State captured by `setup`, shared by the drawn synthesizers.
#[derive(Clone, Debug)]
struct Setup {
    resolution: Resolution,
    features: Arc<AudioFeatureSet>,
    palette: Palette,
}

impl Setup {
    fn from_ctx(ctx: &SynthContext) -> anyhow::Result<Self> {
        ctx.resolution.validate()?;
        Ok(Self {
            resolution: ctx.resolution,
            features: ctx.features.clone(),
            palette: ctx.palette,
        })
    }

    fn width(&self) -> f64 {
        f64::from(self.resolution.width)
    }

    fn height(&self) -> f64 {
        f64::from(self.resolution.height)
    }

    /// Pixel scale relative to a 1080p short edge.
    fn scale(&self) -> f64 {
        self.width().min(self.height()) / 1080.0
    }
}

fn not_set_up() -> anyhow::Error {
    anyhow::anyhow!("render_frame called before setup")
}

/// Reusable vello_cpu raster target.
struct Canvas {
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    width: u16,
    height: u16,
}

impl Canvas {
    fn new(res: Resolution) -> anyhow::Result<Self> {
        let width = u16::try_from(res.width).context("canvas width exceeds u16")?;
        let height = u16::try_from(res.height).context("canvas height exceeds u16")?;
        Ok(Self {
            ctx: vello_cpu::RenderContext::new(width, height),
            pixmap: vello_cpu::Pixmap::new(width, height),
            width,
            height,
        })
    }

    fn begin(&mut self, background: Rgb8) {
        self.ctx.reset();
        self.ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        let (w, h) = (f64::from(self.width), f64::from(self.height));
        self.fill_rect(0.0, 0.0, w, h, background.to_array(), 255);
    }

    fn fill_rect(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, rgb: [u8; 3], alpha: u8) {
        self.ctx
            .set_paint(vello_cpu::peniko::Color::from_rgba8(rgb[0], rgb[1], rgb[2], alpha));
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(x0, y0, x1, y1));
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, r: f64, rgb: [u8; 3], alpha: u8) {
        if r <= 0.0 {
            return;
        }
        let circle = vello_cpu::kurbo::Circle::new((cx, cy), r);
        let mut p = vello_cpu::kurbo::BezPath::new();
        for el in circle.path_elements(0.1) {
            p.push(el);
        }
        self.ctx
            .set_paint(vello_cpu::peniko::Color::from_rgba8(rgb[0], rgb[1], rgb[2], alpha));
        self.ctx.fill_path(&p);
    }

    /// Rasterize and copy into `out`, dropping alpha. The opaque background makes the
    /// premultiplied pixels equal to straight RGB.
    fn finish_into(&mut self, out: &mut FrameBuffer) {
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);
        let res = Resolution {
            width: u32::from(self.width),
            height: u32::from(self.height),
        };
        if out.width != res.width || out.height != res.height || out.data.len() != res.frame_bytes()
        {
            out.reset(res, Rgb8::BLACK);
        }
        for (dst, src) in out
            .data
            .chunks_exact_mut(3)
            .zip(self.pixmap.data_as_u8_slice().chunks_exact(4))
        {
            dst.copy_from_slice(&src[..3]);
        }
    }
}

/// Uniform frame in `params.color`, else the palette primary, else the background.
#[derive(Debug, Default)]
pub struct SolidColor {
    state: Option<(Resolution, Rgb8)>,
}

impl FrameSynthesizer for SolidColor {
    fn setup(&mut self, ctx: &SynthContext) -> anyhow::Result<()> {
        ctx.resolution.validate()?;
        let color = ctx
            .param_color("color")?
            .or(ctx.palette.primary)
            .unwrap_or(ctx.palette.background);
        self.state = Some((ctx.resolution, color));
        Ok(())
    }

    fn render_frame(&mut self, _idx: FrameIndex, out: &mut FrameBuffer) -> anyhow::Result<()> {
        let (res, color) = self.state.ok_or_else(not_set_up)?;
        out.reset(res, color);
        Ok(())
    }
}

/// Loudness-driven disc colored by the dominant pitch class, with a glow, an onset particle
/// ring and a spectral-centroid trail.
#[derive(Default)]
pub struct PulsingCore {
    setup: Option<Setup>,
    canvas: Option<Canvas>,
}

impl FrameSynthesizer for PulsingCore {
    fn setup(&mut self, ctx: &SynthContext) -> anyhow::Result<()> {
        let setup = Setup::from_ctx(ctx)?;
        self.canvas = Some(Canvas::new(setup.resolution)?);
        self.setup = Some(setup);
        Ok(())
    }

    fn render_frame(&mut self, idx: FrameIndex, out: &mut FrameBuffer) -> anyhow::Result<()> {
        let (Some(s), Some(canvas)) = (self.setup.as_ref(), self.canvas.as_mut()) else {
            return Err(not_set_up());
        };
        let f = s.features.frame(idx);
        let (w, h, k) = (s.width(), s.height(), s.scale());
        let (cx, cy) = ((w / 2.0).floor(), (h / 2.0).floor());
        let base_radius = (w.min(h) / 6.0).floor();

        let hue = f.dominant_pitch_class().unwrap_or(0) as f32 / 12.0;
        let main = s
            .palette
            .primary
            .map_or_else(|| hsv_to_rgb8(hue, 0.8, 1.0), Rgb8::to_array);
        let secondary = s
            .palette
            .secondary
            .map_or_else(|| hsv_to_rgb8(hue, 0.8, 200.0 / 255.0), Rgb8::to_array);

        canvas.begin(s.palette.background);

        let rms = f64::from(f.rms);
        let radius = base_radius * (1.0 + rms * 0.8);
        for i in (0..3u32).rev() {
            let alpha = (100.0 * (1.0 - f64::from(i) / 3.0) * rms) as u8;
            if alpha > 10 {
                let offset = f64::from(i + 1) * 20.0 * k;
                canvas.fill_circle(cx, cy, radius + offset, main, alpha / 2);
            }
        }
        canvas.fill_circle(cx, cy, radius, main, 255);

        if f.onset > 0.3 {
            let ring_radius = base_radius * 1.8;
            let arc_start = ((idx.0 % 180) * 2) as f64;
            for j in 0..12u32 {
                let theta = (arc_start + f64::from(j) * 5.0).to_radians();
                let (x, y) = (cx + ring_radius * theta.cos(), cy + ring_radius * theta.sin());
                canvas.fill_circle(x, y, 4.0 * k.max(0.25), secondary, 255);
            }
        }

        const TRAIL: u64 = 20;
        for i in 0..TRAIL {
            let past = s.features.frame(FrameIndex(idx.0.saturating_sub(i)));
            let x = cx + (i as f64 - TRAIL as f64 / 2.0) * 30.0 * k;
            let y = h - 100.0 * k - f64::from(past.spectral_centroid) * 200.0 * k;
            let size = 10.0 * k * (1.0 - i as f64 / TRAIL as f64);
            canvas.fill_circle(x, y, size, main, 255);
        }

        canvas.finish_into(out);
        Ok(())
    }
}

/// Forty-band equalizer whose bar heights follow loudness and onset waves, hued from chroma.
#[derive(Default)]
pub struct SpectrumBars {
    setup: Option<Setup>,
    canvas: Option<Canvas>,
}

const NUM_BARS: u32 = 40;

impl FrameSynthesizer for SpectrumBars {
    fn setup(&mut self, ctx: &SynthContext) -> anyhow::Result<()> {
        let setup = Setup::from_ctx(ctx)?;
        self.canvas = Some(Canvas::new(setup.resolution)?);
        self.setup = Some(setup);
        Ok(())
    }

    fn render_frame(&mut self, idx: FrameIndex, out: &mut FrameBuffer) -> anyhow::Result<()> {
        let (Some(s), Some(canvas)) = (self.setup.as_ref(), self.canvas.as_mut()) else {
            return Err(not_set_up());
        };
        let f = s.features.frame(idx);
        let (w, h) = (s.width(), s.height());
        let bar_width = (w / f64::from(NUM_BARS + 4)).floor().max(1.0);
        let bar_spacing = (bar_width / 4.0).floor();
        let max_bar_height = (h * 0.7).floor();
        let base_y = (h * 0.85).floor();
        let total_width = f64::from(NUM_BARS) * (bar_width + bar_spacing);
        let start_x = ((w - total_width) / 2.0).floor();

        let (rms, onset) = (f64::from(f.rms), f64::from(f.onset));
        let base_hue = f.dominant_pitch_class().unwrap_or(0) as f64 / 12.0;
        let time_offset = idx.0 as f64 * 0.1;

        canvas.begin(s.palette.background);

        for i in 0..NUM_BARS {
            let phase = f64::from(i) / f64::from(NUM_BARS) * TAU;
            let wave1 = (phase + time_offset + rms * PI).sin() * 0.5 + 0.5;
            let wave2 = (phase * 2.0 + time_offset * 1.5).sin() * 0.3 + 0.3;
            let wave3 = onset * (phase * 3.0 + time_offset * 2.0).sin() * 0.2;
            let height_factor = ((wave1 + wave2 + wave3) / 1.5 * rms * 1.5).clamp(0.1, 1.0);
            let bar_height = (max_bar_height * height_factor).floor();

            let hue = (base_hue + f64::from(i) / f64::from(NUM_BARS) * 0.3).rem_euclid(1.0);
            let saturation = 0.7 + f64::from(f.spectral_centroid) * 0.3;
            let value = 0.5 + height_factor * 0.5;
            let mut color = hsv_to_rgb8(hue as f32, saturation as f32, value as f32);
            if let Some(primary) = s.palette.primary {
                for (c, p) in color.iter_mut().zip(primary.to_array()) {
                    *c = (f64::from(p) * 0.5 + f64::from(*c) * 0.5) as u8;
                }
            }

            let x = start_x + f64::from(i) * (bar_width + bar_spacing);
            let y_top = base_y - bar_height;
            canvas.fill_rect(x, y_top, x + bar_width, base_y, color, 255);

            let glow = color.map(|c| c.saturating_add(50));
            canvas.fill_rect(x, y_top - 3.0, x + bar_width, y_top + 3.0, glow, 255);
        }

        let reflection_height = (max_bar_height / 4.0).floor() as u32;
        for y in 0..reflection_height {
            let alpha = 1.0 - f64::from(y) / f64::from(reflection_height);
            let gray = (20.0 + 30.0 * alpha * rms) as u8;
            let row = base_y + f64::from(y);
            canvas.fill_rect(0.0, row, w, row + 1.0, [gray; 3], 255);
        }

        if f.onset > 0.4 {
            let flash = (onset * 30.0) as u8;
            canvas.fill_rect(0.0, 0.0, w, h, [255; 3], flash);
        }

        canvas.finish_into(out);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/synth/builtin.rs"]
mod tests;
