/// Round and saturate a float channel value into `0..=255`. NaN maps to 0.
pub(crate) fn clamp_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    v.round().clamp(0.0, 255.0) as u8
}

pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Min-max normalize in place to `[0, 1]`. Flat input (range below 1e-8) becomes all zeros.
pub(crate) fn normalize_min_max(x: &mut [f32]) {
    let (min, max) = x
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if x.is_empty() || !range.is_finite() || range < 1e-8 {
        x.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in x.iter_mut() {
        *v = (*v - min) / range;
    }
}

/// Linearly resample `src` onto `n` evenly spaced points spanning its first and last sample.
pub(crate) fn resample_linear(src: &[f32], n: usize) -> Vec<f32> {
    match (src.len(), n) {
        (_, 0) => Vec::new(),
        (0, n) => vec![0.0; n],
        (1, n) => vec![src[0]; n],
        (_, 1) => vec![src[0]],
        (len, n) => {
            let step = (len - 1) as f64 / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    let x = i as f64 * step;
                    let lo = (x.floor() as usize).min(len - 1);
                    let hi = (lo + 1).min(len - 1);
                    let t = (x - lo as f64) as f32;
                    lerp(src[lo], src[hi], t)
                })
                .collect()
        }
    }
}

pub(crate) fn mean(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|&v| f64::from(v)).sum::<f64>() / x.len() as f64) as f32
}

/// Population standard deviation.
pub(crate) fn std_dev(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    let m = f64::from(mean(x));
    let var = x
        .iter()
        .map(|&v| {
            let d = f64::from(v) - m;
            d * d
        })
        .sum::<f64>()
        / x.len() as f64;
    var.sqrt() as f32
}

/// HSV (all components in `[0, 1]`) to RGB8, truncating like `int(c * 255)`.
pub(crate) fn hsv_to_rgb8(h: f32, s: f32, v: f32) -> [u8; 3] {
    let h = h.rem_euclid(1.0);
    let s = s.clamp(0.0, 1.0);
    let v = v.clamp(0.0, 1.0);
    let to_u8 = |c: f32| (c * 255.0).clamp(0.0, 255.0) as u8;
    if s == 0.0 {
        return [to_u8(v); 3];
    }
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match (i as u32) % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    [to_u8(r), to_u8(g), to_u8(b)]
}

/// Small deterministic PRNG (splitmix64) for seeded per-frame noise.
#[derive(Clone, Debug)]
pub(crate) struct SplitMix64 {
    state: u64,
    spare_normal: Option<f64>,
}

impl SplitMix64 {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            state: seed,
            spare_normal: None,
        }
    }

    pub(crate) fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    /// Uniform in `[0, 1)`.
    pub(crate) fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Standard normal sample (Box-Muller, caching the second value).
    pub(crate) fn next_normal(&mut self) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        let u1 = (1.0 - self.next_f64()).max(f64::MIN_POSITIVE);
        let u2 = self.next_f64();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        self.spare_normal = Some(r * theta.sin());
        r * theta.cos()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
