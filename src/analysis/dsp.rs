use std::sync::Arc;

use realfft::num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};

use crate::analysis::features::{AudioMode, CHROMA_BINS, MFCC_COEFFS};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::math::{mean, std_dev};

pub(crate) const N_FFT: usize = 2048;
pub(crate) const N_MELS: usize = 40;
const MIN_HOP: usize = 512;
const ROLLOFF_PERCENT: f32 = 0.85;
const TOP_DB: f32 = 80.0;
const AMIN: f32 = 1e-10;
const CHROMA_MIN_HZ: f32 = 20.0;
const DEFAULT_TEMPO: f32 = 120.0;
const MODE_BANDWIDTH_WINDOW_SECS: f64 = 5.0;

const KEY_NAMES: [&str; CHROMA_BINS] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
// Krumhansl-Kessler tonal hierarchy profiles, tonic first.
const MAJOR_PROFILE: [f32; CHROMA_BINS] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; CHROMA_BINS] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Analysis hop in samples: one analysis frame per output frame, never below 512 samples.
pub(crate) fn hop_length(sample_rate: u32, analysis_fps: f64) -> usize {
    if analysis_fps <= 0.0 {
        return MIN_HOP;
    }
    ((f64::from(sample_rate) / analysis_fps) as usize).max(MIN_HOP)
}

/// Raw (un-normalized) features at the analysis frame rate.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpectralSeries {
    pub(crate) frames: usize,
    /// Analysis frames per second.
    pub(crate) frame_rate: f64,
    pub(crate) rms: Vec<f32>,
    pub(crate) zcr: Vec<f32>,
    pub(crate) centroid: Vec<f32>,
    pub(crate) rolloff: Vec<f32>,
    pub(crate) bandwidth: Vec<f32>,
    pub(crate) onset: Vec<f32>,
    /// Frame-major, `CHROMA_BINS` per frame.
    pub(crate) chroma: Vec<f32>,
    /// Frame-major, `MFCC_COEFFS` per frame.
    pub(crate) mfcc: Vec<f32>,
}

struct MelFilter {
    first_bin: usize,
    weights: Vec<f32>,
}

struct Stft {
    plan: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl Stft {
    fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(N_FFT);
        let window = (0..N_FFT)
            .map(|i| {
                0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / N_FFT as f32).cos()
            })
            .collect();
        Self {
            input: plan.make_input_vec(),
            spectrum: plan.make_output_vec(),
            scratch: plan.make_scratch_vec(),
            plan,
            window,
        }
    }

    fn process(&mut self, frame: &[f32]) -> BeatvizResult<&[Complex32]> {
        for ((dst, &x), &w) in self.input.iter_mut().zip(frame).zip(&self.window) {
            *dst = x * w;
        }
        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .map_err(|e| BeatvizError::Other(anyhow::anyhow!("fft failed: {e}")))?;
        Ok(&self.spectrum)
    }
}

fn hz_to_mel(f: f32) -> f32 {
    2595.0 * (1.0 + f / 700.0).log10()
}

fn mel_to_hz(m: f32) -> f32 {
    700.0 * (10f32.powf(m / 2595.0) - 1.0)
}

fn mel_filterbank(sample_rate: u32, bins: usize) -> Vec<MelFilter> {
    let nyquist = sample_rate as f32 / 2.0;
    let mel_max = hz_to_mel(nyquist);
    let edges = (0..N_MELS + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (N_MELS + 1) as f32))
        .collect::<Vec<_>>();
    let bin_hz = sample_rate as f32 / N_FFT as f32;

    (0..N_MELS)
        .map(|m| {
            let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
            let mut first_bin = None;
            let mut weights = Vec::new();
            for k in 0..bins {
                let f = k as f32 * bin_hz;
                let rise = (f - lower) / (center - lower).max(f32::EPSILON);
                let fall = (upper - f) / (upper - center).max(f32::EPSILON);
                let w = rise.min(fall).max(0.0);
                if w > 0.0 {
                    first_bin.get_or_insert(k);
                    weights.push(w);
                } else if first_bin.is_some() {
                    break;
                }
            }
            MelFilter {
                first_bin: first_bin.unwrap_or(0),
                weights,
            }
        })
        .collect()
}

fn chroma_map(sample_rate: u32, bins: usize) -> Vec<Option<usize>> {
    let bin_hz = sample_rate as f32 / N_FFT as f32;
    (0..bins)
        .map(|k| {
            let f = k as f32 * bin_hz;
            if f < CHROMA_MIN_HZ {
                return None;
            }
            // A4 = 440 Hz is pitch class 9 when C is 0.
            let semis = (12.0 * (f / 440.0).log2()).round() as i64;
            Some((semis + 9).rem_euclid(CHROMA_BINS as i64) as usize)
        })
        .collect()
}

/// Orthonormal DCT-II basis, `MFCC_COEFFS` rows of `N_MELS`.
fn dct_basis() -> Vec<f32> {
    let n = N_MELS as f32;
    let mut basis = Vec::with_capacity(MFCC_COEFFS * N_MELS);
    for k in 0..MFCC_COEFFS {
        let scale = if k == 0 {
            (1.0 / n).sqrt()
        } else {
            (2.0 / n).sqrt()
        };
        for i in 0..N_MELS {
            let angle = std::f32::consts::PI / n * (i as f32 + 0.5) * k as f32;
            basis.push(scale * angle.cos());
        }
    }
    basis
}

/// Run a centered, zero-padded 2048-point STFT over `samples` and derive per-frame features.
///
/// Frames are processed one at a time; only the per-frame results are retained.
pub(crate) fn spectral_series(
    samples: &[f32],
    sample_rate: u32,
    hop: usize,
) -> BeatvizResult<SpectralSeries> {
    if sample_rate == 0 || hop == 0 {
        return Err(BeatvizError::validation(
            "sample rate and hop length must be non-zero",
        ));
    }
    let frames = samples.len() / hop + 1;
    let bins = N_FFT / 2 + 1;
    let bin_hz = sample_rate as f32 / N_FFT as f32;

    let mut stft = Stft::new();
    let filters = mel_filterbank(sample_rate, bins);
    let pitch_class = chroma_map(sample_rate, bins);

    let mut out = SpectralSeries {
        frames,
        frame_rate: f64::from(sample_rate) / hop as f64,
        rms: Vec::with_capacity(frames),
        zcr: Vec::with_capacity(frames),
        centroid: Vec::with_capacity(frames),
        rolloff: Vec::with_capacity(frames),
        bandwidth: Vec::with_capacity(frames),
        onset: Vec::with_capacity(frames),
        chroma: Vec::with_capacity(frames * CHROMA_BINS),
        mfcc: Vec::with_capacity(frames * MFCC_COEFFS),
    };
    let mut mel_db = Vec::<f32>::with_capacity(frames * N_MELS);
    let mut frame = vec![0.0f32; N_FFT];
    let mut magnitude = vec![0.0f32; bins];
    let mut power = vec![0.0f32; bins];

    for t in 0..frames {
        let start = (t * hop) as isize - (N_FFT / 2) as isize;
        for (i, dst) in frame.iter_mut().enumerate() {
            let idx = start + i as isize;
            *dst = if idx >= 0 && (idx as usize) < samples.len() {
                samples[idx as usize]
            } else {
                0.0
            };
        }

        let energy = frame.iter().map(|&x| x * x).sum::<f32>() / N_FFT as f32;
        out.rms.push(energy.sqrt());
        let crossings = frame
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        out.zcr.push(crossings as f32 / N_FFT as f32);

        let spectrum = stft.process(&frame)?;
        for ((m, p), c) in magnitude.iter_mut().zip(power.iter_mut()).zip(spectrum) {
            *p = c.norm_sqr();
            *m = p.sqrt();
        }

        let mag_sum = magnitude.iter().sum::<f32>();
        let (centroid, rolloff, bandwidth) = if mag_sum > AMIN {
            let centroid = magnitude
                .iter()
                .enumerate()
                .map(|(k, &m)| k as f32 * bin_hz * m)
                .sum::<f32>()
                / mag_sum;
            let threshold = ROLLOFF_PERCENT * mag_sum;
            let mut acc = 0.0;
            let mut rolloff_bin = bins - 1;
            for (k, &m) in magnitude.iter().enumerate() {
                acc += m;
                if acc >= threshold {
                    rolloff_bin = k;
                    break;
                }
            }
            let spread = magnitude
                .iter()
                .enumerate()
                .map(|(k, &m)| {
                    let d = k as f32 * bin_hz - centroid;
                    m * d * d
                })
                .sum::<f32>()
                / mag_sum;
            (centroid, rolloff_bin as f32 * bin_hz, spread.sqrt())
        } else {
            (0.0, 0.0, 0.0)
        };
        out.centroid.push(centroid);
        out.rolloff.push(rolloff);
        out.bandwidth.push(bandwidth);

        for filter in &filters {
            let energy = filter
                .weights
                .iter()
                .zip(&power[filter.first_bin..])
                .map(|(w, p)| w * p)
                .sum::<f32>();
            mel_db.push(10.0 * energy.max(AMIN).log10());
        }

        let mut chroma = [0.0f32; CHROMA_BINS];
        for (pc, p) in pitch_class.iter().zip(&power) {
            if let Some(pc) = pc {
                chroma[*pc] += p;
            }
        }
        let peak = chroma.iter().copied().fold(0.0f32, f32::max);
        if peak > AMIN {
            chroma.iter_mut().for_each(|c| *c /= peak);
        } else {
            chroma = [0.0; CHROMA_BINS];
        }
        out.chroma.extend_from_slice(&chroma);
    }

    let db_max = mel_db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor = db_max - TOP_DB;
    mel_db.iter_mut().for_each(|v| *v = v.max(floor));

    let basis = dct_basis();
    for t in 0..frames {
        let row = &mel_db[t * N_MELS..(t + 1) * N_MELS];
        for k in 0..MFCC_COEFFS {
            let b = &basis[k * N_MELS..(k + 1) * N_MELS];
            out.mfcc
                .push(row.iter().zip(b).map(|(x, w)| x * w).sum::<f32>());
        }

        let flux = if t == 0 {
            0.0
        } else {
            let prev = &mel_db[(t - 1) * N_MELS..t * N_MELS];
            row.iter()
                .zip(prev)
                .map(|(a, b)| (a - b).max(0.0))
                .sum::<f32>()
                / N_MELS as f32
        };
        out.onset.push(flux);
    }

    Ok(out)
}

/// Global tempo from the onset envelope autocorrelation, weighted toward 120 BPM.
pub(crate) fn estimate_tempo(onset: &[f32], frame_rate: f64) -> f32 {
    let n = onset.len();
    if n < 4 || frame_rate <= 0.0 || std_dev(onset) < 1e-8 {
        return DEFAULT_TEMPO;
    }
    let m = mean(onset);
    let centered = onset.iter().map(|&v| v - m).collect::<Vec<_>>();

    let lag_min = ((60.0 * frame_rate / 240.0).ceil() as usize).max(1);
    let lag_max = ((60.0 * frame_rate / 40.0).floor() as usize).min(n - 1);
    if lag_min > lag_max {
        return DEFAULT_TEMPO;
    }

    let mut best: Option<(f64, usize)> = None;
    for lag in lag_min..=lag_max {
        let ac = centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| f64::from(a * b))
            .sum::<f64>();
        let bpm = 60.0 * frame_rate / lag as f64;
        let prior = (-0.5 * (bpm / f64::from(DEFAULT_TEMPO)).log2().powi(2)).exp();
        let score = ac * prior;
        if score > 0.0 && best.is_none_or(|(s, _)| score > s) {
            best = Some((score, lag));
        }
    }

    match best {
        Some((_, lag)) => (60.0 * frame_rate / lag as f64) as f32,
        None => DEFAULT_TEMPO,
    }
}

/// Local onset autocorrelation, `lags` values per frame, each row normalized by lag 0.
pub(crate) fn tempogram(onset: &[f32], lags: usize) -> Vec<f32> {
    let n = onset.len();
    let half = lags as isize;
    let at = |i: isize| -> f32 {
        if i >= 0 && (i as usize) < n {
            onset[i as usize]
        } else {
            0.0
        }
    };

    let mut out = Vec::with_capacity(n * lags);
    for t in 0..n as isize {
        let lo = t - half;
        let hi = t + half;
        let mut row = vec![0.0f32; lags];
        for (lag, slot) in row.iter_mut().enumerate() {
            let lag = lag as isize;
            let mut acc = 0.0f32;
            let mut i = lo;
            while i + lag < hi {
                acc += at(i) * at(i + lag);
                i += 1;
            }
            *slot = acc;
        }
        let norm = row[0];
        if norm > AMIN {
            row.iter_mut().for_each(|v| *v /= norm);
        } else {
            row.iter_mut().for_each(|v| *v = 0.0);
        }
        out.extend_from_slice(&row);
    }
    out
}

/// Best-correlating major or minor key for the mean chroma vector.
pub(crate) fn estimate_key(chroma: &[f32], frames: usize) -> Option<String> {
    if frames == 0 {
        return None;
    }
    let mut avg = [0.0f32; CHROMA_BINS];
    for row in chroma.chunks_exact(CHROMA_BINS) {
        for (a, v) in avg.iter_mut().zip(row) {
            *a += v;
        }
    }
    avg.iter_mut().for_each(|a| *a /= frames as f32);
    if std_dev(&avg) < 1e-6 {
        return None;
    }

    let mut best: Option<(f32, usize, &str)> = None;
    for (profile, quality) in [(MAJOR_PROFILE, "major"), (MINOR_PROFILE, "minor")] {
        for tonic in 0..CHROMA_BINS {
            let rotated = (0..CHROMA_BINS)
                .map(|i| profile[(i + CHROMA_BINS - tonic) % CHROMA_BINS])
                .collect::<Vec<_>>();
            let r = pearson(&avg, &rotated);
            if best.is_none_or(|(s, _, _)| r > s) {
                best = Some((r, tonic, quality));
            }
        }
    }
    best.map(|(_, tonic, quality)| format!("{} {quality}", KEY_NAMES[tonic]))
}

fn pearson(a: &[f32], b: &[f32]) -> f32 {
    let ma = mean(a);
    let mb = mean(b);
    let mut num = 0.0;
    let mut da = 0.0;
    let mut db = 0.0;
    for (x, y) in a.iter().zip(b) {
        num += (x - ma) * (y - mb);
        da += (x - ma) * (x - ma);
        db += (y - mb) * (y - mb);
    }
    let den = (da * db).sqrt();
    if den <= f32::EPSILON { 0.0 } else { num / den }
}

/// Music when the track is rhythmic, has a varied onset envelope and a wide spectrum early on.
pub(crate) fn classify_mode(series: &SpectralSeries, tempo: f32) -> AudioMode {
    let window = ((MODE_BANDWIDTH_WINDOW_SECS * series.frame_rate).ceil() as usize)
        .clamp(1, series.bandwidth.len().max(1));
    let bandwidth = mean(&series.bandwidth[..window.min(series.bandwidth.len())]);
    if tempo > 60.0 && std_dev(&series.onset) > 0.1 && bandwidth > 2000.0 {
        AudioMode::Music
    } else {
        AudioMode::Speech
    }
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/dsp.rs"]
mod tests;
