use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{BeatvizError, BeatvizResult};

/// Number of pitch classes in the chroma matrix.
pub const CHROMA_BINS: usize = 12;
/// Number of cepstral coefficients per frame.
pub const MFCC_COEFFS: usize = 13;
/// Number of autocorrelation lags per tempogram frame.
pub const TEMPOGRAM_LAGS: usize = 64;

/// Coarse content classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    /// Rhythmic, broadband content.
    Music,
    /// Voice-dominated or sparse content.
    Speech,
    /// Mixed content (never produced by the built-in heuristic, accepted from callers).
    Hybrid,
}

/// Feature that the analyzer deliberately did not compute for a large or long input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkippedFeature {
    /// Local tempo autocorrelation.
    Tempogram,
    /// Musical key estimation.
    Key,
}

/// Dense per-frame matrix in frame-major order: row `f` holds `width` values for frame `f`.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    frames: usize,
    width: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Wrap `data`, checking `data.len() == frames * width`.
    pub fn new(frames: usize, width: usize, data: Vec<f32>) -> BeatvizResult<Self> {
        let expected = frames.checked_mul(width).ok_or_else(|| {
            BeatvizError::validation("feature matrix dimensions overflow usize")
        })?;
        if data.len() != expected {
            return Err(BeatvizError::validation(format!(
                "feature matrix holds {} values, expected {frames}x{width}",
                data.len()
            )));
        }
        Ok(Self {
            frames,
            width,
            data,
        })
    }

    /// All-zero matrix.
    pub fn zeros(frames: usize, width: usize) -> Self {
        Self {
            frames,
            width,
            data: vec![0.0; frames * width],
        }
    }

    /// Number of frames (rows).
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Values per frame (columns). Zero for a skipped feature.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Values for frame `f`. Panics when `f >= frames()`.
    pub fn row(&self, f: usize) -> &[f32] {
        &self.data[f * self.width..(f + 1) * self.width]
    }

    /// Raw frame-major storage.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Owned inputs for [`AudioFeatureSet::from_parts`].
#[derive(Clone, Debug)]
pub struct FeatureParts {
    /// Audio duration in seconds.
    pub duration: f64,
    /// Sample rate the features were computed at.
    pub sample_rate: u32,
    /// Output frame rate.
    pub fps: Fps,
    /// Normalized loudness per frame.
    pub rms: Vec<f32>,
    /// Normalized onset strength per frame.
    pub onset: Vec<f32>,
    /// Normalized spectral centroid per frame.
    pub spectral_centroid: Vec<f32>,
    /// Normalized spectral rolloff per frame.
    pub spectral_rolloff: Vec<f32>,
    /// Normalized zero-crossing rate per frame.
    pub zero_crossing_rate: Vec<f32>,
    /// 12-bin chroma per frame.
    pub chroma: FeatureMatrix,
    /// Cepstral coefficients per frame.
    pub mfcc: FeatureMatrix,
    /// Tempogram per frame (width 0 when skipped).
    pub tempogram: FeatureMatrix,
    /// Global tempo estimate in BPM.
    pub tempo: f32,
    /// Estimated key, e.g. `"A minor"`.
    pub key: Option<String>,
    /// Content classification.
    pub mode: AudioMode,
    /// Features that were not computed.
    pub skipped: Vec<SkippedFeature>,
}

/// Immutable per-frame audio features aligned to an output frame rate.
///
/// Every per-frame array holds exactly `frame_count = floor(duration * fps)` entries.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFeatureSet {
    duration: f64,
    sample_rate: u32,
    fps: Fps,
    frame_count: u64,
    rms: Vec<f32>,
    onset: Vec<f32>,
    spectral_centroid: Vec<f32>,
    spectral_rolloff: Vec<f32>,
    zero_crossing_rate: Vec<f32>,
    chroma: FeatureMatrix,
    mfcc: FeatureMatrix,
    tempogram: FeatureMatrix,
    tempo: f32,
    key: Option<String>,
    mode: AudioMode,
    skipped: Vec<SkippedFeature>,
}

impl AudioFeatureSet {
    /// Build a feature set, enforcing the frame-count invariant on every per-frame array.
    pub fn from_parts(parts: FeatureParts) -> BeatvizResult<Self> {
        parts.fps.validate()?;
        if !parts.duration.is_finite() || parts.duration <= 0.0 {
            return Err(BeatvizError::validation(format!(
                "audio duration must be positive, got {}",
                parts.duration
            )));
        }
        let frame_count = parts.fps.secs_to_frames_floor(parts.duration);
        let n = usize::try_from(frame_count)
            .map_err(|_| BeatvizError::validation("frame count exceeds usize"))?;

        let series = [
            ("rms", parts.rms.len()),
            ("onset", parts.onset.len()),
            ("spectral_centroid", parts.spectral_centroid.len()),
            ("spectral_rolloff", parts.spectral_rolloff.len()),
            ("zero_crossing_rate", parts.zero_crossing_rate.len()),
            ("chroma", parts.chroma.frames()),
            ("mfcc", parts.mfcc.frames()),
            ("tempogram", parts.tempogram.frames()),
        ];
        for (name, len) in series {
            if len != n {
                return Err(BeatvizError::validation(format!(
                    "feature '{name}' has {len} frames, expected {n}"
                )));
            }
        }
        if parts.chroma.width() != CHROMA_BINS {
            return Err(BeatvizError::validation(format!(
                "chroma must have {CHROMA_BINS} bins, got {}",
                parts.chroma.width()
            )));
        }
        let tempogram_skipped = parts.skipped.contains(&SkippedFeature::Tempogram);
        if tempogram_skipped != (parts.tempogram.width() == 0) {
            return Err(BeatvizError::validation(
                "tempogram must be empty exactly when it is marked as skipped",
            ));
        }
        if parts.skipped.contains(&SkippedFeature::Key) && parts.key.is_some() {
            return Err(BeatvizError::validation(
                "key is marked as skipped but a value is present",
            ));
        }

        Ok(Self {
            duration: parts.duration,
            sample_rate: parts.sample_rate,
            fps: parts.fps,
            frame_count,
            rms: parts.rms,
            onset: parts.onset,
            spectral_centroid: parts.spectral_centroid,
            spectral_rolloff: parts.spectral_rolloff,
            zero_crossing_rate: parts.zero_crossing_rate,
            chroma: parts.chroma,
            mfcc: parts.mfcc,
            tempogram: parts.tempogram,
            tempo: parts.tempo,
            key: parts.key,
            mode: parts.mode,
            skipped: parts.skipped,
        })
    }

    /// Feature set for `duration` seconds of silence.
    pub fn silent(duration: f64, fps: Fps, sample_rate: u32) -> BeatvizResult<Self> {
        fps.validate()?;
        let n = fps.secs_to_frames_floor(duration.max(0.0)) as usize;
        Self::from_parts(FeatureParts {
            duration,
            sample_rate,
            fps,
            rms: vec![0.0; n],
            onset: vec![0.0; n],
            spectral_centroid: vec![0.0; n],
            spectral_rolloff: vec![0.0; n],
            zero_crossing_rate: vec![0.0; n],
            chroma: FeatureMatrix::zeros(n, CHROMA_BINS),
            mfcc: FeatureMatrix::zeros(n, MFCC_COEFFS),
            tempogram: FeatureMatrix::zeros(n, TEMPOGRAM_LAGS),
            tempo: 120.0,
            key: None,
            mode: AudioMode::Speech,
            skipped: Vec::new(),
        })
    }

    /// Audio duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Sample rate the features were computed at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Output frame rate the features are aligned to.
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// `floor(duration * fps)`.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Normalized loudness.
    pub fn rms(&self) -> &[f32] {
        &self.rms
    }

    /// Normalized onset strength.
    pub fn onset(&self) -> &[f32] {
        &self.onset
    }

    /// Normalized spectral centroid.
    pub fn spectral_centroid(&self) -> &[f32] {
        &self.spectral_centroid
    }

    /// Normalized spectral rolloff.
    pub fn spectral_rolloff(&self) -> &[f32] {
        &self.spectral_rolloff
    }

    /// Normalized zero-crossing rate.
    pub fn zero_crossing_rate(&self) -> &[f32] {
        &self.zero_crossing_rate
    }

    /// 12-bin chroma, C first.
    pub fn chroma(&self) -> &FeatureMatrix {
        &self.chroma
    }

    /// Cepstral coefficients.
    pub fn mfcc(&self) -> &FeatureMatrix {
        &self.mfcc
    }

    /// Tempogram (width 0 when skipped).
    pub fn tempogram(&self) -> &FeatureMatrix {
        &self.tempogram
    }

    /// Global tempo in BPM.
    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    /// Estimated key, `None` when undetermined or skipped.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Content classification.
    pub fn mode(&self) -> AudioMode {
        self.mode
    }

    /// Features skipped for large or long input.
    pub fn skipped(&self) -> &[SkippedFeature] {
        &self.skipped
    }

    /// Return `true` when `feature` was not computed.
    pub fn is_skipped(&self, feature: SkippedFeature) -> bool {
        self.skipped.contains(&feature)
    }

    /// Per-frame view; the index is clamped into `[0, frame_count)`.
    pub fn frame(&self, idx: FrameIndex) -> FrameFeatures<'_> {
        if self.frame_count == 0 {
            return FrameFeatures {
                index: 0,
                progress: 0.0,
                rms: 0.0,
                onset: 0.0,
                spectral_centroid: 0.0,
                spectral_rolloff: 0.0,
                zero_crossing_rate: 0.0,
                chroma: &[],
                mfcc: &[],
                tempogram: &[],
            };
        }
        let i = idx.0.min(self.frame_count - 1) as usize;
        FrameFeatures {
            index: i as u64,
            progress: i as f32 / self.frame_count as f32,
            rms: self.rms[i],
            onset: self.onset[i],
            spectral_centroid: self.spectral_centroid[i],
            spectral_rolloff: self.spectral_rolloff[i],
            zero_crossing_rate: self.zero_crossing_rate[i],
            chroma: self.chroma.row(i),
            mfcc: self.mfcc.row(i),
            tempogram: self.tempogram.row(i),
        }
    }

    /// Scalar summary for presentation layers.
    pub fn summary(&self) -> FeatureSummary {
        let mean = |x: &[f32]| crate::foundation::math::mean(x);
        FeatureSummary {
            duration: self.duration,
            sample_rate: self.sample_rate,
            fps: self.fps,
            frame_count: self.frame_count,
            tempo: self.tempo,
            key: self.key.clone(),
            mode: self.mode,
            skipped: self.skipped.clone(),
            mean_rms: mean(&self.rms),
            mean_onset: mean(&self.onset),
            mean_spectral_centroid: mean(&self.spectral_centroid),
        }
    }
}

/// Borrowed features for one output frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameFeatures<'a> {
    /// Clamped frame index the values were taken from.
    pub index: u64,
    /// `index / frame_count`, in `[0, 1)`.
    pub progress: f32,
    /// Normalized loudness.
    pub rms: f32,
    /// Normalized onset strength.
    pub onset: f32,
    /// Normalized spectral centroid.
    pub spectral_centroid: f32,
    /// Normalized spectral rolloff.
    pub spectral_rolloff: f32,
    /// Normalized zero-crossing rate.
    pub zero_crossing_rate: f32,
    /// 12-bin chroma.
    pub chroma: &'a [f32],
    /// Cepstral coefficients.
    pub mfcc: &'a [f32],
    /// Tempogram row (empty when skipped).
    pub tempogram: &'a [f32],
}

impl FrameFeatures<'_> {
    /// Index of the strongest pitch class (0 = C), `None` for silent chroma.
    pub fn dominant_pitch_class(&self) -> Option<usize> {
        let (i, v) = self
            .chroma
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 { (i, v) } else { best }
            });
        (v > 0.0).then_some(i)
    }
}

/// Scalar description of an analyzed track.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeatureSummary {
    /// Duration in seconds.
    pub duration: f64,
    /// Analysis sample rate.
    pub sample_rate: u32,
    /// Output frame rate.
    pub fps: Fps,
    /// Output frames.
    pub frame_count: u64,
    /// Tempo in BPM.
    pub tempo: f32,
    /// Estimated key.
    pub key: Option<String>,
    /// Content classification.
    pub mode: AudioMode,
    /// Skipped features.
    pub skipped: Vec<SkippedFeature>,
    /// Mean normalized loudness.
    pub mean_rms: f32,
    /// Mean normalized onset strength.
    pub mean_onset: f32,
    /// Mean normalized spectral centroid.
    pub mean_spectral_centroid: f32,
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/features.rs"]
mod tests;
