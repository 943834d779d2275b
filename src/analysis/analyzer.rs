use std::path::{Path, PathBuf};

use crate::analysis::cache::{CacheLookup, FeatureCache};
use crate::analysis::decode::{DecodedAudio, decode_mono};
use crate::analysis::dsp::{
    classify_mode, estimate_key, estimate_tempo, hop_length, spectral_series, tempogram,
};
use crate::analysis::features::{
    AudioFeatureSet, CHROMA_BINS, FeatureMatrix, FeatureParts, MFCC_COEFFS, SkippedFeature,
    TEMPOGRAM_LAGS,
};
use crate::analysis::fingerprint::{AnalysisParams, cache_key, content_hash};
use crate::foundation::core::Fps;
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::math::{normalize_min_max, resample_linear};

/// Version of the feature extraction algorithm. Part of every cache key.
pub const ANALYSIS_SCHEMA_VERSION: u32 = 1;

/// Analyzer configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AnalyzerOpts {
    /// Cache directory; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Inputs larger than this are analyzed at `reduced_sample_rate`.
    pub large_file_bytes: u64,
    /// Inputs longer than this are analyzed at a reduced frame rate without tempogram and key.
    pub long_duration_secs: f64,
    /// Analysis frame-rate divisor for long inputs.
    pub long_file_hop_factor: u32,
    /// Sample rate used for large or long inputs.
    pub reduced_sample_rate: u32,
    /// Analysis schema version written to and required from the cache.
    pub schema_version: u32,
}

impl Default for AnalyzerOpts {
    fn default() -> Self {
        Self {
            cache_dir: Some(PathBuf::from(".cache/audio_features")),
            large_file_bytes: 200 * 1024 * 1024,
            long_duration_secs: 600.0,
            long_file_hop_factor: 4,
            reduced_sample_rate: 22_050,
            schema_version: ANALYSIS_SCHEMA_VERSION,
        }
    }
}

impl AnalyzerOpts {
    /// Default options with caching disabled.
    pub fn uncached() -> Self {
        Self {
            cache_dir: None,
            ..Self::default()
        }
    }

    /// Reject settings that would make analysis meaningless.
    pub fn validate(&self) -> BeatvizResult<()> {
        if self.long_file_hop_factor == 0 {
            return Err(BeatvizError::validation(
                "analysis long_file_hop_factor must be >= 1",
            ));
        }
        if self.reduced_sample_rate == 0 {
            return Err(BeatvizError::validation(
                "analysis reduced_sample_rate must be > 0",
            ));
        }
        if !self.long_duration_secs.is_finite() || self.long_duration_secs <= 0.0 {
            return Err(BeatvizError::validation(
                "analysis long_duration_secs must be positive",
            ));
        }
        Ok(())
    }

    fn params(&self) -> AnalysisParams {
        AnalysisParams {
            large_file_bytes: self.large_file_bytes,
            long_duration_secs: self.long_duration_secs,
            long_file_hop_factor: self.long_file_hop_factor,
            reduced_sample_rate: self.reduced_sample_rate,
        }
    }
}

/// How a feature set was obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Caching is disabled.
    Disabled,
    /// Loaded from a matching cache entry.
    Hit,
    /// No entry existed (or a re-analysis was forced); computed and stored.
    Miss,
    /// An entry existed but was unusable; recomputed and overwritten.
    Recovered(String),
}

/// Decodes audio into an [`AudioFeatureSet`], backed by a versioned on-disk cache.
#[derive(Clone, Debug)]
pub struct AudioAnalyzer {
    opts: AnalyzerOpts,
    cache: Option<FeatureCache>,
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerOpts::default())
    }
}

impl AudioAnalyzer {
    /// Create an analyzer.
    pub fn new(opts: AnalyzerOpts) -> Self {
        let cache = opts.cache_dir.clone().map(FeatureCache::new);
        Self { opts, cache }
    }

    /// Analyzer without a cache.
    pub fn uncached() -> Self {
        Self::new(AnalyzerOpts::uncached())
    }

    /// Analyzer options.
    pub fn opts(&self) -> &AnalyzerOpts {
        &self.opts
    }

    /// Backing cache, if enabled.
    pub fn cache(&self) -> Option<&FeatureCache> {
        self.cache.as_ref()
    }

    /// Analyze `path` at `fps`, using the cache when possible.
    pub fn analyze(&self, path: &Path, fps: Fps) -> BeatvizResult<AudioFeatureSet> {
        self.analyze_with_status(path, fps).map(|(set, _)| set)
    }

    /// Like [`AudioAnalyzer::analyze`] but also reports how the result was obtained.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub fn analyze_with_status(
        &self,
        path: &Path,
        fps: Fps,
    ) -> BeatvizResult<(AudioFeatureSet, CacheStatus)> {
        self.run(path, fps, false)
    }

    /// Recompute features even when a valid cache entry exists, then overwrite it.
    #[tracing::instrument(skip(self, path), fields(path = %path.display()))]
    pub fn reanalyze(&self, path: &Path, fps: Fps) -> BeatvizResult<AudioFeatureSet> {
        self.run(path, fps, true).map(|(set, _)| set)
    }

    /// Delete all cache entries. Returns the number removed.
    pub fn clear_cache(&self) -> BeatvizResult<usize> {
        match &self.cache {
            Some(cache) => cache.clear(),
            None => Ok(0),
        }
    }

    fn run(
        &self,
        path: &Path,
        fps: Fps,
        force: bool,
    ) -> BeatvizResult<(AudioFeatureSet, CacheStatus)> {
        fps.validate()?;
        self.opts.validate()?;

        let Some(cache) = &self.cache else {
            return Ok((self.compute(path, fps)?, CacheStatus::Disabled));
        };

        let lookup = CacheLookup {
            fingerprint: cache_key(
                content_hash(path)?,
                fps,
                self.opts.schema_version,
                &self.opts.params(),
            ),
            fps,
            schema_version: self.opts.schema_version,
        };

        let mut status = CacheStatus::Miss;
        if !force {
            match cache.load(&lookup) {
                Ok(Some(set)) => {
                    tracing::debug!(entry = %lookup.fingerprint.to_hex(), "feature cache hit");
                    return Ok((set, CacheStatus::Hit));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "unusable feature cache entry, recomputing");
                    status = CacheStatus::Recovered(e.to_string());
                }
            }
        }

        let set = self.compute(path, fps)?;
        if let Err(e) = cache.store(&lookup, &set) {
            tracing::warn!(error = %e, "failed to persist feature cache entry");
        }
        Ok((set, status))
    }

    fn compute(&self, path: &Path, fps: Fps) -> BeatvizResult<AudioFeatureSet> {
        let file_bytes = std::fs::metadata(path)
            .map_err(|e| {
                BeatvizError::decode(format!("failed to stat audio '{}': {e}", path.display()))
            })?
            .len();
        let audio = decode_mono(path)?;
        let duration = audio.duration_secs();
        if duration <= 0.0 {
            return Err(BeatvizError::validation(format!(
                "audio '{}' has no samples",
                path.display()
            )));
        }

        let is_large = file_bytes > self.opts.large_file_bytes;
        let is_long = duration > self.opts.long_duration_secs;
        let audio = if is_large || is_long {
            tracing::info!(
                file_bytes,
                duration,
                sample_rate = self.opts.reduced_sample_rate,
                "large input, analyzing at reduced sample rate"
            );
            audio.downsampled_to(self.opts.reduced_sample_rate)
        } else {
            audio
        };
        let analysis_fps = if is_long {
            fps.as_f64() / f64::from(self.opts.long_file_hop_factor)
        } else {
            fps.as_f64()
        };

        extract_features(&audio, fps, analysis_fps, is_long)
    }
}

/// Turn decoded audio into a frame-aligned feature set.
pub(crate) fn extract_features(
    audio: &DecodedAudio,
    fps: Fps,
    analysis_fps: f64,
    reduced: bool,
) -> BeatvizResult<AudioFeatureSet> {
    let duration = audio.duration_secs();
    let hop = hop_length(audio.sample_rate, analysis_fps);
    tracing::debug!(duration, sample_rate = audio.sample_rate, hop, "extracting features");

    let series = spectral_series(&audio.samples, audio.sample_rate, hop)?;
    let n = usize::try_from(fps.secs_to_frames_floor(duration))
        .map_err(|_| BeatvizError::validation("frame count exceeds usize"))?;

    let tempo = estimate_tempo(&series.onset, series.frame_rate);
    let mode = classify_mode(&series, tempo);

    let mut skipped = Vec::new();
    let tempogram = if reduced {
        skipped.push(SkippedFeature::Tempogram);
        FeatureMatrix::zeros(n, 0)
    } else {
        let raw = tempogram(&series.onset, TEMPOGRAM_LAGS);
        FeatureMatrix::new(
            n,
            TEMPOGRAM_LAGS,
            resample_columns(&raw, TEMPOGRAM_LAGS, n),
        )?
    };
    let key = if reduced {
        skipped.push(SkippedFeature::Key);
        None
    } else {
        estimate_key(&series.chroma, series.frames)
    };

    let mut rms = series.rms.clone();
    normalize_min_max(&mut rms);
    let mut onset = series.onset.clone();
    normalize_min_max(&mut onset);
    let normalized_after = |raw: &[f32]| {
        let mut v = resample_linear(raw, n);
        normalize_min_max(&mut v);
        v
    };

    AudioFeatureSet::from_parts(FeatureParts {
        duration,
        sample_rate: audio.sample_rate,
        fps,
        rms: resample_linear(&rms, n),
        onset: resample_linear(&onset, n),
        spectral_centroid: normalized_after(&series.centroid),
        spectral_rolloff: normalized_after(&series.rolloff),
        zero_crossing_rate: normalized_after(&series.zcr),
        chroma: FeatureMatrix::new(
            n,
            CHROMA_BINS,
            resample_columns(&series.chroma, CHROMA_BINS, n),
        )?,
        mfcc: FeatureMatrix::new(
            n,
            MFCC_COEFFS,
            resample_columns(&series.mfcc, MFCC_COEFFS, n),
        )?,
        tempogram,
        tempo,
        key,
        mode,
        skipped,
    })
}

/// Resample each column of a frame-major matrix to `frames` rows.
fn resample_columns(data: &[f32], width: usize, frames: usize) -> Vec<f32> {
    if width == 0 {
        return Vec::new();
    }
    let src_frames = data.len() / width;
    let mut out = vec![0.0f32; frames * width];
    let mut column = Vec::with_capacity(src_frames);
    for c in 0..width {
        column.clear();
        column.extend((0..src_frames).map(|f| data[f * width + c]));
        for (f, v) in resample_linear(&column, frames).into_iter().enumerate() {
            out[f * width + c] = v;
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/analyzer.rs"]
mod tests;
