//! Job configuration, loaded from JSON.
//!
//! A [`JobConfig`] names the audio input and video output and carries every engine setting with a
//! serde default, so a minimal config is just `{"audio": "...", "output": "..."}`. An optional
//! [`ExportProfile`] overrides resolution, frame rate and encoder settings with platform presets.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::analysis::analyzer::AnalyzerOpts;
use crate::encode::ffmpeg::EncoderSettings;
use crate::foundation::core::{FrameRange, Fps, Resolution, Rgb8};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::postprocess::PostProcessConfig;
use crate::render::job::{RenderJob, RenderOpts};
use crate::synth::contract::Palette;

const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "flac", "aac", "ogg", "m4a"];
const MIN_RESOLUTION: Resolution = Resolution {
    width: 320,
    height: 240,
};
const MAX_RESOLUTION: Resolution = Resolution {
    width: 3840,
    height: 2160,
};

/// Platform export presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportProfile {
    /// 1920x1080 at 60 fps, high quality.
    Youtube,
    /// 3840x2160 at 60 fps.
    #[serde(rename = "youtube_4k")]
    Youtube4k,
    /// 1080x1080 at 30 fps, at most 60 s.
    InstagramFeed,
    /// 1080x1920 at 30 fps, at most 90 s.
    InstagramReels,
    /// 1080x1920 at 30 fps, at most 180 s.
    Tiktok,
    /// 1080x1920 at 60 fps, at most 180 s.
    TiktokHd,
    /// 1920x1080 at 60 fps with default encoder settings.
    Custom,
}

/// Values an [`ExportProfile`] imposes on a job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileSettings {
    /// Output resolution.
    pub resolution: Resolution,
    /// Output frame rate.
    pub fps: u32,
    /// x264 preset.
    pub preset: &'static str,
    /// Constant rate factor.
    pub crf: u8,
    /// AAC bitrate.
    pub audio_bitrate: &'static str,
    /// Longest accepted audio, in seconds.
    pub max_duration_secs: Option<u32>,
}

impl ExportProfile {
    /// Every profile, in display order.
    pub const ALL: [Self; 7] = [
        Self::Youtube,
        Self::Youtube4k,
        Self::InstagramFeed,
        Self::InstagramReels,
        Self::Tiktok,
        Self::TiktokHd,
        Self::Custom,
    ];

    /// Preset values.
    pub fn settings(self) -> ProfileSettings {
        let (width, height, fps, preset, crf, audio_bitrate, max_duration_secs) = match self {
            Self::Youtube => (1920, 1080, 60, "slow", 18, "320k", None),
            Self::Youtube4k => (3840, 2160, 60, "medium", 20, "320k", None),
            Self::InstagramFeed => (1080, 1080, 30, "medium", 23, "128k", Some(60)),
            Self::InstagramReels => (1080, 1920, 30, "medium", 23, "128k", Some(90)),
            Self::Tiktok => (1080, 1920, 30, "fast", 25, "128k", Some(180)),
            Self::TiktokHd => (1080, 1920, 60, "medium", 20, "192k", Some(180)),
            Self::Custom => (1920, 1080, 60, "medium", 23, "320k", None),
        };
        ProfileSettings {
            resolution: Resolution { width, height },
            fps,
            preset,
            crf,
            audio_bitrate,
            max_duration_secs,
        }
    }
}

/// What to draw.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Registry id of the synthesizer.
    pub synthesizer: String,
    /// Output resolution.
    pub resolution: Resolution,
    /// Output frames per second.
    pub fps: u32,
    /// Colors.
    pub palette: Palette,
    /// Synthesizer parameters.
    pub params: serde_json::Value,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            synthesizer: "pulsing_core".to_owned(),
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            fps: 60,
            palette: Palette::default(),
            params: serde_json::Value::Null,
        }
    }
}

/// Render engine settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads; `None` uses every available core, `1` renders sequentially.
    pub workers: Option<usize>,
    /// Bytes per batch written to the encoder.
    pub batch_bytes: usize,
    /// Substituted-frame ratio above which the job fails.
    pub max_failure_ratio: f64,
    /// Per-frame synthesis timeout in milliseconds; `None` disables it.
    pub frame_timeout_ms: Option<u64>,
    /// Render only the first N seconds.
    pub preview_seconds: Option<f64>,
    /// Per-chunk memory bound of the parallel renderer.
    pub spill_bytes: u64,
    /// Substituted frame color.
    pub filler: Rgb8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let opts = RenderOpts::default();
        Self {
            workers: None,
            batch_bytes: opts.batch_bytes,
            max_failure_ratio: opts.max_failure_ratio,
            frame_timeout_ms: opts.frame_timeout.map(|t| t.as_millis() as u64),
            preview_seconds: None,
            spill_bytes: opts.spill_bytes,
            filler: opts.filler,
        }
    }
}

impl EngineConfig {
    /// Equivalent [`RenderOpts`].
    pub fn render_opts(&self) -> RenderOpts {
        let defaults = RenderOpts::default();
        RenderOpts {
            workers: self.workers.unwrap_or(defaults.workers),
            batch_bytes: self.batch_bytes,
            max_failure_ratio: self.max_failure_ratio,
            frame_timeout: self.frame_timeout_ms.map(Duration::from_millis),
            filler: self.filler,
            spill_bytes: self.spill_bytes,
            channel_capacity: defaults.channel_capacity,
        }
    }
}

/// Encoder and muxer settings.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// x264 preset.
    pub preset: String,
    /// Constant rate factor, `0..=51`.
    pub crf: u8,
    /// AAC bitrate for the mux step.
    pub audio_bitrate: String,
    /// Bound on encoder stalls and on each process exit, in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            preset: "medium".to_owned(),
            crf: 23,
            audio_bitrate: "320k".to_owned(),
            timeout_secs: Some(600),
        }
    }
}

impl EncoderConfig {
    /// Settings for the encoder sink.
    pub fn settings(&self) -> EncoderSettings {
        EncoderSettings {
            preset: self.preset.clone(),
            crf: self.crf,
            timeout: self.timeout(),
        }
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// A complete render job.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JobConfig {
    /// Audio input.
    pub audio: PathBuf,
    /// MP4 output.
    pub output: PathBuf,
    /// Platform preset applied on top of `visual` and `encoder`.
    #[serde(default)]
    pub profile: Option<ExportProfile>,
    /// What to draw.
    #[serde(default)]
    pub visual: VisualConfig,
    /// Post-processing.
    #[serde(default)]
    pub postprocess: PostProcessConfig,
    /// Render engine.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Audio analysis and feature cache.
    #[serde(default)]
    pub analysis: AnalyzerOpts,
    /// Encoder.
    #[serde(default)]
    pub encoder: EncoderConfig,
}

impl JobConfig {
    /// Config with defaults for everything but the paths.
    pub fn new(audio: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            audio: audio.into(),
            output: output.into(),
            profile: None,
            visual: VisualConfig::default(),
            postprocess: PostProcessConfig::default(),
            engine: EngineConfig::default(),
            analysis: AnalyzerOpts::default(),
            encoder: EncoderConfig::default(),
        }
    }

    /// Parse JSON.
    pub fn from_json_str(s: &str) -> BeatvizResult<Self> {
        serde_json::from_str(s)
            .map_err(|e| BeatvizError::validation(format!("invalid job config: {e}")))
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: &Path) -> BeatvizResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read job config '{}'", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Copy with the export profile (if any) applied.
    pub fn resolved(&self) -> Self {
        let mut cfg = self.clone();
        if let Some(profile) = self.profile {
            let p = profile.settings();
            cfg.visual.resolution = p.resolution;
            cfg.visual.fps = p.fps;
            cfg.encoder.preset = p.preset.to_owned();
            cfg.encoder.crf = p.crf;
            cfg.encoder.audio_bitrate = p.audio_bitrate.to_owned();
        }
        cfg
    }

    /// Longest accepted audio duration, from the export profile.
    pub fn max_duration_secs(&self) -> Option<u32> {
        self.profile.and_then(|p| p.settings().max_duration_secs)
    }

    /// Output frame rate.
    pub fn fps(&self) -> BeatvizResult<Fps> {
        Fps::integer(self.resolved().visual.fps)
    }

    /// Structural checks. Post-processing values are clamped later, never rejected here.
    pub fn validate(&self) -> BeatvizResult<()> {
        let cfg = self.resolved();
        if !has_extension(&cfg.audio, &AUDIO_EXTENSIONS) {
            return Err(BeatvizError::validation(format!(
                "audio file '{}' must have one of the extensions {AUDIO_EXTENSIONS:?}",
                cfg.audio.display()
            )));
        }
        if !has_extension(&cfg.output, &["mp4"]) {
            return Err(BeatvizError::validation(format!(
                "output file '{}' must have the .mp4 extension",
                cfg.output.display()
            )));
        }
        if cfg.visual.synthesizer.trim().is_empty() {
            return Err(BeatvizError::validation("visual synthesizer must be set"));
        }
        let res = cfg.visual.resolution;
        if res.width < MIN_RESOLUTION.width
            || res.height < MIN_RESOLUTION.height
            || res.width > MAX_RESOLUTION.width
            || res.height > MAX_RESOLUTION.height
        {
            return Err(BeatvizError::validation(format!(
                "resolution {res} must be within {MIN_RESOLUTION} and {MAX_RESOLUTION}"
            )));
        }
        if !res.is_even() {
            return Err(BeatvizError::validation(format!(
                "resolution {res} must have even sides"
            )));
        }
        if !(24..=120).contains(&cfg.visual.fps) {
            return Err(BeatvizError::validation(format!(
                "fps {} must be within 24..=120",
                cfg.visual.fps
            )));
        }
        if let Some(s) = cfg.engine.preview_seconds
            && !(s.is_finite() && s > 0.0)
        {
            return Err(BeatvizError::validation(
                "engine preview_seconds must be positive",
            ));
        }
        cfg.engine.render_opts().validate()?;
        cfg.analysis.validate()?;
        if cfg.encoder.crf > 51 {
            return Err(BeatvizError::validation("encoder crf must be within 0..=51"));
        }
        if cfg.encoder.preset.trim().is_empty() || cfg.encoder.audio_bitrate.trim().is_empty() {
            return Err(BeatvizError::validation(
                "encoder preset and audio_bitrate must be set",
            ));
        }
        Ok(())
    }

    /// Render job for audio with `frame_count` frames (after the profile is applied).
    pub fn to_render_job(&self, frame_count: u64) -> BeatvizResult<RenderJob> {
        let cfg = self.resolved();
        let mut job = RenderJob::new(cfg.visual.synthesizer.clone(), cfg.visual.resolution);
        job.palette = cfg.visual.palette;
        job.params = cfg.visual.params.clone();
        job.postprocess = cfg.postprocess.clamped();
        job.opts = cfg.engine.render_opts();
        if let Some(secs) = cfg.engine.preview_seconds {
            let frames = Fps::integer(cfg.visual.fps)?.secs_to_frames_floor(secs);
            job.range = Some(FrameRange::first(frames.min(frame_count)));
        }
        Ok(job)
    }
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
