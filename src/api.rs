//! Entry points for front ends: analyze a track, render a job, list synthesizers.
//!
//! [`Engine`] bundles a synthesizer registry with an analyzer. The free functions use the
//! process-wide registry and build an analyzer from the job's own settings.

use std::path::Path;
use std::sync::Arc;

use crate::analysis::analyzer::{AnalyzerOpts, AudioAnalyzer};
use crate::analysis::features::{AudioFeatureSet, FeatureSummary};
use crate::config::{JobConfig, VisualConfig};
use crate::encode::ffmpeg::EncoderSink;
use crate::encode::mux::MuxStep;
use crate::encode::process::EncoderCommand;
use crate::encode::sink::FrameSink;
use crate::foundation::core::{Fps, FrameIndex, FrameRange};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::fs::{TempFileGuard, unique_temp_path};
use crate::render::frame_runner::FrameOutcome;
use crate::render::job::{CancelToken, JobLifecycle, JobState, RenderJob, RenderReport};
use crate::render::{Mode, Prepared, drive};
use crate::synth::contract::FrameBuffer;
use crate::synth::registry::{SynthesizerRegistry, global};

/// Registry plus analyzer; renders jobs end to end.
#[derive(Clone, Debug)]
pub struct Engine {
    registry: SynthesizerRegistry,
    analyzer: AudioAnalyzer,
    command: EncoderCommand,
}

impl Engine {
    /// Engine over `registry` and `analyzer`, encoding with the system `ffmpeg`.
    pub fn new(registry: SynthesizerRegistry, analyzer: AudioAnalyzer) -> Self {
        Self {
            registry,
            analyzer,
            command: EncoderCommand::ffmpeg(),
        }
    }

    /// Use `command` for both the encoder and the mux step.
    pub fn with_encoder_command(mut self, command: EncoderCommand) -> Self {
        self.command = command;
        self
    }

    /// Synthesizer registry.
    pub fn registry(&self) -> &SynthesizerRegistry {
        &self.registry
    }

    /// Audio analyzer.
    pub fn analyzer(&self) -> &AudioAnalyzer {
        &self.analyzer
    }

    /// Registered synthesizer ids, sorted.
    pub fn list_synthesizers(&self) -> Vec<String> {
        self.registry.ids()
    }

    /// Analyze `path` at `fps` and summarize it.
    pub fn analyze(&self, path: &Path, fps: Fps) -> BeatvizResult<FeatureSummary> {
        Ok(self.analyzer.analyze(path, fps)?.summary())
    }

    /// Render `cfg` to its output file. The engine's analyzer is used; `cfg.analysis` is not.
    pub fn render(&self, cfg: &JobConfig) -> BeatvizResult<RenderReport> {
        self.render_with_cancel(cfg, &CancelToken::new())
    }

    /// [`Engine::render`] with cooperative cancellation.
    #[tracing::instrument(
        skip_all,
        fields(audio = %cfg.audio.display(), output = %cfg.output.display())
    )]
    pub fn render_with_cancel(
        &self,
        cfg: &JobConfig,
        cancel: &CancelToken,
    ) -> BeatvizResult<RenderReport> {
        cfg.validate()?;
        let cfg = cfg.resolved();
        let mut lifecycle = JobLifecycle::new();
        let res = self.run_job(&cfg, cancel, &mut lifecycle);
        if let Err(e) = &res {
            lifecycle.fail(e);
        }
        res
    }

    fn run_job(
        &self,
        cfg: &JobConfig,
        cancel: &CancelToken,
        lifecycle: &mut JobLifecycle,
    ) -> BeatvizResult<RenderReport> {
        lifecycle.advance(JobState::Analyzing)?;
        let features = Arc::new(self.analyzer.analyze(&cfg.audio, cfg.fps()?)?);
        if let Some(max) = cfg.max_duration_secs()
            && features.duration() > f64::from(max)
        {
            return Err(BeatvizError::validation(format!(
                "audio is {:.1} s long but the export profile allows at most {max} s",
                features.duration()
            )));
        }
        cancel.check()?;

        let job = cfg.to_render_job(features.frame_count())?;
        let frames = job.frame_range(features.frame_count())?.len_frames();
        let dir = match cfg.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        let stem = cfg
            .output
            .file_stem()
            .map_or_else(|| "beatviz".to_owned(), |s| s.to_string_lossy().into_owned());
        let video = unique_temp_path(&dir, &stem, "video.mp4");
        let _video_guard = TempFileGuard::new(video.clone());

        let mut sink = EncoderSink::new(&video, cfg.encoder.settings())
            .with_command(self.command.clone());
        let mut report = drive(
            &self.registry,
            &job,
            features,
            &mut sink,
            cancel,
            lifecycle,
            Mode::for_job(&job.opts, frames),
        )?;

        lifecycle.advance(JobState::Muxing)?;
        cancel.check()?;
        let mut mux = MuxStep::new(&video, &cfg.audio, &cfg.output);
        mux.audio_bitrate = cfg.encoder.audio_bitrate.clone();
        mux.timeout = cfg.encoder.timeout();
        mux.command = self.command.clone();
        mux.run()?;

        lifecycle.advance(JobState::Done)?;
        report.states = lifecycle.history().to_vec();
        report.output = Some(cfg.output.clone());
        tracing::info!(
            frames = report.frames_total,
            substituted = report.partial_failures(),
            "render job done"
        );
        Ok(report)
    }

    /// Render `job` into a caller-provided sink, choosing the engine from `job.opts.workers`.
    pub fn render_to_sink(
        &self,
        job: &RenderJob,
        features: Arc<AudioFeatureSet>,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
    ) -> BeatvizResult<RenderReport> {
        let frames = job.frame_range(features.frame_count())?.len_frames();
        let mut lifecycle = JobLifecycle::new();
        drive(
            &self.registry,
            job,
            features,
            sink,
            cancel,
            &mut lifecycle,
            Mode::for_job(&job.opts, frames),
        )
    }

    /// Render one frame of `cfg` to a PNG file.
    pub fn render_still(
        &self,
        cfg: &JobConfig,
        frame: FrameIndex,
        png: &Path,
    ) -> BeatvizResult<()> {
        cfg.validate()?;
        let cfg = cfg.resolved();
        let features = Arc::new(self.analyzer.analyze(&cfg.audio, cfg.fps()?)?);
        let mut job = cfg.to_render_job(features.frame_count())?;
        job.range = Some(FrameRange::new(frame, FrameIndex(frame.0 + 1))?);
        let prepared = Prepared::new(&self.registry, &job, features)?;
        let mut runner = prepared.runner(&job.opts)?;

        let mut buf = FrameBuffer::new(job.resolution);
        if let FrameOutcome::Substituted(reason) = runner.render(frame, &mut buf)? {
            return Err(BeatvizError::validation(format!(
                "frame {} could not be synthesized: {reason}",
                frame.0
            )));
        }
        buf.save_png(png)?;
        tracing::info!(frame = frame.0, png = %png.display(), "still frame written");
        Ok(())
    }
}

/// Summarize `path` at the default output frame rate, with the default cache.
pub fn analyze(path: &Path) -> BeatvizResult<FeatureSummary> {
    let fps = Fps::integer(VisualConfig::default().fps)?;
    Engine::new(global().clone(), AudioAnalyzer::new(AnalyzerOpts::default())).analyze(path, fps)
}

/// Render `cfg` with the process-wide registry and the analyzer settings in `cfg.analysis`.
pub fn render(cfg: &JobConfig) -> BeatvizResult<RenderReport> {
    Engine::new(global().clone(), AudioAnalyzer::new(cfg.analysis.clone())).render(cfg)
}

/// Ids in the process-wide registry.
pub fn list_synthesizers() -> Vec<String> {
    global().ids()
}
