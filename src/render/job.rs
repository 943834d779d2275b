use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crate::foundation::core::{FrameIndex, FrameRange, Resolution, Rgb8};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::postprocess::PostProcessConfig;
use crate::synth::contract::Palette;

/// Engine knobs for one render.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOpts {
    /// Worker threads. `1` renders sequentially on the calling thread.
    pub workers: usize,
    /// Bytes accumulated before a batch is flushed to the sink.
    pub batch_bytes: usize,
    /// The job fails once more than `floor(max_failure_ratio * frames)` frames were substituted.
    pub max_failure_ratio: f64,
    /// Upper bound for one `render_frame` call; `None` runs synthesizers without a watchdog.
    pub frame_timeout: Option<Duration>,
    /// Color of substituted frames.
    pub filler: Rgb8,
    /// Per-chunk bytes kept in memory before the parallel renderer spills to a temp file.
    pub spill_bytes: u64,
    /// Capacity of the bounded hand-off between workers and the coordinator.
    pub channel_capacity: usize,
}

impl Default for RenderOpts {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            batch_bytes: 4 * 1024 * 1024,
            max_failure_ratio: 0.05,
            frame_timeout: Some(Duration::from_secs(30)),
            filler: Rgb8::BLACK,
            spill_bytes: 256 * 1024 * 1024,
            channel_capacity: 4,
        }
    }
}

impl RenderOpts {
    /// Sequential defaults.
    pub fn sequential() -> Self {
        Self {
            workers: 1,
            ..Self::default()
        }
    }

    /// Reject unusable settings.
    pub fn validate(&self) -> BeatvizResult<()> {
        if self.workers == 0 {
            return Err(BeatvizError::validation("render workers must be >= 1"));
        }
        if self.batch_bytes == 0 {
            return Err(BeatvizError::validation("render batch_bytes must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.max_failure_ratio) {
            return Err(BeatvizError::validation(
                "render max_failure_ratio must be within [0, 1]",
            ));
        }
        if self.frame_timeout.is_some_and(|t| t.is_zero()) {
            return Err(BeatvizError::validation(
                "render frame_timeout must be non-zero when set",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(BeatvizError::validation(
                "render channel_capacity must be >= 1",
            ));
        }
        Ok(())
    }
}

/// Everything needed to render frames, minus the features and the sink.
#[derive(Clone, Debug)]
pub struct RenderJob {
    /// Registry id of the synthesizer.
    pub synthesizer: String,
    /// Output resolution.
    pub resolution: Resolution,
    /// Colors handed to the synthesizer.
    pub palette: Palette,
    /// Synthesizer parameters.
    pub params: serde_json::Value,
    /// Post-processing parameters.
    pub postprocess: PostProcessConfig,
    /// Frames to render; `None` renders every frame of the feature set.
    pub range: Option<FrameRange>,
    /// Engine settings.
    pub opts: RenderOpts,
}

impl RenderJob {
    /// Job with default palette, parameters, post-processing and options.
    pub fn new(synthesizer: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            synthesizer: synthesizer.into(),
            resolution,
            palette: Palette::default(),
            params: serde_json::Value::Null,
            postprocess: PostProcessConfig::default(),
            range: None,
            opts: RenderOpts::default(),
        }
    }

    /// Resolve the frame range against `frame_count`.
    pub fn frame_range(&self, frame_count: u64) -> BeatvizResult<FrameRange> {
        let range = self.range.unwrap_or(FrameRange::first(frame_count));
        if range.is_empty() {
            return Err(BeatvizError::validation("render range must be non-empty"));
        }
        if range.end.0 > frame_count {
            return Err(BeatvizError::validation(format!(
                "render range ends at frame {} but the audio only has {frame_count} frames",
                range.end.0
            )));
        }
        Ok(range)
    }
}

/// Cooperative cancellation flag, checked between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` once [`CancelToken::cancel`] was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> BeatvizResult<()> {
        if self.is_cancelled() {
            Err(BeatvizError::cancelled("render job was cancelled"))
        } else {
            Ok(())
        }
    }
}

/// Phase of a render job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, nothing done yet.
    Init,
    /// Decoding and analyzing audio.
    Analyzing,
    /// Rendering frames and streaming them out.
    Synthesizing,
    /// Waiting for the encoder to finish.
    Encoding,
    /// Merging the audio track.
    Muxing,
    /// Finished successfully.
    Done,
    /// Aborted.
    Failed,
}

impl JobState {
    /// `true` for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Forward-only job state machine with a transition history.
#[derive(Clone, Debug)]
pub struct JobLifecycle {
    history: Vec<JobState>,
}

impl Default for JobLifecycle {
    fn default() -> Self {
        Self {
            history: vec![JobState::Init],
        }
    }
}

impl JobLifecycle {
    /// Lifecycle in `Init`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> JobState {
        self.history.last().copied().unwrap_or(JobState::Init)
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// Move forward to `next`. Phases may be skipped but never revisited.
    pub fn advance(&mut self, next: JobState) -> BeatvizResult<()> {
        let cur = self.state();
        if cur.is_terminal() || next <= cur || next == JobState::Failed {
            return Err(BeatvizError::validation(format!(
                "invalid job state transition {cur:?} -> {next:?}"
            )));
        }
        tracing::info!(from = ?cur, to = ?next, "render job state");
        self.history.push(next);
        Ok(())
    }

    /// Enter `Failed` (no-op when already terminal).
    pub fn fail(&mut self, err: &BeatvizError) {
        if self.state().is_terminal() {
            return;
        }
        tracing::error!(from = ?self.state(), error = %err, "render job failed");
        self.history.push(JobState::Failed);
    }
}

/// A frame replaced by filler because its synthesis failed.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PartialFailure {
    /// Substituted frame.
    pub frame: FrameIndex,
    /// Error text from the synthesizer.
    pub reason: String,
}

/// Completion report; quality degradation is always visible here.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderReport {
    /// Frames in the job range.
    pub frames_total: u64,
    /// Frames produced by the synthesizer (total minus substitutions).
    pub frames_rendered: u64,
    /// Substituted frames in frame order.
    pub failures: Vec<PartialFailure>,
    /// Batches handed to the sink.
    pub batches_flushed: u64,
    /// Raw bytes handed to the sink.
    pub bytes_streamed: u64,
    /// Worker threads used.
    pub workers: usize,
    /// State history.
    pub states: Vec<JobState>,
    /// Final muxed file, when the job produced one.
    pub output: Option<std::path::PathBuf>,
}

impl RenderReport {
    /// Number of substituted frames.
    pub fn partial_failures(&self) -> usize {
        self.failures.len()
    }
}

/// Shared failure counter enforcing the abort ratio.
#[derive(Debug)]
pub(crate) struct FailureBudget {
    total: u64,
    ratio: f64,
    limit: u64,
    failed: AtomicU64,
}

impl FailureBudget {
    pub(crate) fn new(total: u64, ratio: f64) -> Self {
        Self {
            total,
            ratio,
            limit: (ratio * total as f64).floor() as u64,
            failed: AtomicU64::new(0),
        }
    }

    /// Count one substitution; errors once the limit is exceeded.
    pub(crate) fn record(&self) -> BeatvizResult<()> {
        let failed = self.failed.fetch_add(1, Ordering::SeqCst) + 1;
        if failed > self.limit {
            return Err(BeatvizError::FailureThreshold {
                failed,
                total: self.total,
                max_ratio: self.ratio,
            });
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/job.rs"]
mod tests;
