//! Frame rendering engines.
//!
//! Both engines share the same per-frame pipeline ([`frame_runner`]: synthesis, shape check,
//! filler substitution, post-processing) and the same sink boundary. The sequential engine runs
//! on the calling thread; the parallel engine statically partitions the range across a worker
//! pool and reassembles chunk output in strict frame order.

pub(crate) mod batch;
pub(crate) mod frame_runner;
/// Job description, options, lifecycle and report types.
pub mod job;
/// Static-partition parallel renderer.
pub mod parallel;
/// Single-threaded renderer.
pub mod sequential;

use std::sync::Arc;

use crate::analysis::features::AudioFeatureSet;
use crate::encode::sink::{FrameBatch, FrameSink, SinkConfig};
use crate::foundation::core::FrameRange;
use crate::foundation::error::BeatvizResult;
use crate::postprocess::PostProcessChain;
use crate::render::frame_runner::FrameRunner;
use crate::render::job::{
    CancelToken, JobLifecycle, JobState, PartialFailure, RenderJob, RenderOpts, RenderReport,
};
use crate::synth::contract::SynthContext;
use crate::synth::registry::{SynthesizerFactory, SynthesizerRegistry};

pub use parallel::ParallelRenderer;
pub use sequential::SequentialRenderer;

/// Job resolved against a registry and a feature set.
pub(crate) struct Prepared {
    pub(crate) factory: SynthesizerFactory,
    pub(crate) ctx: SynthContext,
    pub(crate) chain: PostProcessChain,
    pub(crate) range: FrameRange,
    pub(crate) sink_cfg: SinkConfig,
}

impl Prepared {
    pub(crate) fn new(
        registry: &SynthesizerRegistry,
        job: &RenderJob,
        features: Arc<AudioFeatureSet>,
    ) -> BeatvizResult<Self> {
        job.opts.validate()?;
        job.resolution.validate()?;
        let factory = registry.get(&job.synthesizer)?.clone();
        let range = job.frame_range(features.frame_count())?;
        let sink_cfg = SinkConfig {
            resolution: job.resolution,
            fps: features.fps(),
            range,
        };
        let ctx = SynthContext {
            resolution: job.resolution,
            features,
            palette: job.palette,
            params: job.params.clone(),
        };
        Ok(Self {
            factory,
            ctx,
            chain: PostProcessChain::from_config(&job.postprocess),
            range,
            sink_cfg,
        })
    }

    pub(crate) fn runner(&self, opts: &RenderOpts) -> BeatvizResult<FrameRunner> {
        FrameRunner::new(
            self.factory.clone(),
            self.ctx.clone(),
            self.chain.clone(),
            opts.filler,
            opts.frame_timeout,
        )
    }
}

/// Counters collected while streaming frames into a sink.
#[derive(Debug, Default)]
pub(crate) struct StreamStats {
    pub(crate) failures: Vec<PartialFailure>,
    pub(crate) batches: u64,
    pub(crate) bytes: u64,
}

impl StreamStats {
    pub(crate) fn flush(
        &mut self,
        sink: &mut dyn FrameSink,
        batch: FrameBatch,
    ) -> BeatvizResult<()> {
        let len = batch.bytes.len() as u64;
        tracing::debug!(
            start = batch.start.0,
            frames = batch.frames,
            bytes = len,
            "flushing batch"
        );
        sink.write_batch(batch)?;
        self.batches += 1;
        self.bytes += len;
        Ok(())
    }
}

/// Which engine runs a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Sequential,
    Parallel,
}

impl Mode {
    /// Parallel when more than one worker can get a frame.
    pub(crate) fn for_job(opts: &RenderOpts, frames: u64) -> Self {
        if opts.workers > 1 && frames > 1 {
            Self::Parallel
        } else {
            Self::Sequential
        }
    }
}

/// Run a prepared job through `mode` into `sink`, driving the sink lifecycle.
///
/// Enters `Synthesizing` and `Encoding`; on error the sink is aborted and the lifecycle fails.
pub(crate) fn drive(
    registry: &SynthesizerRegistry,
    job: &RenderJob,
    features: Arc<AudioFeatureSet>,
    sink: &mut dyn FrameSink,
    cancel: &CancelToken,
    lifecycle: &mut JobLifecycle,
    mode: Mode,
) -> BeatvizResult<RenderReport> {
    let res = drive_inner(registry, job, features, sink, cancel, lifecycle, mode);
    if let Err(e) = &res {
        sink.abort();
        lifecycle.fail(e);
    }
    res
}

fn drive_inner(
    registry: &SynthesizerRegistry,
    job: &RenderJob,
    features: Arc<AudioFeatureSet>,
    sink: &mut dyn FrameSink,
    cancel: &CancelToken,
    lifecycle: &mut JobLifecycle,
    mode: Mode,
) -> BeatvizResult<RenderReport> {
    let prepared = Prepared::new(registry, job, features)?;
    let frames_total = prepared.range.len_frames();
    let workers = match mode {
        Mode::Sequential => 1,
        Mode::Parallel => parallel::worker_count(job.opts.workers, frames_total),
    };

    lifecycle.advance(JobState::Synthesizing)?;
    tracing::info!(
        synthesizer = %job.synthesizer,
        resolution = %job.resolution,
        frames = frames_total,
        workers,
        "rendering frames"
    );
    cancel.check()?;
    sink.begin(&prepared.sink_cfg)?;

    let stats = match mode {
        Mode::Sequential => sequential::stream(&prepared, &job.opts, sink, cancel)?,
        Mode::Parallel => parallel::stream(&prepared, &job.opts, workers, sink, cancel)?,
    };

    lifecycle.advance(JobState::Encoding)?;
    sink.finish()?;

    if !stats.failures.is_empty() {
        tracing::warn!(
            substituted = stats.failures.len(),
            frames = frames_total,
            "render completed with substituted frames"
        );
    }
    let failed = stats.failures.len() as u64;
    Ok(RenderReport {
        frames_total,
        frames_rendered: frames_total - failed,
        failures: stats.failures,
        batches_flushed: stats.batches,
        bytes_streamed: stats.bytes,
        workers,
        states: lifecycle.history().to_vec(),
        output: None,
    })
}
