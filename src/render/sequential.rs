use std::sync::Arc;

use crate::analysis::features::AudioFeatureSet;
use crate::encode::sink::FrameSink;
use crate::foundation::error::BeatvizResult;
use crate::render::batch::FrameBatcher;
use crate::render::frame_runner::FrameOutcome;
use crate::render::job::{
    CancelToken, FailureBudget, JobLifecycle, PartialFailure, RenderJob, RenderOpts, RenderReport,
};
use crate::render::{Mode, Prepared, StreamStats, drive};
use crate::synth::contract::FrameBuffer;
use crate::synth::registry::SynthesizerRegistry;

/// Render the prepared range on the calling thread, flushing batches as they fill.
pub(crate) fn stream(
    prepared: &Prepared,
    opts: &RenderOpts,
    sink: &mut dyn FrameSink,
    cancel: &CancelToken,
) -> BeatvizResult<StreamStats> {
    let range = prepared.range;
    let mut runner = prepared.runner(opts)?;
    let budget = FailureBudget::new(range.len_frames(), opts.max_failure_ratio);
    let mut batcher = FrameBatcher::new(range.start, opts.batch_bytes);
    let mut stats = StreamStats::default();
    let mut frame = FrameBuffer::new(prepared.ctx.resolution);

    for idx in range.iter() {
        cancel.check()?;
        if let FrameOutcome::Substituted(reason) = runner.render(idx, &mut frame)? {
            stats.failures.push(PartialFailure { frame: idx, reason });
            budget.record()?;
        }
        if let Some(batch) = batcher.push(idx, &frame.data)? {
            stats.flush(sink, batch)?;
        }
    }
    if let Some(batch) = batcher.finish() {
        stats.flush(sink, batch)?;
    }
    Ok(stats)
}

/// Renders every frame on the calling thread with one synthesizer instance.
#[derive(Clone, Debug)]
pub struct SequentialRenderer {
    registry: SynthesizerRegistry,
}

impl SequentialRenderer {
    /// Renderer resolving synthesizers from `registry`.
    pub fn new(registry: SynthesizerRegistry) -> Self {
        Self { registry }
    }

    /// Render `job` into `sink`. `job.opts.workers` is ignored.
    #[tracing::instrument(skip_all, fields(synthesizer = %job.synthesizer))]
    pub fn render(
        &self,
        job: &RenderJob,
        features: Arc<AudioFeatureSet>,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
    ) -> BeatvizResult<RenderReport> {
        let mut lifecycle = JobLifecycle::new();
        drive(
            &self.registry,
            job,
            features,
            sink,
            cancel,
            &mut lifecycle,
            Mode::Sequential,
        )
    }
}
