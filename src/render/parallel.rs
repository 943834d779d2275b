use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter, Read as _, Write as _};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use anyhow::Context as _;
use rayon::prelude::*;

use crate::analysis::features::AudioFeatureSet;
use crate::encode::sink::FrameSink;
use crate::foundation::core::{FrameIndex, FrameRange};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::fs::{TempFileGuard, unique_temp_path};
use crate::render::batch::FrameBatcher;
use crate::render::frame_runner::{FrameOutcome, panic_message};
use crate::render::job::{
    CancelToken, FailureBudget, JobLifecycle, PartialFailure, RenderJob, RenderOpts, RenderReport,
};
use crate::render::{Mode, Prepared, StreamStats, drive};
use crate::synth::contract::FrameBuffer;
use crate::synth::registry::SynthesizerRegistry;

/// Split `range` into at most `workers` contiguous chunks whose sizes differ by at most one.
pub(crate) fn partition(range: FrameRange, workers: usize) -> Vec<FrameRange> {
    let len = range.len_frames();
    if len == 0 {
        return Vec::new();
    }
    let n = (workers.max(1) as u64).min(len);
    let base = len / n;
    let extra = len % n;
    let mut start = range.start.0;
    (0..n)
        .map(|i| {
            let size = base + u64::from(i < extra);
            let chunk = FrameRange {
                start: FrameIndex(start),
                end: FrameIndex(start + size),
            };
            start += size;
            chunk
        })
        .collect()
}

/// Workers actually used: never more than there are frames.
pub(crate) fn worker_count(workers: usize, frames: u64) -> usize {
    let frames = usize::try_from(frames).unwrap_or(usize::MAX).max(1);
    workers.max(1).min(frames)
}

fn build_thread_pool(threads: Option<usize>) -> BeatvizResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(BeatvizError::validation(
            "parallel render 'workers' must be >= 1",
        ));
    }
    let mut builder =
        rayon::ThreadPoolBuilder::new().thread_name(|i| format!("beatviz-worker-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build rayon thread pool: {e}").into())
}

enum ChunkStore {
    Memory(Vec<u8>),
    Spilled {
        file: BufWriter<std::fs::File>,
        guard: TempFileGuard,
    },
}

/// Chunk-local frame storage; moves to a temp file once it outgrows `spill_bytes`.
struct ChunkBuffer {
    frame_bytes: usize,
    spill_bytes: u64,
    frames: u64,
    store: ChunkStore,
}

impl ChunkBuffer {
    fn new(frame_bytes: usize, spill_bytes: u64) -> Self {
        Self {
            frame_bytes,
            spill_bytes,
            frames: 0,
            store: ChunkStore::Memory(Vec::new()),
        }
    }

    fn push(&mut self, frame: &[u8]) -> BeatvizResult<()> {
        if let ChunkStore::Memory(mem) = &self.store
            && (mem.len() + frame.len()) as u64 > self.spill_bytes
        {
            self.store = spill(mem)?;
        }
        match &mut self.store {
            ChunkStore::Memory(mem) => mem.extend_from_slice(frame),
            ChunkStore::Spilled { file, .. } => file
                .write_all(frame)
                .context("failed to write chunk spill file")?,
        }
        self.frames += 1;
        Ok(())
    }

    fn is_spilled(&self) -> bool {
        matches!(self.store, ChunkStore::Spilled { .. })
    }

    /// Hand every stored frame to `f`, in order. The spill file is removed afterwards.
    fn drain(self, mut f: impl FnMut(&[u8]) -> BeatvizResult<()>) -> BeatvizResult<()> {
        match self.store {
            ChunkStore::Memory(mem) => {
                for frame in mem.chunks_exact(self.frame_bytes) {
                    f(frame)?;
                }
            }
            ChunkStore::Spilled { file, guard } => {
                file.into_inner()
                    .map_err(|e| anyhow::anyhow!("failed to flush chunk spill file: {e}"))?;
                let path = guard
                    .path()
                    .ok_or_else(|| anyhow::anyhow!("chunk spill file is missing"))?;
                let mut reader = BufReader::new(
                    std::fs::File::open(path)
                        .with_context(|| format!("failed to open '{}'", path.display()))?,
                );
                let mut frame = vec![0u8; self.frame_bytes];
                for _ in 0..self.frames {
                    reader
                        .read_exact(&mut frame)
                        .context("failed to read chunk spill file")?;
                    f(&frame)?;
                }
            }
        }
        Ok(())
    }
}

fn spill(mem: &[u8]) -> BeatvizResult<ChunkStore> {
    let path = unique_temp_path(&std::env::temp_dir(), "beatviz-chunk", "rgb");
    let guard = TempFileGuard::new(path.clone());
    let file = std::fs::File::create(&path)
        .with_context(|| format!("failed to create spill file '{}'", path.display()))?;
    let mut file = BufWriter::new(file);
    file.write_all(mem).context("failed to write chunk spill file")?;
    tracing::debug!(path = %path.display(), bytes = mem.len(), "spilling chunk to disk");
    Ok(ChunkStore::Spilled { file, guard })
}

struct ChunkOutput {
    range: FrameRange,
    buf: ChunkBuffer,
    failures: Vec<PartialFailure>,
}

enum ChunkResult {
    Done(ChunkOutput),
    /// Stopped early because of cancellation or another chunk's error.
    Stopped,
    Failed(BeatvizError),
}

struct WorkerCtx<'a> {
    prepared: &'a Prepared,
    opts: &'a RenderOpts,
    budget: &'a FailureBudget,
    abort: &'a AtomicBool,
    cancel: &'a CancelToken,
}

impl WorkerCtx<'_> {
    fn should_stop(&self) -> bool {
        self.abort.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }
}

fn render_chunk(ctx: &WorkerCtx<'_>, chunk: FrameRange) -> ChunkResult {
    let mut failures = Vec::new();
    let res = match catch_unwind(AssertUnwindSafe(|| {
        render_chunk_frames(ctx, chunk, &mut failures)
    })) {
        Ok(res) => res,
        Err(payload) => {
            let reason = format!("render worker panicked: {}", panic_message(&*payload));
            tracing::error!(
                start = chunk.start.0,
                end = chunk.end.0,
                reason = %reason,
                "render worker crashed, substituting filler for its chunk"
            );
            filler_chunk(ctx, chunk, &reason, failures).map(Some)
        }
    };
    match res {
        Ok(Some(out)) => ChunkResult::Done(out),
        Ok(None) => ChunkResult::Stopped,
        Err(e) => {
            ctx.abort.store(true, Ordering::SeqCst);
            ChunkResult::Failed(e)
        }
    }
}

fn render_chunk_frames(
    ctx: &WorkerCtx<'_>,
    chunk: FrameRange,
    failures: &mut Vec<PartialFailure>,
) -> BeatvizResult<Option<ChunkOutput>> {
    let resolution = ctx.prepared.ctx.resolution;
    let mut runner = ctx.prepared.runner(ctx.opts)?;
    let mut buf = ChunkBuffer::new(resolution.frame_bytes(), ctx.opts.spill_bytes);
    let mut frame = FrameBuffer::new(resolution);

    for idx in chunk.iter() {
        if ctx.should_stop() {
            return Ok(None);
        }
        if let FrameOutcome::Substituted(reason) = runner.render(idx, &mut frame)? {
            failures.push(PartialFailure { frame: idx, reason });
            ctx.budget.record()?;
        }
        buf.push(&frame.data)?;
    }
    tracing::debug!(
        start = chunk.start.0,
        end = chunk.end.0,
        spilled = buf.is_spilled(),
        "chunk rendered"
    );
    Ok(Some(ChunkOutput {
        range: chunk,
        buf,
        failures: std::mem::take(failures),
    }))
}

/// Whole-chunk filler after a worker crash.
///
/// `recorded` holds the substitutions the chunk already counted against the budget; those keep
/// their reason and are not counted again.
fn filler_chunk(
    ctx: &WorkerCtx<'_>,
    chunk: FrameRange,
    reason: &str,
    recorded: Vec<PartialFailure>,
) -> BeatvizResult<ChunkOutput> {
    let resolution = ctx.prepared.ctx.resolution;
    let filler = FrameBuffer::filled(resolution, ctx.opts.filler);
    let mut buf = ChunkBuffer::new(resolution.frame_bytes(), ctx.opts.spill_bytes);
    let mut failures = Vec::with_capacity(chunk.len_frames() as usize);
    let mut recorded = recorded.into_iter().peekable();
    for idx in chunk.iter() {
        match recorded.next_if(|f| f.frame == idx) {
            Some(earlier) => failures.push(earlier),
            None => {
                failures.push(PartialFailure {
                    frame: idx,
                    reason: reason.to_owned(),
                });
                ctx.budget.record()?;
            }
        }
        buf.push(&filler.data)?;
    }
    Ok(ChunkOutput {
        range: chunk,
        buf,
        failures,
    })
}

fn emit(
    out: ChunkOutput,
    batcher: &mut FrameBatcher,
    stats: &mut StreamStats,
    sink: &mut dyn FrameSink,
) -> BeatvizResult<()> {
    let ChunkOutput {
        range,
        buf,
        failures,
    } = out;
    stats.failures.extend(failures);
    let mut frames = range.iter();
    buf.drain(|frame| {
        let idx = frames
            .next()
            .ok_or_else(|| anyhow::anyhow!("chunk holds more frames than its range"))?;
        if let Some(batch) = batcher.push(idx, frame)? {
            stats.flush(sink, batch)?;
        }
        Ok(())
    })
}

/// Render the prepared range on a pool of `workers` threads, one chunk per worker.
///
/// The calling thread is the coordinator and the only writer to `sink`: it receives finished
/// chunks in any order and streams them out strictly by frame index.
pub(crate) fn stream(
    prepared: &Prepared,
    opts: &RenderOpts,
    workers: usize,
    sink: &mut dyn FrameSink,
    cancel: &CancelToken,
) -> BeatvizResult<StreamStats> {
    let chunks = partition(prepared.range, workers);
    let pool = build_thread_pool(Some(chunks.len().max(1)))?;
    let budget = FailureBudget::new(prepared.range.len_frames(), opts.max_failure_ratio);
    let abort = AtomicBool::new(false);
    let ctx = WorkerCtx {
        prepared,
        opts,
        budget: &budget,
        abort: &abort,
        cancel,
    };

    std::thread::scope(|scope| -> BeatvizResult<StreamStats> {
        let (tx, rx) = mpsc::sync_channel::<(usize, ChunkResult)>(opts.channel_capacity.max(1));
        let chunks_ref = &chunks;
        let ctx_ref = &ctx;
        let pool_ref = &pool;
        let producer = scope.spawn(move || {
            pool_ref.install(|| {
                chunks_ref
                    .par_iter()
                    .copied()
                    .enumerate()
                    .for_each_with(tx, |tx, (i, chunk)| {
                        let res = render_chunk(ctx_ref, chunk);
                        // The coordinator drains until every sender is gone.
                        let _ = tx.send((i, res));
                    });
            });
        });

        let mut stats = StreamStats::default();
        let mut batcher = FrameBatcher::new(prepared.range.start, opts.batch_bytes);
        let mut pending = BTreeMap::<usize, ChunkOutput>::new();
        let mut next = 0usize;
        let mut first_err: Option<BeatvizError> = None;

        for (i, res) in rx.iter() {
            match res {
                ChunkResult::Done(out) if first_err.is_none() => {
                    pending.insert(i, out);
                }
                ChunkResult::Done(_) | ChunkResult::Stopped => {}
                ChunkResult::Failed(e) => {
                    abort.store(true, Ordering::SeqCst);
                    first_err.get_or_insert(e);
                }
            }
            if first_err.is_some() {
                pending.clear();
                continue;
            }
            while let Some(out) = pending.remove(&next) {
                if let Err(e) = emit(out, &mut batcher, &mut stats, sink) {
                    abort.store(true, Ordering::SeqCst);
                    first_err = Some(e);
                    pending.clear();
                    break;
                }
                next += 1;
            }
        }

        producer
            .join()
            .map_err(|_| anyhow::anyhow!("render producer thread panicked"))?;
        if let Some(e) = first_err {
            return Err(e);
        }
        if next < chunks.len() {
            cancel.check()?;
            return Err(anyhow::anyhow!(
                "parallel render stopped after {next} of {} chunks",
                chunks.len()
            )
            .into());
        }
        if let Some(batch) = batcher.finish() {
            stats.flush(sink, batch)?;
        }
        Ok(stats)
    })
}

/// Renders contiguous chunks of the range in parallel, one synthesizer instance per worker.
///
/// Output bytes equal [`super::SequentialRenderer`]'s for the same job.
#[derive(Clone, Debug)]
pub struct ParallelRenderer {
    registry: SynthesizerRegistry,
}

impl ParallelRenderer {
    /// Renderer resolving synthesizers from `registry`.
    pub fn new(registry: SynthesizerRegistry) -> Self {
        Self { registry }
    }

    /// Render `job` into `sink` with `job.opts.workers` workers.
    #[tracing::instrument(
        skip_all,
        fields(synthesizer = %job.synthesizer, workers = job.opts.workers)
    )]
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
            Mode::Parallel,
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/parallel.rs"]
mod tests;
