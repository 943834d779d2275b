use super::*;
use crate::encode::sink::InMemorySink;
use crate::foundation::core::{Fps, Resolution, Rgb8};
use crate::synth::contract::{FrameSynthesizer, SynthContext};
use crate::synth::registry::{RegistryBuilder, SynthesizerFactory};

#[derive(Default)]
struct IndexColor {
    res: Option<Resolution>,
}

impl FrameSynthesizer for IndexColor {
    fn setup(&mut self, ctx: &SynthContext) -> anyhow::Result<()> {
        self.res = Some(ctx.resolution);
        Ok(())
    }

    fn render_frame(&mut self, idx: FrameIndex, out: &mut FrameBuffer) -> anyhow::Result<()> {
        let res = self.res.ok_or_else(|| anyhow::anyhow!("not set up"))?;
        // Uneven per-frame cost so chunks finish out of order.
        if idx.0 < 4 {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        out.reset(res, Rgb8::new(idx.0 as u8, 0, 255 - idx.0 as u8));
        Ok(())
    }
}

fn registry() -> SynthesizerRegistry {
    let mut b = RegistryBuilder::new();
    b.register("index", SynthesizerFactory::of::<IndexColor>())
        .unwrap();
    b.build()
}

fn features(frames: u32) -> Arc<AudioFeatureSet> {
    let fps = Fps::integer(10).unwrap();
    Arc::new(AudioFeatureSet::silent(f64::from(frames) / 10.0, fps, 8_000).unwrap())
}

#[test]
fn partition_is_contiguous_and_balanced() {
    let range = FrameRange::new(FrameIndex(3), FrameIndex(13)).unwrap();
    let chunks = partition(range, 3);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].start, FrameIndex(3));
    assert_eq!(chunks[2].end, FrameIndex(13));
    for pair in chunks.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    let sizes: Vec<u64> = chunks.iter().map(|c| c.len_frames()).collect();
    assert_eq!(sizes, vec![4, 3, 3]);
}

#[test]
fn partition_never_yields_empty_chunks() {
    let chunks = partition(FrameRange::first(2), 8);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|c| c.len_frames() == 1));
    assert!(partition(FrameRange::first(0), 4).is_empty());
}

#[test]
fn worker_count_is_bounded_by_frames() {
    assert_eq!(worker_count(8, 3), 3);
    assert_eq!(worker_count(0, 10), 1);
    assert_eq!(worker_count(4, 0), 1);
    assert_eq!(worker_count(4, 100), 4);
}

#[test]
fn zero_thread_pool_is_rejected() {
    assert!(build_thread_pool(Some(0)).is_err());
    assert!(build_thread_pool(Some(2)).is_ok());
}

#[test]
fn chunk_buffer_spills_and_reads_back_in_order() {
    let mut buf = ChunkBuffer::new(3, 4);
    buf.push(&[1, 1, 1]).unwrap();
    assert!(!buf.is_spilled());
    buf.push(&[2, 2, 2]).unwrap();
    assert!(buf.is_spilled());
    buf.push(&[3, 3, 3]).unwrap();

    let spill_path = match &buf.store {
        ChunkStore::Spilled { guard, .. } => guard.path().unwrap().to_path_buf(),
        ChunkStore::Memory(_) => unreachable!(),
    };
    let mut seen = Vec::new();
    buf.drain(|f| {
        seen.push(f.to_vec());
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, vec![vec![1, 1, 1], vec![2, 2, 2], vec![3, 3, 3]]);
    assert!(!spill_path.exists());
}

#[test]
fn parallel_render_streams_in_frame_order() {
    let mut job = RenderJob::new("index", Resolution::new(4, 4).unwrap());
    job.opts.workers = 4;
    job.opts.batch_bytes = 100;
    job.opts.frame_timeout = None;
    job.opts.spill_bytes = 64;

    let mut sink = InMemorySink::new();
    let report = ParallelRenderer::new(registry())
        .render(&job, features(20), &mut sink, &CancelToken::new())
        .unwrap();

    assert_eq!(report.frames_total, 20);
    assert_eq!(report.workers, 4);
    assert!(sink.is_finished());
    assert_eq!(sink.frame_count(), 20);
    for (i, frame) in sink.frames().enumerate() {
        assert_eq!(&frame[..3], &[i as u8, 0, 255 - i as u8]);
    }
}

#[test]
fn cancelled_parallel_render_aborts_the_sink() {
    let mut job = RenderJob::new("index", Resolution::new(4, 4).unwrap());
    job.opts.workers = 2;
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut sink = InMemorySink::new();
    let err = ParallelRenderer::new(registry())
        .render(&job, features(10), &mut sink, &cancel)
        .unwrap_err();
    assert!(matches!(err, BeatvizError::Cancelled(_)));
    assert!(sink.is_aborted());
}

#[test]
fn crashed_chunk_counts_each_frame_once() {
    let job = RenderJob::new("index", Resolution::new(4, 4).unwrap());
    let prepared = Prepared::new(&registry(), &job, features(4)).unwrap();
    // Every frame of the chunk may fail, but no more.
    let budget = FailureBudget::new(4, 1.0);
    let abort = AtomicBool::new(false);
    let cancel = CancelToken::new();
    let ctx = WorkerCtx {
        prepared: &prepared,
        opts: &job.opts,
        budget: &budget,
        abort: &abort,
        cancel: &cancel,
    };

    // Frame 1 was substituted and counted before the worker crashed.
    budget.record().unwrap();
    let earlier = vec![PartialFailure {
        frame: FrameIndex(1),
        reason: "bad frame 1".to_owned(),
    }];
    let out = filler_chunk(&ctx, FrameRange::first(4), "worker crashed", earlier).unwrap();

    assert_eq!(budget.failed(), 4);
    let frames: Vec<u64> = out.failures.iter().map(|f| f.frame.0).collect();
    assert_eq!(frames, vec![0, 1, 2, 3]);
    assert_eq!(out.failures[1].reason, "bad frame 1");
    assert_eq!(out.failures[2].reason, "worker crashed");
    assert_eq!(out.buf.frames, 4);
}
