use std::sync::Arc;

use super::*;
use crate::analysis::features::AudioFeatureSet;
use crate::foundation::core::Fps;
use crate::postprocess::PostProcessConfig;

struct Scripted {
    color: [u8; 3],
    fail_at: Option<u64>,
    panic_at: Option<u64>,
    sleep_at: Option<u64>,
    wrong_shape: bool,
    fail_setup: bool,
    res: Option<Resolution>,
}

impl Default for Scripted {
    fn default() -> Self {
        Self {
            color: [255, 0, 0],
            fail_at: None,
            panic_at: None,
            sleep_at: None,
            wrong_shape: false,
            fail_setup: false,
            res: None,
        }
    }
}

impl FrameSynthesizer for Scripted {
    fn setup(&mut self, ctx: &SynthContext) -> anyhow::Result<()> {
        if self.fail_setup {
            anyhow::bail!("no setup for you");
        }
        self.res = Some(ctx.resolution);
        Ok(())
    }

    fn render_frame(&mut self, idx: FrameIndex, out: &mut FrameBuffer) -> anyhow::Result<()> {
        let res = self
            .res
            .ok_or_else(|| anyhow::anyhow!("not set up"))?;
        if self.fail_at == Some(idx.0) {
            anyhow::bail!("scripted failure at {}", idx.0);
        }
        if self.panic_at == Some(idx.0) {
            panic!("scripted panic");
        }
        if self.sleep_at == Some(idx.0) {
            std::thread::sleep(Duration::from_millis(500));
        }
        let [r, g, b] = self.color;
        if self.wrong_shape {
            out.reset(Resolution::new(res.width + 1, res.height).unwrap(), Rgb8::new(r, g, b));
        } else {
            out.reset(res, Rgb8::new(r, g, b));
        }
        Ok(())
    }
}

fn ctx() -> SynthContext {
    let features =
        Arc::new(AudioFeatureSet::silent(1.0, Fps::integer(10).unwrap(), 8_000).unwrap());
    SynthContext::new(Resolution::new(4, 2).unwrap(), features)
}

fn runner(
    make: impl Fn() -> Scripted + Send + Sync + 'static,
    timeout: Option<Duration>,
) -> BeatvizResult<FrameRunner> {
    FrameRunner::new(
        SynthesizerFactory::from_fn(move || -> Box<dyn FrameSynthesizer> { Box::new(make()) }),
        ctx(),
        PostProcessChain::identity(),
        Rgb8::BLACK,
        timeout,
    )
}

#[test]
fn renders_and_validates_frames() {
    let mut r = runner(Scripted::default, None).unwrap();
    let mut out = FrameBuffer::default();
    assert_eq!(r.render(FrameIndex(0), &mut out).unwrap(), FrameOutcome::Rendered);
    assert!(out.is_uniform(Rgb8::new(255, 0, 0)));
    assert_eq!((out.width, out.height), (4, 2));
}

#[test]
fn synthesizer_error_becomes_filler() {
    let mut r = runner(
        || Scripted {
            fail_at: Some(3),
            ..Scripted::default()
        },
        None,
    )
    .unwrap();
    let mut out = FrameBuffer::default();
    let outcome = r.render(FrameIndex(3), &mut out).unwrap();
    assert!(
        matches!(outcome, FrameOutcome::Substituted(ref reason) if reason.contains("failure at 3"))
    );
    assert!(out.is_uniform(Rgb8::BLACK));
    assert_eq!(r.render(FrameIndex(4), &mut out).unwrap(), FrameOutcome::Rendered);
}

#[test]
fn panic_is_caught_and_the_synthesizer_rebuilt() {
    let mut r = runner(
        || Scripted {
            panic_at: Some(1),
            ..Scripted::default()
        },
        None,
    )
    .unwrap();
    let mut out = FrameBuffer::default();
    let outcome = r.render(FrameIndex(1), &mut out).unwrap();
    assert!(
        matches!(outcome, FrameOutcome::Substituted(ref reason) if reason.contains("scripted panic"))
    );
    assert_eq!(r.render(FrameIndex(2), &mut out).unwrap(), FrameOutcome::Rendered);
    assert!(out.is_uniform(Rgb8::new(255, 0, 0)));
}

#[test]
fn filler_is_not_post_processed() {
    let cfg = PostProcessConfig {
        brightness: 2.0,
        ..PostProcessConfig::default()
    };
    let mut r = FrameRunner::new(
        SynthesizerFactory::from_fn(|| -> Box<dyn FrameSynthesizer> {
            Box::new(Scripted {
                fail_at: Some(0),
                ..Scripted::default()
            })
        }),
        ctx(),
        PostProcessChain::from_config(&cfg),
        Rgb8::new(20, 20, 20),
        None,
    )
    .unwrap();
    let mut out = FrameBuffer::default();
    r.render(FrameIndex(0), &mut out).unwrap();
    assert!(out.is_uniform(Rgb8::new(20, 20, 20)));
}

#[test]
fn wrong_shape_is_a_validation_error() {
    let mut r = runner(
        || Scripted {
            wrong_shape: true,
            ..Scripted::default()
        },
        None,
    )
    .unwrap();
    let mut out = FrameBuffer::default();
    let err = r.render(FrameIndex(0), &mut out).unwrap_err();
    assert!(matches!(err, BeatvizError::Validation(_)));
}

#[test]
fn setup_failure_is_a_validation_error() {
    let err = runner(
        || Scripted {
            fail_setup: true,
            ..Scripted::default()
        },
        None,
    )
    .err()
    .unwrap();
    assert!(matches!(err, BeatvizError::Validation(ref m) if m.contains("no setup for you")));
}

#[test]
fn watched_runner_renders_like_inline() {
    let mut r = runner(Scripted::default, Some(Duration::from_secs(10))).unwrap();
    let mut out = FrameBuffer::default();
    for i in 0..3 {
        assert_eq!(r.render(FrameIndex(i), &mut out).unwrap(), FrameOutcome::Rendered);
        assert!(out.is_uniform(Rgb8::new(255, 0, 0)));
    }
}

#[test]
fn stuck_frame_times_out() {
    let mut r = runner(
        || Scripted {
            sleep_at: Some(2),
            ..Scripted::default()
        },
        Some(Duration::from_millis(50)),
    )
    .unwrap();
    let mut out = FrameBuffer::default();
    r.render(FrameIndex(1), &mut out).unwrap();
    let err = r.render(FrameIndex(2), &mut out).unwrap_err();
    assert!(matches!(err, BeatvizError::Timeout(_)));
    assert!(r.render(FrameIndex(3), &mut out).is_err());
}

#[test]
fn panic_message_reads_str_and_string_payloads() {
    let s: Box<dyn Any + Send> = Box::new("static");
    assert_eq!(panic_message(&*s), "static");
    let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
    assert_eq!(panic_message(&*s), "owned");
    let s: Box<dyn Any + Send> = Box::new(7u8);
    assert_eq!(panic_message(&*s), "non-string panic payload");
}
