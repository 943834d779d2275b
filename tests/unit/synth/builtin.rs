use super::*;
use crate::foundation::core::Fps;

fn ctx(w: u32, h: u32) -> SynthContext {
    let features =
        Arc::new(AudioFeatureSet::silent(2.0, Fps::integer(15).unwrap(), 8_000).unwrap());
    SynthContext::new(Resolution::new(w, h).unwrap(), features)
}

fn render(s: &mut dyn FrameSynthesizer, c: &SynthContext, idx: u64) -> FrameBuffer {
    s.setup(c).unwrap();
    let mut out = FrameBuffer::default();
    s.render_frame(FrameIndex(idx), &mut out).unwrap();
    out
}

#[test]
fn solid_color_prefers_param_then_palette() {
    let mut c = ctx(8, 6);
    let out = render(&mut SolidColor::default(), &c, 0);
    assert!(out.is_uniform(Rgb8::new(10, 10, 10)));

    c.palette.primary = Some(Rgb8::new(1, 2, 3));
    let out = render(&mut SolidColor::default(), &c, 0);
    assert!(out.is_uniform(Rgb8::new(1, 2, 3)));

    c.params = serde_json::json!({ "color": "#ff0000" });
    let out = render(&mut SolidColor::default(), &c, 5);
    assert!(out.validate(c.resolution).is_ok());
    assert!(out.is_uniform(Rgb8::new(255, 0, 0)));
}

#[test]
fn render_before_setup_fails() {
    let mut out = FrameBuffer::default();
    assert!(
        PulsingCore::default()
            .render_frame(FrameIndex(0), &mut out)
            .is_err()
    );
    assert!(
        SolidColor::default()
            .render_frame(FrameIndex(0), &mut out)
            .is_err()
    );
}

#[test]
fn pulsing_core_draws_primary_disc_on_background() {
    let mut c = ctx(64, 64);
    c.palette.primary = Some(Rgb8::new(255, 0, 0));
    let out = render(&mut PulsingCore::default(), &c, 3);
    assert!(out.validate(c.resolution).is_ok());
    assert_eq!(out.pixel(32, 32), Some([255, 0, 0]));
    assert_eq!(out.pixel(0, 0), Some([10, 10, 10]));
}

#[test]
fn drawn_synths_are_pure_in_frame_index() {
    let c = ctx(48, 32);
    for id in ["pulsing_core", "spectrum_bars"] {
        let reg = crate::synth::registry::SynthesizerRegistry::builtin();
        let mut s = reg.create(id).unwrap();
        s.setup(&c).unwrap();
        let mut a = FrameBuffer::default();
        let mut b = FrameBuffer::default();
        s.render_frame(FrameIndex(7), &mut a).unwrap();
        s.render_frame(FrameIndex(2), &mut b).unwrap();
        s.render_frame(FrameIndex(7), &mut b).unwrap();
        assert_eq!(a, b, "{id}");

        let mut fresh = reg.create(id).unwrap();
        fresh.setup(&c).unwrap();
        let mut d = FrameBuffer::default();
        fresh.render_frame(FrameIndex(7), &mut d).unwrap();
        assert_eq!(a, d, "{id}");
    }
}

#[test]
fn spectrum_bars_draws_bars() {
    let c = ctx(88, 40);
    let out = render(&mut SpectrumBars::default(), &c, 0);
    assert!(out.validate(c.resolution).is_ok());
    assert!(!out.is_uniform(c.palette.background));
}
