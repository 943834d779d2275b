use super::*;
use crate::foundation::core::FrameIndex;
use crate::synth::builtin::SolidColor;
use crate::synth::contract::{FrameBuffer, SynthContext};

#[derive(Default)]
struct Other;

impl FrameSynthesizer for Other {
    fn setup(&mut self, _ctx: &SynthContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn render_frame(&mut self, _idx: FrameIndex, _out: &mut FrameBuffer) -> anyhow::Result<()> {
        Ok(())
    }
}

fn make_other() -> Box<dyn FrameSynthesizer> {
    Box::new(Other)
}

#[test]
fn builtins_are_listed_sorted() {
    let reg = SynthesizerRegistry::builtin();
    assert_eq!(
        reg.ids(),
        vec!["pulsing_core", "solid_color", "spectrum_bars"]
    );
    assert!(reg.contains("solid_color"));
    assert_eq!(reg.len(), 3);
    assert!(!reg.is_empty());
}

#[test]
fn reregistering_same_impl_is_a_noop() {
    let mut b = RegistryBuilder::with_builtins();
    b.register("solid_color", SynthesizerFactory::of::<SolidColor>())
        .unwrap();
    b.register("mine", SynthesizerFactory::from_fn(make_other))
        .unwrap();
    b.register("mine", SynthesizerFactory::from_fn(make_other))
        .unwrap();
    assert_eq!(b.build().len(), 4);
}

#[test]
fn different_impl_under_same_id_conflicts() {
    let mut b = RegistryBuilder::with_builtins();
    let err = b
        .register("solid_color", SynthesizerFactory::of::<Other>())
        .unwrap_err();
    assert!(matches!(err, BeatvizError::Conflict(_)), "{err}");

    let err = b
        .register("", SynthesizerFactory::of::<Other>())
        .unwrap_err();
    assert!(matches!(err, BeatvizError::Validation(_)));
}

#[test]
fn unknown_id_is_not_found() {
    let reg = SynthesizerRegistry::builtin();
    let err = reg.create("nope").err().unwrap();
    assert!(matches!(err, BeatvizError::NotFound(_)));
    assert!(err.to_string().contains("spectrum_bars"));
}

#[test]
fn global_registry_is_frozen_after_first_use() {
    assert!(global().contains("pulsing_core"));
    let err = install_global(SynthesizerRegistry::default()).unwrap_err();
    assert!(matches!(err, BeatvizError::Conflict(_)));
}
