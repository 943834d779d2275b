use super::*;
use crate::foundation::core::{Resolution, Rgb8};

fn frame(w: u32, h: u32, color: Rgb8) -> FrameBuffer {
    FrameBuffer::filled(Resolution::new(w, h).unwrap(), color)
}

fn gradient(w: u32, h: u32) -> FrameBuffer {
    let mut f = frame(w, h, Rgb8::BLACK);
    for (i, px) in f.data.chunks_exact_mut(3).enumerate() {
        px.copy_from_slice(&[(i * 7 % 256) as u8, (i * 13 % 256) as u8, (i * 29 % 256) as u8]);
    }
    f
}

#[test]
fn default_config_is_identity() {
    let mut chain = PostProcessChain::from_config(&PostProcessConfig::default());
    assert!(chain.is_identity());
    let mut f = gradient(16, 9);
    let before = f.clone();
    chain.apply(FrameIndex(3), &mut f);
    assert_eq!(f, before);
}

#[test]
fn out_of_range_parameters_are_clamped() {
    let cfg = PostProcessConfig {
        contrast: 10.0,
        saturation: -3.0,
        brightness: f32::NAN,
        grain: 7.0,
        vignette: -1.0,
        chromatic_aberration: 99.0,
    };
    let chain = PostProcessChain::from_config(&cfg);
    assert_eq!(
        chain.ops(),
        &[
            PostOp::Contrast(2.0),
            PostOp::Saturation(0.0),
            PostOp::Grain(1.0),
            PostOp::ChromaticAberration(5.0),
        ]
    );
}

#[test]
fn brightness_and_saturation_follow_luma_blends() {
    let mut f = frame(2, 2, Rgb8::new(100, 50, 0));
    PostProcessChain::from_config(&PostProcessConfig {
        brightness: 2.0,
        ..PostProcessConfig::default()
    })
    .apply(FrameIndex(0), &mut f);
    assert!(f.is_uniform(Rgb8::new(200, 100, 0)));

    let mut g = frame(2, 2, Rgb8::new(200, 100, 0));
    PostProcessChain::from_config(&PostProcessConfig {
        saturation: 0.0,
        ..PostProcessConfig::default()
    })
    .apply(FrameIndex(0), &mut g);
    // luma = (200*299 + 100*587) / 1000 = 118.5 -> 118
    assert!(g.is_uniform(Rgb8::new(118, 118, 118)));
}

#[test]
fn contrast_on_uniform_frame_is_stable() {
    let mut f = frame(4, 4, Rgb8::new(80, 80, 80));
    PostProcessChain::from_config(&PostProcessConfig {
        contrast: 1.8,
        ..PostProcessConfig::default()
    })
    .apply(FrameIndex(0), &mut f);
    assert!(f.is_uniform(Rgb8::new(80, 80, 80)));
}

#[test]
fn grain_is_seeded_by_frame_index() {
    let cfg = PostProcessConfig {
        grain: 0.5,
        ..PostProcessConfig::default()
    };
    let mut a = frame(8, 8, Rgb8::new(128, 128, 128));
    let mut b = a.clone();
    let mut c = a.clone();
    PostProcessChain::from_config(&cfg).apply(FrameIndex(5), &mut a);
    PostProcessChain::from_config(&cfg).apply(FrameIndex(5), &mut b);
    PostProcessChain::from_config(&cfg).apply(FrameIndex(6), &mut c);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(!a.is_uniform(Rgb8::new(128, 128, 128)));
}

#[test]
fn vignette_darkens_corners_only() {
    let mut f = frame(21, 21, Rgb8::new(200, 200, 200));
    PostProcessChain::from_config(&PostProcessConfig {
        vignette: 1.0,
        ..PostProcessConfig::default()
    })
    .apply(FrameIndex(0), &mut f);
    assert_eq!(f.pixel(10, 10), Some([200, 200, 200]));
    // Corner distance equals the max distance, so the mask bottoms out at 0.3.
    assert_eq!(f.pixel(0, 0), Some([60, 60, 60]));
}

#[test]
fn chromatic_aberration_shifts_red_left_and_blue_right() {
    let mut f = frame(4, 1, Rgb8::BLACK);
    f.data = vec![10, 0, 50, 20, 0, 60, 30, 0, 70, 40, 0, 80];
    PostProcessChain::from_config(&PostProcessConfig {
        chromatic_aberration: 0.4,
        ..PostProcessConfig::default()
    })
    .apply(FrameIndex(0), &mut f);
    assert_eq!(f.data, vec![20, 0, 50, 30, 0, 50, 40, 0, 60, 40, 0, 70]);
}
