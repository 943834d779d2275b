use super::*;
use crate::foundation::core::Fps;

fn res(w: u32, h: u32) -> Resolution {
    Resolution::new(w, h).unwrap()
}

#[test]
fn buffers_fill_and_report_pixels() {
    let mut buf = FrameBuffer::filled(res(4, 2), Rgb8::new(1, 2, 3));
    assert_eq!(buf.data.len(), 24);
    assert!(buf.is_uniform(Rgb8::new(1, 2, 3)));
    assert_eq!(buf.pixel(3, 1), Some([1, 2, 3]));
    assert_eq!(buf.pixel(4, 0), None);

    buf.reset(res(2, 2), Rgb8::BLACK);
    assert_eq!(buf.data.len(), 12);
    assert!(buf.is_uniform(Rgb8::BLACK));
}

#[test]
fn validate_rejects_shape_mismatch() {
    let buf = FrameBuffer::new(res(8, 8));
    assert!(buf.validate(res(8, 8)).is_ok());
    assert!(matches!(
        buf.validate(res(8, 4)),
        Err(BeatvizError::Validation(_))
    ));

    let short = FrameBuffer {
        width: 8,
        height: 8,
        data: vec![0; 10],
    };
    assert!(matches!(
        short.validate(res(8, 8)),
        Err(BeatvizError::Validation(_))
    ));
}

#[test]
fn params_are_read_with_defaults() {
    let features = Arc::new(AudioFeatureSet::silent(1.0, Fps::integer(10).unwrap(), 8_000).unwrap());
    let mut ctx = SynthContext::new(res(4, 4), features);
    assert_eq!(ctx.param_f64("speed", 1.5), 1.5);
    assert_eq!(ctx.param_color("color").unwrap(), None);

    ctx.params = serde_json::json!({ "speed": 3, "count": 7, "color": "#00ff00", "bad": 4 });
    assert_eq!(ctx.param_f64("speed", 1.5), 3.0);
    assert_eq!(ctx.param_u64("count", 1), 7);
    assert_eq!(ctx.param_color("color").unwrap(), Some(Rgb8::new(0, 255, 0)));
    assert!(ctx.param_color("bad").is_err());
}

#[test]
fn palette_deserializes_hex_colors() {
    let p: Palette = serde_json::from_str(r##"{ "primary": "#ff0000" }"##).unwrap();
    assert_eq!(p.primary, Some(Rgb8::new(255, 0, 0)));
    assert_eq!(p.secondary, None);
    assert_eq!(p.background, Rgb8::new(10, 10, 10));
}

#[test]
fn save_png_writes_a_readable_file() {
    let path = std::env::temp_dir().join(format!("beatviz_still_{}.png", std::process::id()));
    FrameBuffer::filled(res(3, 2), Rgb8::new(9, 8, 7))
        .save_png(&path)
        .unwrap();
    let img = image::open(&path).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (3, 2));
    assert_eq!(img.get_pixel(2, 1).0, [9, 8, 7]);
    let _ = std::fs::remove_file(path);
}
