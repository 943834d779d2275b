use super::*;

#[test]
fn frame_range_basics() {
    let r = FrameRange::new(FrameIndex(2), FrameIndex(5)).unwrap();
    assert_eq!(r.len_frames(), 3);
    assert!(!r.is_empty());
    assert!(r.contains(FrameIndex(2)));
    assert!(!r.contains(FrameIndex(5)));
    assert_eq!(
        r.iter().collect::<Vec<_>>(),
        vec![FrameIndex(2), FrameIndex(3), FrameIndex(4)]
    );
    assert!(FrameRange::new(FrameIndex(3), FrameIndex(1)).is_err());
}

#[test]
fn fps_validation_and_floor_conversion() {
    assert!(Fps::new(30, 0).is_err());
    assert!(Fps::new(0, 1).is_err());
    let fps = Fps::integer(30).unwrap();
    assert_eq!(fps.secs_to_frames_floor(1.0), 30);
    assert_eq!(fps.secs_to_frames_floor(1.999), 59);
    assert_eq!(fps.secs_to_frames_floor(-1.0), 0);

    let ntsc = Fps::new(30000, 1001).unwrap();
    assert_eq!(ntsc.secs_to_frames_floor(10.0), 299);
}

#[test]
fn resolution_checks() {
    assert!(Resolution::new(0, 10).is_err());
    assert!(Resolution::new(70_000, 10).is_err());
    let r = Resolution::new(64, 48).unwrap();
    assert_eq!(r.frame_bytes(), 64 * 48 * 3);
    assert!(r.is_even());
    assert!(!Resolution::new(63, 48).unwrap().is_even());
    assert_eq!(r.to_string(), "64x48");
}

#[test]
fn hex_colors_parse_long_and_short_forms() {
    assert_eq!(Rgb8::from_hex("#ff0000").unwrap(), Rgb8::new(255, 0, 0));
    assert_eq!(Rgb8::from_hex("00FF80").unwrap(), Rgb8::new(0, 255, 128));
    assert_eq!(Rgb8::from_hex("#fff").unwrap(), Rgb8::new(255, 255, 255));
    assert!(Rgb8::from_hex("#12345").is_err());
    assert!(Rgb8::from_hex("#gg0000").is_err());
    assert_eq!(Rgb8::new(1, 2, 255).to_hex(), "#0102ff");
}

#[test]
fn rgb8_serde_uses_hex_strings() {
    let c: Rgb8 = serde_json::from_str("\"#102030\"").unwrap();
    assert_eq!(c, Rgb8::new(16, 32, 48));
    assert_eq!(serde_json::to_string(&c).unwrap(), "\"#102030\"");
    assert!(serde_json::from_str::<Rgb8>("\"nope\"").is_err());
}
