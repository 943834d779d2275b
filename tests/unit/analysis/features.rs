use super::*;

fn parts(frames: usize) -> FeatureParts {
    FeatureParts {
        duration: 1.0,
        sample_rate: 8_000,
        fps: Fps::integer(10).unwrap(),
        rms: (0..frames).map(|i| i as f32 / 10.0).collect(),
        onset: vec![0.0; frames],
        spectral_centroid: vec![0.0; frames],
        spectral_rolloff: vec![0.0; frames],
        zero_crossing_rate: vec![0.0; frames],
        chroma: FeatureMatrix::zeros(frames, CHROMA_BINS),
        mfcc: FeatureMatrix::zeros(frames, MFCC_COEFFS),
        tempogram: FeatureMatrix::zeros(frames, TEMPOGRAM_LAGS),
        tempo: 120.0,
        key: None,
        mode: AudioMode::Music,
        skipped: Vec::new(),
    }
}

#[test]
fn frame_count_is_floor_of_duration_times_fps() {
    let set = AudioFeatureSet::from_parts(parts(10)).unwrap();
    assert_eq!(set.frame_count(), 10);
    assert_eq!(set.rms().len(), 10);
}

#[test]
fn mismatched_lengths_are_rejected() {
    let mut p = parts(10);
    p.onset.pop();
    let err = AudioFeatureSet::from_parts(p).unwrap_err();
    assert!(matches!(err, BeatvizError::Validation(_)));
    assert!(err.to_string().contains("onset"));
}

#[test]
fn non_positive_duration_is_rejected() {
    let mut p = parts(0);
    p.duration = 0.0;
    assert!(AudioFeatureSet::from_parts(p).is_err());
}

#[test]
fn skipped_tempogram_must_be_empty() {
    let mut p = parts(10);
    p.skipped.push(SkippedFeature::Tempogram);
    assert!(AudioFeatureSet::from_parts(p.clone()).is_err());
    p.tempogram = FeatureMatrix::zeros(10, 0);
    let set = AudioFeatureSet::from_parts(p).unwrap();
    assert!(set.is_skipped(SkippedFeature::Tempogram));
    assert!(set.frame(FrameIndex(3)).tempogram.is_empty());
}

#[test]
fn frame_view_clamps_index_and_reports_progress() {
    let set = AudioFeatureSet::from_parts(parts(10)).unwrap();
    let f = set.frame(FrameIndex(5));
    assert_eq!(f.index, 5);
    assert!((f.progress - 0.5).abs() < 1e-6);
    assert!((f.rms - 0.5).abs() < 1e-6);
    assert_eq!(f.chroma.len(), CHROMA_BINS);

    let last = set.frame(FrameIndex(1_000));
    assert_eq!(last.index, 9);
}

#[test]
fn dominant_pitch_class_ignores_silence() {
    let mut p = parts(1);
    p.duration = 0.1;
    let mut chroma = vec![0.0; CHROMA_BINS];
    chroma[9] = 1.0;
    p.chroma = FeatureMatrix::new(1, CHROMA_BINS, chroma).unwrap();
    let set = AudioFeatureSet::from_parts(p).unwrap();
    assert_eq!(set.frame(FrameIndex(0)).dominant_pitch_class(), Some(9));

    let silent = AudioFeatureSet::silent(1.0, Fps::integer(10).unwrap(), 8_000).unwrap();
    assert_eq!(silent.frame(FrameIndex(0)).dominant_pitch_class(), None);
}

#[test]
fn matrix_shape_is_checked() {
    assert!(FeatureMatrix::new(2, 3, vec![0.0; 5]).is_err());
    let m = FeatureMatrix::new(2, 3, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    assert_eq!(m.row(1), &[3.0, 4.0, 5.0]);
}

#[test]
fn summary_serializes_mode_lowercase() {
    let set = AudioFeatureSet::from_parts(parts(10)).unwrap();
    let json = serde_json::to_string(&set.summary()).unwrap();
    assert!(json.contains("\"mode\":\"music\""));
}
