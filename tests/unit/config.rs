use super::*;

#[test]
fn minimal_config_gets_defaults() {
    let cfg = JobConfig::from_json_str(r#"{"audio": "song.mp3", "output": "out/video.mp4"}"#)
        .unwrap();
    assert_eq!(cfg.visual.synthesizer, "pulsing_core");
    assert_eq!(cfg.visual.resolution, Resolution::new(1920, 1080).unwrap());
    assert_eq!(cfg.visual.fps, 60);
    assert_eq!(cfg.encoder.crf, 23);
    assert_eq!(cfg.engine.max_failure_ratio, 0.05);
    assert!(cfg.validate().is_ok());
}

#[test]
fn missing_paths_and_bad_json_are_validation_errors() {
    assert!(matches!(
        JobConfig::from_json_str(r#"{"audio": "a.wav"}"#),
        Err(BeatvizError::Validation(_))
    ));
    assert!(matches!(
        JobConfig::from_json_str("{"),
        Err(BeatvizError::Validation(_))
    ));
}

#[test]
fn nested_sections_parse() {
    let cfg = JobConfig::from_json_str(
        r##"{
            "audio": "a.wav",
            "output": "b.mp4",
            "visual": {
                "synthesizer": "spectrum_bars",
                "resolution": {"width": 1280, "height": 720},
                "fps": 30,
                "palette": {"primary": "#ff0055", "background": "#000"},
                "params": {"bar_count": 40}
            },
            "postprocess": {"contrast": 9.0, "grain": 0.2},
            "engine": {"workers": 2, "preview_seconds": 1.0, "filler": "#101010"},
            "analysis": {"cache_dir": null},
            "encoder": {"preset": "fast", "timeout_secs": null}
        }"##,
    )
    .unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.visual.palette.primary, Some(Rgb8::new(255, 0, 0x55)));
    assert_eq!(cfg.visual.palette.background, Rgb8::BLACK);
    assert_eq!(cfg.engine.filler, Rgb8::new(16, 16, 16));
    assert_eq!(cfg.analysis.cache_dir, None);
    assert_eq!(cfg.encoder.timeout(), None);

    let job = cfg.to_render_job(300).unwrap();
    assert_eq!(job.synthesizer, "spectrum_bars");
    assert_eq!(job.opts.workers, 2);
    assert_eq!(job.range, Some(FrameRange::first(30)));
    assert_eq!(job.postprocess.contrast, 2.0);
    assert_eq!(job.params["bar_count"], 40);
}

#[test]
fn preview_is_capped_by_audio_length() {
    let mut cfg = JobConfig::new("a.wav", "b.mp4");
    cfg.engine.preview_seconds = Some(10.0);
    let job = cfg.to_render_job(100).unwrap();
    assert_eq!(job.range, Some(FrameRange::first(100)));
}

#[test]
fn profile_overrides_visual_and_encoder() {
    let mut cfg = JobConfig::new("a.wav", "b.mp4");
    cfg.profile = Some(ExportProfile::Tiktok);
    let r = cfg.resolved();
    assert_eq!(r.visual.resolution, Resolution::new(1080, 1920).unwrap());
    assert_eq!(r.visual.fps, 30);
    assert_eq!(r.encoder.preset, "fast");
    assert_eq!(r.encoder.crf, 25);
    assert_eq!(r.encoder.audio_bitrate, "128k");
    assert_eq!(cfg.max_duration_secs(), Some(180));
    assert_eq!(cfg.fps().unwrap(), Fps::integer(30).unwrap());
    assert!(cfg.validate().is_ok());
}

#[test]
fn every_profile_validates() {
    for profile in ExportProfile::ALL {
        let mut cfg = JobConfig::new("a.flac", "b.mp4");
        cfg.profile = Some(profile);
        cfg.validate().unwrap();
    }
    assert_eq!(ExportProfile::Youtube.settings().max_duration_secs, None);
    assert_eq!(
        serde_json::from_str::<ExportProfile>("\"youtube_4k\"").unwrap(),
        ExportProfile::Youtube4k
    );
}

#[test]
fn structural_problems_are_rejected() {
    let base = JobConfig::new("a.wav", "b.mp4");

    let mut cfg = base.clone();
    cfg.audio = "a.txt".into();
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.output = "b.mov".into();
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.visual.resolution = Resolution {
        width: 100,
        height: 100,
    };
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.visual.resolution = Resolution {
        width: 641,
        height: 480,
    };
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.visual.fps = 10;
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.engine.workers = Some(0);
    assert!(cfg.validate().is_err());

    let mut cfg = base.clone();
    cfg.engine.preview_seconds = Some(0.0);
    assert!(cfg.validate().is_err());

    let mut cfg = base;
    cfg.encoder.crf = 60;
    assert!(cfg.validate().is_err());
}

#[test]
fn out_of_range_postprocess_is_accepted() {
    let mut cfg = JobConfig::new("a.wav", "b.mp4");
    cfg.postprocess.vignette = 42.0;
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.to_render_job(10).unwrap().postprocess.vignette, 1.0);
}

#[test]
fn from_path_reads_json_files() {
    let path = std::env::temp_dir().join(format!("beatviz_cfg_{}.json", std::process::id()));
    std::fs::write(&path, r#"{"audio": "a.ogg", "output": "b.mp4"}"#).unwrap();
    let cfg = JobConfig::from_path(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(cfg.audio, PathBuf::from("a.ogg"));
    assert!(JobConfig::from_path(Path::new("/definitely/missing.json")).is_err());
}
