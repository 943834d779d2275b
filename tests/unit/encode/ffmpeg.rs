use super::*;
use crate::foundation::core::{Fps, FrameIndex, FrameRange, Resolution};

fn cfg(w: u32, h: u32, frames: u64) -> SinkConfig {
    SinkConfig {
        resolution: Resolution::new(w, h).unwrap(),
        fps: Fps::new(30000, 1001).unwrap(),
        range: FrameRange::first(frames),
    }
}

fn tmp_out(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "beatviz_encoder_{tag}_{}.bin",
        std::process::id()
    ))
}

#[cfg(unix)]
fn script(body: &str) -> EncoderCommand {
    // The generated arguments become "$@"; the output path is the last one.
    EncoderCommand::new(
        "sh",
        [
            "-c".to_owned(),
            format!("eval \"out=\\${{$#}}\"; {body}"),
            "sh".to_owned(),
        ],
    )
}

#[test]
fn args_describe_raw_rgb24_input_and_h264_output() {
    let settings = EncoderSettings {
        preset: "fast".to_owned(),
        crf: 18,
        timeout: None,
    };
    let args: Vec<String> = encoder_args(&cfg(64, 32, 1), &settings, Path::new("out.mp4"))
        .into_iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let joined = args.join(" ");
    assert!(joined.starts_with("-y -loglevel error -f rawvideo -vcodec rawvideo -s 64x32"));
    assert!(joined.contains("-pix_fmt rgb24 -r 30000/1001 -i -"));
    assert!(joined.contains("-c:v libx264 -pix_fmt yuv420p -preset fast -crf 18"));
    assert!(joined.ends_with("-movflags +faststart -an out.mp4"));
}

#[test]
fn settings_deserialize_timeout_in_seconds() {
    let s: EncoderSettings = serde_json::from_str(r#"{"crf": 20, "timeout": 1.5}"#).unwrap();
    assert_eq!(s.crf, 20);
    assert_eq!(s.preset, "medium");
    assert_eq!(s.timeout, Some(Duration::from_millis(1500)));
    let s: EncoderSettings = serde_json::from_str(r#"{"timeout": null}"#).unwrap();
    assert_eq!(s.timeout, None);
}

#[test]
fn ffmpeg_requires_even_dimensions() {
    let mut sink = EncoderSink::new(tmp_out("odd"), EncoderSettings::default());
    let err = sink.begin(&cfg(63, 32, 1)).unwrap_err();
    assert!(matches!(err, BeatvizError::Validation(_)));
}

#[test]
fn writing_before_begin_fails() {
    let mut sink = EncoderSink::new(tmp_out("unstarted"), EncoderSettings::default());
    let batch = FrameBatch {
        start: FrameIndex(0),
        frames: 1,
        bytes: vec![0; 3],
    };
    assert!(sink.write_batch(batch).is_err());
    assert!(sink.finish().is_err());
}

#[cfg(unix)]
#[test]
fn streams_batches_to_the_process_stdin() {
    let out = tmp_out("cat");
    let mut sink = EncoderSink::new(&out, EncoderSettings::default())
        .with_command(script("cat > \"$out\""));
    sink.begin(&cfg(3, 1, 3)).unwrap();
    for i in 0..3u8 {
        sink.write_batch(FrameBatch {
            start: FrameIndex(u64::from(i)),
            frames: 1,
            bytes: vec![i; 9],
        })
        .unwrap();
    }
    sink.finish().unwrap();
    let bytes = std::fs::read(&out).unwrap();
    let _ = std::fs::remove_file(&out);
    let mut expected = vec![0u8; 9];
    expected.extend([1u8; 9]);
    expected.extend([2u8; 9]);
    assert_eq!(bytes, expected);
}

#[cfg(unix)]
#[test]
fn nonzero_exit_is_an_encoding_error_with_stderr() {
    let out = tmp_out("exit3");
    let mut sink = EncoderSink::new(&out, EncoderSettings::default())
        .with_command(script("cat > /dev/null; echo 'bad codec' >&2; exit 3"));
    sink.begin(&cfg(2, 2, 1)).unwrap();
    sink.write_batch(FrameBatch {
        start: FrameIndex(0),
        frames: 1,
        bytes: vec![0; 12],
    })
    .unwrap();
    let err = sink.finish().unwrap_err();
    assert!(matches!(err, BeatvizError::Encoding(_)));
    assert!(err.to_string().contains("bad codec"));
    assert!(!out.exists());
}

#[cfg(unix)]
#[test]
fn encoder_exiting_early_is_a_broken_pipe() {
    let mut sink = EncoderSink::new(tmp_out("early"), EncoderSettings::default())
        .with_command(script("exit 0"));
    let frames = 8u64;
    sink.begin(&cfg(256, 256, frames)).unwrap();
    let mut result = Ok(());
    for i in 0..frames {
        result = sink.write_batch(FrameBatch {
            start: FrameIndex(i),
            frames: 1,
            bytes: vec![7; 256 * 256 * 3],
        });
        if result.is_err() {
            break;
        }
    }
    let err = match result {
        Err(e) => e,
        Ok(()) => sink.finish().unwrap_err(),
    };
    assert!(matches!(err, BeatvizError::Encoding(_)));
    sink.abort();
}

#[cfg(unix)]
#[test]
fn hanging_encoder_times_out_and_is_killed() {
    let settings = EncoderSettings {
        timeout: Some(Duration::from_millis(200)),
        ..EncoderSettings::default()
    };
    let mut sink =
        EncoderSink::new(tmp_out("hang"), settings).with_command(script("exec sleep 30"));
    sink.begin(&cfg(2, 2, 1)).unwrap();
    sink.write_batch(FrameBatch {
        start: FrameIndex(0),
        frames: 1,
        bytes: vec![0; 12],
    })
    .unwrap();
    let start = Instant::now();
    let err = sink.finish().unwrap_err();
    assert!(matches!(err, BeatvizError::Timeout(_)));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn abort_kills_the_process_and_removes_output() {
    let out = tmp_out("abort");
    let mut sink = EncoderSink::new(&out, EncoderSettings::default())
        .with_command(script("cat > \"$out\""));
    sink.begin(&cfg(2, 2, 2)).unwrap();
    sink.write_batch(FrameBatch {
        start: FrameIndex(0),
        frames: 1,
        bytes: vec![0; 12],
    })
    .unwrap();
    sink.abort();
    sink.abort();
    assert!(!out.exists());
}
