use super::*;

#[test]
fn default_command_is_ffmpeg() {
    assert!(EncoderCommand::default().is_ffmpeg());
    assert!(!EncoderCommand::new("sh", ["-c", "true"]).is_ffmpeg());
    assert!(!EncoderCommand::new("ffmpeg", ["-hide_banner"]).is_ffmpeg());
}

#[test]
fn tail_suffix_is_empty_for_empty_tail() {
    assert_eq!(tail_suffix(""), "");
    assert_eq!(tail_suffix("bad input"), ": bad input");
}

#[test]
fn poll_until_honors_deadline() {
    assert!(poll_until(None, || true));
    let start = Instant::now();
    assert!(!poll_until(
        Some(Instant::now() + Duration::from_millis(20)),
        || false
    ));
    assert!(start.elapsed() >= Duration::from_millis(20));
}

#[cfg(unix)]
#[test]
fn generated_args_follow_leading_args() {
    let cmd = EncoderCommand::new("sh", ["-c", "test \"$1\" = a && test \"$2\" = b", "sh"]);
    let extra: Vec<OsString> = vec!["a".into(), "b".into()];
    let status = cmd.build(&extra).status().unwrap();
    assert!(status.success());
}

#[cfg(unix)]
#[test]
fn wait_with_deadline_returns_exit_status() {
    let mut child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
    let status = wait_with_deadline(&mut child, None, "test child").unwrap();
    assert_eq!(status.code(), Some(3));
}

#[cfg(unix)]
#[test]
fn wait_with_deadline_kills_on_timeout() {
    let mut child = Command::new("sh")
        .args(["-c", "exec sleep 30"])
        .spawn()
        .unwrap();
    let start = Instant::now();
    let err = wait_with_deadline(
        &mut child,
        Some(Instant::now() + Duration::from_millis(100)),
        "test child",
    )
    .unwrap_err();
    assert!(matches!(err, BeatvizError::Timeout(_)));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert!(child.try_wait().unwrap().is_some());
}

#[cfg(unix)]
#[test]
fn stderr_tail_keeps_the_last_bytes() {
    let mut child = Command::new("sh")
        .args([
            "-c",
            "i=0; while [ $i -lt 600 ]; do echo line-$i >&2; i=$((i+1)); done",
        ])
        .stderr(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let mut tail = StderrTail::spawn(child.stderr.take().unwrap());
    child.wait().unwrap();
    let text = tail.finish();
    assert!(text.len() <= STDERR_TAIL_BYTES);
    assert!(text.ends_with("line-599"));
    assert!(!text.contains("line-0\n"));
}
