use std::ffi::{OsStr, OsString};
use std::io::Read as _;
use std::process::{Child, ChildStderr, Command, ExitStatus};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::foundation::error::{BeatvizError, BeatvizResult};

const POLL: Duration = Duration::from_millis(5);
const STDERR_TAIL_BYTES: usize = 4096;
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// Program used for encoding and muxing, plus arguments placed before the generated ones.
///
/// Defaults to the system `ffmpeg`. Any other program receives the same argument list, which
/// lets tests stand in a shell script for the encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderCommand {
    /// Executable name or path.
    pub program: OsString,
    /// Leading arguments.
    pub args: Vec<OsString>,
}

impl Default for EncoderCommand {
    fn default() -> Self {
        Self::ffmpeg()
    }
}

impl EncoderCommand {
    /// The system `ffmpeg` from `PATH`.
    pub fn ffmpeg() -> Self {
        Self {
            program: "ffmpeg".into(),
            args: Vec::new(),
        }
    }

    /// A custom program with leading arguments.
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `true` when this runs the system `ffmpeg`.
    pub fn is_ffmpeg(&self) -> bool {
        self.program == OsStr::new("ffmpeg") && self.args.is_empty()
    }

    pub(crate) fn build(&self, generated: &[OsString]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(generated);
        cmd
    }

    pub(crate) fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Fail early when the system `ffmpeg` is required but missing.
    pub(crate) fn preflight(&self) -> BeatvizResult<()> {
        if self.is_ffmpeg() && !is_ffmpeg_on_path() {
            return Err(BeatvizError::encoding(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }
        Ok(())
    }
}

/// Background reader that keeps the last few KiB of a child's stderr.
pub(crate) struct StderrTail {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl StderrTail {
    pub(crate) fn spawn(mut stderr: ChildStderr) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = std::thread::spawn(move || {
            let mut chunk = [0u8; 1024];
            loop {
                match stderr.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut tail = sink.lock().unwrap_or_else(|e| e.into_inner());
                        tail.extend_from_slice(&chunk[..n]);
                        if tail.len() > STDERR_TAIL_BYTES {
                            let excess = tail.len() - STDERR_TAIL_BYTES;
                            tail.drain(..excess);
                        }
                    }
                }
            }
        });
        Self {
            buf,
            handle: Some(handle),
        }
    }

    /// Collected text so far.
    pub(crate) fn snapshot(&self) -> String {
        let tail = self.buf.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&tail).trim().to_owned()
    }

    /// Wait briefly for the stream to close, then return the tail.
    pub(crate) fn finish(&mut self) -> String {
        if let Some(handle) = self.handle.take() {
            if poll_until(Some(Instant::now() + STDERR_GRACE), || handle.is_finished()) {
                let _ = handle.join();
            }
            // Otherwise a grandchild still holds the pipe; the reader is left detached.
        }
        self.snapshot()
    }
}

/// `": <tail>"`, or nothing when the tail is empty.
pub(crate) fn tail_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {tail}")
    }
}

/// Poll `done` until it returns `true` or `deadline` passes. Returns the last result.
pub(crate) fn poll_until(deadline: Option<Instant>, mut done: impl FnMut() -> bool) -> bool {
    loop {
        if done() {
            return true;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return false;
        }
        std::thread::sleep(POLL);
    }
}

/// Wait for `child` to exit; on timeout it is killed and reaped and `Timeout` is returned.
pub(crate) fn wait_with_deadline(
    child: &mut Child,
    deadline: Option<Instant>,
    what: &str,
) -> BeatvizResult<ExitStatus> {
    loop {
        if let Some(status) = child
            .try_wait()
            .with_context(|| format!("failed to wait for the {what}"))?
        {
            return Ok(status);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_and_reap(child);
            return Err(BeatvizError::timeout(format!(
                "{what} did not finish in time and was killed"
            )));
        }
        std::thread::sleep(POLL);
    }
}

/// Kill `child` (ignoring "already exited") and collect its status.
pub(crate) fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/process.rs"]
mod tests;
