use std::ffi::OsString;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::encode::process::{
    EncoderCommand, StderrTail, kill_and_reap, poll_until, tail_suffix, wait_with_deadline,
};
use crate::encode::sink::{BatchOrder, FrameBatch, FrameSink, SinkConfig};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::fs::ensure_parent_dir;

/// Batches queued between the coordinator and the pipe writer.
const WRITE_QUEUE: usize = 2;
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// x264 settings and the bound on encoder stalls.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// x264 preset.
    pub preset: String,
    /// Constant rate factor.
    pub crf: u8,
    /// Longest the encoder may refuse input or take to exit after the last frame.
    #[serde(with = "opt_secs")]
    pub timeout: Option<Duration>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preset: "medium".to_owned(),
            crf: 23,
            timeout: Some(Duration::from_secs(600)),
        }
    }
}

mod opt_secs {
    use std::time::Duration;

    pub(super) fn serialize<S: serde::Serializer>(
        v: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&v.map(|d| d.as_secs_f64()), s)
    }

    pub(super) fn deserialize<'de, D: serde::Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = serde::Deserialize::deserialize(d)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Arguments for streaming raw RGB24 from stdin into an H.264 MP4 at `out`.
pub fn encoder_args(cfg: &SinkConfig, settings: &EncoderSettings, out: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-vcodec",
        "rawvideo",
        "-s",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(cfg.resolution.to_string().into());
    args.extend(["-pix_fmt", "rgb24", "-r"].map(OsString::from));
    args.push(format!("{}/{}", cfg.fps.num, cfg.fps.den).into());
    args.extend(
        [
            "-i",
            "-",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-preset",
        ]
        .map(OsString::from),
    );
    args.push(settings.preset.clone().into());
    args.push("-crf".into());
    args.push(settings.crf.to_string().into());
    args.extend(["-movflags", "+faststart", "-an"].map(OsString::from));
    args.push(out.as_os_str().to_owned());
    args
}

struct Running {
    child: Child,
    tx: Option<SyncSender<Vec<u8>>>,
    writer: Option<JoinHandle<std::io::Result<()>>>,
    stderr: StderrTail,
}

impl Running {
    /// Wait for the writer thread until `deadline`; `None` when it is still blocked.
    fn join_writer(&mut self, deadline: Option<Instant>) -> Option<Result<(), String>> {
        let Some(handle) = self.writer.take() else {
            return Some(Ok(()));
        };
        if !poll_until(deadline, || handle.is_finished()) {
            self.writer = Some(handle);
            return None;
        }
        Some(match handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("encoder writer thread panicked".to_owned()),
        })
    }

    /// Error for a writer that stopped: usually the encoder exited early (broken pipe).
    fn broken_pipe(&mut self) -> BeatvizError {
        let io = match self.join_writer(Some(Instant::now() + EXIT_GRACE)) {
            Some(Err(e)) => e,
            _ => "writer stopped".to_owned(),
        };
        let status = wait_with_deadline(
            &mut self.child,
            Some(Instant::now() + EXIT_GRACE),
            "encoder",
        )
        .map(|s| s.to_string())
        .unwrap_or_else(|_| "still running".to_owned());
        let tail = self.stderr.finish();
        BeatvizError::encoding(format!(
            "encoder stopped accepting frames ({io}; {status}){}",
            tail_suffix(&tail)
        ))
    }

    fn wait(&mut self, deadline: Option<Instant>) -> BeatvizResult<()> {
        drop(self.tx.take());
        let written = match self.join_writer(deadline) {
            Some(res) => res,
            None => {
                kill_and_reap(&mut self.child);
                let _ = self.join_writer(Some(Instant::now() + EXIT_GRACE));
                return Err(BeatvizError::timeout(
                    "encoder stopped reading its input and was killed",
                ));
            }
        };
        let status = wait_with_deadline(&mut self.child, deadline, "encoder")?;
        let tail = self.stderr.finish();
        if let Err(e) = written {
            return Err(BeatvizError::encoding(format!(
                "failed to write frames to the encoder ({e}; {status}){}",
                tail_suffix(&tail)
            )));
        }
        if !status.success() {
            return Err(BeatvizError::encoding(format!(
                "encoder exited with {status}{}",
                tail_suffix(&tail)
            )));
        }
        Ok(())
    }

    fn kill(&mut self) {
        drop(self.tx.take());
        kill_and_reap(&mut self.child);
        let _ = self.join_writer(Some(Instant::now() + EXIT_GRACE));
    }
}

/// Sink that spawns an encoder process and streams raw RGB24 frames into its stdin.
///
/// Batches go through a small bounded queue to a dedicated writer thread, so a slow encoder
/// throttles the coordinator (pipe backpressure) while a stalled one is detected by deadline.
pub struct EncoderSink {
    out_path: PathBuf,
    settings: EncoderSettings,
    command: EncoderCommand,
    running: Option<Running>,
    order: Option<BatchOrder>,
}

impl EncoderSink {
    /// Sink writing an MP4 to `out_path` with the system `ffmpeg`.
    pub fn new(out_path: impl Into<PathBuf>, settings: EncoderSettings) -> Self {
        Self {
            out_path: out_path.into(),
            settings,
            command: EncoderCommand::ffmpeg(),
            running: None,
            order: None,
        }
    }

    /// Use `command` instead of the system `ffmpeg`.
    pub fn with_command(mut self, command: EncoderCommand) -> Self {
        self.command = command;
        self
    }

    /// Output file.
    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    fn remove_output(&self) {
        let _ = std::fs::remove_file(&self.out_path);
    }

    fn running(&mut self) -> BeatvizResult<&mut Running> {
        self.running
            .as_mut()
            .ok_or_else(|| BeatvizError::validation("encoder sink not started"))
    }
}

impl FrameSink for EncoderSink {
    fn begin(&mut self, cfg: &SinkConfig) -> BeatvizResult<()> {
        if self.running.is_some() {
            return Err(BeatvizError::validation("encoder sink already started"));
        }
        cfg.resolution.validate()?;
        cfg.fps.validate()?;
        if self.command.is_ffmpeg() && !cfg.resolution.is_even() {
            return Err(BeatvizError::validation(format!(
                "encoder resolution {} must be even (required for yuv420p output)",
                cfg.resolution
            )));
        }
        self.command.preflight()?;
        ensure_parent_dir(&self.out_path)?;

        let args = encoder_args(cfg, &self.settings, &self.out_path);
        let mut child = self
            .command
            .build(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BeatvizError::encoding(format!(
                    "failed to spawn encoder '{}': {e}",
                    self.command.display_name()
                ))
            })?;
        let (Some(mut stdin), Some(stderr)) = (child.stdin.take(), child.stderr.take()) else {
            kill_and_reap(&mut child);
            return Err(BeatvizError::encoding("failed to open encoder pipes"));
        };
        let stderr = StderrTail::spawn(stderr);

        let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(WRITE_QUEUE);
        let writer = std::thread::Builder::new()
            .name("beatviz-encoder-writer".to_owned())
            .spawn(move || -> std::io::Result<()> {
                for bytes in rx {
                    stdin.write_all(&bytes)?;
                }
                stdin.flush()
            });
        let writer = match writer {
            Ok(w) => w,
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(anyhow::anyhow!("failed to spawn encoder writer thread: {e}").into());
            }
        };

        tracing::info!(
            program = %self.command.display_name(),
            out = %self.out_path.display(),
            resolution = %cfg.resolution,
            frames = cfg.range.len_frames(),
            "encoder started"
        );
        self.running = Some(Running {
            child,
            tx: Some(tx),
            writer: Some(writer),
            stderr,
        });
        self.order = Some(BatchOrder::new(cfg));
        Ok(())
    }

    fn write_batch(&mut self, batch: FrameBatch) -> BeatvizResult<()> {
        self.order
            .as_mut()
            .ok_or_else(|| BeatvizError::validation("encoder sink not started"))?
            .accept(&batch)?;
        let timeout = self.settings.timeout;
        let running = self.running()?;
        let tx = running
            .tx
            .as_ref()
            .ok_or_else(|| BeatvizError::validation("encoder sink already finished"))?;

        let deadline = timeout.map(|t| Instant::now() + t);
        let mut payload = batch.bytes;
        loop {
            match tx.try_send(payload) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        running.kill();
                        return Err(BeatvizError::timeout(format!(
                            "encoder did not accept frames for {timeout:?} and was killed"
                        )));
                    }
                    payload = back;
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(TrySendError::Disconnected(_)) => return Err(running.broken_pipe()),
            }
        }
    }

    fn finish(&mut self) -> BeatvizResult<()> {
        let deadline = self.settings.timeout.map(|t| Instant::now() + t);
        let res = self.running()?.wait(deadline);
        self.running = None;
        match res {
            Ok(()) => {
                tracing::info!(out = %self.out_path.display(), "encoder finished");
                Ok(())
            }
            Err(e) => {
                self.remove_output();
                Err(e)
            }
        }
    }

    fn abort(&mut self) {
        if let Some(mut running) = self.running.take() {
            tracing::warn!(out = %self.out_path.display(), "aborting encoder");
            running.kill();
            self.remove_output();
        }
    }
}

impl Drop for EncoderSink {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
