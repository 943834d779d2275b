use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use crate::encode::process::{EncoderCommand, StderrTail, tail_suffix, wait_with_deadline};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::fs::ensure_parent_dir;

/// Second pass that copies the video stream and adds the source audio as AAC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MuxStep {
    /// Encoded video without audio.
    pub video: PathBuf,
    /// Original audio file.
    pub audio: PathBuf,
    /// Final container.
    pub output: PathBuf,
    /// AAC bitrate, e.g. `"320k"`.
    pub audio_bitrate: String,
    /// Bound on the muxer run.
    pub timeout: Option<Duration>,
    /// Program to run.
    pub command: EncoderCommand,
}

impl MuxStep {
    /// Mux with the system `ffmpeg` at 320 kbit/s.
    pub fn new(
        video: impl Into<PathBuf>,
        audio: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video: video.into(),
            audio: audio.into(),
            output: output.into(),
            audio_bitrate: "320k".to_owned(),
            timeout: Some(Duration::from_secs(600)),
            command: EncoderCommand::ffmpeg(),
        }
    }

    /// Generated argument list.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-loglevel", "error", "-i"]
            .map(OsString::from)
            .into();
        args.push(self.video.clone().into());
        args.push("-i".into());
        args.push(self.audio.clone().into());
        args.extend(["-c:v", "copy", "-c:a", "aac", "-b:a"].map(OsString::from));
        args.push(self.audio_bitrate.clone().into());
        args.push("-shortest".into());
        args.push(self.output.clone().into());
        args
    }

    /// Run the muxer to completion. A failed run removes any partial output.
    #[tracing::instrument(skip_all, fields(output = %self.output.display()))]
    pub fn run(&self) -> BeatvizResult<()> {
        self.command.preflight()?;
        ensure_parent_dir(&self.output)?;
        let deadline = self.timeout.map(|t| Instant::now() + t);

        let mut child = self
            .command
            .build(&self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BeatvizError::encoding(format!(
                    "failed to spawn muxer '{}': {e}",
                    self.command.display_name()
                ))
            })?;
        let mut stderr = child.stderr.take().map(StderrTail::spawn);

        let res = wait_with_deadline(&mut child, deadline, "muxer").and_then(|status| {
            if status.success() {
                return Ok(());
            }
            let tail = stderr.as_mut().map(StderrTail::finish).unwrap_or_default();
            Err(BeatvizError::encoding(format!(
                "muxer exited with {status}{}",
                tail_suffix(&tail)
            )))
        });
        match res {
            Ok(()) => {
                tracing::info!("audio muxed");
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&self.output);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/mux.rs"]
mod tests;
