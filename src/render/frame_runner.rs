use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::foundation::core::{FrameIndex, Resolution, Rgb8};
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::postprocess::PostProcessChain;
use crate::synth::contract::{FrameBuffer, FrameSynthesizer, SynthContext};
use crate::synth::registry::SynthesizerFactory;

/// What happened to one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    Rendered,
    Substituted(String),
}

/// Result of one synthesizer call before filler substitution.
enum CallOutcome {
    Ok,
    Failed(String),
    Fatal(BeatvizError),
}

/// One synthesizer instance plus what it takes to rebuild it after a panic.
struct SynthHost {
    factory: SynthesizerFactory,
    ctx: SynthContext,
    synth: Box<dyn FrameSynthesizer>,
}

impl SynthHost {
    fn new(factory: SynthesizerFactory, ctx: SynthContext) -> BeatvizResult<Self> {
        let synth = build(&factory, &ctx)?;
        Ok(Self {
            factory,
            ctx,
            synth,
        })
    }

    fn call(&mut self, idx: FrameIndex, out: &mut FrameBuffer) -> CallOutcome {
        let synth = &mut self.synth;
        match catch_unwind(AssertUnwindSafe(|| synth.render_frame(idx, out))) {
            Ok(Ok(())) => CallOutcome::Ok,
            Ok(Err(e)) => CallOutcome::Failed(format!("{e:#}")),
            Err(payload) => {
                let reason = format!("synthesizer panicked: {}", panic_message(&*payload));
                match build(&self.factory, &self.ctx) {
                    Ok(fresh) => {
                        self.synth = fresh;
                        CallOutcome::Failed(reason)
                    }
                    Err(e) => CallOutcome::Fatal(e),
                }
            }
        }
    }
}

fn build(
    factory: &SynthesizerFactory,
    ctx: &SynthContext,
) -> BeatvizResult<Box<dyn FrameSynthesizer>> {
    let mut synth = catch_unwind(AssertUnwindSafe(|| factory.make())).map_err(|payload| {
        BeatvizError::validation(format!(
            "synthesizer construction panicked: {}",
            panic_message(&*payload)
        ))
    })?;
    match catch_unwind(AssertUnwindSafe(|| synth.setup(ctx))) {
        Ok(Ok(())) => Ok(synth),
        Ok(Err(e)) => Err(BeatvizError::validation(format!(
            "synthesizer setup failed: {e:#}"
        ))),
        Err(payload) => Err(BeatvizError::validation(format!(
            "synthesizer setup panicked: {}",
            panic_message(&*payload)
        ))),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

type Request = (FrameIndex, FrameBuffer);
type Reply = (FrameBuffer, CallOutcome);

/// Synthesizer running on its own thread so a stuck call can be abandoned.
struct Watchdog {
    tx: Option<mpsc::Sender<Request>>,
    rx: mpsc::Receiver<Reply>,
    handle: Option<JoinHandle<()>>,
    timeout: Duration,
    stuck: bool,
}

impl Watchdog {
    fn spawn(mut host: SynthHost, timeout: Duration) -> BeatvizResult<Self> {
        let (tx, req_rx) = mpsc::channel::<Request>();
        let (reply_tx, rx) = mpsc::channel::<Reply>();
        let handle = std::thread::Builder::new()
            .name("beatviz-synth".to_owned())
            .spawn(move || {
                while let Ok((idx, mut buf)) = req_rx.recv() {
                    let outcome = host.call(idx, &mut buf);
                    if reply_tx.send((buf, outcome)).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| anyhow::anyhow!("failed to spawn synthesizer thread: {e}"))?;
        Ok(Self {
            tx: Some(tx),
            rx,
            handle: Some(handle),
            timeout,
            stuck: false,
        })
    }

    fn call(&mut self, idx: FrameIndex, out: &mut FrameBuffer) -> BeatvizResult<CallOutcome> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| BeatvizError::timeout("synthesizer thread was abandoned"))?;
        tx.send((idx, std::mem::take(out)))
            .map_err(|_| anyhow::anyhow!("synthesizer thread exited unexpectedly"))?;
        match self.rx.recv_timeout(self.timeout) {
            Ok((buf, outcome)) => {
                *out = buf;
                Ok(outcome)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                self.stuck = true;
                self.tx = None;
                Err(BeatvizError::timeout(format!(
                    "frame {} exceeded the {:?} synthesis timeout",
                    idx.0, self.timeout
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(anyhow::anyhow!("synthesizer thread exited unexpectedly").into())
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take()
            && !self.stuck
        {
            let _ = handle.join();
        }
        // A stuck thread is detached; it exits once its call returns and the reply fails.
    }
}

enum Host {
    Inline(SynthHost),
    Watched(Watchdog),
}

/// Renders single frames: synthesis, shape check, filler substitution and post-processing.
///
/// Each worker owns exactly one runner; runners are never shared.
pub(crate) struct FrameRunner {
    host: Host,
    chain: PostProcessChain,
    resolution: Resolution,
    filler: Rgb8,
}

impl FrameRunner {
    /// Build and set up a synthesizer. A construction or setup failure is a `Validation` error.
    pub(crate) fn new(
        factory: SynthesizerFactory,
        ctx: SynthContext,
        chain: PostProcessChain,
        filler: Rgb8,
        timeout: Option<Duration>,
    ) -> BeatvizResult<Self> {
        let resolution = ctx.resolution;
        let host = SynthHost::new(factory, ctx)?;
        let host = match timeout {
            Some(t) => Host::Watched(Watchdog::spawn(host, t)?),
            None => Host::Inline(host),
        };
        Ok(Self {
            host,
            chain,
            resolution,
            filler,
        })
    }

    /// Render `idx` into `out`.
    ///
    /// A failing or panicking synthesizer yields a filler frame and
    /// [`FrameOutcome::Substituted`]. Timeouts, shape violations and rebuild failures are fatal.
    pub(crate) fn render(
        &mut self,
        idx: FrameIndex,
        out: &mut FrameBuffer,
    ) -> BeatvizResult<FrameOutcome> {
        let outcome = match &mut self.host {
            Host::Inline(host) => host.call(idx, out),
            Host::Watched(w) => w.call(idx, out)?,
        };
        match outcome {
            CallOutcome::Ok => {
                if let Err(e) = out.validate(self.resolution) {
                    tracing::error!(frame = idx.0, error = %e, "synthesizer returned a malformed frame");
                    return Err(e);
                }
                self.chain.apply(idx, out);
                Ok(FrameOutcome::Rendered)
            }
            CallOutcome::Failed(reason) => {
                tracing::warn!(
                    frame = idx.0,
                    reason = %reason,
                    "frame synthesis failed, substituting filler"
                );
                out.reset(self.resolution, self.filler);
                Ok(FrameOutcome::Substituted(reason))
            }
            CallOutcome::Fatal(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/frame_runner.rs"]
mod tests;
