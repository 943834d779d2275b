use crate::foundation::core::{Fps, FrameIndex, FrameRange, Resolution};
use crate::foundation::error::{BeatvizError, BeatvizResult};

/// Configuration provided to a [`FrameSink`] before the first batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    /// Frame resolution.
    pub resolution: Resolution,
    /// Output frames-per-second.
    pub fps: Fps,
    /// Frames that will be delivered, in order.
    pub range: FrameRange,
}

/// A run of consecutive frames as raw RGB24 bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBatch {
    /// Index of the first frame.
    pub start: FrameIndex,
    /// Number of frames.
    pub frames: u64,
    /// `frames * width * height * 3` bytes.
    pub bytes: Vec<u8>,
}

impl FrameBatch {
    /// One past the last frame.
    pub fn end(&self) -> FrameIndex {
        FrameIndex(self.start.0 + self.frames)
    }
}

/// Sink contract for consuming rendered frames in timeline order.
///
/// Ordering contract: batches are contiguous and strictly increasing, starting at
/// `SinkConfig::range.start`. Exactly one coordinator writes to a sink.
pub trait FrameSink: Send {
    /// Called once before any batch.
    fn begin(&mut self, cfg: &SinkConfig) -> BeatvizResult<()>;
    /// Consume the next batch.
    fn write_batch(&mut self, batch: FrameBatch) -> BeatvizResult<()>;
    /// Called once after the last batch; flushes and waits for the consumer.
    fn finish(&mut self) -> BeatvizResult<()>;
    /// Tear down after a failure or cancellation. Must not block indefinitely.
    fn abort(&mut self);
}

/// Shape and ordering checks shared by sink implementations.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BatchOrder {
    next: FrameIndex,
    end: FrameIndex,
    frame_bytes: usize,
}

impl BatchOrder {
    pub(crate) fn new(cfg: &SinkConfig) -> Self {
        Self {
            next: cfg.range.start,
            end: cfg.range.end,
            frame_bytes: cfg.resolution.frame_bytes(),
        }
    }

    pub(crate) fn accept(&mut self, batch: &FrameBatch) -> BeatvizResult<()> {
        if batch.start != self.next {
            return Err(BeatvizError::validation(format!(
                "sink expected a batch starting at frame {}, got {}",
                self.next.0, batch.start.0
            )));
        }
        if batch.frames == 0 || batch.end().0 > self.end.0 {
            return Err(BeatvizError::validation(format!(
                "batch [{}, {}) is empty or past the end of the range",
                batch.start.0,
                batch.end().0
            )));
        }
        let expected = self.frame_bytes as u64 * batch.frames;
        if batch.bytes.len() as u64 != expected {
            return Err(BeatvizError::validation(format!(
                "batch carries {} bytes, expected {expected}",
                batch.bytes.len()
            )));
        }
        self.next = batch.end();
        Ok(())
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.next == self.end
    }

    pub(crate) fn next(&self) -> FrameIndex {
        self.next
    }
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    order: Option<BatchOrder>,
    bytes: Vec<u8>,
    batches: u64,
    finished: bool,
    aborted: bool,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration captured in `begin`, if any.
    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    /// All received bytes, in order.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of frames received.
    pub fn frame_count(&self) -> usize {
        match self.cfg {
            Some(cfg) if cfg.resolution.frame_bytes() > 0 => {
                self.bytes.len() / cfg.resolution.frame_bytes()
            }
            _ => 0,
        }
    }

    /// Bytes of the `i`-th received frame (relative to the range start).
    pub fn frame(&self, i: usize) -> Option<&[u8]> {
        let n = self.cfg?.resolution.frame_bytes();
        self.bytes.get(i * n..(i + 1) * n)
    }

    /// Received frames in order.
    pub fn frames(&self) -> impl Iterator<Item = &[u8]> {
        let n = self.cfg.map_or(1, |c| c.resolution.frame_bytes().max(1));
        self.bytes.chunks_exact(n)
    }

    /// Batches received.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// `true` after a successful `finish`.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// `true` after `abort`.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: &SinkConfig) -> BeatvizResult<()> {
        self.cfg = Some(*cfg);
        self.order = Some(BatchOrder::new(cfg));
        self.bytes.clear();
        self.batches = 0;
        self.finished = false;
        self.aborted = false;
        Ok(())
    }

    fn write_batch(&mut self, mut batch: FrameBatch) -> BeatvizResult<()> {
        let order = self
            .order
            .as_mut()
            .ok_or_else(|| BeatvizError::validation("sink not started"))?;
        order.accept(&batch)?;
        self.bytes.append(&mut batch.bytes);
        self.batches += 1;
        Ok(())
    }

    fn finish(&mut self) -> BeatvizResult<()> {
        let order = self
            .order
            .as_ref()
            .ok_or_else(|| BeatvizError::validation("sink not started"))?;
        if !order.is_complete() {
            return Err(BeatvizError::validation(format!(
                "sink finished early at frame {}",
                order.next().0
            )));
        }
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/sink.rs"]
mod tests;
