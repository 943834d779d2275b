use crate::encode::sink::FrameBatch;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{BeatvizError, BeatvizResult};

/// Accumulates consecutive frames until `threshold` bytes, then yields a [`FrameBatch`].
///
/// Batching amortizes per-write pipe overhead; a batch always holds at least one frame.
#[derive(Debug)]
pub(crate) struct FrameBatcher {
    threshold: usize,
    start: FrameIndex,
    frames: u64,
    bytes: Vec<u8>,
}

impl FrameBatcher {
    pub(crate) fn new(start: FrameIndex, threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            start,
            frames: 0,
            bytes: Vec::new(),
        }
    }

    fn next_index(&self) -> FrameIndex {
        FrameIndex(self.start.0 + self.frames)
    }

    /// Append frame `idx`. Returns a full batch once the threshold is reached.
    pub(crate) fn push(
        &mut self,
        idx: FrameIndex,
        frame: &[u8],
    ) -> BeatvizResult<Option<FrameBatch>> {
        if idx != self.next_index() {
            return Err(BeatvizError::validation(format!(
                "batcher expected frame {}, got {}",
                self.next_index().0,
                idx.0
            )));
        }
        if self.bytes.capacity() == 0 {
            self.bytes.reserve(self.threshold.max(frame.len()));
        }
        self.bytes.extend_from_slice(frame);
        self.frames += 1;
        if self.bytes.len() >= self.threshold {
            return Ok(self.take());
        }
        Ok(None)
    }

    /// Remaining frames, if any.
    pub(crate) fn finish(&mut self) -> Option<FrameBatch> {
        self.take()
    }

    fn take(&mut self) -> Option<FrameBatch> {
        if self.frames == 0 {
            return None;
        }
        let next = self.next_index();
        let batch = FrameBatch {
            start: self.start,
            frames: self.frames,
            bytes: std::mem::take(&mut self.bytes),
        };
        self.start = next;
        self.frames = 0;
        Some(batch)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/batch.rs"]
mod tests;
