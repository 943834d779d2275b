/// Convenience result type used across beatviz.
pub type BeatvizResult<T> = Result<T, BeatvizError>;

/// Top-level error taxonomy used by engine APIs.
#[derive(thiserror::Error, Debug)]
pub enum BeatvizError {
    /// Unreadable, unsupported or corrupt audio input.
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid configuration, job parameters or synthesizer output.
    #[error("validation error: {0}")]
    Validation(String),

    /// Corrupt or mismatched feature cache entry.
    ///
    /// The analyzer recovers from this internally by recomputing; it only surfaces from the
    /// low-level cache API.
    #[error("cache error: {0}")]
    Cache(String),

    /// Encoder or muxer process failure.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A frame synthesis call or an external process exceeded its time bound.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Lookup of an unknown identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Registration of an identifier that is already bound to a different implementation.
    #[error("conflict error: {0}")]
    Conflict(String),

    /// The job was cancelled cooperatively.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Too many frames were substituted with filler frames.
    #[error(
        "failure threshold exceeded: {failed} of {total} frames failed (max ratio {max_ratio})"
    )]
    FailureThreshold {
        /// Frames that failed so far.
        failed: u64,
        /// Frames in the job.
        total: u64,
        /// Configured abort ratio.
        max_ratio: f64,
    },

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeatvizError {
    /// Build a [`BeatvizError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`BeatvizError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`BeatvizError::Cache`] value.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Build a [`BeatvizError::Encoding`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Build a [`BeatvizError::Timeout`] value.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Build a [`BeatvizError::NotFound`] value.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Build a [`BeatvizError::Conflict`] value.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Build a [`BeatvizError::Cancelled`] value.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Return `true` for errors that end a render job (everything except recoverable cache errors).
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cache(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
