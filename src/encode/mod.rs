//! Encoding sinks.
//!
//! Sinks consume rendered frames in timeline order. The encoder sink streams them into an
//! external process; the mux step adds the audio track afterwards.

/// Encoder process sink (`ffmpeg` by default).
pub mod ffmpeg;
/// Audio muxing pass.
pub mod mux;
/// Child process helpers shared by the encoder and the muxer.
pub mod process;
/// Generic frame sink trait and the in-memory sink.
pub mod sink;

pub use ffmpeg::{EncoderSettings, EncoderSink, encoder_args};
pub use mux::MuxStep;
pub use process::{EncoderCommand, is_ffmpeg_on_path};
pub use sink::{FrameBatch, FrameSink, InMemorySink, SinkConfig};
