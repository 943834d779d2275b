//! beatviz renders audio-reactive videos.
//!
//! The pipeline has three stages:
//!
//! - Analyze an audio file into a frame-aligned [`AudioFeatureSet`] (cached on disk)
//! - Synthesize one RGB frame per video frame with a registered [`FrameSynthesizer`]
//! - Post-process and stream the frames, in order, into an encoder process, then mux the audio
//!
//! Front ends only need [`analyze`], [`render`] and [`list_synthesizers`].
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Audio decoding, feature extraction and the feature cache.
pub mod analysis;
/// Front-end entry points.
pub mod api;
/// JSON job configuration and export profiles.
pub mod config;
/// Frame sinks, the encoder process and the mux step.
pub mod encode;
/// Pixel-space post-processing.
pub mod postprocess;
/// Sequential and parallel render engines.
pub mod render;
/// Synthesizer contract, registry and built-ins.
pub mod synth;

pub use crate::foundation::core::{Fps, FrameIndex, FrameRange, Resolution, Rgb8};
pub use crate::foundation::error::{BeatvizError, BeatvizResult};

pub use crate::analysis::{
    AnalyzerOpts, AudioAnalyzer, AudioFeatureSet, CacheStatus, FeatureSummary, FrameFeatures,
};
pub use crate::api::{Engine, analyze, list_synthesizers, render};
pub use crate::config::{EncoderConfig, EngineConfig, ExportProfile, JobConfig, VisualConfig};
pub use crate::encode::{
    EncoderCommand, EncoderSettings, EncoderSink, FrameBatch, FrameSink, InMemorySink, MuxStep,
    SinkConfig, is_ffmpeg_on_path,
};
pub use crate::postprocess::{PostProcessChain, PostProcessConfig};
pub use crate::render::job::{
    CancelToken, JobLifecycle, JobState, PartialFailure, RenderJob, RenderOpts, RenderReport,
};
pub use crate::render::{ParallelRenderer, SequentialRenderer};
pub use crate::synth::{
    FrameBuffer, FrameSynthesizer, Palette, RegistryBuilder, SynthContext, SynthesizerFactory,
    SynthesizerRegistry,
};
