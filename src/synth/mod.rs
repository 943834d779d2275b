//! Frame synthesizers: the plugin contract, the registry that names them and the built-ins.
//!
//! A synthesizer turns a frame index plus the immutable [`crate::AudioFeatureSet`] into one RGB8
//! frame. Instances are created per worker through [`SynthesizerRegistry`] and never shared.

/// Built-in synthesizers.
pub mod builtin;
/// Plugin contract and frame buffer.
pub mod contract;
/// Id to factory registry.
pub mod registry;

pub use builtin::{PulsingCore, SolidColor, SpectrumBars};
pub use contract::{FrameBuffer, FrameSynthesizer, Palette, SynthContext};
pub use registry::{
    RegistryBuilder, SynthesizerFactory, SynthesizerRegistry, global, install_global,
};
