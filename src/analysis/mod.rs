//! Audio analysis: decoding, per-frame feature extraction and the versioned feature cache.
//!
//! [`AudioAnalyzer`] is the entry point. It fingerprints the input bytes, serves a matching cache
//! entry when one exists, and otherwise decodes, analyzes and persists atomically.

/// Analyzer front end and options.
pub mod analyzer;
/// On-disk feature cache.
pub mod cache;
pub(crate) mod decode;
pub(crate) mod dsp;
/// Frame-aligned feature set.
pub mod features;
/// Content and cache-key fingerprints.
pub mod fingerprint;

pub use analyzer::{ANALYSIS_SCHEMA_VERSION, AnalyzerOpts, AudioAnalyzer, CacheStatus};
pub use cache::{CACHE_FORMAT_VERSION, CacheLookup, FeatureCache};
pub use features::{
    AudioFeatureSet, AudioMode, CHROMA_BINS, FeatureMatrix, FeatureParts, FeatureSummary,
    FrameFeatures, MFCC_COEFFS, SkippedFeature, TEMPOGRAM_LAGS,
};
pub use fingerprint::Fingerprint;
