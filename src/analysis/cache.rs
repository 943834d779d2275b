use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::analysis::features::{
    AudioFeatureSet, AudioMode, CHROMA_BINS, FeatureMatrix, FeatureParts, MFCC_COEFFS,
    SkippedFeature,
};
use crate::analysis::fingerprint::{Fingerprint, checksum};
use crate::foundation::core::Fps;
use crate::foundation::error::{BeatvizError, BeatvizResult};
use crate::foundation::fs::{TempFileGuard, unique_temp_path};

/// On-disk layout version. Bump on any change to the header or body encoding.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"BVZF";
const FILE_EXT: &str = "bvzf";
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Per-frame series in body order.
const FEATURE_NAMES: [&str; 8] = [
    "rms",
    "onset",
    "spectral_centroid",
    "spectral_rolloff",
    "zero_crossing_rate",
    "chroma",
    "mfcc",
    "tempogram",
];

#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
struct CacheHeader {
    format_version: u32,
    schema_version: u32,
    fingerprint: String,
    fps: Fps,
    frame_count: u64,
    // Floats are stored as raw bits so a round trip is bit-exact.
    duration_bits: u64,
    tempo_bits: u32,
    sample_rate: u32,
    key: Option<String>,
    mode: AudioMode,
    skipped: Vec<SkippedFeature>,
    feature_names: Vec<String>,
    feature_rows: Vec<usize>,
    body_len: u64,
    body_checksum: u64,
}

/// Identity a cache entry must match to be used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLookup {
    /// Content + parameter fingerprint.
    pub fingerprint: Fingerprint,
    /// Output frame rate the features are aligned to.
    pub fps: Fps,
    /// Analysis schema version.
    pub schema_version: u32,
}

/// Directory of write-once feature cache entries.
#[derive(Clone, Debug)]
pub struct FeatureCache {
    dir: PathBuf,
}

impl FeatureCache {
    /// Cache rooted at `dir` (created lazily on first store).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path of the entry for `fingerprint`.
    pub fn entry_path(&self, fingerprint: Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{FILE_EXT}", fingerprint.to_hex()))
    }

    /// Load the entry for `lookup`.
    ///
    /// Returns `Ok(None)` when no entry exists and [`BeatvizError::Cache`] when an entry exists
    /// but is corrupt or was written for a different identity or layout.
    pub fn load(&self, lookup: &CacheLookup) -> BeatvizResult<Option<AudioFeatureSet>> {
        let path = self.entry_path(lookup.fingerprint);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BeatvizError::cache(format!(
                    "failed to read '{}': {e}",
                    path.display()
                )));
            }
        };
        decode_entry(&bytes, lookup).map(Some)
    }

    /// Persist `features` atomically: write a temp file, sync it, then rename into place.
    pub fn store(
        &self,
        lookup: &CacheLookup,
        features: &AudioFeatureSet,
    ) -> BeatvizResult<PathBuf> {
        let bytes = encode_entry(lookup, features)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            BeatvizError::cache(format!(
                "failed to create cache dir '{}': {e}",
                self.dir.display()
            ))
        })?;

        let final_path = self.entry_path(lookup.fingerprint);
        let tmp = unique_temp_path(&self.dir, &lookup.fingerprint.to_hex(), "tmp");
        let mut guard = TempFileGuard::new(tmp.clone());
        let io = |what: &str, e: std::io::Error| {
            BeatvizError::cache(format!("failed to {what} '{}': {e}", tmp.display()))
        };
        {
            let mut f = std::fs::File::create(&tmp).map_err(|e| io("create", e))?;
            f.write_all(&bytes).map_err(|e| io("write", e))?;
            f.sync_all().map_err(|e| io("sync", e))?;
        }
        std::fs::rename(&tmp, &final_path).map_err(|e| io("rename", e))?;
        guard.disarm();
        Ok(final_path)
    }

    /// Delete the entry for `fingerprint`. Returns whether one existed.
    pub fn remove(&self, fingerprint: Fingerprint) -> BeatvizResult<bool> {
        match std::fs::remove_file(self.entry_path(fingerprint)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BeatvizError::cache(format!("failed to remove entry: {e}"))),
        }
    }

    /// Delete every entry. Returns the number removed.
    pub fn clear(&self) -> BeatvizResult<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(BeatvizError::cache(format!("failed to list cache: {e}"))),
        };
        let mut removed = 0;
        for entry in entries {
            let path = entry
                .map_err(|e| BeatvizError::cache(format!("failed to list cache: {e}")))?
                .path();
            if path.extension().and_then(|e| e.to_str()) == Some(FILE_EXT) {
                std::fs::remove_file(&path).map_err(|e| {
                    BeatvizError::cache(format!("failed to remove '{}': {e}", path.display()))
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn series_rows(tempogram_width: usize) -> [usize; 8] {
    [1, 1, 1, 1, 1, CHROMA_BINS, MFCC_COEFFS, tempogram_width]
}

pub(crate) fn encode_entry(
    lookup: &CacheLookup,
    features: &AudioFeatureSet,
) -> BeatvizResult<Vec<u8>> {
    let series: [&[f32]; 8] = [
        features.rms(),
        features.onset(),
        features.spectral_centroid(),
        features.spectral_rolloff(),
        features.zero_crossing_rate(),
        features.chroma().as_slice(),
        features.mfcc().as_slice(),
        features.tempogram().as_slice(),
    ];
    let mut body = Vec::with_capacity(series.iter().map(|s| s.len() * 4).sum());
    for s in series {
        for v in s {
            body.extend_from_slice(&v.to_le_bytes());
        }
    }

    let header = CacheHeader {
        format_version: CACHE_FORMAT_VERSION,
        schema_version: lookup.schema_version,
        fingerprint: lookup.fingerprint.to_hex(),
        fps: features.fps(),
        frame_count: features.frame_count(),
        duration_bits: features.duration().to_bits(),
        tempo_bits: features.tempo().to_bits(),
        sample_rate: features.sample_rate(),
        key: features.key().map(str::to_owned),
        mode: features.mode(),
        skipped: features.skipped().to_vec(),
        feature_names: FEATURE_NAMES.iter().map(|s| (*s).to_owned()).collect(),
        feature_rows: series_rows(features.tempogram().width()).to_vec(),
        body_len: body.len() as u64,
        body_checksum: checksum(&body),
    };
    let header_json = serde_json::to_vec(&header)
        .map_err(|e| BeatvizError::cache(format!("failed to encode header: {e}")))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| BeatvizError::cache("cache header too large"))?;

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header_json.len() + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&body);
    Ok(out)
}

pub(crate) fn decode_entry(bytes: &[u8], lookup: &CacheLookup) -> BeatvizResult<AudioFeatureSet> {
    let rest = bytes
        .strip_prefix(MAGIC.as_slice())
        .ok_or_else(|| BeatvizError::cache("bad magic"))?;
    if rest.len() < 4 {
        return Err(BeatvizError::cache("truncated header length"));
    }
    let header_len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    let rest = &rest[4..];
    if header_len > MAX_HEADER_BYTES || header_len > rest.len() {
        return Err(BeatvizError::cache(format!(
            "invalid header length {header_len}"
        )));
    }
    let (header_json, body) = rest.split_at(header_len);
    let header: CacheHeader = serde_json::from_slice(header_json)
        .map_err(|e| BeatvizError::cache(format!("unreadable header: {e}")))?;

    if header.format_version != CACHE_FORMAT_VERSION {
        return Err(BeatvizError::cache(format!(
            "format version {} != {CACHE_FORMAT_VERSION}",
            header.format_version
        )));
    }
    if header.schema_version != lookup.schema_version {
        return Err(BeatvizError::cache(format!(
            "schema version {} != {}",
            header.schema_version, lookup.schema_version
        )));
    }
    if header.fingerprint != lookup.fingerprint.to_hex() {
        return Err(BeatvizError::cache("fingerprint mismatch"));
    }
    if header.fps != lookup.fps {
        return Err(BeatvizError::cache(format!(
            "fps {}/{} != {}/{}",
            header.fps.num, header.fps.den, lookup.fps.num, lookup.fps.den
        )));
    }
    if header.feature_names.len() != FEATURE_NAMES.len()
        || header
            .feature_names
            .iter()
            .zip(FEATURE_NAMES)
            .any(|(a, b)| a != b)
    {
        return Err(BeatvizError::cache(format!(
            "unexpected feature names {:?}",
            header.feature_names
        )));
    }
    let tempogram_width = header.feature_rows.last().copied().unwrap_or(0);
    if header.feature_rows != series_rows(tempogram_width) {
        return Err(BeatvizError::cache(format!(
            "unexpected feature rows {:?}",
            header.feature_rows
        )));
    }

    let frames = usize::try_from(header.frame_count)
        .map_err(|_| BeatvizError::cache("frame count exceeds usize"))?;
    let values_per_frame = header.feature_rows.iter().sum::<usize>();
    let expected_len = frames
        .checked_mul(values_per_frame)
        .and_then(|v| v.checked_mul(4))
        .ok_or_else(|| BeatvizError::cache("body size overflows usize"))?;
    if header.body_len != body.len() as u64 || body.len() != expected_len {
        return Err(BeatvizError::cache(format!(
            "body is {} bytes, header says {}, layout needs {expected_len}",
            body.len(),
            header.body_len
        )));
    }
    if checksum(body) != header.body_checksum {
        return Err(BeatvizError::cache("body checksum mismatch"));
    }

    let mut values = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    let mut take = |n: usize| values.by_ref().take(n).collect::<Vec<f32>>();
    let rms = take(frames);
    let onset = take(frames);
    let spectral_centroid = take(frames);
    let spectral_rolloff = take(frames);
    let zero_crossing_rate = take(frames);
    let chroma = take(frames * CHROMA_BINS);
    let mfcc = take(frames * MFCC_COEFFS);
    let tempogram = take(frames * tempogram_width);

    let as_cache = |e: BeatvizError| BeatvizError::cache(format!("inconsistent entry: {e}"));
    let features = AudioFeatureSet::from_parts(FeatureParts {
        duration: f64::from_bits(header.duration_bits),
        sample_rate: header.sample_rate,
        fps: header.fps,
        rms,
        onset,
        spectral_centroid,
        spectral_rolloff,
        zero_crossing_rate,
        chroma: FeatureMatrix::new(frames, CHROMA_BINS, chroma).map_err(as_cache)?,
        mfcc: FeatureMatrix::new(frames, MFCC_COEFFS, mfcc).map_err(as_cache)?,
        tempogram: FeatureMatrix::new(frames, tempogram_width, tempogram).map_err(as_cache)?,
        tempo: f32::from_bits(header.tempo_bits),
        key: header.key,
        mode: header.mode,
        skipped: header.skipped,
    })
    .map_err(as_cache)?;
    if features.frame_count() != header.frame_count {
        return Err(BeatvizError::cache(
            "frame count does not match duration and fps",
        ));
    }
    Ok(features)
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/cache.rs"]
mod tests;
