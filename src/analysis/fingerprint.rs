use std::io::Read as _;
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

use crate::foundation::core::Fps;
use crate::foundation::error::{BeatvizError, BeatvizResult};

const XXH3_SEED: u64 = 0x6a09_e667_f3bc_c908;
const READ_CHUNK: usize = 64 * 1024;

/// Stable 128-bit cache key derived from audio content and analysis parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// High 64 bits.
    pub hi: u64,
    /// Low 64 bits.
    pub lo: u64,
}

impl Fingerprint {
    /// 32-character lowercase hex form, used for cache file names.
    pub fn to_hex(self) -> String {
        format!("{:016x}{:016x}", self.hi, self.lo)
    }

    /// Parse the form produced by [`Fingerprint::to_hex`].
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.is_ascii() {
            return None;
        }
        let hi = u64::from_str_radix(&s[..16], 16).ok()?;
        let lo = u64::from_str_radix(&s[16..], 16).ok()?;
        Some(Self { hi, lo })
    }
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> Fingerprint {
        let v = self.inner.digest128();
        Fingerprint {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

/// Hash the full byte content of `path`.
pub(crate) fn content_hash(path: &Path) -> BeatvizResult<Fingerprint> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        BeatvizError::decode(format!("failed to open audio '{}': {e}", path.display()))
    })?;
    let mut h = StableHasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(|e| {
            BeatvizError::decode(format!("failed to read audio '{}': {e}", path.display()))
        })?;
        if n == 0 {
            break;
        }
        total += n as u64;
        h.write_bytes(&buf[..n]);
    }
    h.write_u64(total);
    Ok(h.finish())
}

/// Parameters besides content, fps and schema version that change analysis output.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AnalysisParams {
    pub(crate) large_file_bytes: u64,
    pub(crate) long_duration_secs: f64,
    pub(crate) long_file_hop_factor: u32,
    pub(crate) reduced_sample_rate: u32,
}

/// Combine content hash, fps, schema version and analysis parameters into the cache key.
pub(crate) fn cache_key(
    content: Fingerprint,
    fps: Fps,
    schema_version: u32,
    params: &AnalysisParams,
) -> Fingerprint {
    let mut h = StableHasher::new();
    h.write_str("beatviz.features");
    h.write_u64(content.hi);
    h.write_u64(content.lo);
    h.write_u32(fps.num);
    h.write_u32(fps.den);
    h.write_u32(schema_version);
    h.write_u64(params.large_file_bytes);
    h.write_f64(params.long_duration_secs);
    h.write_u32(params.long_file_hop_factor);
    h.write_u32(params.reduced_sample_rate);
    h.finish()
}

/// xxh3 of a byte slice, used as the cache body checksum.
pub(crate) fn checksum(bytes: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64_with_seed(bytes, XXH3_SEED)
}

#[cfg(test)]
#[path = "../../tests/unit/analysis/fingerprint.rs"]
mod tests;
