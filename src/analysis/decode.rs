use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::foundation::error::{BeatvizError, BeatvizResult};

/// Mono PCM decoded from an audio file.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DecodedAudio {
    pub(crate) samples: Vec<f32>,
    pub(crate) sample_rate: u32,
}

impl DecodedAudio {
    pub(crate) fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Linear-interpolation resample. No-op when already at or below `target_rate`.
    pub(crate) fn downsampled_to(&self, target_rate: u32) -> DecodedAudio {
        if target_rate == 0 || self.sample_rate <= target_rate || self.samples.is_empty() {
            return self.clone();
        }
        let ratio = f64::from(self.sample_rate) / f64::from(target_rate);
        let out_len = ((self.samples.len() as f64) / ratio).floor().max(1.0) as usize;
        let last = self.samples.len() - 1;
        let samples = (0..out_len)
            .map(|i| {
                let x = i as f64 * ratio;
                let lo = (x.floor() as usize).min(last);
                let hi = (lo + 1).min(last);
                let t = (x - lo as f64) as f32;
                self.samples[lo] + (self.samples[hi] - self.samples[lo]) * t
            })
            .collect();
        DecodedAudio {
            samples,
            sample_rate: target_rate,
        }
    }
}

/// Decode the default track of `path` and down-mix it to mono.
///
/// Corrupt packets are skipped; anything that prevents decoding the stream at all is a
/// [`BeatvizError::Decode`].
pub(crate) fn decode_mono(path: &Path) -> BeatvizResult<DecodedAudio> {
    let file = std::fs::File::open(path).map_err(|e| {
        BeatvizError::decode(format!("failed to open audio '{}': {e}", path.display()))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| {
            BeatvizError::decode(format!(
                "unsupported or corrupt audio '{}': {e}",
                path.display()
            ))
        })?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| BeatvizError::decode(format!("no audio track in '{}'", path.display())))?;
    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
        BeatvizError::decode(format!("unknown sample rate in '{}'", path.display()))
    })?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| BeatvizError::decode(format!("unsupported codec: {e}")))?;

    let mut samples = Vec::<f32>::new();
    let mut skipped_packets = 0u64;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(BeatvizError::decode(format!(
                    "failed to read audio packet: {e}"
                )));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let channels = spec.channels.count().max(1);
                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend(
                    buf.samples()
                        .chunks_exact(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                );
            }
            Err(SymphoniaError::DecodeError(_)) | Err(SymphoniaError::IoError(_)) => {
                skipped_packets += 1;
            }
            Err(e) => {
                return Err(BeatvizError::decode(format!("audio decoder failed: {e}")));
            }
        }
    }

    if skipped_packets > 0 {
        tracing::warn!(skipped_packets, path = %path.display(), "skipped corrupt audio packets");
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}
