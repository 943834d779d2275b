use crate::foundation::error::{BeatvizError, BeatvizResult};

/// Video frame number, counted from 0 at the start of the audio.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames `start..end`, end exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// First frame.
    pub start: FrameIndex,
    /// One past the last frame.
    pub end: FrameIndex,
}

impl FrameRange {
    /// Range `start..end`; rejects `start > end`.
    pub fn new(start: FrameIndex, end: FrameIndex) -> BeatvizResult<Self> {
        if start > end {
            return Err(BeatvizError::validation(format!(
                "frame range {}..{} is reversed",
                start.0, end.0
            )));
        }
        Ok(Self { start, end })
    }

    /// Range `0..frames`.
    pub fn first(frames: u64) -> Self {
        Self {
            start: FrameIndex(0),
            end: FrameIndex(frames),
        }
    }

    /// Frame count.
    pub fn len_frames(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// `true` when no frame is covered.
    pub fn is_empty(self) -> bool {
        self.len_frames() == 0
    }

    /// `true` when `f` lies within the range.
    pub fn contains(self, f: FrameIndex) -> bool {
        (self.start..self.end).contains(&f)
    }

    /// Frame indices, ascending.
    pub fn iter(self) -> impl Iterator<Item = FrameIndex> {
        (self.start.0..self.end.0).map(FrameIndex)
    }
}

/// Frame rate as the fraction `num / den` frames per second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Frames.
    pub num: u32,
    /// Seconds; never zero.
    pub den: u32,
}

impl Fps {
    /// Validated rate; both parts must be non-zero.
    pub fn new(num: u32, den: u32) -> BeatvizResult<Self> {
        if num == 0 || den == 0 {
            return Err(BeatvizError::validation(format!(
                "frame rate {num}/{den} must have a non-zero numerator and denominator"
            )));
        }
        Ok(Self { num, den })
    }

    /// `num / 1`.
    pub fn integer(num: u32) -> BeatvizResult<Self> {
        Self::new(num, 1)
    }

    /// Re-check a deserialized value.
    pub fn validate(self) -> BeatvizResult<()> {
        Self::new(self.num, self.den).map(|_| ())
    }

    /// Frames per second as a float.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Whole frames that fit in `secs` (negative input gives 0).
    pub fn secs_to_frames_floor(self, secs: f64) -> u64 {
        let frames = secs * f64::from(self.num) / f64::from(self.den);
        frames.floor().max(0.0) as u64
    }
}

/// Output frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Create a validated resolution.
    pub fn new(width: u32, height: u32) -> BeatvizResult<Self> {
        let r = Self { width, height };
        r.validate()?;
        Ok(r)
    }

    /// Reject zero dimensions and dimensions the rasterizer cannot address.
    pub fn validate(self) -> BeatvizResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BeatvizError::validation(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(BeatvizError::validation(format!(
                "resolution {}x{} exceeds {} pixels per side",
                self.width,
                self.height,
                u16::MAX
            )));
        }
        Ok(())
    }

    /// Size of one packed RGB24 frame in bytes.
    pub fn frame_bytes(self) -> usize {
        (self.width as usize) * (self.height as usize) * 3
    }

    /// Return `true` when both sides are even (required for yuv420p output).
    pub fn is_even(self) -> bool {
        self.width.is_multiple_of(2) && self.height.is_multiple_of(2)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Opaque 8-bit RGB color.
///
/// Serializes as a `#rrggbb` hex string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb8 {
    /// Pure black.
    pub const BLACK: Self = Self::new(0, 0, 0);

    /// Construct from channel values.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `rrggbb`, `#rgb` or `rgb`.
    pub fn from_hex(s: &str) -> BeatvizResult<Self> {
        let hex = s.trim().trim_start_matches('#');
        let bad = || BeatvizError::validation(format!("invalid hex color '{s}'"));
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(bad());
        }
        let channel = |i: usize, len: usize| -> BeatvizResult<u8> {
            u8::from_str_radix(&hex[i..i + len], 16).map_err(|_| bad())
        };
        match hex.len() {
            6 => Ok(Self::new(channel(0, 2)?, channel(2, 2)?, channel(4, 2)?)),
            3 => {
                let r = channel(0, 1)?;
                let g = channel(1, 1)?;
                let b = channel(2, 1)?;
                Ok(Self::new(r * 17, g * 17, b * 17))
            }
            _ => Err(bad()),
        }
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Channels as an array.
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl TryFrom<String> for Rgb8 {
    type Error = BeatvizError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Rgb8> for String {
    fn from(value: Rgb8) -> Self {
        value.to_hex()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
