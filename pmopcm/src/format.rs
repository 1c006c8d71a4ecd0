use std::{fmt, time::Duration};

use crate::error::PcmError;

/// Basic PCM layout description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
}

/// The wire format every joined stream carries: 16-bit little-endian,
/// 48 kHz, interleaved stereo.
pub const CANONICAL: PcmFormat = PcmFormat {
    sample_rate: 48_000,
    channels: 2,
    bits_per_sample: 16,
};

impl PcmFormat {
    pub fn validate(&self) -> Result<(), PcmError> {
        if self.channels == 0 {
            return Err(PcmError::InvalidFormat(
                "channel count must be greater than 0".into(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(PcmError::InvalidFormat(
                "sample rate must be greater than 0".into(),
            ));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample > 32 || self.bits_per_sample % 8 != 0
        {
            return Err(PcmError::InvalidFormat(format!(
                "unsupported bits per sample: {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8).max(1)
    }

    /// Size of one interleaved frame (one sample per channel).
    pub fn frame_len(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.frame_len() * self.sample_rate as usize
    }

    /// Number of bytes needed to hold `duration` of audio, rounded down to a
    /// whole frame. Saturates at the largest whole number of frames a
    /// `usize` can hold.
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let frame_len = self.frame_len();
        if frame_len == 0 {
            return 0;
        }
        let frames = (self.sample_rate as u128).saturating_mul(duration.as_micros()) / 1_000_000;
        let frames = usize::try_from(frames)
            .unwrap_or(usize::MAX)
            .min(usize::MAX / frame_len);
        frames * frame_len
    }
}

/// Native layout declared by an audio producer.
///
/// The tag decides which normaliser runs before the source enters a
/// [`JoinedStream`](crate::JoinedStream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    /// Already 16-bit / 48 kHz / stereo and frame aligned.
    Canonical,
    /// 16-bit / 48 kHz mono; every sample is duplicated into both channels.
    Mono,
    /// 16-bit / 48 kHz stereo with no guarantee on chunk boundaries.
    Stereo,
    /// Canonical PCM wrapped in a container (WAV) with a header to skip.
    Container,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceFormat::Canonical => "canonical",
            SourceFormat::Mono => "mono",
            SourceFormat::Stereo => "stereo",
            SourceFormat::Container => "container",
        };
        f.write_str(name)
    }
}
