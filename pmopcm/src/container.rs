//! Container header skipping.
//!
//! Sources tagged as `Container` carry canonical PCM behind a container
//! header (WAV in practice). The payload starts right after the data chunk
//! header, which is located by scanning for its 4-byte id. Detection happens
//! at most once per stream: once the payload has started, a later occurrence
//! of the marker inside the audio is just audio.

use crate::transform::ChunkTransform;

/// Chunk id announcing the PCM payload of a RIFF/WAVE file.
pub const WAV_DATA_MARKER: [u8; 4] = *b"data";

/// Chunk id plus 32-bit little-endian chunk length.
pub const WAV_DATA_HEADER_LEN: usize = 8;

/// Bytes held back while looking for the marker before giving up.
pub const DEFAULT_SCAN_LIMIT: usize = 16 * 1024;

#[derive(Debug)]
enum ScanState {
    Scanning { window: Vec<u8>, searched: usize },
    Skipping { remaining: usize },
    Passthrough,
}

/// Drops everything up to and including the sub-header that starts at the
/// first occurrence of `marker`.
///
/// If the marker does not show up within the scan limit, or the stream ends
/// before it does, the held bytes are forwarded unchanged and the rest of
/// the stream passes through.
#[derive(Debug)]
pub struct HeaderSkipper {
    marker: Vec<u8>,
    header_len: usize,
    scan_limit: usize,
    marker_found: bool,
    state: ScanState,
}

impl HeaderSkipper {
    /// `header_len` counts from the first byte of the marker.
    pub fn new(marker: impl Into<Vec<u8>>, header_len: usize) -> Self {
        let marker = marker.into();
        let header_len = header_len.max(marker.len());
        Self {
            marker,
            header_len,
            scan_limit: DEFAULT_SCAN_LIMIT,
            marker_found: false,
            state: ScanState::Scanning {
                window: Vec::new(),
                searched: 0,
            },
        }
    }

    /// Skipper for the `data` chunk of a WAV file.
    pub fn wav() -> Self {
        Self::new(WAV_DATA_MARKER, WAV_DATA_HEADER_LEN)
    }

    pub fn with_scan_limit(mut self, scan_limit: usize) -> Self {
        self.scan_limit = scan_limit.max(self.header_len);
        self
    }

    /// True once the header has been found and fully skipped.
    pub fn header_skipped(&self) -> bool {
        self.marker_found && matches!(self.state, ScanState::Passthrough)
    }

    /// True while the skipper is still holding bytes back.
    pub fn is_scanning(&self) -> bool {
        matches!(self.state, ScanState::Scanning { .. })
    }

    fn scan(&mut self, out: &mut Vec<u8>) {
        let ScanState::Scanning { window, searched } = &mut self.state else {
            return;
        };

        let marker_len = self.marker.len();
        let found = if marker_len == 0 {
            Some(0)
        } else {
            window[*searched..]
                .windows(marker_len)
                .position(|candidate| candidate == self.marker.as_slice())
                .map(|offset| *searched + offset)
        };

        match found {
            Some(start) => {
                let payload = start + self.header_len;
                self.marker_found = true;
                if window.len() >= payload {
                    out.extend_from_slice(&window[payload..]);
                    tracing::trace!(skipped = payload, "container header skipped");
                    self.state = ScanState::Passthrough;
                } else {
                    let remaining = payload - window.len();
                    self.state = ScanState::Skipping { remaining };
                }
            }
            None if window.len() > self.scan_limit => {
                tracing::debug!(
                    held = window.len(),
                    "no container header within scan limit, passing bytes through"
                );
                out.append(window);
                self.state = ScanState::Passthrough;
            }
            None => {
                // a marker split across chunks starts in the last marker_len - 1 bytes
                *searched = window.len().saturating_sub(marker_len.saturating_sub(1));
            }
        }
    }
}

impl ChunkTransform for HeaderSkipper {
    fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        match &mut self.state {
            ScanState::Passthrough => out.extend_from_slice(input),
            ScanState::Skipping { remaining } => {
                if input.len() < *remaining {
                    *remaining -= input.len();
                } else {
                    out.extend_from_slice(&input[*remaining..]);
                    tracing::trace!("container header skipped");
                    self.state = ScanState::Passthrough;
                }
            }
            ScanState::Scanning { window, .. } => {
                window.extend_from_slice(input);
                self.scan(out);
            }
        }
    }

    fn finish(&mut self, out: &mut Vec<u8>) {
        match std::mem::replace(&mut self.state, ScanState::Passthrough) {
            ScanState::Scanning { window, .. } => {
                if !window.is_empty() {
                    tracing::debug!(
                        held = window.len(),
                        "stream ended before a container header, passing bytes through"
                    );
                }
                out.extend_from_slice(&window);
            }
            ScanState::Skipping { remaining } => {
                tracing::debug!(remaining, "stream ended inside the container header");
            }
            ScanState::Passthrough => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&((36 + payload.len()) as u32).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&48_000u32.to_le_bytes());
        bytes.extend_from_slice(&192_000u32.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn run(skipper: &mut HeaderSkipper, input: &[u8], chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for piece in input.chunks(chunk) {
            skipper.push(piece, &mut out);
        }
        skipper.finish(&mut out);
        out
    }

    #[test]
    fn strips_wav_header() {
        let payload: Vec<u8> = (0..64).collect();
        let out = run(&mut HeaderSkipper::wav(), &wav_bytes(&payload), 4096);
        assert_eq!(out, payload);
    }

    #[test]
    fn marker_split_across_chunks() {
        let payload: Vec<u8> = (0..32).collect();
        let input = wav_bytes(&payload);
        for chunk in 1..=13 {
            let out = run(&mut HeaderSkipper::wav(), &input, chunk);
            assert_eq!(out, payload, "chunk size {chunk}");
        }
    }

    #[test]
    fn marker_in_payload_is_kept() {
        let mut payload = vec![1, 2, 3, 4];
        payload.extend_from_slice(b"data");
        payload.extend_from_slice(&[5, 6, 7, 8]);
        let out = run(&mut HeaderSkipper::wav(), &wav_bytes(&payload), 5);
        assert_eq!(out, payload);
    }

    #[test]
    fn missing_marker_forwards_bytes_at_end() {
        let input: Vec<u8> = vec![9; 100];
        let mut skipper = HeaderSkipper::wav();
        let mut out = Vec::new();
        skipper.push(&input, &mut out);
        assert!(out.is_empty());
        assert!(skipper.is_scanning());
        skipper.finish(&mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn scan_limit_disables_detection() {
        let mut skipper = HeaderSkipper::wav().with_scan_limit(16);
        let mut input = vec![0u8; 20];
        input.extend_from_slice(b"data\x04\x00\x00\x00");
        input.extend_from_slice(&[1, 2, 3, 4]);

        let mut out = Vec::new();
        skipper.push(&input[..20], &mut out);
        assert_eq!(out.len(), 20);
        assert!(!skipper.is_scanning());

        skipper.push(&input[20..], &mut out);
        skipper.finish(&mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn stream_ending_inside_header_yields_nothing() {
        let mut skipper = HeaderSkipper::wav();
        let out = run(&mut skipper, b"RIFFdata\x10", 3);
        assert!(out.is_empty());
    }
}
