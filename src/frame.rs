//! Frames handed from a source to the detector.
//!
//! Frames are ephemeral: the perception loop pulls one, runs detection and
//! drops it. Nothing downstream keeps pixel data.

use anyhow::Result;
use std::time::Instant;

/// A single captured image (8-bit, row-major, `channels` interleaved).
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
    /// Capture instant; detections inherit it as their timestamp.
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, channels: u8, sequence: u64) -> Self {
        Self::captured(pixels, width, height, channels, sequence, Instant::now())
    }

    pub fn captured(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
        sequence: u64,
        captured_at: Instant,
    ) -> Self {
        Self {
            pixels,
            width,
            height,
            channels,
            sequence,
            captured_at,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// True when the pixel buffer matches the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        let expected = self.width as usize * self.height as usize * self.channels as usize;
        expected > 0 && self.pixels.len() == expected
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Camera / frame source collaborator.
pub trait FrameSource: Send {
    /// Open the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. Errors are transient; callers log and retry.
    fn next_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_checks_buffer_length() {
        let frame = Frame::new(vec![0u8; 4 * 3 * 3], 4, 3, 3, 1);
        assert!(frame.is_well_formed());

        let short = Frame::new(vec![0u8; 10], 4, 3, 3, 2);
        assert!(!short.is_well_formed());

        let empty = Frame::new(Vec::new(), 0, 0, 1, 3);
        assert!(!empty.is_well_formed());
    }
}
