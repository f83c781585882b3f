use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// Implementations wrap a segmentation model (or a replay of one). They must
/// treat the frame as read-only and must not retain it past the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, returning detections at or above `confidence`.
    ///
    /// Every returned detection carries `frame.captured_at` as its timestamp.
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
