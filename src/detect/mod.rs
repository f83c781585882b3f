//! Detector collaborator interface.
//!
//! The neural detector is a black box: per frame it returns labelled boxes
//! with confidences and optional segmentation masks. This module defines that
//! contract plus a scripted backend that replays prepared detections.

mod backend;
mod backends;
mod result;

pub use backend::DetectorBackend;
pub use backends::{ScriptHandle, ScriptedDetector};
pub use result::{Detection, ObjectLabel};
