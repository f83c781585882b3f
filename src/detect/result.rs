use image::GrayImage;
use std::fmt;
use std::time::Instant;

use crate::PixelRect;

/// Object classes the workcell model is trained on.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ObjectLabel {
    Cup,
    Capsule,
    CapsuleLabel,
    CapsuleNotLabel,
    Robot,
    Human,
    CupHolder,
    Other(String),
}

impl ObjectLabel {
    /// Map a detector class name to a label. `hand` is reported as `Human`.
    pub fn from_class_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cup" => Self::Cup,
            "capsule" => Self::Capsule,
            "capsule_label" => Self::CapsuleLabel,
            "capsule_not_label" => Self::CapsuleNotLabel,
            "robot" => Self::Robot,
            "human" | "hand" => Self::Human,
            "cup_holder" => Self::CupHolder,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Cup => "cup",
            Self::Capsule => "capsule",
            Self::CapsuleLabel => "capsule_label",
            Self::CapsuleNotLabel => "capsule_not_label",
            Self::Robot => "robot",
            Self::Human => "human",
            Self::CupHolder => "cup_holder",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ObjectLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detection in one frame. Never persisted.
#[derive(Clone, Debug)]
pub struct Detection {
    pub label: ObjectLabel,
    pub confidence: f32,
    /// Bounding box in frame pixels.
    pub bbox: PixelRect,
    /// Segmentation mask (non-zero = object). May be lower resolution than the frame.
    pub mask: Option<GrayImage>,
    pub timestamp: Instant,
}

impl Detection {
    pub fn new(label: ObjectLabel, confidence: f32, bbox: PixelRect, timestamp: Instant) -> Self {
        Self {
            label,
            confidence,
            bbox,
            mask: None,
            timestamp,
        }
    }

    pub fn with_mask(mut self, mask: GrayImage) -> Self {
        self.mask = Some(mask);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hand_is_reported_as_human() {
        assert_eq!(ObjectLabel::from_class_name("hand"), ObjectLabel::Human);
        assert_eq!(ObjectLabel::from_class_name("Human"), ObjectLabel::Human);
    }

    #[test]
    fn unknown_classes_are_kept_by_name() {
        let label = ObjectLabel::from_class_name("spoon");
        assert_eq!(label, ObjectLabel::Other("spoon".to_string()));
        assert_eq!(label.to_string(), "spoon");
    }
}
