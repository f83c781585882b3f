//! Segmentation mask → outline points.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

use crate::PixelPoint;

/// Outline of one connected mask region, in frame pixels.
pub type Contour = Vec<PixelPoint>;

/// Extract outer contours from `mask`, rescaled to a `frame_width` × `frame_height` frame.
///
/// Masks may come back at model resolution; points are scaled per axis. Empty
/// masks or a zero-sized frame yield no contours.
pub fn mask_contours(mask: &GrayImage, frame_width: u32, frame_height: u32) -> Vec<Contour> {
    let (mask_width, mask_height) = mask.dimensions();
    if mask_width == 0 || mask_height == 0 || frame_width == 0 || frame_height == 0 {
        return Vec::new();
    }
    let sx = frame_width as f64 / mask_width as f64;
    let sy = frame_height as f64 / mask_height as f64;

    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| matches!(contour.border_type, BorderType::Outer))
        .map(|contour| {
            contour
                .points
                .iter()
                .map(|p| PixelPoint::new(p.x as f64 * sx, p.y as f64 * sy))
                .collect::<Contour>()
        })
        .filter(|points| !points.is_empty())
        .collect()
}
