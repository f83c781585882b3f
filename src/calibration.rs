//! Pixel → world coordinate mapping.
//!
//! A planar homography is fitted once at startup from paired calibration
//! points (normalized DLT, least squares over all correspondences). The
//! resulting `CoordinateMapper` is immutable and shared by reference; every
//! pixel → world conversion in the process goes through the same instance.

use anyhow::{anyhow, bail, Result};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::{PixelPoint, WorldPoint};

/// Minimum number of correspondences for a homography.
pub const MIN_CALIBRATION_POINTS: usize = 4;

/// Relative eigenvalue floor below which the DLT system is rank deficient.
const RANK_EPSILON: f64 = 1e-10;

/// Denominator floor when projecting a point.
const PROJECTION_EPSILON: f64 = 1e-12;

/// Paired calibration points: `pixel[i]` is where `world[i]` appears in the image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    pub pixel: Vec<PixelPoint>,
    pub world: Vec<WorldPoint>,
}

impl Default for CalibrationSet {
    /// Six-point calibration of the workcell camera against the arm base frame.
    fn default() -> Self {
        let pixel = [
            (247.0, 121.0),
            (306.0, 107.0),
            (358.0, 94.0),
            (238.0, 79.0),
            (290.0, 66.0),
            (342.0, 52.0),
        ];
        let world = [
            (116.3, -424.9),
            (17.4, -456.5),
            (-73.2, -484.2),
            (140.1, -518.5),
            (45.6, -548.1),
            (-47.5, -580.8),
        ];
        Self {
            pixel: pixel.iter().map(|&(x, y)| PixelPoint::new(x, y)).collect(),
            world: world.iter().map(|&(x, y)| WorldPoint::new(x, y)).collect(),
        }
    }
}

impl CalibrationSet {
    pub fn fit(&self) -> Result<CoordinateMapper> {
        CoordinateMapper::fit(&self.pixel, &self.world)
    }
}

/// Fitted planar perspective transform.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateMapper {
    homography: Matrix3<f64>,
}

impl CoordinateMapper {
    /// Fit a homography from at least four non-degenerate correspondences.
    pub fn fit(pixel: &[PixelPoint], world: &[WorldPoint]) -> Result<Self> {
        if pixel.len() != world.len() {
            bail!(
                "calibration: {} pixel points but {} world points",
                pixel.len(),
                world.len()
            );
        }
        if pixel.len() < MIN_CALIBRATION_POINTS {
            bail!(
                "calibration: need at least {} point pairs, got {}",
                MIN_CALIBRATION_POINTS,
                pixel.len()
            );
        }

        let src: Vec<(f64, f64)> = pixel.iter().map(|p| (p.x, p.y)).collect();
        let dst: Vec<(f64, f64)> = world.iter().map(|p| (p.x, p.y)).collect();
        if src
            .iter()
            .chain(dst.iter())
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            bail!("calibration: non-finite coordinate");
        }

        let t_src = normalizing_transform(&src)?;
        let t_dst = normalizing_transform(&dst)?;

        let mut ata = SMatrix::<f64, 9, 9>::zeros();
        for (&(x, y), &(u, v)) in src.iter().zip(dst.iter()) {
            let (x, y) = apply(&t_src, x, y);
            let (u, v) = apply(&t_dst, u, v);
            let row1 = SVector::<f64, 9>::from_row_slice(&[
                -x,
                -y,
                -1.0,
                0.0,
                0.0,
                0.0,
                u * x,
                u * y,
                u,
            ]);
            let row2 = SVector::<f64, 9>::from_row_slice(&[
                0.0,
                0.0,
                0.0,
                -x,
                -y,
                -1.0,
                v * x,
                v * y,
                v,
            ]);
            ata += row1 * row1.transpose();
            ata += row2 * row2.transpose();
        }

        let eigen = ata.symmetric_eigen();
        let mut order: Vec<usize> = (0..9).collect();
        order.sort_by(|&a, &b| {
            eigen.eigenvalues[a]
                .abs()
                .total_cmp(&eigen.eigenvalues[b].abs())
        });
        let largest = eigen.eigenvalues[order[8]].abs();
        let second_smallest = eigen.eigenvalues[order[1]].abs();
        if largest <= 0.0 || second_smallest <= RANK_EPSILON * largest {
            bail!("calibration: degenerate point configuration (collinear or repeated points)");
        }

        let h = eigen.eigenvectors.column(order[0]);
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
        if normalized.determinant().abs() < RANK_EPSILON {
            bail!("calibration: singular homography");
        }

        let t_dst_inv = t_dst
            .try_inverse()
            .ok_or_else(|| anyhow!("calibration: world normalization not invertible"))?;
        let mut homography = t_dst_inv * normalized * t_src;
        let scale = homography[(2, 2)];
        if scale.abs() > PROJECTION_EPSILON {
            homography /= scale;
        }

        let mapper = Self { homography };
        log::debug!("calibration: fitted homography {:?}", mapper.homography);
        Ok(mapper)
    }

    /// Project a pixel coordinate onto the work surface, rounded to 0.1 mm.
    pub fn project(&self, point: PixelPoint) -> Result<WorldPoint> {
        let projected = self.homography * Vector3::new(point.x, point.y, 1.0);
        let w = projected[2];
        if w.abs() < PROJECTION_EPSILON {
            return Err(anyhow!(
                "pixel ({}, {}) projects to infinity",
                point.x,
                point.y
            ));
        }
        Ok(WorldPoint::new(
            round_one_decimal(projected[0] / w),
            round_one_decimal(projected[1] / w),
        ))
    }

    pub fn homography(&self) -> &Matrix3<f64> {
        &self.homography
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Similarity transform moving the centroid to the origin with mean distance √2.
fn normalizing_transform(points: &[(f64, f64)]) -> Result<Matrix3<f64>> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.0 - cx).hypot(p.1 - cy))
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        bail!("calibration: all points coincide");
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

fn apply(t: &Matrix3<f64>, x: f64, y: f64) -> (f64, f64) {
    let p = t * Vector3::new(x, y, 1.0);
    (p[0] / p[2], p[1] / p[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known_homography() -> Matrix3<f64> {
        Matrix3::new(1.2, 0.1, 5.0, -0.05, 0.9, -3.0, 0.0005, 0.0002, 1.0)
    }

    fn map(h: &Matrix3<f64>, x: f64, y: f64) -> WorldPoint {
        let p = h * Vector3::new(x, y, 1.0);
        WorldPoint::new(p[0] / p[2], p[1] / p[2])
    }

    #[test]
    fn recovers_exact_homography() -> Result<()> {
        let h = known_homography();
        let pixel: Vec<PixelPoint> = [(10.0, 20.0), (400.0, 30.0), (380.0, 300.0), (20.0, 280.0), (200.0, 150.0)]
            .iter()
            .map(|&(x, y)| PixelPoint::new(x, y))
            .collect();
        let world: Vec<WorldPoint> = pixel.iter().map(|p| map(&h, p.x, p.y)).collect();

        let mapper = CoordinateMapper::fit(&pixel, &world)?;
        let probe = mapper.project(PixelPoint::new(123.0, 222.0))?;
        let expected = map(&h, 123.0, 222.0);
        assert!((probe.x - expected.x).abs() <= 0.051);
        assert!((probe.y - expected.y).abs() <= 0.051);
        Ok(())
    }

    #[test]
    fn identity_square_projects_unchanged() -> Result<()> {
        let pts = [(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)];
        let pixel: Vec<PixelPoint> = pts.iter().map(|&(x, y)| PixelPoint::new(x, y)).collect();
        let world: Vec<WorldPoint> = pts.iter().map(|&(x, y)| WorldPoint::new(x, y)).collect();
        let mapper = CoordinateMapper::fit(&pixel, &world)?;
        assert_eq!(
            mapper.project(PixelPoint::new(25.0, 75.0))?,
            WorldPoint::new(25.0, 75.0)
        );
        Ok(())
    }

    #[test]
    fn workcell_calibration_round_trips() -> Result<()> {
        let set = CalibrationSet::default();
        let mapper = set.fit()?;
        for (pixel, world) in set.pixel.iter().zip(set.world.iter()) {
            let projected = mapper.project(*pixel)?;
            assert!(
                projected.distance_to(world) < 3.0,
                "{:?} projected to {:?}, expected near {:?}",
                pixel,
                projected,
                world
            );
        }
        Ok(())
    }

    #[test]
    fn projections_are_rounded_to_one_decimal() -> Result<()> {
        let mapper = CalibrationSet::default().fit()?;
        let p = mapper.project(PixelPoint::new(301.3, 99.7))?;
        assert!(((p.x * 10.0) - (p.x * 10.0).round()).abs() < 1e-9);
        assert!(((p.y * 10.0) - (p.y * 10.0).round()).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn rejects_too_few_points() {
        let pixel = vec![PixelPoint::new(0.0, 0.0), PixelPoint::new(1.0, 0.0), PixelPoint::new(0.0, 1.0)];
        let world = vec![WorldPoint::new(0.0, 0.0), WorldPoint::new(1.0, 0.0), WorldPoint::new(0.0, 1.0)];
        assert!(CoordinateMapper::fit(&pixel, &world).is_err());
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let set = CalibrationSet::default();
        assert!(CoordinateMapper::fit(&set.pixel, &set.world[..5]).is_err());
    }

    #[test]
    fn rejects_collinear_points() {
        let pixel: Vec<PixelPoint> = (0..5).map(|i| PixelPoint::new(i as f64 * 10.0, i as f64 * 5.0)).collect();
        let world: Vec<WorldPoint> = (0..5).map(|i| WorldPoint::new(i as f64, i as f64 * 2.0)).collect();
        assert!(CoordinateMapper::fit(&pixel, &world).is_err());
    }

    #[test]
    fn rejects_coincident_points() {
        let pixel = vec![PixelPoint::new(5.0, 5.0); 4];
        let world = vec![
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(1.0, 0.0),
            WorldPoint::new(1.0, 1.0),
            WorldPoint::new(0.0, 1.0),
        ];
        assert!(CoordinateMapper::fit(&pixel, &world).is_err());
    }
}
