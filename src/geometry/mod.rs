//! Ground-plane to pixel projection through an extrinsic homography.
//!
//! The extrinsic calibration stores `H`, the homography taking rectified
//! pixel coordinates to ground (axle) plane coordinates:
//! `H * [u, v, 1]^T ~ [x, y, 1]^T`. Going from the ground to the image
//! therefore solves `H * p_pixel = p_ground` for `p_pixel`.

use crate::error::OverlayError;
use log::debug;
use nalgebra::{Matrix3, Point2, Vector3, LU, U3};

/// Relative tolerance below which a determinant or a homogeneous `w`
/// component counts as zero.
const SINGULAR_EPS: f64 = 1e-12;

/// Converts between ground-plane points and rectified pixel coordinates.
///
/// # Examples
///
/// ```rust
/// use ar_overlay::geometry::GroundProjector;
/// use nalgebra::Point2;
///
/// // pixel -> ground: scale by 1/100 and shift
/// let h = [0.01, 0.0, -3.2, 0.0, 0.01, -2.4, 0.0, 0.0, 1.0];
/// let projector = GroundProjector::new(&h).unwrap();
///
/// let pixel = projector.ground_to_pixel(&Point2::new(0.0, 0.0)).unwrap();
/// assert!((pixel.x - 320.0).abs() < 1e-9);
/// assert!((pixel.y - 240.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct GroundProjector {
    homography: Matrix3<f64>,
    lu: LU<f64, U3, U3>,
}

impl GroundProjector {
    /// Builds the projector from a row-major 3x3 pixel-to-ground homography.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidHomography`] if `values` does not hold 9 finite
    /// numbers or the matrix is singular. Singularity is judged relative to
    /// the row norms, so homographies with tiny entries (metres per pixel)
    /// are accepted.
    pub fn new(values: &[f64]) -> Result<Self, OverlayError> {
        if values.len() != 9 {
            return Err(OverlayError::InvalidHomography(format!(
                "homography must have 9 entries, got {}",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(OverlayError::InvalidHomography(
                "homography contains non-finite entries".to_string(),
            ));
        }
        Self::from_matrix(Matrix3::from_row_slice(values))
    }

    pub fn from_matrix(homography: Matrix3<f64>) -> Result<Self, OverlayError> {
        let row_norms: f64 = homography.row_iter().map(|row| row.norm()).product();
        let determinant = homography.determinant();
        if row_norms == 0.0 || determinant.abs() <= SINGULAR_EPS * row_norms {
            return Err(OverlayError::InvalidHomography(format!(
                "homography is singular (det = {determinant:e})"
            )));
        }
        debug!("Ground projector homography determinant {determinant:e}");

        Ok(GroundProjector {
            homography,
            lu: homography.lu(),
        })
    }

    pub fn homography(&self) -> &Matrix3<f64> {
        &self.homography
    }

    /// Projects a ground-plane point to fractional pixel coordinates.
    ///
    /// # Errors
    ///
    /// [`OverlayError::DegenerateProjection`] when the point maps to the line
    /// at infinity of the image (homogeneous `w` is zero).
    pub fn ground_to_pixel(&self, ground: &Point2<f64>) -> Result<Point2<f64>, OverlayError> {
        let degenerate = || OverlayError::DegenerateProjection {
            x: ground.x,
            y: ground.y,
        };
        let pixel = self
            .lu
            .solve(&ground.to_homogeneous())
            .ok_or_else(degenerate)?;
        dehomogenize(&pixel).ok_or_else(degenerate)
    }

    /// Homogeneous form of [`ground_to_pixel`](Self::ground_to_pixel).
    ///
    /// The third component of `ground` is discarded and replaced by `1`:
    /// map points are always on the ground plane.
    pub fn ground_to_pixel_homogeneous(
        &self,
        ground: &Vector3<f64>,
    ) -> Result<Point2<f64>, OverlayError> {
        self.ground_to_pixel(&Point2::new(ground.x, ground.y))
    }

    /// Projects a rectified pixel onto the ground plane.
    ///
    /// # Errors
    ///
    /// [`OverlayError::DegenerateProjection`] when the pixel lies on the
    /// horizon (its ground point is at infinity). The error carries the pixel
    /// coordinates.
    pub fn pixel_to_ground(&self, pixel: &Point2<f64>) -> Result<Point2<f64>, OverlayError> {
        let ground = self.homography * pixel.to_homogeneous();
        dehomogenize(&ground).ok_or(OverlayError::DegenerateProjection {
            x: pixel.x,
            y: pixel.y,
        })
    }
}

fn dehomogenize(p: &Vector3<f64>) -> Option<Point2<f64>> {
    if !p.iter().all(|v| v.is_finite()) || p.z.abs() <= SINGULAR_EPS * p.norm() {
        return None;
    }
    Some(Point2::new(p.x / p.z, p.y / p.z))
}
