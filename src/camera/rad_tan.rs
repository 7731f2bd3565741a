//! Implements the Radial-Tangential (plumb-bob) lens distortion model.
//!
//! The model works on normalized image coordinates `(x, y)` (camera-frame
//! ray divided by its depth). [`RadTanDistortion::distort`] moves an ideal
//! point to where the lens actually images it, and
//! [`RadTanDistortion::undistort`] inverts that with Newton iterations.

use crate::error::OverlayError;
use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Radial-tangential distortion coefficients.
///
/// Coefficients are stored in the OpenCV / ROS `plumb_bob` order:
/// *   `k1`, `k2`, `k3`: Radial distortion coefficients.
/// *   `p1`, `p2`: Tangential distortion coefficients.
///
/// # Examples
///
/// ```rust
/// use ar_overlay::camera::RadTanDistortion;
///
/// // k1, k2, p1, p2 (k3 defaults to zero)
/// let distortion = RadTanDistortion::from_coefficients(&[-0.28, 0.07, 0.0002, 0.00002]).unwrap();
/// assert_eq!(distortion.coefficients()[0], -0.28);
/// assert_eq!(distortion.coefficients()[4], 0.0);
/// ```
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadTanDistortion {
    distortions: [f64; 5], // k1, k2, p1, p2, k3
}

impl RadTanDistortion {
    /// The distortion-free model.
    pub fn zero() -> Self {
        RadTanDistortion {
            distortions: [0.0; 5],
        }
    }

    /// Builds the model from 4 (`k1, k2, p1, p2`) or 5 (`k1, k2, p1, p2, k3`)
    /// coefficients.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidCalibration`] for any other coefficient count or
    /// for a non-finite coefficient.
    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, OverlayError> {
        if coefficients.len() != 4 && coefficients.len() != 5 {
            return Err(OverlayError::InvalidCalibration(format!(
                "plumb_bob model expects 4 or 5 distortion coefficients, got {}",
                coefficients.len()
            )));
        }
        if let Some(i) = coefficients.iter().position(|c| !c.is_finite()) {
            return Err(OverlayError::InvalidCalibration(format!(
                "distortion coefficient at index {i} is not finite"
            )));
        }

        let mut distortions = [0.0; 5];
        distortions[..coefficients.len()].copy_from_slice(coefficients);
        Ok(RadTanDistortion { distortions })
    }

    /// The coefficients as `[k1, k2, p1, p2, k3]`.
    pub fn coefficients(&self) -> [f64; 5] {
        self.distortions
    }

    pub fn is_zero(&self) -> bool {
        self.distortions.iter().all(|&c| c == 0.0)
    }

    /// Applies radial and tangential distortion to a normalized image point.
    pub fn distort(&self, point: &Vector2<f64>) -> Vector2<f64> {
        let [k1, k2, p1, p2, k3] = self.distortions;
        let x = point.x;
        let y = point.y;

        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;

        Vector2::new(
            x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x),
            y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y,
        )
    }

    /// Recovers the ideal normalized point that [`distort`](Self::distort) maps
    /// onto `distorted`.
    ///
    /// Returns `None` when the Jacobian becomes singular or the iteration does
    /// not converge; both mean the point lies outside the region where the
    /// model is invertible.
    pub fn undistort(&self, distorted: &Vector2<f64>) -> Option<Vector2<f64>> {
        const EPS: f64 = 1e-10;
        const MAX_ITERATIONS: u32 = 100;

        let [k1, k2, p1, p2, k3] = self.distortions;
        let mut point = *distorted;

        for _ in 0..MAX_ITERATIONS {
            let x = point.x;
            let y = point.y;
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r4 * r2;

            let error = self.distort(&point) - distorted;
            if error.norm() < EPS {
                return Some(point);
            }

            // d(radial)/d(r2), chained through dr2/dx = 2x and dr2/dy = 2y
            let d_radial = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;
            let d_radial_dx = d_radial * 2.0 * x;
            let d_radial_dy = d_radial * 2.0 * y;

            let jacobian = Matrix2::new(
                radial + x * d_radial_dx + 2.0 * p1 * y + 6.0 * p2 * x,
                x * d_radial_dy + 2.0 * p1 * x + 2.0 * p2 * y,
                y * d_radial_dx + 2.0 * p1 * x + 2.0 * p2 * y,
                radial + y * d_radial_dy + 6.0 * p1 * y + 2.0 * p2 * x,
            );

            let delta = jacobian.lu().solve(&error)?;
            point -= delta;

            if delta.norm() < EPS {
                return Some(point);
            }
        }

        None
    }
}

impl fmt::Debug for RadTanDistortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [k1, k2, p1, p2, k3] = self.distortions;
        write!(
            f,
            "RadTanDistortion [k1: {k1} k2: {k2} p1: {p1} p2: {p2} k3: {k3}]"
        )
    }
}
