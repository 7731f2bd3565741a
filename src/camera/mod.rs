//! Intrinsic camera calibration and frame rectification.
//!
//! [`CalibrationModel`] holds the plumb-bob (radial-tangential) intrinsic
//! model of the camera, and [`FrameRectifier`] applies its cached
//! [`RemapTable`] to raw frames.

pub mod calibration;
pub mod rad_tan;
pub mod remap;

pub use calibration::{CalibrationData, CalibrationModel};
pub use rad_tan::RadTanDistortion;
pub use remap::{FrameRectifier, RemapTable};

use crate::error::OverlayError;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Pixel skew, `K[0][1]`. Zero for every ROS calibration in practice.
    pub skew: f64,
}

impl Intrinsics {
    /// Reads the intrinsic parameters out of an upper-triangular camera matrix.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Intrinsics {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        }
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), OverlayError> {
        if !(intrinsics.fx > 0.0 && intrinsics.fy > 0.0) {
            return Err(OverlayError::InvalidCalibration(format!(
                "focal length must be positive, got fx={} fy={}",
                intrinsics.fx, intrinsics.fy
            )));
        }
        if !intrinsics.cx.is_finite() || !intrinsics.cy.is_finite() {
            return Err(OverlayError::InvalidCalibration(
                "principal point must be finite".to_string(),
            ));
        }
        if !intrinsics.skew.is_finite() {
            return Err(OverlayError::InvalidCalibration(
                "skew must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_resolution(resolution: &Resolution) -> Result<(), OverlayError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(OverlayError::InvalidCalibration(format!(
                "image size must be positive, got {}x{}",
                resolution.width, resolution.height
            )));
        }
        Ok(())
    }
}
