//! Intrinsic calibration of a distorted pinhole camera.
//!
//! [`CalibrationData`] is the raw record as it comes out of a ROS
//! `camera_info` file; [`CalibrationModel`] is the validated model built from
//! it. The model owns the pixel remap table used by [`FrameRectifier`], which
//! is computed on first use and shared by every later frame.

use crate::camera::remap::{FrameRectifier, RemapTable};
use crate::camera::{validation, Intrinsics, RadTanDistortion, Resolution};
use crate::error::OverlayError;
use image::RgbImage;
use nalgebra::{Matrix3, Matrix3x4, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Raw intrinsic calibration record.
///
/// Matrices are flattened row-major, exactly as ROS stores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    pub image_width: u32,
    pub image_height: u32,
    /// 3x3 camera matrix `K` (9 values).
    pub camera_matrix: Vec<f64>,
    /// `k1, k2, p1, p2[, k3]`.
    pub distortion_coefficients: Vec<f64>,
    /// 3x3 rectification matrix `R` (9 values), identity when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rectification_matrix: Option<Vec<f64>>,
    /// 3x4 projection matrix `P` (12 values), `[K | 0]` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_matrix: Option<Vec<f64>>,
}

/// Validated plumb-bob camera model.
///
/// Rectified output pixels live on the grid of the projection matrix `P`;
/// raw input pixels live on the grid of the camera matrix `K`. With the
/// default `R = I` and `P = [K | 0]`, rectification only removes lens
/// distortion.
///
/// # Examples
///
/// ```rust
/// use ar_overlay::camera::{CalibrationData, CalibrationModel};
///
/// let data = CalibrationData {
///     image_width: 640,
///     image_height: 480,
///     camera_matrix: vec![300.0, 0.0, 320.0, 0.0, 300.0, 240.0, 0.0, 0.0, 1.0],
///     distortion_coefficients: vec![-0.25, 0.05, 0.0, 0.0, 0.0],
///     rectification_matrix: None,
///     projection_matrix: None,
/// };
/// let model = CalibrationModel::new(&data).unwrap();
/// assert_eq!(model.resolution().width, 640);
/// assert_eq!(model.intrinsics().fx, 300.0);
/// ```
#[derive(Debug)]
pub struct CalibrationModel {
    camera_matrix: Matrix3<f64>,
    distortion: RadTanDistortion,
    rectification: Matrix3<f64>,
    projection: Matrix3x4<f64>,
    resolution: Resolution,
    /// `(P[:, :3] * R)^-1`, rectified pixel to normalized camera ray.
    rectified_to_ray: Matrix3<f64>,
    remap: OnceLock<RemapTable>,
}

impl CalibrationModel {
    /// Validates `data` and builds the model.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidCalibration`] if a matrix has the wrong number of
    /// entries or non-finite entries, the camera matrix is not an
    /// upper-triangular intrinsic matrix with positive focal lengths, the
    /// distortion coefficient count is not 4 or 5, the image size is zero, or
    /// `P[:, :3] * R` cannot be inverted.
    pub fn new(data: &CalibrationData) -> Result<Self, OverlayError> {
        let resolution = Resolution {
            width: data.image_width,
            height: data.image_height,
        };
        validation::validate_resolution(&resolution)?;

        let camera_matrix = matrix3_from_slice("camera matrix", &data.camera_matrix)?;
        if camera_matrix[(1, 0)] != 0.0
            || camera_matrix[(2, 0)] != 0.0
            || camera_matrix[(2, 1)] != 0.0
            || camera_matrix[(2, 2)] != 1.0
        {
            return Err(OverlayError::InvalidCalibration(
                "camera matrix must have the form [[fx, s, cx], [0, fy, cy], [0, 0, 1]]"
                    .to_string(),
            ));
        }
        validation::validate_intrinsics(&Intrinsics::from_matrix(&camera_matrix))?;

        let distortion = RadTanDistortion::from_coefficients(&data.distortion_coefficients)?;

        let rectification = match &data.rectification_matrix {
            Some(values) => matrix3_from_slice("rectification matrix", values)?,
            None => Matrix3::identity(),
        };

        let projection = match &data.projection_matrix {
            Some(values) => matrix3x4_from_slice("projection matrix", values)?,
            None => {
                let mut p = Matrix3x4::zeros();
                p.fixed_view_mut::<3, 3>(0, 0).copy_from(&camera_matrix);
                p
            }
        };

        let new_camera_matrix: Matrix3<f64> = projection.fixed_view::<3, 3>(0, 0).into_owned();
        let rectified_to_ray = (new_camera_matrix * rectification)
            .try_inverse()
            .ok_or_else(|| {
                OverlayError::InvalidCalibration(
                    "projection and rectification matrices are not invertible".to_string(),
                )
            })?;

        Ok(CalibrationModel {
            camera_matrix,
            distortion,
            rectification,
            projection,
            resolution,
            rectified_to_ray,
            remap: OnceLock::new(),
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn intrinsics(&self) -> Intrinsics {
        Intrinsics::from_matrix(&self.camera_matrix)
    }

    pub fn camera_matrix(&self) -> &Matrix3<f64> {
        &self.camera_matrix
    }

    pub fn distortion(&self) -> &RadTanDistortion {
        &self.distortion
    }

    pub fn rectification_matrix(&self) -> &Matrix3<f64> {
        &self.rectification
    }

    pub fn projection_matrix(&self) -> &Matrix3x4<f64> {
        &self.projection
    }

    /// Maps a rectified output pixel to the fractional raw pixel it samples.
    ///
    /// Returns `None` when the pixel's ray is parallel to the image plane
    /// after rectification.
    pub fn source_pixel(&self, u: f64, v: f64) -> Option<Point2<f64>> {
        let ray = self.rectified_to_ray * Vector3::new(u, v, 1.0);
        if ray.z.abs() <= f64::EPSILON * ray.norm() {
            return None;
        }

        let normalized = Vector2::new(ray.x / ray.z, ray.y / ray.z);
        let distorted = self.distortion.distort(&normalized);

        let k = &self.camera_matrix;
        Some(Point2::new(
            k[(0, 0)] * distorted.x + k[(0, 1)] * distorted.y + k[(0, 2)],
            k[(1, 1)] * distorted.y + k[(1, 2)],
        ))
    }

    /// Maps a raw (distorted) pixel to its location in the rectified frame.
    ///
    /// The inverse of [`source_pixel`](Self::source_pixel); useful to place
    /// detections from raw frames onto rectified ones.
    ///
    /// Returns `None` if the distortion model cannot be inverted at that pixel.
    pub fn rectify_pixel(&self, raw: &Point2<f64>) -> Option<Point2<f64>> {
        let intrinsics = self.intrinsics();
        let yd = (raw.y - intrinsics.cy) / intrinsics.fy;
        let xd = (raw.x - intrinsics.cx - intrinsics.skew * yd) / intrinsics.fx;
        let normalized = self.distortion.undistort(&Vector2::new(xd, yd))?;

        let p = self.projection.fixed_view::<3, 3>(0, 0) * self.rectification;
        let pixel = p * Vector3::new(normalized.x, normalized.y, 1.0);
        if pixel.z.abs() <= f64::EPSILON * pixel.norm() {
            return None;
        }
        Some(Point2::new(pixel.x / pixel.z, pixel.y / pixel.z))
    }

    /// The per-pixel remap table, computed on first access.
    pub fn remap_table(&self) -> &RemapTable {
        self.remap.get_or_init(|| RemapTable::compute(self))
    }

    /// Removes lens distortion from `frame`.
    ///
    /// # Errors
    ///
    /// [`OverlayError::DimensionMismatch`] if `frame` is not
    /// `image_width x image_height`.
    pub fn rectify(&self, frame: &RgbImage) -> Result<RgbImage, OverlayError> {
        FrameRectifier::new(self).rectify(frame)
    }
}

fn matrix3_from_slice(name: &str, values: &[f64]) -> Result<Matrix3<f64>, OverlayError> {
    check_entries(name, values, 9)?;
    Ok(Matrix3::from_row_slice(values))
}

fn matrix3x4_from_slice(name: &str, values: &[f64]) -> Result<Matrix3x4<f64>, OverlayError> {
    check_entries(name, values, 12)?;
    Ok(Matrix3x4::from_row_slice(values))
}

fn check_entries(name: &str, values: &[f64], expected: usize) -> Result<(), OverlayError> {
    if values.len() != expected {
        return Err(OverlayError::InvalidCalibration(format!(
            "{name} must have {expected} entries, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(OverlayError::InvalidCalibration(format!(
            "{name} contains non-finite entries"
        )));
    }
    Ok(())
}
