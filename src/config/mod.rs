//! Loading calibration and map files.
//!
//! Three file kinds feed a pipeline:
//! * intrinsic calibration in the ROS `camera_info` YAML layout,
//! * extrinsic calibration, a YAML file whose `homography` key holds the
//!   row-major pixel-to-ground homography,
//! * the scene map (see [`SceneMapConfig`]).
//!
//! Paths are always passed in explicitly.

use crate::camera::CalibrationData;
use crate::error::OverlayError;
use crate::scene::SceneMapConfig;
use serde::Serialize;
use std::fs;
use std::path::Path;
use yaml_rust::{Yaml, YamlLoader};

/// Reads a ROS `camera_info` YAML file.
///
/// # Errors
///
/// [`OverlayError::Config`] if the file cannot be read or is not valid YAML,
/// [`OverlayError::InvalidCalibration`] if required keys are missing or
/// malformed.
pub fn load_intrinsics(path: impl AsRef<Path>) -> Result<CalibrationData, OverlayError> {
    let contents = fs::read_to_string(path)?;
    parse_intrinsics(&contents)
}

/// Parses the contents of a ROS `camera_info` YAML file.
///
/// ```rust
/// let yaml = "
/// image_width: 640
/// image_height: 480
/// camera_matrix:
///   rows: 3
///   cols: 3
///   data: [300, 0, 320, 0, 300, 240, 0, 0, 1]
/// distortion_model: plumb_bob
/// distortion_coefficients:
///   rows: 1
///   cols: 5
///   data: [-0.25, 0.05, 0, 0, 0]
/// ";
/// let data = ar_overlay::config::parse_intrinsics(yaml).unwrap();
/// assert_eq!(data.camera_matrix[0], 300.0);
/// assert!(data.projection_matrix.is_none());
/// ```
pub fn parse_intrinsics(contents: &str) -> Result<CalibrationData, OverlayError> {
    let docs = YamlLoader::load_from_str(contents)?;
    let doc = docs
        .first()
        .ok_or_else(|| OverlayError::Config("Empty YAML document".to_string()))?;

    if let Some(model) = doc["distortion_model"].as_str() {
        if model != "plumb_bob" {
            return Err(OverlayError::InvalidCalibration(format!(
                "unsupported distortion model '{model}'"
            )));
        }
    }

    let image_width = yaml_dimension(&doc["image_width"], "image_width")?;
    let image_height = yaml_dimension(&doc["image_height"], "image_height")?;

    let camera_matrix = yaml_matrix(&doc["camera_matrix"], "camera_matrix")?
        .ok_or_else(|| OverlayError::InvalidCalibration("Missing camera_matrix".to_string()))?;
    let distortion_coefficients =
        yaml_matrix(&doc["distortion_coefficients"], "distortion_coefficients")?.ok_or_else(
            || OverlayError::InvalidCalibration("Missing distortion_coefficients".to_string()),
        )?;

    Ok(CalibrationData {
        image_width,
        image_height,
        camera_matrix,
        distortion_coefficients,
        rectification_matrix: yaml_matrix(&doc["rectification_matrix"], "rectification_matrix")?,
        projection_matrix: yaml_matrix(&doc["projection_matrix"], "projection_matrix")?,
    })
}

#[derive(Serialize)]
struct RosMatrix<'a> {
    rows: usize,
    cols: usize,
    data: &'a [f64],
}

impl<'a> RosMatrix<'a> {
    fn new(rows: usize, cols: usize, data: &'a [f64]) -> Self {
        RosMatrix { rows, cols, data }
    }
}

#[derive(Serialize)]
struct RosCameraInfo<'a> {
    image_width: u32,
    image_height: u32,
    camera_matrix: RosMatrix<'a>,
    distortion_model: &'static str,
    distortion_coefficients: RosMatrix<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rectification_matrix: Option<RosMatrix<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    projection_matrix: Option<RosMatrix<'a>>,
}

/// Writes `data` as a ROS `camera_info` YAML file.
pub fn save_intrinsics(path: impl AsRef<Path>, data: &CalibrationData) -> Result<(), OverlayError> {
    let info = RosCameraInfo {
        image_width: data.image_width,
        image_height: data.image_height,
        camera_matrix: RosMatrix::new(3, 3, &data.camera_matrix),
        distortion_model: "plumb_bob",
        distortion_coefficients: RosMatrix::new(
            1,
            data.distortion_coefficients.len(),
            &data.distortion_coefficients,
        ),
        rectification_matrix: data
            .rectification_matrix
            .as_deref()
            .map(|values| RosMatrix::new(3, 3, values)),
        projection_matrix: data
            .projection_matrix
            .as_deref()
            .map(|values| RosMatrix::new(3, 4, values)),
    };

    let yaml_string = serde_yaml::to_string(&info)?;
    fs::write(path, yaml_string)?;
    Ok(())
}

/// Reads the homography out of an extrinsic calibration YAML file.
pub fn load_homography(path: impl AsRef<Path>) -> Result<Vec<f64>, OverlayError> {
    let contents = fs::read_to_string(path)?;
    parse_homography(&contents)
}

/// Parses an extrinsic calibration document with a `homography` key of 9
/// reals. The count itself is checked by
/// [`GroundProjector::new`](crate::geometry::GroundProjector::new).
pub fn parse_homography(contents: &str) -> Result<Vec<f64>, OverlayError> {
    let docs = YamlLoader::load_from_str(contents)?;
    let doc = docs
        .first()
        .ok_or_else(|| OverlayError::Config("Empty YAML document".to_string()))?;

    let values = doc["homography"]
        .as_vec()
        .ok_or_else(|| OverlayError::InvalidHomography("Missing homography".to_string()))?;

    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            yaml_f64(v).ok_or_else(|| {
                OverlayError::InvalidHomography(format!("Invalid homography entry at index {i}"))
            })
        })
        .collect()
}

/// Reads a scene map YAML file.
pub fn load_scene_map(path: impl AsRef<Path>) -> Result<SceneMapConfig, OverlayError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// YAML numbers without a decimal point load as integers; accept both.
fn yaml_f64(value: &Yaml) -> Option<f64> {
    match value {
        Yaml::Real(_) => value.as_f64(),
        Yaml::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn yaml_dimension(value: &Yaml, name: &str) -> Result<u32, OverlayError> {
    value
        .as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| OverlayError::InvalidCalibration(format!("Invalid {name}")))
}

/// Reads a `{rows, cols, data}` node. `Ok(None)` if the key is absent.
fn yaml_matrix(node: &Yaml, name: &str) -> Result<Option<Vec<f64>>, OverlayError> {
    if node.is_badvalue() || node.is_null() {
        return Ok(None);
    }

    let invalid = |what: &str| OverlayError::InvalidCalibration(format!("{name}: {what}"));
    let data = node["data"]
        .as_vec()
        .ok_or_else(|| invalid("missing data"))?;
    let values = data
        .iter()
        .map(|v| yaml_f64(v).ok_or_else(|| invalid("non-numeric entry")))
        .collect::<Result<Vec<_>, _>>()?;

    if let (Some(rows), Some(cols)) = (node["rows"].as_i64(), node["cols"].as_i64()) {
        if rows * cols != values.len() as i64 {
            return Err(invalid(&format!(
                "{rows}x{cols} does not match {} entries",
                values.len()
            )));
        }
    }

    Ok(Some(values))
}
