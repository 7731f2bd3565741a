//! Error type shared by every stage of the overlay pipeline.

/// Errors raised while building or running the overlay pipeline.
///
/// Construction-time variants ([`InvalidCalibration`](OverlayError::InvalidCalibration),
/// [`InvalidHomography`](OverlayError::InvalidHomography),
/// [`InvalidSceneMap`](OverlayError::InvalidSceneMap),
/// [`InvalidRendererConfig`](OverlayError::InvalidRendererConfig)) mean no
/// pipeline can be built.
/// [`DimensionMismatch`](OverlayError::DimensionMismatch) and
/// [`DegenerateProjection`](OverlayError::DegenerateProjection) only fail the current frame.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),
    #[error("Invalid homography: {0}")]
    InvalidHomography(String),
    #[error("Invalid scene map: {0}")]
    InvalidSceneMap(String),
    #[error("Frame is {}x{}, expected {}x{}", actual.0, actual.1, expected.0, expected.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Ground point ({x}, {y}) projects to infinity")]
    DegenerateProjection { x: f64, y: f64 },
    #[error("Invalid renderer configuration: {0}")]
    InvalidRendererConfig(String),
    #[error("Failed to load configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        OverlayError::Config(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for OverlayError {
    fn from(err: yaml_rust::ScanError) -> Self {
        OverlayError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for OverlayError {
    fn from(err: serde_yaml::Error) -> Self {
        OverlayError::Config(err.to_string())
    }
}
