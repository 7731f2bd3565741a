//! AR Overlay Library
//!
//! Draws a map of colored line segments onto frames from a calibrated
//! wide-angle camera. Each frame goes through two stages:
//! - rectification: lens distortion is removed with a plumb-bob
//!   (radial-tangential) model and a cached remap table
//! - rendering: map points given in normalized image coordinates or on the
//!   ground plane are projected to pixels and joined by thick lines
//!
//! Ground points reach the image through an extrinsic homography, see
//! [`GroundProjector`]. Calibration and map files are read by the
//! [`config`] module.

pub mod camera;
pub mod config;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod render;
pub mod scene;

// Re-export commonly used types
pub use camera::{
    CalibrationData, CalibrationModel, FrameRectifier, Intrinsics, RadTanDistortion, RemapTable,
    Resolution,
};
pub use error::OverlayError;
pub use geometry::GroundProjector;
pub use pipeline::RenderingPipeline;
pub use render::{DegeneratePolicy, PixelSegment, RendererConfig, SegmentRenderer};
pub use scene::{
    Color, CoordinateFrame, SceneMap, SceneMapConfig, ScenePoint, Segment, SegmentConfig,
};
