//! Per-frame rendering: rectify the raw frame, then draw the scene map on it.

use crate::camera::{CalibrationModel, FrameRectifier};
use crate::config;
use crate::error::OverlayError;
use crate::geometry::GroundProjector;
use crate::render::{RendererConfig, SegmentRenderer};
use crate::scene::SceneMap;
use image::RgbImage;
use log::{info, trace};
use std::path::Path;

/// Owns the calibration, projector and scene map, and renders frames with
/// them.
///
/// Nothing inside changes while rendering apart from the remap table, which
/// is filled once on the first frame. A pipeline can be shared between
/// threads and used for concurrent frames.
#[derive(Debug)]
pub struct RenderingPipeline {
    calibration: CalibrationModel,
    projector: GroundProjector,
    scene: SceneMap,
    config: RendererConfig,
}

impl RenderingPipeline {
    /// Builds a pipeline with the default [`RendererConfig`].
    pub fn new(calibration: CalibrationModel, projector: GroundProjector, scene: SceneMap) -> Self {
        Self::assemble(calibration, projector, scene, RendererConfig::default())
    }

    /// # Errors
    ///
    /// [`OverlayError::InvalidRendererConfig`] if `config` fails
    /// [`RendererConfig::validate`].
    pub fn with_config(
        calibration: CalibrationModel,
        projector: GroundProjector,
        scene: SceneMap,
        config: RendererConfig,
    ) -> Result<Self, OverlayError> {
        config.validate()?;
        Ok(Self::assemble(calibration, projector, scene, config))
    }

    fn assemble(
        calibration: CalibrationModel,
        projector: GroundProjector,
        scene: SceneMap,
        config: RendererConfig,
    ) -> Self {
        let resolution = calibration.resolution();
        info!(
            "Rendering pipeline ready: {}x{} frames, {} segments, stroke width {}",
            resolution.width,
            resolution.height,
            scene.segments().len(),
            config.stroke_width
        );
        RenderingPipeline {
            calibration,
            projector,
            scene,
            config,
        }
    }

    /// Builds a pipeline from an intrinsic calibration file, an extrinsic
    /// (homography) file and a map file.
    ///
    /// # Errors
    ///
    /// [`OverlayError::Config`] if a file cannot be read or parsed, otherwise
    /// the construction error of the offending component or of
    /// `renderer_config`.
    pub fn from_files(
        intrinsics: impl AsRef<Path>,
        extrinsics: impl AsRef<Path>,
        map: impl AsRef<Path>,
        renderer_config: RendererConfig,
    ) -> Result<Self, OverlayError> {
        let calibration = CalibrationModel::new(&config::load_intrinsics(intrinsics)?)?;
        let projector = GroundProjector::new(&config::load_homography(extrinsics)?)?;
        let scene = SceneMap::from_config(&config::load_scene_map(map)?)?;
        Self::with_config(calibration, projector, scene, renderer_config)
    }

    pub fn calibration(&self) -> &CalibrationModel {
        &self.calibration
    }

    pub fn projector(&self) -> &GroundProjector {
        &self.projector
    }

    pub fn scene(&self) -> &SceneMap {
        &self.scene
    }

    pub fn renderer(&self) -> SegmentRenderer<'_> {
        SegmentRenderer::with_valid_config(&self.calibration, &self.projector, self.config)
    }

    /// Rectifies `raw` and draws the scene map onto it.
    ///
    /// # Errors
    ///
    /// [`OverlayError::DimensionMismatch`] if `raw` does not match the
    /// calibration, [`OverlayError::DegenerateProjection`] if a ground point
    /// projects to infinity under [`DegeneratePolicy::Propagate`](crate::render::DegeneratePolicy).
    /// Nothing is drawn when rectification fails.
    pub fn render_frame(&self, raw: &RgbImage) -> Result<RgbImage, OverlayError> {
        let rectified = FrameRectifier::new(&self.calibration).rectify(raw)?;
        let output = self.renderer().render(rectified, &self.scene)?;
        trace!("Rendered {}x{} frame", output.width(), output.height());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CalibrationData;
    use crate::scene::{SceneMapConfig, SegmentConfig};
    use image::Rgb;
    use std::sync::Arc;
    use std::thread;

    fn components() -> (CalibrationModel, GroundProjector, SceneMap) {
        let calibration = CalibrationModel::new(&CalibrationData {
            image_width: 64,
            image_height: 48,
            camera_matrix: vec![50.0, 0.0, 32.0, 0.0, 50.0, 24.0, 0.0, 0.0, 1.0],
            distortion_coefficients: vec![-0.2, 0.03, 0.0, 0.0],
            rectification_matrix: None,
            projection_matrix: None,
        })
        .unwrap();
        let projector =
            GroundProjector::new(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap();
        let mut config = SceneMapConfig::default();
        config
            .points
            .insert("A".to_string(), ("image01".to_string(), vec![0.0, 0.5]));
        config
            .points
            .insert("B".to_string(), ("image01".to_string(), vec![1.0, 0.5]));
        config.segments.push(SegmentConfig {
            points: vec!["A".to_string(), "B".to_string()],
            color: "magenta".to_string(),
        });
        let scene = SceneMap::from_config(&config).unwrap();
        (calibration, projector, scene)
    }

    fn pipeline() -> RenderingPipeline {
        let (calibration, projector, scene) = components();
        RenderingPipeline::new(calibration, projector, scene)
    }

    #[test]
    fn test_rejects_even_stroke_width() {
        let (calibration, projector, scene) = components();
        let config = RendererConfig {
            stroke_width: 4,
            ..RendererConfig::default()
        };
        assert!(matches!(
            RenderingPipeline::with_config(calibration, projector, scene, config),
            Err(OverlayError::InvalidRendererConfig(_))
        ));
    }

    #[test]
    fn test_thin_stroke_pipeline() {
        let (calibration, projector, scene) = components();
        let config = RendererConfig {
            stroke_width: 1,
            ..RendererConfig::default()
        };
        let pipeline =
            RenderingPipeline::with_config(calibration, projector, scene, config).unwrap();
        let output = pipeline.render_frame(&RgbImage::new(64, 48)).unwrap();
        assert_eq!(*output.get_pixel(32, 24), Rgb([255, 0, 255]));
        assert_eq!(*output.get_pixel(32, 23), Rgb([0, 0, 0]));
        assert_eq!(*output.get_pixel(32, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_rejects_wrong_frame_size() {
        let pipeline = pipeline();
        let result = pipeline.render_frame(&RgbImage::new(640, 480));
        assert!(matches!(
            result,
            Err(OverlayError::DimensionMismatch {
                expected: (64, 48),
                actual: (640, 480)
            })
        ));
    }

    #[test]
    fn test_renders_segment_over_rectified_frame() {
        let pipeline = pipeline();
        let raw = RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]));
        let output = pipeline.render_frame(&raw).unwrap();
        assert_eq!(*output.get_pixel(32, 24), Rgb([255, 0, 255]));
        // this pixel samples well inside the raw frame, so it keeps its colour
        assert_eq!(*output.get_pixel(32, 10), Rgb([40, 40, 40]));
    }

    #[test]
    fn test_concurrent_frames_match() {
        let pipeline = Arc::new(pipeline());
        let raw = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 4) as u8, (y * 5) as u8, 128]));
        let expected = pipeline.render_frame(&raw).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = Arc::clone(&pipeline);
                let raw = raw.clone();
                thread::spawn(move || pipeline.render_frame(&raw).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().as_raw(), expected.as_raw());
        }
    }
}
