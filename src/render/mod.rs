//! Drawing scene map segments onto rectified frames.

use crate::camera::{CalibrationModel, Resolution};
use crate::error::OverlayError;
use crate::geometry::GroundProjector;
use crate::scene::{SceneMap, ScenePoint};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, BresenhamLineIter};
use log::warn;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// What to do with a segment whose ground endpoint projects to infinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Fail the whole frame with [`OverlayError::DegenerateProjection`].
    #[default]
    Propagate,
    /// Log a warning and leave the segment out.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Line thickness in pixels. Must be odd so the stroke is centred on
    /// the segment.
    pub stroke_width: u32,
    pub degenerate_policy: DegeneratePolicy,
}

impl RendererConfig {
    /// Checks that `stroke_width` can be drawn exactly.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidRendererConfig`] for a zero or even width.
    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.stroke_width % 2 == 0 {
            return Err(OverlayError::InvalidRendererConfig(format!(
                "stroke width must be an odd number of pixels, got {}",
                self.stroke_width
            )));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig {
            stroke_width: 5,
            degenerate_policy: DegeneratePolicy::Propagate,
        }
    }
}

/// A segment ready to draw: endpoints rounded to whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSegment {
    pub color: Rgb<u8>,
    pub start: (i64, i64),
    pub end: (i64, i64),
}

/// Resolves scene points to pixels and draws segments.
///
/// Borrows the calibration (for the image size) and the ground projector; it
/// holds no state of its own and may be rebuilt for every frame.
#[derive(Debug, Clone, Copy)]
pub struct SegmentRenderer<'a> {
    resolution: Resolution,
    projector: &'a GroundProjector,
    config: RendererConfig,
}

impl<'a> SegmentRenderer<'a> {
    /// # Errors
    ///
    /// [`OverlayError::InvalidRendererConfig`] if `config` fails
    /// [`RendererConfig::validate`].
    pub fn new(
        calibration: &CalibrationModel,
        projector: &'a GroundProjector,
        config: RendererConfig,
    ) -> Result<Self, OverlayError> {
        config.validate()?;
        Ok(Self::with_valid_config(calibration, projector, config))
    }

    /// `config` must already have passed [`RendererConfig::validate`].
    pub(crate) fn with_valid_config(
        calibration: &CalibrationModel,
        projector: &'a GroundProjector,
        config: RendererConfig,
    ) -> Self {
        SegmentRenderer {
            resolution: calibration.resolution(),
            projector,
            config,
        }
    }

    /// Fractional pixel coordinates of a scene point.
    ///
    /// Normalized image points are scaled by the calibrated image size with
    /// no clamping; ground points go through the homography.
    pub fn resolve(&self, point: &ScenePoint) -> Result<Point2<f64>, OverlayError> {
        match point {
            ScenePoint::NormalizedImage(p) => Ok(Point2::new(
                p.x * self.resolution.width as f64,
                p.y * self.resolution.height as f64,
            )),
            ScenePoint::GroundPlane(p) => self.projector.ground_to_pixel(p),
        }
    }

    /// Resolves every segment of `scene`, in declaration order.
    ///
    /// Pixel coordinates are rounded to the nearest integer (halves away
    /// from zero).
    pub fn resolve_segments(&self, scene: &SceneMap) -> Result<Vec<PixelSegment>, OverlayError> {
        let mut resolved = Vec::with_capacity(scene.segments().len());
        for segment in scene.segments() {
            let endpoints = self
                .resolve(&segment.endpoints[0])
                .and_then(|start| Ok((start, self.resolve(&segment.endpoints[1])?)));

            match endpoints {
                Ok((start, end)) => resolved.push(PixelSegment {
                    color: Rgb(segment.color.rgb()),
                    start: round_pixel(&start),
                    end: round_pixel(&end),
                }),
                Err(e @ OverlayError::DegenerateProjection { .. })
                    if self.config.degenerate_policy == DegeneratePolicy::Skip =>
                {
                    warn!(
                        "Skipping {} segment {} -> {}: {}",
                        segment.color, segment.names[0], segment.names[1], e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }

    /// Draws every segment of `scene` onto `frame` and hands the frame back.
    ///
    /// All endpoints are resolved before the first pixel is written, so a
    /// failure leaves the frame untouched.
    pub fn render(&self, mut frame: RgbImage, scene: &SceneMap) -> Result<RgbImage, OverlayError> {
        let segments = self.resolve_segments(scene)?;
        for segment in &segments {
            self.draw_segment(&mut frame, segment);
        }
        Ok(frame)
    }

    /// Draws one thick segment. Parts outside the frame are clipped.
    pub fn draw_segment(&self, frame: &mut RgbImage, segment: &PixelSegment) {
        let radius = (self.config.stroke_width / 2) as i32;
        let (width, height) = frame.dimensions();
        let margin = radius as f64 + 1.0;
        let bounds = (
            -margin,
            -margin,
            width as f64 - 1.0 + margin,
            height as f64 - 1.0 + margin,
        );

        let start = (segment.start.0 as f64, segment.start.1 as f64);
        let end = (segment.end.0 as f64, segment.end.1 as f64);
        let Some((start, end)) = clip_segment(start, end, bounds) else {
            return;
        };
        let start = (start.0.round() as f32, start.1.round() as f32);
        let end = (end.0.round() as f32, end.1.round() as f32);

        if self.config.stroke_width <= 1 {
            draw_line_segment_mut(frame, start, end, segment.color);
            return;
        }

        for (x, y) in BresenhamLineIter::new(start, end) {
            draw_filled_circle_mut(frame, (x, y), radius, segment.color);
        }
    }
}

fn round_pixel(p: &Point2<f64>) -> (i64, i64) {
    // saturating casts keep far off-screen points representable
    (p.x.round() as i64, p.y.round() as i64)
}

/// Liang-Barsky clipping of the segment `start -> end` against
/// `(min_x, min_y, max_x, max_y)`. `None` if nothing is left.
fn clip_segment(
    start: (f64, f64),
    end: (f64, f64),
    bounds: (f64, f64, f64, f64),
) -> Option<((f64, f64), (f64, f64))> {
    let (min_x, min_y, max_x, max_y) = bounds;
    let dx = end.0 - start.0;
    let dy = end.1 - start.1;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;

    for (p, q) in [
        (-dx, start.0 - min_x),
        (dx, max_x - start.0),
        (-dy, start.1 - min_y),
        (dy, max_y - start.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((
        (start.0 + t0 * dx, start.1 + t0 * dy),
        (start.0 + t1 * dx, start.1 + t1 * dy),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CalibrationData;
    use crate::scene::{SceneMapConfig, SegmentConfig};
    use std::collections::BTreeMap;

    fn calibration() -> CalibrationModel {
        CalibrationModel::new(&CalibrationData {
            image_width: 640,
            image_height: 480,
            camera_matrix: vec![300.0, 0.0, 320.0, 0.0, 300.0, 240.0, 0.0, 0.0, 1.0],
            distortion_coefficients: vec![0.0; 5],
            rectification_matrix: None,
            projection_matrix: None,
        })
        .unwrap()
    }

    fn scene(points: &[(&str, &str, &[f64])], segments: &[(&str, &str, &str)]) -> SceneMap {
        let points: BTreeMap<String, (String, Vec<f64>)> = points
            .iter()
            .map(|(name, frame, coords)| (name.to_string(), (frame.to_string(), coords.to_vec())))
            .collect();
        let segments = segments
            .iter()
            .map(|(a, b, color)| SegmentConfig {
                points: vec![a.to_string(), b.to_string()],
                color: color.to_string(),
            })
            .collect();
        SceneMap::from_config(&SceneMapConfig { points, segments }).unwrap()
    }

    fn identity_projector() -> GroundProjector {
        GroundProjector::new(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).unwrap()
    }

    /// Rows lit in column 150 after drawing a horizontal segment at y = 100.
    fn stroke_rows(stroke_width: u32) -> Vec<u32> {
        let calibration = calibration();
        let projector = identity_projector();
        let config = RendererConfig {
            stroke_width,
            ..RendererConfig::default()
        };
        let renderer = SegmentRenderer::new(&calibration, &projector, config).unwrap();
        let mut frame = RgbImage::new(640, 480);
        renderer.draw_segment(
            &mut frame,
            &PixelSegment {
                color: Rgb([255, 255, 255]),
                start: (100, 100),
                end: (200, 100),
            },
        );
        (80..120)
            .filter(|&y| frame.get_pixel(150, y)[0] == 255)
            .collect()
    }

    #[test]
    fn test_normalized_point_scales_to_image_size() {
        let calibration = calibration();
        let projector = identity_projector();
        let renderer =
            SegmentRenderer::new(&calibration, &projector, RendererConfig::default()).unwrap();

        let pixel = renderer
            .resolve(&ScenePoint::NormalizedImage(Point2::new(0.5, 0.5)))
            .unwrap();
        assert_eq!(pixel, Point2::new(320.0, 240.0));

        // no clamping outside [0, 1]
        let pixel = renderer
            .resolve(&ScenePoint::NormalizedImage(Point2::new(1.5, -0.25)))
            .unwrap();
        assert_eq!(pixel, Point2::new(960.0, -120.0));
    }

    #[test]
    fn test_clip_segment() {
        let bounds = (0.0, 0.0, 10.0, 10.0);
        assert_eq!(
            clip_segment((2.0, 2.0), (8.0, 8.0), bounds),
            Some(((2.0, 2.0), (8.0, 8.0)))
        );
        assert_eq!(
            clip_segment((-10.0, 5.0), (20.0, 5.0), bounds),
            Some(((0.0, 5.0), (10.0, 5.0)))
        );
        assert_eq!(clip_segment((-5.0, -5.0), (-1.0, 20.0), bounds), None);
        assert_eq!(clip_segment((20.0, 20.0), (20.0, 20.0), bounds), None);
    }

    #[test]
    fn test_draw_order_follows_declaration() {
        let calibration = calibration();
        let projector = identity_projector();
        let renderer =
            SegmentRenderer::new(&calibration, &projector, RendererConfig::default()).unwrap();
        let map = scene(
            &[
                ("L", "image01", &[0.25, 0.5]),
                ("R", "image01", &[0.75, 0.5]),
            ],
            &[("L", "R", "green"), ("R", "L", "blue")],
        );

        let frame = renderer.render(RgbImage::new(640, 480), &map).unwrap();
        assert_eq!(*frame.get_pixel(320, 240), Rgb([0, 0, 255]));
        assert_eq!(*frame.get_pixel(320, 242), Rgb([0, 0, 255]));
        assert_eq!(*frame.get_pixel(320, 250), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_stroke_width_is_drawn_exactly() {
        assert_eq!(stroke_rows(1), vec![100]);
        assert_eq!(stroke_rows(3), vec![99, 100, 101]);
        assert_eq!(stroke_rows(5), vec![98, 99, 100, 101, 102]);
        assert_eq!(stroke_rows(7), (97..=103).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_even_or_zero_stroke_width() {
        let calibration = calibration();
        let projector = identity_projector();
        for stroke_width in [0, 2, 4, 6] {
            let config = RendererConfig {
                stroke_width,
                ..RendererConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(OverlayError::InvalidRendererConfig(_))
            ));
            assert!(matches!(
                SegmentRenderer::new(&calibration, &projector, config),
                Err(OverlayError::InvalidRendererConfig(_))
            ));
        }
        assert!(RendererConfig::default().validate().is_ok());
    }

    #[test]
    fn test_far_off_screen_segment_is_clipped() {
        let calibration = calibration();
        let projector = identity_projector();
        let renderer =
            SegmentRenderer::new(&calibration, &projector, RendererConfig::default()).unwrap();
        let mut frame = RgbImage::new(640, 480);
        renderer.draw_segment(
            &mut frame,
            &PixelSegment {
                color: Rgb([255, 0, 0]),
                start: (-1_000_000_000, 240),
                end: (1_000_000_000, 240),
            },
        );
        assert_eq!(*frame.get_pixel(0, 240), Rgb([255, 0, 0]));
        assert_eq!(*frame.get_pixel(639, 240), Rgb([255, 0, 0]));
        assert_eq!(*frame.get_pixel(320, 200), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_policy() {
        let calibration = calibration();
        // ground (1, 0) lies on the line at infinity of the image
        let projector =
            GroundProjector::new(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]).unwrap();
        let map = scene(
            &[
                ("A", "axle", &[0.0, 0.0]),
                ("B", "axle", &[1.0, 0.0]),
                ("C", "image01", &[0.5, 0.5]),
                ("D", "image01", &[0.5, 0.75]),
            ],
            &[("A", "B", "red"), ("C", "D", "white")],
        );

        let strict =
            SegmentRenderer::new(&calibration, &projector, RendererConfig::default()).unwrap();
        let result = strict.render(RgbImage::new(640, 480), &map);
        assert_eq!(
            result.unwrap_err(),
            OverlayError::DegenerateProjection { x: 1.0, y: 0.0 }
        );

        let lenient = SegmentRenderer::new(
            &calibration,
            &projector,
            RendererConfig {
                degenerate_policy: DegeneratePolicy::Skip,
                ..RendererConfig::default()
            },
        )
        .unwrap();
        let segments = lenient.resolve_segments(&map).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start, (320, 240));
        assert_eq!(segments[0].end, (320, 360));
    }
}
