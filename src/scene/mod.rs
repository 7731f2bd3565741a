//! Scene maps: named reference points and the colored segments joining them.
//!
//! A [`SceneMap`] is built once from a [`SceneMapConfig`] and never changes
//! afterwards. Every check (frame tags, coordinate counts, colors, endpoint
//! names) happens in [`SceneMap::from_config`], so rendering never has to
//! re-validate anything.

use crate::error::OverlayError;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The fixed palette segments may be drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Red,
    Green,
    Blue,
    Yellow,
    Magenta,
    Cyan,
    White,
    Black,
}

impl Color {
    pub const ALL: [Color; 8] = [
        Color::Red,
        Color::Green,
        Color::Blue,
        Color::Yellow,
        Color::Magenta,
        Color::Cyan,
        Color::White,
        Color::Black,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Yellow => "yellow",
            Color::Magenta => "magenta",
            Color::Cyan => "cyan",
            Color::White => "white",
            Color::Black => "black",
        }
    }

    /// 8-bit RGB triple.
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Color::Red => [255, 0, 0],
            Color::Green => [0, 255, 0],
            Color::Blue => [0, 0, 255],
            Color::Yellow => [255, 255, 0],
            Color::Magenta => [255, 0, 255],
            Color::Cyan => [0, 255, 255],
            Color::White => [255, 255, 255],
            Color::Black => [0, 0, 0],
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Color {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::ALL
            .iter()
            .copied()
            .find(|color| color.name() == s)
            .ok_or_else(|| OverlayError::InvalidSceneMap(format!("unknown color '{s}'")))
    }
}

/// Coordinate frame a map point is authored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateFrame {
    /// Fractions of the image size, `(0, 0)` top-left and `(1, 1)` bottom-right.
    NormalizedImage,
    /// Ground (axle) plane, in the units of the extrinsic homography.
    GroundPlane,
}

impl FromStr for CoordinateFrame {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image01" | "normalized_image" => Ok(CoordinateFrame::NormalizedImage),
            "axle" | "ground" => Ok(CoordinateFrame::GroundPlane),
            other => Err(OverlayError::InvalidSceneMap(format!(
                "unknown coordinate frame '{other}'"
            ))),
        }
    }
}

/// A map point, tagged with the frame its coordinates are expressed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScenePoint {
    NormalizedImage(Point2<f64>),
    GroundPlane(Point2<f64>),
}

impl ScenePoint {
    /// Builds a point from a frame tag and its raw coordinates.
    ///
    /// Normalized image points take exactly 2 coordinates. Ground points take
    /// 2 or 3; a third coordinate is dropped since map points always lie on
    /// the ground plane.
    pub fn parse(frame: &str, coordinates: &[f64]) -> Result<Self, OverlayError> {
        let frame: CoordinateFrame = frame.parse()?;
        if coordinates.iter().any(|c| !c.is_finite()) {
            return Err(OverlayError::InvalidSceneMap(
                "point coordinates must be finite".to_string(),
            ));
        }

        match (frame, coordinates) {
            (CoordinateFrame::NormalizedImage, &[x, y]) => {
                Ok(ScenePoint::NormalizedImage(Point2::new(x, y)))
            }
            (CoordinateFrame::GroundPlane, &[x, y] | &[x, y, _]) => {
                Ok(ScenePoint::GroundPlane(Point2::new(x, y)))
            }
            (frame, coordinates) => Err(OverlayError::InvalidSceneMap(format!(
                "{frame:?} point cannot have {} coordinates",
                coordinates.len()
            ))),
        }
    }

    pub fn frame(&self) -> CoordinateFrame {
        match self {
            ScenePoint::NormalizedImage(_) => CoordinateFrame::NormalizedImage,
            ScenePoint::GroundPlane(_) => CoordinateFrame::GroundPlane,
        }
    }
}

/// A validated segment. Endpoints are copied out of the point table so
/// rendering never looks names up.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub color: Color,
    pub names: [String; 2],
    pub endpoints: [ScenePoint; 2],
}

/// Serde model of a map file.
///
/// ```yaml
/// points:
///   TL: [axle, [0.315, 0.093]]
///   TR: [image01, [1.0, 0.0]]
/// segments:
///   - points: [TL, TR]
///     color: red
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMapConfig {
    #[serde(default)]
    pub points: BTreeMap<String, (String, Vec<f64>)>,
    #[serde(default)]
    pub segments: Vec<SegmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub points: Vec<String>,
    pub color: String,
}

/// Immutable, validated scene map.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneMap {
    points: BTreeMap<String, ScenePoint>,
    segments: Vec<Segment>,
}

impl SceneMap {
    /// Validates `config` and builds the map.
    ///
    /// # Errors
    ///
    /// [`OverlayError::InvalidSceneMap`] for an unknown frame tag, a wrong
    /// coordinate count, a non-finite coordinate, an unknown color, a segment
    /// without exactly two endpoints, or an endpoint naming a missing point.
    pub fn from_config(config: &SceneMapConfig) -> Result<Self, OverlayError> {
        let points = config
            .points
            .iter()
            .map(|(name, (frame, coordinates))| {
                ScenePoint::parse(frame, coordinates)
                    .map(|point| (name.clone(), point))
                    .map_err(|e| match e {
                        OverlayError::InvalidSceneMap(message) => {
                            OverlayError::InvalidSceneMap(format!("point '{name}': {message}"))
                        }
                        other => other,
                    })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let segments = config
            .segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                Self::resolve_segment(&points, segment)
                    .map_err(|e| OverlayError::InvalidSceneMap(format!("segment {i}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SceneMap { points, segments })
    }

    fn resolve_segment(
        points: &BTreeMap<String, ScenePoint>,
        segment: &SegmentConfig,
    ) -> Result<Segment, String> {
        let color: Color = segment
            .color
            .parse()
            .map_err(|_| format!("unknown color '{}'", segment.color))?;

        let [start, end] = match segment.points.as_slice() {
            [start, end] => [start, end],
            other => return Err(format!("expected 2 endpoints, got {}", other.len())),
        };
        let lookup = |name: &String| {
            points
                .get(name)
                .copied()
                .ok_or_else(|| format!("endpoint '{name}' is not a defined point"))
        };

        Ok(Segment {
            color,
            names: [start.clone(), end.clone()],
            endpoints: [lookup(start)?, lookup(end)?],
        })
    }

    pub fn point(&self, name: &str) -> Option<&ScenePoint> {
        self.points.get(name)
    }

    pub fn points(&self) -> impl Iterator<Item = (&str, &ScenePoint)> {
        self.points
            .iter()
            .map(|(name, point)| (name.as_str(), point))
    }

    /// Segments in declaration order, which is also draw order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(segments: Vec<(&str, &str, &str)>) -> SceneMapConfig {
        let mut points = BTreeMap::new();
        points.insert("TL".to_string(), ("axle".to_string(), vec![0.315, 0.093]));
        points.insert(
            "TR".to_string(),
            ("axle".to_string(), vec![0.315, -0.093, 0.0]),
        );
        points.insert("C".to_string(), ("image01".to_string(), vec![0.5, 0.5]));
        SceneMapConfig {
            points,
            segments: segments
                .into_iter()
                .map(|(a, b, color)| SegmentConfig {
                    points: vec![a.to_string(), b.to_string()],
                    color: color.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_color_palette() {
        assert_eq!("red".parse::<Color>().unwrap().rgb(), [255, 0, 0]);
        assert_eq!("cyan".parse::<Color>().unwrap().rgb(), [0, 255, 255]);
        for color in Color::ALL {
            assert_eq!(color.name().parse::<Color>().unwrap(), color);
        }
        assert!(matches!(
            "orange".parse::<Color>(),
            Err(OverlayError::InvalidSceneMap(_))
        ));
        assert!("Red".parse::<Color>().is_err());
    }

    #[test]
    fn test_builds_valid_map() {
        let map_config = config(vec![("TL", "TR", "red"), ("TR", "C", "blue")]);
        let map = SceneMap::from_config(&map_config).unwrap();

        assert_eq!(map.segments().len(), 2);
        assert_eq!(map.segments()[0].color, Color::Red);
        assert_eq!(map.segments()[1].names, ["TR".to_string(), "C".to_string()]);
        assert_eq!(
            map.point("TR"),
            Some(&ScenePoint::GroundPlane(Point2::new(0.315, -0.093)))
        );
        assert_eq!(
            map.segments()[1].endpoints[1],
            ScenePoint::NormalizedImage(Point2::new(0.5, 0.5))
        );
        assert_eq!(map.points().count(), 3);
    }

    #[test]
    fn test_rejects_dangling_endpoint() {
        let result = SceneMap::from_config(&config(vec![("TL", "BR", "red")]));
        match result {
            Err(OverlayError::InvalidSceneMap(message)) => assert!(message.contains("BR")),
            other => panic!("expected InvalidSceneMap, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_color() {
        let result = SceneMap::from_config(&config(vec![("TL", "TR", "orange")]));
        match result {
            Err(OverlayError::InvalidSceneMap(message)) => assert!(message.contains("orange")),
            other => panic!("expected InvalidSceneMap, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_unknown_frame_and_bad_coordinates() {
        let mut bad_frame = config(vec![]);
        bad_frame
            .points
            .insert("X".to_string(), ("world".to_string(), vec![0.0, 0.0]));
        assert!(matches!(
            SceneMap::from_config(&bad_frame),
            Err(OverlayError::InvalidSceneMap(_))
        ));

        assert!(ScenePoint::parse("image01", &[0.1, 0.2, 1.0]).is_err());
        assert!(ScenePoint::parse("axle", &[0.1]).is_err());
        assert!(ScenePoint::parse("axle", &[0.1, f64::INFINITY]).is_err());
        let point = ScenePoint::parse("ground", &[0.1, 0.2, 5.0]).unwrap();
        assert_eq!(point.frame(), CoordinateFrame::GroundPlane);
    }

    #[test]
    fn test_rejects_segment_with_wrong_endpoint_count() {
        let mut map = config(vec![]);
        map.segments.push(SegmentConfig {
            points: vec!["TL".to_string(), "TR".to_string(), "C".to_string()],
            color: "green".to_string(),
        });
        assert!(SceneMap::from_config(&map).is_err());
    }

    #[test]
    fn test_parses_yaml_layout() {
        let yaml = r#"
points:
  TL: [axle, [0.315, 0.093]]
  TR: [image01, [1, 0]]
segments:
  - points: [TL, TR]
    color: yellow
"#;
        let config: SceneMapConfig = serde_yaml::from_str(yaml).unwrap();
        let map = SceneMap::from_config(&config).unwrap();
        assert_eq!(map.segments()[0].color, Color::Yellow);
        assert_eq!(
            map.point("TR"),
            Some(&ScenePoint::NormalizedImage(Point2::new(1.0, 0.0)))
        );
    }
}
