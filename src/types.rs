use crate::occupancy::DetectionFilter;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signal: SignalConfig,
    pub lanes: Vec<LaneConfig>,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub filter: DetectionFilter,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Caution dwell and blink period, in milliseconds.
    pub dwell_ms: u64,
    /// 1-based number of the lane holding the right-of-way at startup.
    pub initial_lane: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 500,
            initial_lane: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub source: String,
    #[serde(default)]
    pub source_kind: SourceKind,
    pub region: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Video,
    Recorded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Drop everything but car / motorcycle / bus / truck inside the detector.
    pub vehicle_classes_only: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8m.onnx".to_string(),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            vehicle_classes_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub frame_width: usize,
    pub frame_height: usize,
    /// Cap on frames per second per lane. `None` runs as fast as the
    /// detector allows.
    pub pace_fps: Option<f64>,
    pub save_annotated: bool,
    pub output_dir: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_width: 600,
            frame_height: 400,
            pace_fps: None,
            save_annotated: false,
            output_dir: "output".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Index of a lane in the configured lane set. Zero-based internally,
/// displayed 1-based ("Road 1", "Road 2", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LaneId(pub usize);

impl LaneId {
    /// Lane from its 1-based display number.
    pub fn from_number(number: usize) -> Option<Self> {
        number.checked_sub(1).map(LaneId)
    }

    pub fn index(self) -> usize {
        self.0
    }

    pub fn number(self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Road {}", self.number())
    }
}

/// Integer pixel coordinate. Deserializes from `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub timestamp_ms: f64,
    pub width: usize,
    pub height: usize,
    /// Packed BGR pixels. Empty for replayed detection logs.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [f32; 4], // [x1, y1, x2, y2] in frame coordinates
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: [f32; 4], confidence: f32, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }

    /// Box corners truncated to whole pixels.
    pub fn pixel_box(&self) -> [i32; 4] {
        let [x1, y1, x2, y2] = self.bbox;
        [x1 as i32, y1 as i32, x2 as i32, y2 as i32]
    }

    /// Box center in whole pixels, rounded toward negative infinity.
    pub fn centroid(&self) -> Point {
        let [x1, y1, x2, y2] = self.pixel_box();
        Point::new(floor_mid(x1, x2), floor_mid(y1, y2))
    }
}

/// Floor of the midpoint. Summed in i64; the result always fits in i32.
fn floor_mid(a: i32, b: i32) -> i32 {
    (a as i64 + b as i64).div_euclid(2) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_floors() {
        let det = Detection::new([2.0, 2.0, 5.0, 5.0], 0.9, 2);
        assert_eq!(det.centroid(), Point::new(3, 3));

        let det = Detection::new([-3.0, -3.0, 0.0, 0.0], 0.9, 2);
        assert_eq!(det.centroid(), Point::new(-2, -2));
    }

    #[test]
    fn test_centroid_truncates_subpixel_boxes() {
        let det = Detection::new([2.9, 2.9, 4.9, 4.9], 0.5, 0);
        assert_eq!(det.pixel_box(), [2, 2, 4, 4]);
        assert_eq!(det.centroid(), Point::new(3, 3));
    }

    #[test]
    fn test_centroid_of_huge_boxes_does_not_overflow() {
        let det = Detection::new([2.0e9, 0.0, 2.0e9, 10.0], 0.5, 2);
        assert_eq!(det.centroid(), Point::new(2_000_000_000, 5));

        // Non-finite coordinates saturate to the i32 range.
        let det = Detection::new([f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY, 0.0], 0.5, 2);
        assert_eq!(det.centroid(), Point::new(i32::MAX, i32::MIN / 2));
    }

    #[test]
    fn test_lane_id_numbering() {
        assert_eq!(LaneId::from_number(1), Some(LaneId(0)));
        assert_eq!(LaneId::from_number(0), None);
        assert_eq!(LaneId(1).number(), 2);
        assert_eq!(LaneId(1).to_string(), "Road 2");
    }
}
