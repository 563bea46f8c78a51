// src/occupancy.rs
//
// Per-lane vehicle counting: every detection whose box center falls inside
// the lane's region counts once. Counts are recomputed from scratch on every
// frame; nothing carries over between frames.

use crate::region::{contains, Polygon};
use crate::types::{Detection, LaneId};
use serde::{Deserialize, Serialize};

/// Optional pre-count filter. The default accepts every detection, so any
/// class or confidence policy has to be opted into explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    pub min_confidence: Option<f32>,
    pub classes: Option<Vec<u32>>,
}

impl DetectionFilter {
    pub fn accepts(&self, detection: &Detection) -> bool {
        if let Some(min) = self.min_confidence {
            if detection.confidence < min {
                return false;
            }
        }
        match &self.classes {
            Some(classes) => classes.contains(&detection.class_id),
            None => true,
        }
    }
}

/// Number of detections whose centroid lies inside `polygon`.
pub fn aggregate(detections: &[Detection], polygon: &Polygon) -> usize {
    detections
        .iter()
        .filter(|d| contains(d.centroid(), polygon))
        .count()
}

/// Counting stage for one lane. Immutable after construction.
#[derive(Debug, Clone)]
pub struct LaneOccupancyAggregator {
    lane: LaneId,
    region: Polygon,
    filter: DetectionFilter,
}

/// Result of aggregating one frame.
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    pub count: usize,
    /// Per-detection membership, parallel to the input slice. Used by the
    /// overlay to highlight counted vehicles.
    pub counted: Vec<bool>,
}

impl LaneOccupancyAggregator {
    pub fn new(lane: LaneId, region: Polygon, filter: DetectionFilter) -> Self {
        Self {
            lane,
            region,
            filter,
        }
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    pub fn region(&self) -> &Polygon {
        &self.region
    }

    pub fn count(&self, detections: &[Detection]) -> usize {
        self.aggregate(detections).count
    }

    pub fn aggregate(&self, detections: &[Detection]) -> Occupancy {
        let counted: Vec<bool> = detections
            .iter()
            .map(|d| self.filter.accepts(d) && self.region.contains(d.centroid()))
            .collect();
        let count = counted.iter().filter(|&&c| c).count();
        Occupancy { count, counted }
    }
}

/// Text shown under each lane's video feed.
pub fn status_text(lane: LaneId, count: usize) -> String {
    format!("Vehicles Detected on {}: {}", lane, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn square() -> Polygon {
        Polygon::new(
            LaneId(0),
            vec![
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(0, 10),
            ],
        )
        .unwrap()
    }

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new([x1, y1, x2, y2], 0.8, 2)
    }

    #[test]
    fn test_single_vehicle_inside() {
        assert_eq!(aggregate(&[det(2.0, 2.0, 4.0, 4.0)], &square()), 1);
    }

    #[test]
    fn test_single_vehicle_outside() {
        assert_eq!(aggregate(&[det(20.0, 20.0, 24.0, 24.0)], &square()), 0);
    }

    #[test]
    fn test_box_overlapping_region_counts_by_centroid_only() {
        // Box crosses the border but its center (12, 5) is outside.
        assert_eq!(aggregate(&[det(8.0, 3.0, 16.0, 7.0)], &square()), 0);
        // Huge box whose center (5, 5) is inside.
        assert_eq!(aggregate(&[det(-100.0, -100.0, 110.0, 110.0)], &square()), 1);
    }

    #[test]
    fn test_centroid_on_border_counts() {
        // Center (10, 5) lies on the right edge.
        assert_eq!(aggregate(&[det(8.0, 3.0, 12.0, 7.0)], &square()), 1);
    }

    #[test]
    fn test_mixed_list_bounded_by_input() {
        let dets = vec![
            det(2.0, 2.0, 4.0, 4.0),
            det(20.0, 20.0, 24.0, 24.0),
            det(5.0, 5.0, 7.0, 9.0),
            det(-5.0, -5.0, -1.0, -1.0),
        ];
        let count = aggregate(&dets, &square());
        assert_eq!(count, 2);
        assert!(count <= dets.len());
        assert_eq!(aggregate(&[], &square()), 0);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let aggregator =
            LaneOccupancyAggregator::new(LaneId(0), square(), DetectionFilter::default());
        let dets = vec![det(2.0, 2.0, 4.0, 4.0), det(6.0, 6.0, 8.0, 8.0)];

        let first = aggregator.count(&dets);
        let second = aggregator.count(&dets);
        assert_eq!(first, 2);
        assert_eq!(first, second);

        // A later, emptier frame replaces the count rather than adding to it.
        assert_eq!(aggregator.count(&dets[..1]), 1);
    }

    #[test]
    fn test_default_filter_counts_every_class_and_confidence() {
        let aggregator =
            LaneOccupancyAggregator::new(LaneId(0), square(), DetectionFilter::default());
        let dets = vec![
            Detection::new([2.0, 2.0, 4.0, 4.0], 0.01, 0),
            Detection::new([2.0, 2.0, 4.0, 4.0], 0.99, 7),
        ];
        assert_eq!(aggregator.count(&dets), 2);
    }

    #[test]
    fn test_filter_by_confidence_and_class() {
        let filter = DetectionFilter {
            min_confidence: Some(0.5),
            classes: Some(vec![2, 7]),
        };
        let aggregator = LaneOccupancyAggregator::new(LaneId(0), square(), filter);
        let dets = vec![
            Detection::new([2.0, 2.0, 4.0, 4.0], 0.9, 2),  // car, counted
            Detection::new([2.0, 2.0, 4.0, 4.0], 0.3, 2),  // low confidence
            Detection::new([2.0, 2.0, 4.0, 4.0], 0.9, 0),  // person
            Detection::new([20.0, 2.0, 24.0, 4.0], 0.9, 7), // truck, outside
        ];

        let occupancy = aggregator.aggregate(&dets);
        assert_eq!(occupancy.count, 1);
        assert_eq!(occupancy.counted, vec![true, false, false, false]);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(status_text(LaneId(1), 4), "Vehicles Detected on Road 2: 4");
    }
}
