// src/pipeline/metrics.rs
//
// Counters shared by the lane workers and the signal loop. Written with
// relaxed atomics, read once for the shutdown summary.

use crate::types::LaneId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
pub struct LaneCounters {
    pub frames: AtomicU64,
    pub source_restarts: AtomicU64,
    pub detector_failures: AtomicU64,
    pub last_count: AtomicU64,
}

#[derive(Debug)]
pub struct ControlMetrics {
    lanes: Vec<LaneCounters>,
    pub ticks: AtomicU64,
    pub switches_started: AtomicU64,
    pub switches_committed: AtomicU64,
    pub started_at: Instant,
}

impl ControlMetrics {
    pub fn new(lane_count: usize) -> Self {
        Self {
            lanes: (0..lane_count).map(|_| LaneCounters::default()).collect(),
            ticks: AtomicU64::new(0),
            switches_started: AtomicU64::new(0),
            switches_committed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn lane(&self, lane: LaneId) -> &LaneCounters {
        &self.lanes[lane.index()]
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        let elapsed_secs = self.started_at.elapsed().as_secs_f64();
        MetricsSummary {
            elapsed_secs,
            ticks: self.ticks.load(Ordering::Relaxed),
            switches_started: self.switches_started.load(Ordering::Relaxed),
            switches_committed: self.switches_committed.load(Ordering::Relaxed),
            lanes: self
                .lanes
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let frames = c.frames.load(Ordering::Relaxed);
                    LaneSummary {
                        lane: LaneId(i).number(),
                        frames,
                        fps: if elapsed_secs > 0.01 {
                            frames as f64 / elapsed_secs
                        } else {
                            0.0
                        },
                        source_restarts: c.source_restarts.load(Ordering::Relaxed),
                        detector_failures: c.detector_failures.load(Ordering::Relaxed),
                        last_count: c.last_count.load(Ordering::Relaxed),
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub elapsed_secs: f64,
    pub ticks: u64,
    pub switches_started: u64,
    pub switches_committed: u64,
    pub lanes: Vec<LaneSummary>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LaneSummary {
    pub lane: usize,
    pub frames: u64,
    pub fps: f64,
    pub source_restarts: u64,
    pub detector_failures: u64,
    pub last_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_reports_per_lane_counters() {
        let metrics = ControlMetrics::new(2);
        metrics.inc(&metrics.lane(LaneId(1)).frames);
        metrics.inc(&metrics.lane(LaneId(1)).frames);
        metrics.inc(&metrics.lane(LaneId(0)).source_restarts);
        metrics.inc(&metrics.switches_started);

        let summary = metrics.summary();
        assert_eq!(summary.lanes.len(), 2);
        assert_eq!(summary.lanes[1].lane, 2);
        assert_eq!(summary.lanes[1].frames, 2);
        assert_eq!(summary.lanes[0].source_restarts, 1);
        assert_eq!(summary.switches_started, 1);
        assert_eq!(summary.switches_committed, 0);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"switches_started\":1"));
    }
}
