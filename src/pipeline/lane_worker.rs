// src/pipeline/lane_worker.rs
//
// Sensing loop for one lane: frame → detector → occupancy count → published
// reading. Runs on a blocking thread because frame decoding and inference
// are synchronous.

use super::metrics::ControlMetrics;
use crate::error::{Error, Result};
use crate::occupancy::{status_text, LaneOccupancyAggregator};
use crate::render::{LaneView, StatusSink};
use crate::shutdown::ShutdownListener;
use crate::source::{Detector, FrameSource};
use crate::types::{Detection, Frame, LaneId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const EMPTY_READ_BACKOFF: Duration = Duration::from_millis(100);

/// Latest count of one lane. Replaced as a whole on every processed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneReading {
    pub lane: LaneId,
    pub count: usize,
    /// Frame the count came from; `None` until the first frame is done.
    pub frame_index: Option<u64>,
}

impl LaneReading {
    pub fn empty(lane: LaneId) -> Self {
        Self {
            lane,
            count: 0,
            frame_index: None,
        }
    }
}

pub struct LaneWorker<S, D> {
    aggregator: LaneOccupancyAggregator,
    source: S,
    detector: D,
    readings: watch::Sender<LaneReading>,
    sink: Arc<dyn StatusSink>,
    metrics: Arc<ControlMetrics>,
    frame_interval: Option<Duration>,
}

impl<S: FrameSource, D: Detector> LaneWorker<S, D> {
    pub fn new(
        aggregator: LaneOccupancyAggregator,
        source: S,
        detector: D,
        readings: watch::Sender<LaneReading>,
        sink: Arc<dyn StatusSink>,
        metrics: Arc<ControlMetrics>,
    ) -> Self {
        Self {
            aggregator,
            source,
            detector,
            readings,
            sink,
            metrics,
            frame_interval: None,
        }
    }

    /// Minimum spacing between frames. The wait is cut short by shutdown.
    pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Run until shutdown. Consumes the worker so the frame source is
    /// dropped, and thereby released, on every exit path.
    pub fn run(mut self, mut shutdown: ShutdownListener) -> Result<()> {
        let lane = self.aggregator.lane();
        let source_name = self.source.describe();
        info!("▶ {} sensing from {}", lane, source_name);

        // Rewinds since the last good frame. An empty read straight after a
        // rewind backs off before rewinding again.
        let mut empty_rewinds = 0u32;

        while !shutdown.is_triggered() {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => {
                    empty_rewinds = 0;
                    frame
                }
                Ok(None) => {
                    if self.rewind(lane, &mut empty_rewinds, &mut shutdown)? {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("{}: frame read failed ({}), rewinding", lane, e);
                    if self.rewind(lane, &mut empty_rewinds, &mut shutdown)? {
                        break;
                    }
                    continue;
                }
            };

            match self.detector.detect(&frame) {
                Ok(detections) => {
                    if shutdown.is_triggered() {
                        break;
                    }
                    self.publish(lane, &frame, &detections);
                }
                Err(e) => {
                    warn!("{}: detector failed on frame {}: {}", lane, frame.index, e);
                    self.metrics.inc(&self.metrics.lane(lane).detector_failures);
                }
            }

            if let Some(interval) = self.frame_interval {
                if shutdown.wait_blocking(interval) {
                    break;
                }
            }
        }

        info!("■ {} stopped, releasing {}", lane, source_name);
        Ok(())
    }

    /// Rewind after an empty read. Returns true if shutdown fired during the
    /// back-off. Only a failing `restart` is fatal.
    fn rewind(
        &mut self,
        lane: LaneId,
        empty_rewinds: &mut u32,
        shutdown: &mut ShutdownListener,
    ) -> Result<bool> {
        if *empty_rewinds >= 1 {
            warn!(
                "{}: {} still empty after rewind, retrying in {:?}",
                lane,
                self.source.describe(),
                EMPTY_READ_BACKOFF
            );
            if shutdown.wait_blocking(EMPTY_READ_BACKOFF) {
                return Ok(true);
            }
        }
        *empty_rewinds += 1;

        debug!("{}: end of stream, restarting {}", lane, self.source.describe());
        self.source
            .restart()
            .map_err(|e| Error::source_unavailable(lane, format!("restart failed: {}", e)))?;
        self.metrics.inc(&self.metrics.lane(lane).source_restarts);
        Ok(false)
    }

    fn publish(&self, lane: LaneId, frame: &Frame, detections: &[Detection]) {
        let occupancy = self.aggregator.aggregate(detections);

        self.readings.send_replace(LaneReading {
            lane,
            count: occupancy.count,
            frame_index: Some(frame.index),
        });

        let counters = self.metrics.lane(lane);
        self.metrics.inc(&counters.frames);
        counters
            .last_count
            .store(occupancy.count as u64, Ordering::Relaxed);

        let status = status_text(lane, occupancy.count);
        self.sink.lane_frame(&LaneView {
            lane,
            frame,
            region: self.aggregator.region(),
            detections,
            counted: &occupancy.counted,
            count: occupancy.count,
            status: &status,
        });
    }
}
