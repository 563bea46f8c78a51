// src/pipeline/orchestrator.rs
//
// Starts and stops the control loops: one sensing worker per lane on a
// blocking thread, one arbitration loop on the async runtime. The loops
// never call each other; they share only the watch channels created here
// and the shutdown signal.

use super::lane_worker::{LaneReading, LaneWorker};
use super::metrics::ControlMetrics;
use super::signal_loop::SignalLoop;
use crate::arbitration::{SignalArbiter, SignalState};
use crate::error::{Error, Result};
use crate::occupancy::LaneOccupancyAggregator;
use crate::render::StatusSink;
use crate::shutdown::Shutdown;
use crate::source::{Detector, FrameSource};
use crate::types::LaneId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type BoxedSource = Box<dyn FrameSource>;
pub type BoxedDetector = Box<dyn Detector>;

/// Opens a lane's frame source and detector. Runs on the lane's own
/// thread, so a slow or failing open only affects that lane.
pub type LaneOpener = Box<dyn FnOnce() -> Result<(BoxedSource, BoxedDetector)> + Send>;

pub struct LaneSetup {
    pub aggregator: LaneOccupancyAggregator,
    pub open: LaneOpener,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub dwell: Duration,
    pub initial_lane: LaneId,
    pub frame_interval: Option<Duration>,
}

/// How a lane worker ended.
#[derive(Debug)]
pub struct LaneOutcome {
    pub lane: LaneId,
    pub result: std::result::Result<(), String>,
}

pub struct ControlLoop {
    shutdown: Shutdown,
    lane_tasks: Vec<(LaneId, JoinHandle<Result<()>>)>,
    signal_task: JoinHandle<()>,
    signal: watch::Receiver<SignalState>,
    readings: Vec<watch::Receiver<LaneReading>>,
    metrics: Arc<ControlMetrics>,
}

impl ControlLoop {
    /// Spawn every loop. Must be called from within a Tokio runtime.
    pub fn start(
        lanes: Vec<LaneSetup>,
        settings: LoopSettings,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        if lanes.is_empty() {
            return Err(Error::InvalidConfig("no lanes configured".to_string()));
        }
        if settings.initial_lane.index() >= lanes.len() {
            return Err(Error::InvalidConfig(format!(
                "initial lane {} out of range (1..={})",
                settings.initial_lane.number(),
                lanes.len()
            )));
        }
        if settings.dwell.is_zero() {
            return Err(Error::InvalidConfig("dwell interval must be > 0".to_string()));
        }
        for (i, setup) in lanes.iter().enumerate() {
            if setup.aggregator.lane() != LaneId(i) {
                return Err(Error::InvalidConfig(format!(
                    "lane setup {} is for {}",
                    i + 1,
                    setup.aggregator.lane()
                )));
            }
        }

        let lane_count = lanes.len();
        let shutdown = Shutdown::new();
        let metrics = Arc::new(ControlMetrics::new(lane_count));

        let mut readings = Vec::with_capacity(lane_count);
        let mut lane_tasks = Vec::with_capacity(lane_count);

        for setup in lanes {
            let lane = setup.aggregator.lane();
            let (reading_tx, reading_rx) = watch::channel(LaneReading::empty(lane));
            readings.push(reading_rx);

            let sink = sink.clone();
            let metrics = metrics.clone();
            let listener = shutdown.listener();
            let frame_interval = settings.frame_interval;

            let task = tokio::task::spawn_blocking(move || {
                let result = (setup.open)().and_then(|(source, detector)| {
                    LaneWorker::new(
                        setup.aggregator,
                        source,
                        detector,
                        reading_tx,
                        sink,
                        metrics,
                    )
                    .with_frame_interval(frame_interval)
                    .run(listener)
                });
                if let Err(e) = &result {
                    error!("✗ {} stopped: {}", lane, e);
                }
                result
            });
            lane_tasks.push((lane, task));
        }

        let arbiter = SignalArbiter::new(lane_count, settings.initial_lane);
        let (signal_tx, signal_rx) = watch::channel(arbiter.snapshot());
        let signal_loop = SignalLoop::new(
            arbiter,
            readings.clone(),
            signal_tx,
            metrics.clone(),
            settings.dwell,
        );
        let signal_task = tokio::spawn(signal_loop.run(shutdown.listener()));

        info!("✓ Control loop started with {} lanes", lane_count);

        Ok(Self {
            shutdown,
            lane_tasks,
            signal_task,
            signal: signal_rx,
            readings,
            metrics,
        })
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn subscribe_signal(&self) -> watch::Receiver<SignalState> {
        self.signal.clone()
    }

    pub fn subscribe_lane(&self, lane: LaneId) -> Option<watch::Receiver<LaneReading>> {
        self.readings.get(lane.index()).cloned()
    }

    pub fn signal_state(&self) -> SignalState {
        *self.signal.borrow()
    }

    pub fn metrics(&self) -> Arc<ControlMetrics> {
        self.metrics.clone()
    }

    pub fn lane_count(&self) -> usize {
        self.readings.len()
    }

    /// Trigger shutdown and wait for every loop to exit.
    pub async fn stop(self) -> Vec<LaneOutcome> {
        self.shutdown.trigger();
        self.join().await
    }

    /// Wait for every loop to exit. Only returns once shutdown has been
    /// triggered, since the arbitration loop runs until then.
    async fn join(self) -> Vec<LaneOutcome> {
        let mut outcomes = Vec::with_capacity(self.lane_tasks.len());
        for (lane, task) in self.lane_tasks {
            let result = match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => {
                    warn!("{} worker panicked: {}", lane, e);
                    Err(format!("worker panicked: {}", e))
                }
            };
            outcomes.push(LaneOutcome { lane, result });
        }

        if let Err(e) = self.signal_task.await {
            warn!("Signal loop panicked: {}", e);
        }

        outcomes
    }
}
