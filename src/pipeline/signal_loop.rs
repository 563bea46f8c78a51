// src/pipeline/signal_loop.rs
//
// Arbitration tick loop. Sole owner of the `SignalArbiter`; reads the latest
// lane readings once per dwell interval and publishes a full `SignalState`
// snapshot after every tick.

use super::lane_worker::LaneReading;
use super::metrics::ControlMetrics;
use crate::arbitration::{SignalArbiter, SignalState, Transition};
use crate::shutdown::ShutdownListener;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

pub struct SignalLoop {
    arbiter: SignalArbiter,
    readings: Vec<watch::Receiver<LaneReading>>,
    signal: watch::Sender<SignalState>,
    metrics: Arc<ControlMetrics>,
    dwell: Duration,
}

impl SignalLoop {
    pub fn new(
        arbiter: SignalArbiter,
        readings: Vec<watch::Receiver<LaneReading>>,
        signal: watch::Sender<SignalState>,
        metrics: Arc<ControlMetrics>,
        dwell: Duration,
    ) -> Self {
        Self {
            arbiter,
            readings,
            signal,
            metrics,
            dwell,
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        info!(
            "▶ Signal arbitration running ({} lanes, dwell {:?}, {} starts green)",
            self.arbiter.lane_count(),
            self.dwell,
            self.arbiter.active_lane()
        );

        let mut ticker = interval(self.dwell);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {}
            }

            let counts: Vec<usize> = self.readings.iter().map(|rx| rx.borrow().count).collect();
            let transition = self.arbiter.tick(&counts);

            self.metrics.inc(&self.metrics.ticks);
            match transition {
                Some(Transition::Began { .. }) => self.metrics.inc(&self.metrics.switches_started),
                Some(Transition::Committed { .. }) => {
                    self.metrics.inc(&self.metrics.switches_committed)
                }
                None => {}
            }

            let state = self.arbiter.snapshot();
            debug!(
                "tick {}: counts {:?} → {} {:?}",
                state.tick, counts, state.active_lane, state.phase
            );
            self.signal.send_replace(state);
        }

        info!(
            "■ Signal arbitration stopped after {} ticks",
            self.metrics.ticks.load(Ordering::Relaxed)
        );
    }
}
