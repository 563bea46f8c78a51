// src/render.rs
//
// Presentation side. The control loops only publish; whatever implements
// `StatusSink` decides how lanes and lights are shown.

use crate::arbitration::SignalState;
use crate::region::Polygon;
use crate::shutdown::ShutdownListener;
use crate::types::{Detection, Frame, LaneId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One processed frame of one lane, as handed to the sink.
pub struct LaneView<'a> {
    pub lane: LaneId,
    pub frame: &'a Frame,
    pub region: &'a Polygon,
    pub detections: &'a [Detection],
    /// Parallel to `detections`: true for boxes included in the count.
    pub counted: &'a [bool],
    pub count: usize,
    pub status: &'a str,
}

pub trait StatusSink: Send + Sync {
    fn lane_frame(&self, view: &LaneView<'_>);

    fn signal(&self, state: &SignalState, lane_count: usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Light {
    Green,
    /// Lighter green shade of the blink cycle.
    GreenDim,
    Red,
}

impl Light {
    fn symbol(self) -> &'static str {
        match self {
            Light::Green => "🟢",
            Light::GreenDim => "🟩",
            Light::Red => "🔴",
        }
    }
}

/// Lamp color of each lane for a given signal state.
pub fn lane_lights(state: &SignalState, lane_count: usize) -> Vec<Light> {
    (0..lane_count)
        .map(|i| {
            if state.is_green(LaneId(i)) {
                if state.blink_on {
                    Light::Green
                } else {
                    Light::GreenDim
                }
            } else {
                Light::Red
            }
        })
        .collect()
}

/// Single-line rendering of the light board, e.g. `Road 1 🟢 | Road 2 🔴 | caution 🟡`.
pub fn light_board(state: &SignalState, lane_count: usize) -> String {
    let lights = lane_lights(state, lane_count);
    let caution = if state.caution { "🟡" } else { "⚫" };
    let lanes: Vec<String> = lights
        .iter()
        .enumerate()
        .map(|(i, light)| format!("{} {}", LaneId(i), light.symbol()))
        .collect();
    format!("{} | caution {}", lanes.join(" | "), caution)
}

/// Sink that renders everything through the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn lane_frame(&self, view: &LaneView<'_>) {
        debug!(
            "[frame {} @ {:.0} ms] {} ({} of {} detections in region)",
            view.frame.index,
            view.frame.timestamp_ms,
            view.status,
            view.count,
            view.detections.len()
        );
    }

    fn signal(&self, state: &SignalState, lane_count: usize) {
        if state.caution {
            info!("🚦 {}", light_board(state, lane_count));
        } else {
            debug!("🚦 {}", light_board(state, lane_count));
        }
    }
}

/// Sink fan-out, e.g. log output plus annotated video.
pub struct MultiSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn StatusSink>>) -> Self {
        Self { sinks }
    }
}

impl StatusSink for MultiSink {
    fn lane_frame(&self, view: &LaneView<'_>) {
        for sink in &self.sinks {
            sink.lane_frame(view);
        }
    }

    fn signal(&self, state: &SignalState, lane_count: usize) {
        for sink in &self.sinks {
            sink.signal(state, lane_count);
        }
    }
}

/// Follow the published signal state and present every change.
pub fn spawn_signal_display(
    mut signal: watch::Receiver<SignalState>,
    sink: Arc<dyn StatusSink>,
    lane_count: usize,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let state = *signal.borrow_and_update();
            sink.signal(&state, lane_count);

            tokio::select! {
                _ = shutdown.triggered() => break,
                changed = signal.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Signal display stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitration::Phase;

    fn state(active: usize, blink_on: bool, caution: bool) -> SignalState {
        SignalState {
            active_lane: LaneId(active),
            phase: if caution {
                Phase::Switching
            } else {
                Phase::Steady
            },
            pending_lane: if caution {
                Some(LaneId(1 - active))
            } else {
                None
            },
            blink_on,
            caution,
            tick: 0,
        }
    }

    #[test]
    fn test_exactly_one_green() {
        for active in 0..2 {
            for blink in [true, false] {
                let lights = lane_lights(&state(active, blink, false), 2);
                let greens = lights.iter().filter(|l| **l != Light::Red).count();
                assert_eq!(greens, 1);
                assert_ne!(lights[active], Light::Red);
            }
        }
    }

    #[test]
    fn test_blink_only_changes_shade() {
        assert_eq!(
            lane_lights(&state(0, true, false), 2),
            vec![Light::Green, Light::Red]
        );
        assert_eq!(
            lane_lights(&state(0, false, false), 2),
            vec![Light::GreenDim, Light::Red]
        );
    }

    #[test]
    fn test_outgoing_lane_stays_green_during_caution() {
        let s = state(0, true, true);
        assert_eq!(lane_lights(&s, 2), vec![Light::Green, Light::Red]);
        assert!(light_board(&s, 2).contains("caution 🟡"));
        assert!(light_board(&state(0, true, false), 2).contains("caution ⚫"));
    }

    #[derive(Default)]
    struct CountingSink {
        signals: std::sync::atomic::AtomicUsize,
    }

    impl StatusSink for CountingSink {
        fn lane_frame(&self, _view: &LaneView<'_>) {}

        fn signal(&self, _state: &SignalState, _lane_count: usize) {
            self.signals
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_multi_sink_fans_out() {
        let a = Arc::new(CountingSink::default());
        let b = Arc::new(CountingSink::default());
        let multi = MultiSink::new(vec![a.clone() as Arc<dyn StatusSink>, b.clone()]);
        multi.signal(&state(0, true, false), 2);
        multi.signal(&state(0, false, false), 2);
        assert_eq!(a.signals.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(b.signals.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_signal_display_stops_on_shutdown() {
        let shutdown = crate::shutdown::Shutdown::new();
        let (tx, rx) = watch::channel(state(0, true, false));
        let sink = Arc::new(CountingSink::default());
        let display = spawn_signal_display(rx, sink.clone(), 2, shutdown.listener());

        tokio::task::yield_now().await;
        tx.send_replace(state(0, false, false));
        tokio::task::yield_now().await;

        shutdown.trigger();
        display.await.unwrap();
        assert!(sink.signals.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }
}
