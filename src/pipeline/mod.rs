// src/pipeline/mod.rs
//
// Concurrent control loops. Signal flow:
//   FrameSource → Detector → LaneWorker ──watch<LaneReading>──┐
//   FrameSource → Detector → LaneWorker ──watch<LaneReading>──┼→ SignalLoop ──watch<SignalState>→ renderer
//                                                             ┘
// Orchestrated by orchestrator::ControlLoop.

pub mod lane_worker;
pub mod metrics;
pub mod orchestrator;
pub mod signal_loop;

pub use orchestrator::{
    BoxedDetector, BoxedSource, ControlLoop, LaneOpener, LaneSetup, LoopSettings,
};
