// src/vision/mod.rs
//
// OpenCV / ONNX Runtime adapters. Built with the `vision` feature.

pub mod overlay;
pub mod vehicle_detection;
pub mod video_source;

pub use overlay::OverlayWriter;
pub use vehicle_detection::YoloDetector;
pub use video_source::VideoFileSource;
