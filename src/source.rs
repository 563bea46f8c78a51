// src/source.rs
//
// Collaborator contracts for the sensing loops: where frames come from and
// how they turn into detections. Both are owned by exactly one lane loop.

use crate::error::Result;
use crate::types::{Detection, Frame};

pub trait FrameSource: Send {
    /// Next frame, or `Ok(None)` at end of stream. A frame that fails to
    /// decode is also reported as `Ok(None)` so the caller rewinds.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Rewind to the first frame.
    fn restart(&mut self) -> Result<()>;

    /// Short human-readable name for logs.
    fn describe(&self) -> String;
}

pub trait Detector: Send {
    /// Detect objects in `frame`. Any confidence or class policy of the
    /// model itself is applied here; the lane counter takes the result as is.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn restart(&mut self) -> Result<()> {
        (**self).restart()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}
