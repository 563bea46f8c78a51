// src/vision/video_source.rs

use crate::error::{Error, Result};
use crate::source::FrameSource;
use crate::types::{Frame, LaneId};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Video file (or camera URL) played in a loop, every frame resized to the
/// configured processing size.
pub struct VideoFileSource {
    path: PathBuf,
    cap: VideoCapture,
    fps: f64,
    total_frames: i32,
    current_frame: u64,
    width: i32,
    height: i32,
}

impl VideoFileSource {
    pub fn open(lane: LaneId, path: &Path, width: usize, height: usize) -> Result<Self> {
        info!("{}: opening video {}", lane, path.display());

        let path_str = path
            .to_str()
            .ok_or_else(|| Error::source_unavailable(lane, "path is not valid UTF-8"))?;
        let mut cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .map_err(|e| Error::source_unavailable(lane, e.to_string()))?;

        if !cap.is_opened()? {
            return Err(Error::source_unavailable(
                lane,
                format!("unable to open {}", path.display()),
            ));
        }

        // A source that cannot yield even one frame counts as unopenable;
        // later empty reads are only rewound.
        let mut first = Mat::default();
        let readable = VideoCaptureTrait::read(&mut cap, &mut first).unwrap_or(false);
        if !readable || first.empty() {
            return Err(Error::source_unavailable(
                lane,
                format!("{} has no readable frames", path.display()),
            ));
        }
        VideoCaptureTrait::set(&mut cap, videoio::CAP_PROP_POS_FRAMES, 0.0)?;

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let src_width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let src_height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "{}: {}x{} @ {:.1} FPS, {} frames → processing at {}x{}",
            lane, src_width, src_height, fps, total_frames, width, height
        );

        Ok(Self {
            path: path.to_path_buf(),
            cap,
            fps: if fps > 0.0 { fps } else { 30.0 },
            total_frames,
            current_frame: 0,
            width: width as i32,
            height: height as i32,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();

        match VideoCaptureTrait::read(&mut self.cap, &mut mat) {
            Ok(true) if !mat.empty() => {}
            Ok(_) => return Ok(None),
            Err(e) => {
                warn!("Decode failure in {}: {}", self.path.display(), e);
                return Ok(None);
            }
        }

        let mut resized = Mat::default();
        imgproc::resize(
            &mat,
            &mut resized,
            core::Size::new(self.width, self.height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let index = self.current_frame;
        self.current_frame += 1;

        Ok(Some(Frame {
            index,
            timestamp_ms: (index as f64 / self.fps) * 1000.0,
            width: self.width as usize,
            height: self.height as usize,
            data: resized.data_bytes()?.to_vec(),
        }))
    }

    fn restart(&mut self) -> Result<()> {
        debug!(
            "Rewinding {} after {}/{} frames",
            self.path.display(),
            self.current_frame,
            self.total_frames
        );
        VideoCaptureTrait::set(&mut self.cap, videoio::CAP_PROP_POS_FRAMES, 0.0)?;
        self.current_frame = 0;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("video {}", self.path.display())
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        if let Err(e) = VideoCaptureTrait::release(&mut self.cap) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}
