// src/replay.rs
//
// Replay of recorded detections. A recording is a JSON-lines file with one
// frame per line:
//
//   {"detections": [[x1, y1, x2, y2, confidence, class_id], ...]}
//
// `RecordedSource` plays the frames back (looping like a video file) and
// `RecordedDetector` hands out the recorded boxes for each frame, so the
// whole control loop can run without a camera or a model.

use crate::error::{Error, Result};
use crate::source::{Detector, FrameSource};
use crate::types::{Detection, Frame, LaneId};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const RECORDED_FPS: f64 = 30.0;

#[derive(Debug, Deserialize)]
struct RecordedLine {
    #[serde(default)]
    detections: Vec<[f32; 6]>,
}

#[derive(Debug, Default)]
pub struct DetectionLog {
    frames: Vec<Vec<Detection>>,
}

impl DetectionLog {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut frames = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: RecordedLine = serde_json::from_str(line)?;
            frames.push(
                parsed
                    .detections
                    .iter()
                    .map(|&[x1, y1, x2, y2, conf, cls]| {
                        Detection::new([x1, y1, x2, y2], conf, cls as u32)
                    })
                    .collect(),
            );
        }
        Ok(Self { frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<&[Detection]> {
        self.frames.get(index).map(Vec::as_slice)
    }
}

pub struct RecordedSource {
    path: PathBuf,
    log: Arc<DetectionLog>,
    cursor: usize,
    width: usize,
    height: usize,
}

impl RecordedSource {
    pub fn new(path: PathBuf, log: Arc<DetectionLog>, width: usize, height: usize) -> Self {
        Self {
            path,
            log,
            cursor: 0,
            width,
            height,
        }
    }
}

impl FrameSource for RecordedSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.cursor >= self.log.len() {
            return Ok(None);
        }
        let index = self.cursor as u64;
        self.cursor += 1;
        Ok(Some(Frame {
            index,
            timestamp_ms: index as f64 * 1000.0 / RECORDED_FPS,
            width: self.width,
            height: self.height,
            data: Vec::new(),
        }))
    }

    fn restart(&mut self) -> Result<()> {
        debug!("Rewinding recording {}", self.path.display());
        self.cursor = 0;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("recording {}", self.path.display())
    }
}

pub struct RecordedDetector {
    log: Arc<DetectionLog>,
}

impl RecordedDetector {
    pub fn new(log: Arc<DetectionLog>) -> Self {
        Self { log }
    }
}

impl Detector for RecordedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.log
            .frame(frame.index as usize)
            .map(<[Detection]>::to_vec)
            .ok_or_else(|| {
                Error::Detector(format!(
                    "frame {} not in recording of {} frames",
                    frame.index,
                    self.log.len()
                ))
            })
    }
}

/// Open a recording as a matched source/detector pair for `lane`.
pub fn open_recording(
    lane: LaneId,
    path: &Path,
    width: usize,
    height: usize,
) -> Result<(RecordedSource, RecordedDetector)> {
    let log = DetectionLog::load(path)
        .map_err(|e| Error::source_unavailable(lane, format!("{}: {}", path.display(), e)))?;
    if log.is_empty() {
        return Err(Error::source_unavailable(
            lane,
            format!("{} contains no frames", path.display()),
        ));
    }
    info!(
        "✓ {}: loaded recording {} ({} frames)",
        lane,
        path.display(),
        log.len()
    );

    let log = Arc::new(log);
    Ok((
        RecordedSource::new(path.to_path_buf(), log.clone(), width, height),
        RecordedDetector::new(log),
    ))
}
