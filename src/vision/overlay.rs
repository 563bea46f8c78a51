// src/vision/overlay.rs
//
// Annotated video output: region outline, counted vehicles, status text and
// the lane's signal lamp drawn onto every processed frame, one output file
// per lane.

use crate::arbitration::SignalState;
use crate::error::Result;
use crate::render::{LaneView, StatusSink};
use crate::types::LaneId;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{VideoWriter, VideoWriterTrait},
};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

const OUTPUT_FPS: f64 = 30.0;

pub struct OverlayWriter {
    output_dir: PathBuf,
    writers: Vec<Mutex<Option<VideoWriter>>>,
    signal: Mutex<Option<SignalState>>,
}

impl OverlayWriter {
    pub fn new(output_dir: impl Into<PathBuf>, lane_count: usize) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            writers: (0..lane_count).map(|_| Mutex::new(None)).collect(),
            signal: Mutex::new(None),
        })
    }

    fn open_writer(&self, lane: LaneId, width: i32, height: i32) -> Result<VideoWriter> {
        let output_path = self
            .output_dir
            .join(format!("road{}_annotated.mp4", lane.number()));
        info!("{}: writing annotated video to {}", lane, output_path.display());

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            &output_path.to_string_lossy(),
            fourcc,
            OUTPUT_FPS,
            core::Size::new(width, height),
            true,
        )?;
        Ok(writer)
    }

    fn render(&self, view: &LaneView<'_>) -> Result<()> {
        if view.frame.data.is_empty() {
            return Ok(());
        }

        let mat = Mat::from_slice(&view.frame.data)?;
        let mat = mat.reshape(3, view.frame.height as i32)?;
        let mut output = mat.try_clone()?;

        let red = core::Scalar::new(0.0, 0.0, 255.0, 0.0);
        let green = core::Scalar::new(0.0, 255.0, 0.0, 0.0);
        let white = core::Scalar::new(255.0, 255.0, 255.0, 0.0);

        // Counted vehicles
        for (det, _) in view
            .detections
            .iter()
            .zip(view.counted)
            .filter(|(_, counted)| **counted)
        {
            let [x1, y1, x2, y2] = det.pixel_box();
            imgproc::rectangle(
                &mut output,
                core::Rect::new(x1, y1, x2 - x1, y2 - y1),
                green,
                2,
                imgproc::LINE_8,
                0,
            )?;
        }

        // Region outline
        for (a, b) in view.region.edges() {
            imgproc::line(
                &mut output,
                core::Point::new(a.x, a.y),
                core::Point::new(b.x, b.y),
                red,
                2,
                imgproc::LINE_AA,
                0,
            )?;
        }

        imgproc::put_text(
            &mut output,
            view.status,
            core::Point::new(10, 25),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.6,
            white,
            2,
            imgproc::LINE_8,
            false,
        )?;

        let signal = self.signal.lock().ok().and_then(|s| *s);
        if let Some(state) = signal {
            draw_lamp(&mut output, view.lane, &state)?;
        }

        let Some(slot) = self.writers.get(view.lane.index()) else {
            return Ok(());
        };
        let Ok(mut writer) = slot.lock() else {
            return Ok(());
        };
        if writer.is_none() {
            *writer = Some(self.open_writer(view.lane, output.cols(), output.rows())?);
        }
        if let Some(writer) = writer.as_mut() {
            writer.write(&output)?;
        }
        Ok(())
    }
}

/// Lamp in the top-right corner: green (two shades for the blink) when the
/// lane has the right-of-way, red otherwise, ringed in yellow during caution.
fn draw_lamp(output: &mut Mat, lane: LaneId, state: &SignalState) -> Result<()> {
    let center = core::Point::new(output.cols() - 30, 30);
    let fill = if state.is_green(lane) {
        if state.blink_on {
            core::Scalar::new(0.0, 255.0, 0.0, 0.0)
        } else {
            core::Scalar::new(102.0, 255.0, 102.0, 0.0)
        }
    } else {
        core::Scalar::new(0.0, 0.0, 255.0, 0.0)
    };

    imgproc::circle(output, center, 18, fill, -1, imgproc::LINE_AA, 0)?;
    if state.caution {
        imgproc::circle(
            output,
            center,
            22,
            core::Scalar::new(0.0, 255.0, 255.0, 0.0),
            4,
            imgproc::LINE_AA,
            0,
        )?;
    }
    Ok(())
}

impl StatusSink for OverlayWriter {
    fn lane_frame(&self, view: &LaneView<'_>) {
        if let Err(e) = self.render(view) {
            warn!("{}: failed to write annotated frame: {}", view.lane, e);
        }
    }

    fn signal(&self, state: &SignalState, _lane_count: usize) {
        if let Ok(mut last) = self.signal.lock() {
            *last = Some(*state);
        }
    }
}
