// src/vision/vehicle_detection.rs

use crate::error::{Error, Result};
use crate::source::Detector;
use crate::types::{Detection, DetectorConfig, Frame};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

const YOLO_INPUT_SIZE: usize = 640;
const YOLO_CLASSES: usize = 80;
const YOLO_PREDICTIONS: usize = 8400;

// COCO class IDs for vehicles
const VEHICLE_CLASSES: [u32; 4] = [2, 3, 5, 7]; // car, motorcycle, bus, truck

fn ort_error(e: impl std::fmt::Display) -> Error {
    Error::Detector(format!("ONNX Runtime: {}", e))
}

/// YOLOv8 detector on ONNX Runtime (CPU).
pub struct YoloDetector {
    session: Session,
    confidence_threshold: f32,
    iou_threshold: f32,
    vehicle_classes_only: bool,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        info!("Loading YOLO model: {}", config.model_path);

        let session = Session::builder()
            .map_err(ort_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort_error)?
            .with_intra_threads(4)
            .map_err(ort_error)?
            .commit_from_file(&config.model_path)
            .map_err(ort_error)?;

        info!("✓ YOLO detector initialized");
        Ok(Self {
            session,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            vehicle_classes_only: config.vehicle_classes_only,
        })
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1, 3, YOLO_INPUT_SIZE, YOLO_INPUT_SIZE];
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))
                .map_err(ort_error)?;

        let outputs = self
            .session
            .run(ort::inputs!["images" => input_value])
            .map_err(ort_error)?;
        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(ort_error)?;

        Ok(data.to_vec())
    }

    fn postprocess(&self, output: &[f32], letterbox: Letterbox) -> Result<Vec<Detection>> {
        let expected = YOLO_PREDICTIONS * (4 + YOLO_CLASSES);
        if output.len() < expected {
            return Err(Error::Detector(format!(
                "unexpected output size {} (expected {})",
                output.len(),
                expected
            )));
        }

        let mut detections = Vec::new();

        // Output layout [1, 84, 8400]: per prediction [cx, cy, w, h, class scores...]
        for i in 0..YOLO_PREDICTIONS {
            let cx = output[i];
            let cy = output[YOLO_PREDICTIONS + i];
            let w = output[YOLO_PREDICTIONS * 2 + i];
            let h = output[YOLO_PREDICTIONS * 3 + i];

            let mut max_conf = 0.0f32;
            let mut best_class = 0u32;
            for c in 0..YOLO_CLASSES {
                let conf = output[YOLO_PREDICTIONS * (4 + c) + i];
                if conf > max_conf {
                    max_conf = conf;
                    best_class = c as u32;
                }
            }

            if max_conf < self.confidence_threshold {
                continue;
            }
            if self.vehicle_classes_only && !VEHICLE_CLASSES.contains(&best_class) {
                continue;
            }

            detections.push(Detection::new(
                letterbox.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]),
                max_conf,
                best_class,
            ));
        }

        Ok(nms(detections, self.iou_threshold))
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.data.len() < frame.width * frame.height * 3 {
            return Err(Error::Detector(format!(
                "frame {} has {} bytes, expected {}x{}x3",
                frame.index,
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }

        let (input, letterbox) = preprocess(&frame.data, frame.width, frame.height);
        let output = self.infer(input)?;
        let detections = self.postprocess(&output, letterbox)?;

        debug!(
            "Frame {}: {} detections [{}]",
            frame.index,
            detections.len(),
            detections
                .iter()
                .map(|d| class_name(d.class_id))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(detections)
    }
}

/// Scale and padding applied when fitting a frame into the square model input.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn unmap(&self, [x1, y1, x2, y2]: [f32; 4]) -> [f32; 4] {
        [
            (x1 - self.pad_x) / self.scale,
            (y1 - self.pad_y) / self.scale,
            (x2 - self.pad_x) / self.scale,
            (y2 - self.pad_y) / self.scale,
        ]
    }
}

/// Letterbox a packed BGR frame into a normalized RGB CHW tensor.
fn preprocess(src: &[u8], src_w: usize, src_h: usize) -> (Vec<f32>, Letterbox) {
    let target = YOLO_INPUT_SIZE;

    let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
    let scaled_w = ((src_w as f32 * scale) as usize).clamp(1, target);
    let scaled_h = ((src_h as f32 * scale) as usize).clamp(1, target);

    let pad_x = (target - scaled_w) as f32 / 2.0;
    let pad_y = (target - scaled_h) as f32 / 2.0;

    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    // Gray background, as used during training
    let mut canvas = vec![114u8; target * target * 3];
    for y in 0..scaled_h {
        for x in 0..scaled_w {
            let src_idx = (y * scaled_w + x) * 3;
            let dst_idx = ((y + pad_y as usize) * target + x + pad_x as usize) * 3;
            canvas[dst_idx..dst_idx + 3].copy_from_slice(&resized[src_idx..src_idx + 3]);
        }
    }

    // HWC BGR [0, 255] → CHW RGB [0, 1]
    let plane = target * target;
    let mut input = vec![0.0f32; 3 * plane];
    for (pixel, bgr) in canvas.chunks_exact(3).enumerate() {
        input[pixel] = bgr[2] as f32 / 255.0;
        input[plane + pixel] = bgr[1] as f32 / 255.0;
        input[2 * plane + pixel] = bgr[0] as f32 / 255.0;
    }

    (
        input,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = (sx.floor() as usize).min(src_w - 1);
            let sy0 = (sy.floor() as usize).min(src_h - 1);
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }
    dst
}

fn class_name(class_id: u32) -> &'static str {
    match class_id {
        0 => "person",
        1 => "bicycle",
        2 => "car",
        3 => "motorcycle",
        5 => "bus",
        7 => "truck",
        _ => "other",
    }
}

fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for det in detections {
        if keep
            .iter()
            .all(|kept| calculate_iou(&kept.bbox, &det.bbox) < iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
