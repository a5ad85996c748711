//! SCRFD face detector via ONNX Runtime.
//!
//! The image is letterboxed into a square RGB tensor, the network emits a
//! score, a box-distance and a five-landmark offset per anchor for each of the
//! three feature strides, and overlapping candidates are merged with NMS.
//! Every returned box carries landmarks in source-image pixels.

use crate::types::BoundingBox;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = SCRFD_STRIDES.len() * 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (run `facerec fetch-models`)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Decoding thresholds.
#[derive(Debug, Clone, Copy)]
pub struct DetectorOptions {
    /// Anchors scoring at or below this are dropped before NMS.
    pub confidence: f32,
    /// Overlap above which the weaker of two boxes is suppressed.
    pub nms_iou: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            nms_iou: 0.4,
        }
    }
}

/// Uniform scale plus centered padding that maps the source image into the
/// square network input. Padding is whole pixels, rounded down.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    pad_x: usize,
    pad_y: usize,
    content_w: usize,
    content_h: usize,
}

impl Letterbox {
    fn fit(src_w: usize, src_h: usize, dst: usize) -> Self {
        let scale = (dst as f32 / src_w as f32).min(dst as f32 / src_h as f32);
        let content_w = ((src_w as f32 * scale).round() as usize).min(dst);
        let content_h = ((src_h as f32 * scale).round() as usize).min(dst);
        Self {
            scale,
            pad_x: (dst - content_w) / 2,
            pad_y: (dst - content_h) / 2,
            content_w,
            content_h,
        }
    }

    /// Network-input coordinates back to source-image pixels.
    fn to_source(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x as f32) / self.scale, (y - self.pad_y as f32) / self.scale)
    }
}

/// Positions of one stride's three output tensors in the session outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// SCRFD-based face detector.
pub struct FaceDetector {
    session: Session,
    options: DetectorOptions,
    outputs: [StrideOutputs; 3],
}

impl FaceDetector {
    /// Load the SCRFD ONNX model with the given decoding thresholds.
    pub fn load_with(model_path: &Path, options: DetectorOptions) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2).map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?names,
            confidence = options.confidence,
            nms_iou = options.nms_iou,
            "loaded SCRFD model"
        );

        if names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model needs {SCRFD_OUTPUTS} outputs (score/bbox/kps per stride), got {}",
                names.len()
            )));
        }

        let outputs = map_outputs(&names);
        tracing::debug!(?outputs, "SCRFD output mapping");

        Ok(Self {
            session,
            options,
            outputs,
        })
    }

    /// Detect faces in an RGB image, strongest first.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = letterbox_tensor(image, SCRFD_INPUT_SIZE);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in self.outputs.iter().zip(SCRFD_STRIDES.iter()) {
            let extract = |index: usize, what: &'static str| {
                outputs[index]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let head = StrideHead {
                stride,
                scores: extract(slot.score, "scores")?,
                bboxes: extract(slot.bbox, "bboxes")?,
                kps: extract(slot.kps, "kps")?,
            };
            candidates.extend(head.decode(SCRFD_INPUT_SIZE, &letterbox, self.options.confidence));
        }

        let faces = nms(candidates, self.options.nms_iou);
        tracing::trace!(count = faces.len(), "SCRFD detections after NMS");
        Ok(faces)
    }
}

/// Resize into a `size × size` NCHW tensor, normalized to the SCRFD input
/// distribution. Bilinear sampling; the border stays at the normalized mean.
fn letterbox_tensor(image: &RgbImage, size: usize) -> (Array4<f32>, Letterbox) {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let lb = Letterbox::fit(w, h, size);

    // Zero is SCRFD_MEAN after normalization, so the padding needs no extra pass
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    let sample = |pos: f32, len: usize| -> (u32, u32, f32) {
        let src = (pos + 0.5) / lb.scale - 0.5;
        let lo = (src.floor() as i64).clamp(0, len as i64 - 1) as u32;
        let hi = (lo + 1).min(len as u32 - 1);
        (lo, hi, (src - src.floor()).clamp(0.0, 1.0))
    };

    for y in 0..lb.content_h {
        let (y0, y1, fy) = sample(y as f32, h);
        for x in 0..lb.content_w {
            let (x0, x1, fx) = sample(x as f32, w);
            let corners = [
                (image.get_pixel(x0, y0).0, (1.0 - fx) * (1.0 - fy)),
                (image.get_pixel(x1, y0).0, fx * (1.0 - fy)),
                (image.get_pixel(x0, y1).0, (1.0 - fx) * fy),
                (image.get_pixel(x1, y1).0, fx * fy),
            ];
            for c in 0..3 {
                let v: f32 = corners.iter().map(|(p, wt)| p[c] as f32 * wt).sum();
                tensor[[0, c, y + lb.pad_y, x + lb.pad_x]] = (v.round().clamp(0.0, 255.0) - SCRFD_MEAN) / SCRFD_STD;
            }
        }
    }

    (tensor, lb)
}

/// Map each stride to its output tensors.
///
/// Exports that name tensors `score_8`, `bbox_8`, `kps_8`, ... are matched by
/// name in any order. Anything else is read positionally: scores for strides
/// 8/16/32 first, then boxes, then landmarks.
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let position = |kind: &str, stride: usize| {
        let wanted = format!("{kind}_{stride}");
        names.iter().position(|n| *n == wanted)
    };

    let by_name: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| {
            Some(StrideOutputs {
                score: position("score", s)?,
                bbox: position("bbox", s)?,
                kps: position("kps", s)?,
            })
        })
        .collect();

    match by_name.as_deref() {
        Some(&[a, b, c]) => [a, b, c],
        _ => {
            tracing::debug!(?names, "SCRFD output names not recognized, mapping positionally");
            let n = SCRFD_STRIDES.len();
            [0, 1, 2].map(|i| StrideOutputs {
                score: i,
                bbox: n + i,
                kps: 2 * n + i,
            })
        }
    }
}

/// Raw network output for one feature stride.
struct StrideHead<'a> {
    stride: usize,
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
}

impl StrideHead<'_> {
    /// Anchors above `threshold`, as boxes in source-image coordinates.
    fn decode(&self, input_size: usize, letterbox: &Letterbox, threshold: f32) -> Vec<BoundingBox> {
        let grid = input_size / self.stride;
        let step = self.stride as f32;
        let anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;

        (0..anchors)
            .filter_map(|idx| {
                let score = *self.scores.get(idx)?;
                if score <= threshold {
                    return None;
                }
                let cell = idx / SCRFD_ANCHORS_PER_CELL;
                let (ax, ay) = ((cell % grid) as f32 * step, (cell / grid) as f32 * step);

                let d = self.bboxes.get(idx * 4..idx * 4 + 4)?;
                let (x1, y1) = letterbox.to_source((ax - d[0] * step, ay - d[1] * step));
                let (x2, y2) = letterbox.to_source((ax + d[2] * step, ay + d[3] * step));

                let landmarks = self.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                    let mut points = [(0.0f32, 0.0f32); 5];
                    for (p, xy) in points.iter_mut().zip(k.chunks_exact(2)) {
                        *p = letterbox.to_source((ax + xy[0] * step, ay + xy[1] * step));
                    }
                    points
                });

                Some(BoundingBox {
                    x: x1,
                    y: y1,
                    width: x2 - x1,
                    height: y2 - y1,
                    confidence: score,
                    landmarks,
                })
            })
            .collect()
    }
}

/// Greedy non-maximum suppression; the result is sorted by confidence, descending.
fn nms(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let overlap_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let overlap_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = overlap_w * overlap_h;
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
