use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Pick the box with the largest area. Earlier boxes win ties.
    pub fn largest(boxes: &[BoundingBox]) -> Option<&BoundingBox> {
        boxes.iter().fold(None, |best: Option<&BoundingBox>, b| match best {
            Some(prev) if prev.area() >= b.area() => Some(prev),
            _ => Some(b),
        })
    }
}

/// Subset of the five detector landmarks used to estimate the alignment transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkSet {
    /// Left eye, right eye and nose tip.
    #[default]
    OuterEyesAndNose,
    /// All five points: both eyes, nose, both mouth corners.
    FivePoint,
}

impl LandmarkSet {
    /// Indices into the five-point landmark array.
    pub fn indices(self) -> &'static [usize] {
        match self {
            LandmarkSet::OuterEyesAndNose => &[0, 1, 2],
            LandmarkSet::FivePoint => &[0, 1, 2, 3, 4],
        }
    }
}

/// A face warped to a canonical square crop, packed RGB (size * size * 3 bytes).
#[derive(Debug, Clone)]
pub struct AlignedFace {
    pub data: Vec<u8>,
    pub size: usize,
}

impl AlignedFace {
    /// Pixel value scaled to [0, 1].
    pub fn normalized(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.data
            .get((y * self.size + x) * 3 + channel)
            .copied()
            .unwrap_or(0) as f32
            / 255.0
    }

    pub fn to_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.size as u32, self.size as u32, self.data.clone())
    }
}

/// Face embedding vector (128-dimensional for the nn4.small2 family).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.values
    }
}
