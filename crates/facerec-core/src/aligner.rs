//! Face alignment boundary: detect the largest face, then warp it to a canonical crop.

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::types::{AlignedFace, BoundingBox, LandmarkSet};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face has no landmarks; alignment needs a landmark-producing detector")]
    NoLandmarks,
    #[error("landmarks are degenerate, cannot estimate alignment transform")]
    DegenerateLandmarks,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Detects a face and warps it to a fixed-size canonical image.
pub trait Aligner {
    /// Bounding box of the largest face in the image.
    fn largest_face(&mut self, image: &RgbImage) -> Result<BoundingBox, AlignError>;

    /// Warp the face described by `face` to the aligner's crop size.
    fn align_box(&self, image: &RgbImage, face: &BoundingBox) -> Result<AlignedFace, AlignError>;

    /// Detect the largest face and align it.
    fn align(&mut self, image: &RgbImage) -> Result<AlignedFace, AlignError> {
        let face = self.largest_face(image)?;
        self.align_box(image, &face)
    }
}

/// [`Aligner`] backed by the SCRFD detector and a similarity-transform warp.
pub struct ScrfdAligner {
    detector: FaceDetector,
    crop_size: usize,
    landmarks: LandmarkSet,
}

impl ScrfdAligner {
    pub fn new(detector: FaceDetector, crop_size: usize, landmarks: LandmarkSet) -> Self {
        Self {
            detector,
            crop_size,
            landmarks,
        }
    }
}

impl Aligner for ScrfdAligner {
    fn largest_face(&mut self, image: &RgbImage) -> Result<BoundingBox, AlignError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(count = faces.len(), "faces detected");
        BoundingBox::largest(&faces)
            .cloned()
            .ok_or(AlignError::NoFaceDetected)
    }

    fn align_box(&self, image: &RgbImage, face: &BoundingBox) -> Result<AlignedFace, AlignError> {
        align_with(image, face, self.crop_size, self.landmarks)
    }
}

/// Align a known face box; shared by every aligner that produces five-point landmarks.
pub fn align_with(
    image: &RgbImage,
    face: &BoundingBox,
    crop_size: usize,
    landmarks: LandmarkSet,
) -> Result<AlignedFace, AlignError> {
    let points = face.landmarks.as_ref().ok_or(AlignError::NoLandmarks)?;
    alignment::align_face(image, points, crop_size, landmarks).ok_or(AlignError::DegenerateLandmarks)
}
