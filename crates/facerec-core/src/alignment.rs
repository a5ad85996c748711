//! Landmark-based face alignment.
//!
//! A subset of the five detector landmarks is mapped onto a reference
//! template by the least-squares similarity (uniform scale, rotation,
//! translation), and the image is resampled through that map into a square
//! crop.

use crate::types::{AlignedFace, LandmarkSet};
use image::RgbImage;

/// Landmark template for a 112×112 crop: eyes, nose tip, mouth corners.
const TEMPLATE_112: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];
const TEMPLATE_SIZE: f32 = 112.0;

/// Source points closer together than this (summed squared spread) cannot
/// fix a scale.
const MIN_SPREAD: f32 = 1e-6;

/// The template scaled to an `out_size`×`out_size` crop.
pub fn reference_landmarks(out_size: usize) -> [(f32, f32); 5] {
    let k = out_size as f32 / TEMPLATE_SIZE;
    TEMPLATE_112.map(|(x, y)| (x * k, y * k))
}

/// `p ↦ [[a, -b], [b, a]] · p + (tx, ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    pub const IDENTITY: Similarity = Similarity {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Least-squares fit taking `src` onto `dst`.
    ///
    /// Centering both point sets decouples the translation, leaving a closed
    /// form for `a` and `b`. `None` with fewer than two pairs, mismatched
    /// lengths, or source points that all coincide.
    pub fn estimate(src: &[(f32, f32)], dst: &[(f32, f32)]) -> Option<Self> {
        if src.len() != dst.len() || src.len() < 2 {
            return None;
        }
        let (sx, sy) = centroid(src);
        let (dx, dy) = centroid(dst);

        let (mut dot, mut cross, mut spread) = (0.0f32, 0.0f32, 0.0f32);
        for (&(px, py), &(qx, qy)) in src.iter().zip(dst) {
            let (px, py, qx, qy) = (px - sx, py - sy, qx - dx, qy - dy);
            dot += px * qx + py * qy;
            cross += px * qy - py * qx;
            spread += px * px + py * py;
        }
        if spread < MIN_SPREAD {
            return None;
        }

        let (a, b) = (dot / spread, cross / spread);
        Some(Self {
            a,
            b,
            tx: dx - (a * sx - b * sy),
            ty: dy - (b * sx + a * sy),
        })
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// Inverse map, or `None` for a zero scale.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < f32::EPSILON {
            return None;
        }
        let (a, b) = (self.a / det, -self.b / det);
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

fn centroid(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len() as f32;
    let (x, y) = points.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0, y + p.1));
    (x / n, y / n)
}

/// Resample `image` into a packed RGB `out_size`² crop where output pixel `p`
/// takes the bilinear source value at `to_source(p)`. Outside the image is black.
fn warp(image: &RgbImage, to_source: &Similarity, out_size: usize) -> Vec<u8> {
    let texel = |x: i64, y: i64| -> [f32; 3] {
        if x < 0 || y < 0 {
            return [0.0; 3];
        }
        image
            .get_pixel_checked(x as u32, y as u32)
            .map(|p| p.0.map(f32::from))
            .unwrap_or([0.0; 3])
    };

    let mut out = Vec::with_capacity(out_size * out_size * 3);
    for oy in 0..out_size {
        for ox in 0..out_size {
            let (sx, sy) = to_source.apply((ox as f32, oy as f32));
            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as i64, y0 as i64);

            let taps = [
                (texel(x0, y0), (1.0 - fx) * (1.0 - fy)),
                (texel(x0 + 1, y0), fx * (1.0 - fy)),
                (texel(x0, y0 + 1), (1.0 - fx) * fy),
                (texel(x0 + 1, y0 + 1), fx * fy),
            ];
            for c in 0..3 {
                let v: f32 = taps.iter().map(|(t, w)| t[c] * w).sum();
                out.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }
    out
}

/// Align a face given its five detector landmarks.
///
/// Only the landmarks in `set` drive the fit. `None` when they are degenerate.
pub fn align_face(
    image: &RgbImage,
    landmarks: &[(f32, f32); 5],
    out_size: usize,
    set: LandmarkSet,
) -> Option<AlignedFace> {
    let template = reference_landmarks(out_size);
    let (src, dst): (Vec<_>, Vec<_>) = set.indices().iter().map(|&i| (landmarks[i], template[i])).unzip();

    let to_crop = Similarity::estimate(&src, &dst)?;
    let to_source = to_crop.inverse()?;
    Some(AlignedFace {
        data: warp(image, &to_source, out_size),
        size: out_size,
    })
}
