// ============================================================
// Layer 4 — Image Preprocessor
// ============================================================
// Turns decoded images into the float layout the model expects.
//
//   RGB u8  (H×W×3)  →  f32 in [0, 1], channel-major (3×H×W)
//                    →  (x − mean_c) / std_c   (ImageNet statistics)
//
//   disparity u16    →  value / 256   (KITTI-style encoding)
//                       0 means "no measurement" → +∞, which the
//                       validity mask always rejects
//
// Reference: Rust Book §8 (Vectors), image crate documentation

use image::{ImageBuffer, Luma, RgbImage};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed-point scale of 16-bit disparity PNGs
pub const DISPARITY_SCALE: f32 = 256.0;

pub struct Preprocessor {
    mean: [f32; 3],
    std:  [f32; 3],
}

impl Preprocessor {
    pub fn new() -> Self {
        Self { mean: IMAGENET_MEAN, std: IMAGENET_STD }
    }

    /// Normalise a channel-major [0, 1] image in place.
    pub fn normalize_chw(&self, mut data: Vec<f32>, height: usize, width: usize) -> Vec<f32> {
        let plane = height * width;
        for (c, channel) in data.chunks_mut(plane).enumerate() {
            let (m, s) = (self.mean[c % 3], self.std[c % 3]);
            for v in channel {
                *v = (*v - m) / s;
            }
        }
        data
    }

    /// Decode an RGB image into a normalised channel-major buffer.
    pub fn rgb(&self, image: &RgbImage) -> Vec<f32> {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let plane  = w * h;
        let mut chw = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in image.enumerate_pixels() {
            let idx = y as usize * w + x as usize;
            for c in 0..3 {
                chw[c * plane + idx] = pixel[c] as f32 / 255.0;
            }
        }
        self.normalize_chw(chw, h, w)
    }

    /// Decode a 16-bit disparity image; zero pixels become +∞.
    pub fn disparity(&self, image: &ImageBuffer<Luma<u16>, Vec<u16>>) -> Vec<f32> {
        image
            .pixels()
            .map(|p| match p[0] {
                0 => f32::INFINITY,
                v => v as f32 / DISPARITY_SCALE,
            })
            .collect()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
