// ============================================================
// Layer 4 — Stereo Dataset
// ============================================================
// In-memory samples exposed through Burn's Dataset trait so the
// DataLoader can shuffle, batch and parallelise over them.
//
// Reference: Burn Book §4 (Datasets)

use burn::data::dataset::Dataset;

/// One rectified stereo pair with its left-view disparity.
///
/// Images are channel-major (C×H×W) and already normalised.
/// `disp_height` equals `height` except for evaluation samples,
/// whose images carry extra rows at the top (see `pad_top`).
#[derive(Debug, Clone)]
pub struct StereoSample {
    pub left:        Vec<f32>,
    pub right:       Vec<f32>,
    pub disparity:   Vec<f32>,
    pub channels:    usize,
    pub height:      usize,
    pub width:       usize,
    pub disp_height: usize,
}

impl StereoSample {
    pub fn new(
        left:      Vec<f32>,
        right:     Vec<f32>,
        disparity: Vec<f32>,
        channels:  usize,
        height:    usize,
        width:     usize,
    ) -> Self {
        debug_assert_eq!(left.len(), channels * height * width);
        debug_assert_eq!(right.len(), left.len());
        debug_assert_eq!(disparity.len(), height * width);
        Self { left, right, disparity, channels, height, width, disp_height: height }
    }

    /// Prepend `rows` zero rows to both images; the disparity map is
    /// left untouched.
    pub fn pad_top(self, rows: usize) -> Self {
        let (channels, height, width) = (self.channels, self.height, self.width);
        let plane = height * width;
        let pad = |image: Vec<f32>| -> Vec<f32> {
            let mut out = Vec::with_capacity(image.len() + channels * rows * width);
            for c in 0..channels {
                out.extend(std::iter::repeat(0.0).take(rows * width));
                out.extend_from_slice(&image[c * plane..(c + 1) * plane]);
            }
            out
        };
        Self {
            left:   pad(self.left),
            right:  pad(self.right),
            height: height + rows,
            ..self
        }
    }

    #[cfg(test)]
    pub fn valid_pixels(&self, max_disp: f32) -> usize {
        self.disparity.iter().filter(|d| **d < max_disp).count()
    }
}

pub struct StereoDataset {
    samples: Vec<StereoSample>,
}

impl StereoDataset {
    pub fn new(samples: Vec<StereoSample>) -> Self { Self { samples } }
}

impl Dataset<StereoSample> for StereoDataset {
    fn get(&self, index: usize) -> Option<StereoSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_top_grows_images_only() {
        // 2 channels, 2×3 image
        let left: Vec<f32> = (1..=12).map(|v| v as f32).collect();
        let sample = StereoSample::new(left.clone(), left, vec![1.0; 6], 2, 2, 3);

        let padded = sample.pad_top(1);
        assert_eq!(padded.height, 3);
        assert_eq!(padded.disp_height, 2);
        assert_eq!(padded.disparity.len(), 6);
        assert_eq!(
            padded.left,
            vec![
                0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0,
                0.0, 0.0, 0.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0,
            ]
        );
    }

    #[test]
    fn dataset_indexes_samples() {
        let s = StereoSample::new(vec![0.0; 3], vec![0.0; 3], vec![f32::INFINITY], 3, 1, 1);
        let ds = StereoDataset::new(vec![s.clone(), s]);
        assert_eq!(ds.len(), 2);
        assert!(ds.get(1).is_some());
        assert!(ds.get(2).is_none());
        assert_eq!(ds.get(0).unwrap().valid_pixels(192.0), 0);
    }
}
