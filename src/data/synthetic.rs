// ============================================================
// Layer 4 — Synthetic Stereo Pairs
// ============================================================
// Random-dot stereograms with known disparity, used when no
// dataset directory is configured (and by the tests).
//
//   right(y, x)  = random colour dots
//   d(y, x)      = background plane with a vertical gradient,
//                  plus one fronto-parallel foreground rectangle
//   left(y, x)   = right(y, x − d)      when x − d >= 0
//                  fresh noise          otherwise (no match → d = +∞)
//
// Every sample is generated from `seed + index`, so a split is
// reproducible and independent of how many samples are drawn.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::{dataset::StereoSample, preprocessor::Preprocessor};

pub struct SyntheticStereo {
    height:   usize,
    width:    usize,
    max_disp: usize,
}

impl SyntheticStereo {
    /// `max_disp` bounds the generated disparities; it is further
    /// capped at a quarter of the width so most pixels stay matchable.
    pub fn new(height: usize, width: usize, max_disp: f32) -> Self {
        let cap = (width / 4).max(2);
        let max_disp = (max_disp.max(2.0) as usize - 1).min(cap).max(2);
        Self { height, width, max_disp }
    }

    pub fn generate(&self, count: usize, seed: u64) -> Vec<StereoSample> {
        (0..count)
            .map(|i| self.sample(&mut StdRng::seed_from_u64(seed.wrapping_add(i as u64))))
            .collect()
    }

    fn sample(&self, rng: &mut StdRng) -> StereoSample {
        let (h, w) = (self.height, self.width);
        let plane  = h * w;

        let right: Vec<f32> = (0..3 * plane).map(|_| rng.gen::<f32>()).collect();
        let disparity = self.disparity_field(rng);

        let mut left = vec![0.0f32; 3 * plane];
        let mut gt   = vec![f32::INFINITY; plane];
        for y in 0..h {
            for x in 0..w {
                let idx = y * w + x;
                let d   = disparity[idx];
                if x >= d {
                    for c in 0..3 {
                        left[c * plane + idx] = right[c * plane + idx - d];
                    }
                    gt[idx] = d as f32;
                } else {
                    for c in 0..3 {
                        left[c * plane + idx] = rng.gen::<f32>();
                    }
                }
            }
        }

        let prep = Preprocessor::new();
        StereoSample::new(
            prep.normalize_chw(left, h, w),
            prep.normalize_chw(right, h, w),
            gt,
            3,
            h,
            w,
        )
    }

    fn disparity_field(&self, rng: &mut StdRng) -> Vec<usize> {
        let (h, w) = (self.height, self.width);
        let half   = (self.max_disp / 2).max(1);

        let base  = rng.gen_range(1..=half);
        let slope = rng.gen_range(0..=half.saturating_sub(base));
        let fg    = rng.gen_range(half..=self.max_disp);

        let (rh, rw) = ((h / 3).max(1), (w / 3).max(1));
        let top  = rng.gen_range(0..=h - rh);
        let left = rng.gen_range(0..=w - rw);

        let mut field = Vec::with_capacity(h * w);
        for y in 0..h {
            for x in 0..w {
                let inside = (top..top + rh).contains(&y) && (left..left + rw).contains(&x);
                field.push(if inside { fg } else { base + slope * y / h.max(1) });
            }
        }
        field
    }
}
