// ============================================================
// Layer 6 — PNG Grid Visualizer
// ============================================================
// Renders each evaluated batch item as one 2×2 PNG panel:
//
//   ┌──────────────┬──────────────┐
//   │  left (ref)  │ ground truth │
//   ├──────────────┼──────────────┤
//   │ right (test) │  prediction  │
//   └──────────────┴──────────────┘
//
// Images are min/max stretched per item. Disparities share one
// scale taken from the finite ground-truth values:
//   v = (d − gt_min) / gt_max, clipped to [0, 1]
// Invalid ground-truth pixels (+∞) render black.
//
// Files are named <batch>_<item:02>.png.
//
// Reference: image crate documentation (ImageBuffer, save)

use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use std::path::PathBuf;

use crate::domain::traits::{VisualizationRequest, VisualizationSink};

pub struct PngGridSink {
    dir: PathBuf,
    written: usize,
}

impl PngGridSink {
    /// The directory is created if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl VisualizationSink for PngGridSink {
    fn submit(&mut self, request: VisualizationRequest) -> Result<()> {
        let items = request.left.batch_len();
        let (channels, height, width) = match request.left.shape.as_slice() {
            [_, c, h, w] => (*c, *h, *w),
            other => bail!("expected [B, C, H, W] images, got {:?}", other),
        };
        if request.prediction.shape != [items, height, width]
            || request.ground_truth.shape != request.prediction.shape
        {
            bail!(
                "disparity shapes {:?}/{:?} do not match images {:?}",
                request.ground_truth.shape,
                request.prediction.shape,
                request.left.shape
            );
        }

        for i in 0..items {
            let panel = compose_panel(
                request.left.item(i),
                request.right.item(i),
                request.ground_truth.item(i),
                request.prediction.item(i),
                channels,
                height,
                width,
            );
            let path = self.dir.join(format!("{}_{:02}.png", request.batch_index, i));
            panel
                .save(&path)
                .with_context(|| format!("Cannot write '{}'", path.display()))?;
            self.written += 1;
        }
        Ok(())
    }
}

/// Build the 2×2 panel for one batch item.
pub fn compose_panel(
    left:         &[f32],
    right:        &[f32],
    ground_truth: &[f32],
    prediction:   &[f32],
    channels:     usize,
    height:       usize,
    width:        usize,
) -> RgbImage {
    let (w, h) = (width as u32, height as u32);
    let mut panel = RgbImage::new(2 * w, 2 * h);

    let (lo, hi) = finite_range(ground_truth);
    let scale = |d: f32| -> u8 {
        if !d.is_finite() || hi <= 0.0 {
            return 0;
        }
        to_u8(((d - lo) / hi).clamp(0.0, 1.0))
    };

    let left  = stretch(left);
    let right = stretch(right);
    let plane = height * width;

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let (px, py) = (x as u32, y as u32);

            panel.put_pixel(px, py, rgb_at(&left, channels, plane, idx));
            panel.put_pixel(px, py + h, rgb_at(&right, channels, plane, idx));

            let g = scale(ground_truth[idx]);
            panel.put_pixel(px + w, py, Rgb([g, g, g]));
            let p = scale(prediction[idx]);
            panel.put_pixel(px + w, py + h, Rgb([p, p, p]));
        }
    }
    panel
}

fn rgb_at(image: &[u8], channels: usize, plane: usize, idx: usize) -> Rgb<u8> {
    if channels >= 3 {
        Rgb([image[idx], image[plane + idx], image[2 * plane + idx]])
    } else {
        let v = image[idx];
        Rgb([v, v, v])
    }
}

/// Min/max stretch to u8; a constant image maps to black.
fn stretch(values: &[f32]) -> Vec<u8> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = hi - lo;
    values
        .iter()
        .map(|v| if span > 0.0 && v.is_finite() { to_u8((v - lo) / span) } else { 0 })
        .collect()
}

fn finite_range(values: &[f32]) -> (f32, f32) {
    let mut finite = values.iter().copied().filter(|v| v.is_finite()).peekable();
    if finite.peek().is_none() {
        return (0.0, 0.0);
    }
    finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round() as u8
}
