// ============================================================
// Layer 5 — Masked Losses and Metrics
// ============================================================
// Pixels whose ground-truth disparity is >= max_disp are invalid.
// One mask is built per batch and reused for every stage, for the
// training loss and for the evaluation EPE alike.
//
// Masking is done by zeroing the residual at invalid pixels
// (mask_fill) and dividing by the number of valid pixels, which
// is the mean over the selected pixels. Invalid ground truth may
// be +inf; filling replaces it before any arithmetic reaches the
// loss, so neither the value nor the gradient becomes NaN.
//
// Smooth L1 with β = 1 (Huber):
//   |d| <  β  →  0.5·d²/β
//   |d| >= β  →  |d| − 0.5·β
// Written branch-free as  q = min(|d|, β);  0.5·q²/β + (|d| − q)

use burn::prelude::*;

pub const SMOOTH_L1_BETA: f64 = 1.0;

/// True where `ground_truth < max_disp`.
pub fn validity_mask<B: Backend>(ground_truth: Tensor<B, 3>, max_disp: f32) -> Tensor<B, 3, Bool> {
    ground_truth.lower_elem(max_disp)
}

pub fn valid_pixel_count<B: Backend>(mask: Tensor<B, 3, Bool>) -> usize {
    let count: i64 = mask.int().sum().into_scalar().elem();
    count.max(0) as usize
}

/// Mean smooth-L1 over the `valid` selected pixels, as a 1-element tensor.
/// With no valid pixels the result is 0, not NaN.
pub fn masked_smooth_l1<B: Backend>(
    prediction:   Tensor<B, 3>,
    ground_truth: Tensor<B, 3>,
    mask:         Tensor<B, 3, Bool>,
    valid:        usize,
) -> Tensor<B, 1> {
    let diff = (prediction - ground_truth).mask_fill(mask.bool_not(), 0.0);
    let abs  = diff.abs();
    let quadratic = abs.clone().clamp_max(SMOOTH_L1_BETA);
    let linear    = abs - quadratic.clone();

    let elementwise = quadratic.powf_scalar(2.0).mul_scalar(0.5 / SMOOTH_L1_BETA) + linear;
    elementwise.sum().div_scalar(valid.max(1) as f64)
}

/// End-point error: mean |prediction − ground truth| over the valid
/// pixels. Returns exactly 0.0 when the mask selects nothing.
pub fn masked_epe<B: Backend>(
    prediction:   Tensor<B, 3>,
    ground_truth: Tensor<B, 3>,
    mask:         Tensor<B, 3, Bool>,
    valid:        usize,
) -> f64 {
    if valid == 0 {
        return 0.0;
    }
    let total: f64 = (prediction - ground_truth)
        .mask_fill(mask.bool_not(), 0.0)
        .abs()
        .sum()
        .into_scalar()
        .elem();
    total / valid as f64
}

/// Undo the stage weighting for logging. A zero weight records 0.
pub fn unweighted_loss(weighted: f64, weight: f64) -> f64 {
    if weight == 0.0 { 0.0 } else { weighted / weight }
}

/// Drop the first `rows` rows of a [B, H, W] map.
pub fn crop_top<B: Backend>(map: Tensor<B, 3>, rows: usize) -> Tensor<B, 3> {
    let [b, h, w] = map.dims();
    map.slice([0..b, rows..h, 0..w])
}

/// Drop the first `rows` rows of a [B, C, H, W] image batch.
pub fn crop_top_images<B: Backend>(images: Tensor<B, 4>, rows: usize) -> Tensor<B, 4> {
    let [b, c, h, w] = images.dims();
    images.slice([0..b, 0..c, rows..h, 0..w])
}

/// Per-batch log cadence: every batch whose index is NOT a multiple
/// of `freq` is logged (batch 0 never is). `freq == 0` disables it.
pub fn should_log(batch_idx: usize, freq: usize) -> bool {
    freq != 0 && batch_idx % freq != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{InferBackend, TestDevice};

    fn map(values: &[f32], shape: [usize; 3]) -> Tensor<InferBackend, 3> {
        Tensor::from_data(TensorData::new(values.to_vec(), shape), &TestDevice::default())
    }

    #[test]
    fn mask_is_strictly_below_max_disp() {
        let gt   = map(&[0.0, 191.9, 192.0, 500.0, f32::INFINITY, 3.0], [1, 2, 3]);
        let mask = validity_mask(gt.clone(), 192.0);

        assert_eq!(mask.dims(), gt.dims());
        let flags = mask.into_data().to_vec::<bool>().unwrap();
        assert_eq!(flags, vec![true, true, false, false, false, true]);
    }

    #[test]
    fn smooth_l1_uses_only_valid_pixels() {
        // residuals: 0.5 (quadratic), 3.0 (linear), masked pixel ignored
        let pred = map(&[1.5, 5.0, 0.0], [1, 1, 3]);
        let gt   = map(&[1.0, 2.0, 999.0], [1, 1, 3]);
        let mask = validity_mask(gt.clone(), 192.0);
        let valid = valid_pixel_count(mask.clone());
        assert_eq!(valid, 2);

        let loss: f64 = masked_smooth_l1(pred, gt, mask, valid).into_scalar().elem();
        let expected = (0.5 * 0.5 * 0.5 + (3.0 - 0.5)) / 2.0;
        assert!((loss - expected).abs() < 1e-6, "loss = {loss}");
    }

    #[test]
    fn smooth_l1_with_empty_mask_is_zero() {
        let pred = map(&[1.0, 2.0], [1, 1, 2]);
        let gt   = map(&[f32::INFINITY, 500.0], [1, 1, 2]);
        let mask = validity_mask(gt.clone(), 192.0);

        let loss: f64 = masked_smooth_l1(pred, gt, mask, 0).into_scalar().elem();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn epe_is_mean_absolute_error_over_mask() {
        let pred = map(&[1.0, 4.0, 10.0, 0.0], [1, 2, 2]);
        let gt   = map(&[2.0, 2.0, 300.0, 1.0], [1, 2, 2]);
        let mask = validity_mask(gt.clone(), 192.0);
        let valid = valid_pixel_count(mask.clone());

        let epe = masked_epe(pred, gt, mask, valid);
        assert!((epe - (1.0 + 2.0 + 1.0) / 3.0).abs() < 1e-6);
    }

    #[test]
    fn epe_with_empty_mask_is_exactly_zero() {
        let pred = map(&[1.0, 4.0], [1, 1, 2]);
        let gt   = map(&[192.0, 193.0], [1, 1, 2]);
        let mask = validity_mask(gt.clone(), 192.0);

        assert_eq!(masked_epe(pred, gt, mask.clone(), valid_pixel_count(mask)), 0.0);
    }

    #[test]
    fn zero_weight_records_zero() {
        assert_eq!(unweighted_loss(0.0, 0.0), 0.0);
        assert_eq!(unweighted_loss(0.5, 0.25), 2.0);
    }

    #[test]
    fn crop_removes_top_rows_only() {
        let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let cropped = crop_top(map(&values, [1, 6, 2]), 4);
        assert_eq!(cropped.dims(), [1, 2, 2]);
        assert_eq!(cropped.into_data().to_vec::<f32>().unwrap(), vec![8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn first_batch_is_never_logged() {
        let logged: Vec<usize> = (0..11).filter(|&i| should_log(i, 5)).collect();
        assert_eq!(logged, vec![1, 2, 3, 4, 6, 7, 8, 9]);
        assert!(!(0..10).any(|i| should_log(i, 0)));
    }
}
