// ============================================================
// Layer 4 — Stereo Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks a Vec<StereoSample>
// into device tensors.
//
//   left, right : [batch, channels, height, width]
//   disparity   : [batch, disp_height, width]
//
// All samples in one batch share their dimensions; the loaders
// guarantee this (fixed-size synthetic pairs, same-size files).
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::StereoSample;

/// A batch of stereo pairs on the compute device.
#[derive(Debug, Clone)]
pub struct StereoBatch<B: Backend> {
    pub left:      Tensor<B, 4>,
    pub right:     Tensor<B, 4>,
    pub disparity: Tensor<B, 3>,
}

#[derive(Clone, Debug)]
pub struct StereoBatcher<B: Backend> {
    /// Tensors are created directly on this device
    pub device: B::Device,
}

impl<B: Backend> StereoBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<StereoSample, StereoBatch<B>> for StereoBatcher<B> {
    fn batch(&self, items: Vec<StereoSample>) -> StereoBatch<B> {
        let batch_size = items.len();
        let (c, h, w)  = (items[0].channels, items[0].height, items[0].width);
        let dh         = items[0].disp_height;

        let left: Vec<f32>  = items.iter().flat_map(|s| s.left.iter().copied()).collect();
        let right: Vec<f32> = items.iter().flat_map(|s| s.right.iter().copied()).collect();
        let disp: Vec<f32>  = items.iter().flat_map(|s| s.disparity.iter().copied()).collect();

        StereoBatch {
            left:      Tensor::from_data(TensorData::new(left, [batch_size, c, h, w]), &self.device),
            right:     Tensor::from_data(TensorData::new(right, [batch_size, c, h, w]), &self.device),
            disparity: Tensor::from_data(TensorData::new(disp, [batch_size, dh, w]), &self.device),
        }
    }
}
