//! Backends, a fixed-output model and batch builders for unit tests.

use burn::{
    backend::{ndarray::NdArrayDevice, Autodiff, NdArray},
    module::{AutodiffModule, Param},
    optim::{adaptor::OptimizerAdaptor, Adam, AdamConfig},
    prelude::*,
};

use crate::data::batcher::StereoBatch;
use crate::ml::model::StageModel;

pub type InferBackend = NdArray<f32>;
pub type TestBackend  = Autodiff<InferBackend>;
pub type TestDevice   = NdArrayDevice;

pub fn adam<M: AutodiffModule<TestBackend>>() -> OptimizerAdaptor<Adam, M, TestBackend> {
    AdamConfig::new().init::<TestBackend, M>()
}

/// Predicts a spatially constant disparity per stage; the constants
/// are trainable.
#[derive(Module, Debug)]
pub struct ConstantStages<B: Backend> {
    pub values: Param<Tensor<B, 1>>,
}

impl<B: Backend> ConstantStages<B> {
    pub fn new(values: &[f32], device: &B::Device) -> Self {
        let tensor = Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), device);
        Self { values: Param::from_tensor(tensor) }
    }
}

impl<B: Backend> StageModel<B> for ConstantStages<B> {
    fn forward(&self, left: Tensor<B, 4>, _right: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let [b, _, h, w] = left.dims();
        let device = left.device();
        let [stages] = self.values.val().dims();

        (0..stages)
            .map(|s| {
                let value = self.values.val().slice([s..s + 1]).reshape([1, 1, 1, 1]);
                Tensor::<B, 4>::ones([b, 1, h, w], &device) * value
            })
            .collect()
    }
}

/// Batch of `size` items: images are `height + pad_rows` tall, ground
/// truth is `height` tall and filled with `disparity`.
pub fn batch<B: Backend>(
    size:      usize,
    height:    usize,
    width:     usize,
    pad_rows:  usize,
    disparity: f32,
    device:    &B::Device,
) -> StereoBatch<B> {
    let image = [size, 3, height + pad_rows, width];
    StereoBatch {
        left:      Tensor::ones(image, device),
        right:     Tensor::zeros(image, device),
        disparity: Tensor::full([size, height, width], disparity, device),
    }
}
