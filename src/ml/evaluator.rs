// ============================================================
// Layer 5 — Evaluation Loop
// ============================================================
// Runs an inference-mode model over a batch stream and reports
// the per-stage End-Point-Error.
//
// Callers pass `model.valid()`: the model then lives on the inner
// (non-autodiff) backend, so no gradient graph is ever recorded.
//
// Stride: only batch indices that are multiples of `stride` are
// evaluated. Skipped batches produce no metric, no rendering and
// no log line.
//
// Alignment: every stage output has OUTPUT_TOP_CROP rows too many
// at the top (evaluation images are padded there). The PREDICTION
// is cropped; ground truth and mask are used as-is. The cropped
// prediction then shares the ground truth's [B, H, W] frame.

use burn::prelude::*;

use crate::data::batcher::StereoBatch;
use crate::domain::{
    config::{RunConfig, EVAL_BORDER_ROWS},
    error::RunError,
    traits::{HostArray, VisualizationRequest, VisualizationSink},
};
use crate::infra::metrics::StageMeters;
use crate::ml::loss::{crop_top, crop_top_images, masked_epe, valid_pixel_count, validity_mask};
use crate::ml::model::StageModel;

/// Rows removed from the top of every evaluated prediction.
pub const OUTPUT_TOP_CROP: usize = EVAL_BORDER_ROWS;

#[derive(Debug, Clone)]
pub struct EvalReport {
    /// Batches that passed the stride filter
    pub evaluated_batches: usize,
    pub epe:               StageMeters,
}

pub struct EvaluationLoop<'a> {
    config: &'a RunConfig,
}

impl<'a> EvaluationLoop<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    pub fn run<B, M, I>(
        &self,
        batches:     I,
        num_batches: usize,
        model:       &M,
        stride:      usize,
        mut sink:    Option<&mut dyn VisualizationSink>,
    ) -> Result<EvalReport, RunError>
    where
        B: Backend,
        M: StageModel<B>,
        I: IntoIterator<Item = StereoBatch<B>>,
    {
        let stages = self.config.stage_count();
        let stride = stride.max(1);
        let mut epe = StageMeters::new(stages);
        let mut evaluated_batches = 0usize;

        for (batch_idx, batch) in batches.into_iter().enumerate() {
            if batch_idx % stride != 0 {
                continue;
            }
            evaluated_batches += 1;

            let StereoBatch { left, right, disparity } = batch;
            let mask  = validity_mask(disparity.clone(), self.config.max_disp);
            let valid = valid_pixel_count(mask.clone());

            let outputs = model.forward(left.clone(), right.clone());
            if outputs.len() != stages {
                return Err(RunError::StageCountMismatch { expected: stages, got: outputs.len() });
            }

            let mut last_prediction = None;
            for (stage, output) in outputs.into_iter().enumerate() {
                // Crop the prediction only; ground truth and mask keep their frame.
                let prediction = crop_output(output.squeeze::<3>(1), stage)?;
                if prediction.dims() != disparity.dims() {
                    return Err(RunError::ShapeMismatch {
                        stage,
                        prediction:   prediction.dims().to_vec(),
                        ground_truth: disparity.dims().to_vec(),
                    });
                }

                let value = if valid == 0 {
                    0.0
                } else {
                    masked_epe(prediction.clone(), disparity.clone(), mask.clone(), valid)
                };
                epe.update(stage, value);
                last_prediction = Some(prediction);
            }

            if let (Some(sink), Some(prediction)) = (sink.as_deref_mut(), last_prediction) {
                let request = VisualizationRequest {
                    batch_index:  batch_idx,
                    left:         to_host(crop_top_images(left, OUTPUT_TOP_CROP), batch_idx)?,
                    right:        to_host(crop_top_images(right, OUTPUT_TOP_CROP), batch_idx)?,
                    ground_truth: to_host(disparity, batch_idx)?,
                    prediction:   to_host(prediction, batch_idx)?,
                };
                sink.submit(request).map_err(|e| RunError::Visualization {
                    batch:   batch_idx,
                    message: format!("{e:#}"),
                })?;
            }

            tracing::info!("[T {}/{}] {}", batch_idx, num_batches, epe.progress_line());
        }

        tracing::info!("Average test EPE = {}", epe.compact_summary_line());
        Ok(EvalReport { evaluated_batches, epe })
    }
}

fn crop_output<B: Backend>(prediction: Tensor<B, 3>, stage: usize) -> Result<Tensor<B, 3>, RunError> {
    let [_, height, _] = prediction.dims();
    if height <= OUTPUT_TOP_CROP {
        tracing::debug!("stage {} output too short to crop", stage);
        return Err(RunError::CropTooLarge { height, crop: OUTPUT_TOP_CROP });
    }
    Ok(crop_top(prediction, OUTPUT_TOP_CROP))
}

fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>, batch: usize) -> Result<HostArray, RunError> {
    let shape  = tensor.dims().to_vec();
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| RunError::Visualization {
            batch,
            message: format!("cannot copy tensor to host: {e:?}"),
        })?;
    host_array(shape, values, batch)
}

fn host_array(shape: Vec<usize>, values: Vec<f32>, batch: usize) -> Result<HostArray, RunError> {
    let message = format!("{} values do not fill shape {:?}", values.len(), shape);
    HostArray::new(shape, values).ok_or(RunError::Visualization { batch, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use crate::ml::test_support::{batch, ConstantStages, InferBackend, TestDevice};

    #[derive(Default)]
    struct RecordingSink {
        requests: Vec<VisualizationRequest>,
    }

    impl VisualizationSink for RecordingSink {
        fn submit(&mut self, request: VisualizationRequest) -> Result<()> {
            self.requests.push(request);
            Ok(())
        }
    }

    fn eval_batches(n: usize, gt: f32, device: &TestDevice) -> Vec<StereoBatch<InferBackend>> {
        (0..n)
            .map(|_| batch::<InferBackend>(2, 5, 6, OUTPUT_TOP_CROP, gt, device))
            .collect()
    }

    #[test]
    fn stride_selects_multiples_only() {
        let device = TestDevice::default();
        let cfg    = RunConfig::default();
        let model  = ConstantStages::<InferBackend>::new(&[1.0, 2.0, 3.0], &device);

        let report = EvaluationLoop::new(&cfg)
            .run(eval_batches(10, 5.0, &device), 10, &model, 3, None)
            .unwrap();

        // batches 0, 3, 6, 9
        assert_eq!(report.evaluated_batches, 4);
        for stage in 0..3 {
            assert_eq!(report.epe.stage(stage).count, 4.0);
        }
    }

    #[test]
    fn epe_per_stage_matches_constant_offsets() {
        let device = TestDevice::default();
        let cfg    = RunConfig::default();
        let model  = ConstantStages::<InferBackend>::new(&[1.0, 2.0, 8.0], &device);

        let report = EvaluationLoop::new(&cfg)
            .run(eval_batches(2, 5.0, &device), 2, &model, 1, None)
            .unwrap();

        let epe = report.epe.averages();
        assert!((epe[0] - 4.0).abs() < 1e-6);
        assert!((epe[1] - 3.0).abs() < 1e-6);
        assert!((epe[2] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn empty_mask_records_exact_zero() {
        let device = TestDevice::default();
        let cfg    = RunConfig::default();
        let model  = ConstantStages::<InferBackend>::new(&[1.0, 2.0, 3.0], &device);

        let report = EvaluationLoop::new(&cfg)
            .run(eval_batches(1, cfg.max_disp, &device), 1, &model, 1, None)
            .unwrap();

        for stage in 0..3 {
            let meter = report.epe.stage(stage);
            assert_eq!(meter.count, 1.0);
            assert_eq!(meter.val, 0.0);
            assert!(!meter.avg.is_nan());
        }
    }

    #[test]
    fn sink_receives_cropped_aligned_arrays() {
        let device = TestDevice::default();
        let cfg    = RunConfig::default();
        let model  = ConstantStages::<InferBackend>::new(&[1.0, 2.0, 3.0], &device);
        let mut sink = RecordingSink::default();

        EvaluationLoop::new(&cfg)
            .run(eval_batches(5, 5.0, &device), 5, &model, 2, Some(&mut sink))
            .unwrap();

        let indices: Vec<usize> = sink.requests.iter().map(|r| r.batch_index).collect();
        assert_eq!(indices, vec![0, 2, 4]);

        let r = &sink.requests[0];
        assert_eq!(r.left.shape, vec![2, 3, 5, 6]);
        assert_eq!(r.right.shape, vec![2, 3, 5, 6]);
        assert_eq!(r.ground_truth.shape, vec![2, 5, 6]);
        assert_eq!(r.prediction.shape, vec![2, 5, 6]);
        // the final stage's prediction is rendered
        assert!(r.prediction.values.iter().all(|v| (*v - 3.0).abs() < 1e-6));
    }

    #[test]
    fn uncropped_ground_truth_frame_is_required() {
        let device = TestDevice::default();
        let cfg    = RunConfig::default();
        let model  = ConstantStages::<InferBackend>::new(&[1.0, 2.0, 3.0], &device);

        // images without the top padding: cropped prediction is 4 rows short
        let batches = vec![batch::<InferBackend>(1, 8, 6, 0, 5.0, &device)];
        let err = EvaluationLoop::new(&cfg)
            .run(batches, 1, &model, 1, None)
            .unwrap_err();
        assert!(matches!(err, RunError::ShapeMismatch { stage: 0, .. }));
    }

    #[test]
    fn host_copies_keep_shape_and_values() {
        let device = TestDevice::default();
        let tensor = Tensor::<InferBackend, 3>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 2, 3]),
            &device,
        );
        let host = to_host(tensor, 0).unwrap();
        assert_eq!(host.shape, vec![1, 2, 3]);
        assert_eq!(host.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn short_host_buffer_is_a_visualization_error() {
        let err = host_array(vec![2, 2], vec![0.0; 3], 7).unwrap_err();
        assert!(matches!(err, RunError::Visualization { batch: 7, .. }));
    }
}
