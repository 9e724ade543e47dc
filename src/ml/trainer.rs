// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One call = one epoch over a finite batch stream:
//
//   for each batch
//     mask    = ground_truth < max_disp          (once per batch)
//     outputs = model.forward(left, right)       (one map per stage)
//     loss_s  = w_s · smoothL1(output_s[mask], gt[mask])
//     total   = Σ_s loss_s  →  backward  →  Adam step
//     meter_s ← loss_s / w_s                     (weight-independent)
//
// Burn rebuilds gradients on every backward() call, so nothing
// carries over from one batch to the next.
//
// Batches must already live on the model's device; the batcher
// creates them there.

use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::StereoBatch;
use crate::domain::{config::RunConfig, error::RunError};
use crate::infra::metrics::StageMeters;
use crate::ml::loss::{masked_smooth_l1, should_log, unweighted_loss, valid_pixel_count, validity_mask};
use crate::ml::model::StageModel;

/// What one training epoch produced.
#[derive(Debug, Clone)]
pub struct EpochReport {
    /// Optimizer updates applied (one per batch)
    pub steps:  usize,
    /// Unweighted per-stage losses
    pub losses: StageMeters,
}

pub struct TrainingLoop<'a> {
    config: &'a RunConfig,
}

impl<'a> TrainingLoop<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Train `model` for one epoch and hand it back with the report.
    ///
    /// `num_batches` is only used in log lines. An empty stream is a
    /// completed epoch with zero steps and all-zero averages.
    pub fn run_epoch<B, M, O, I>(
        &self,
        batches:     I,
        num_batches: usize,
        mut model:   M,
        optim:       &mut O,
        epoch:       usize,
    ) -> Result<(M, EpochReport), RunError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + StageModel<B>,
        O: Optimizer<M, B>,
        I: IntoIterator<Item = StereoBatch<B>>,
    {
        let stages  = self.config.stage_count();
        let weights = self.config.stage_weights();
        let mut losses = StageMeters::new(stages);
        let mut steps  = 0usize;

        for (batch_idx, batch) in batches.into_iter().enumerate() {
            let StereoBatch { left, right, disparity } = batch;

            let mask  = validity_mask(disparity.clone(), self.config.max_disp);
            let valid = valid_pixel_count(mask.clone());

            let outputs = model.forward(left, right);
            if outputs.len() != stages {
                return Err(RunError::StageCountMismatch { expected: stages, got: outputs.len() });
            }

            let weighted: Vec<Tensor<B, 1>> = outputs
                .into_iter()
                .zip(weights)
                .map(|(output, &w)| {
                    let prediction = output.squeeze::<3>(1);
                    masked_smooth_l1(prediction, disparity.clone(), mask.clone(), valid).mul_scalar(w)
                })
                .collect();

            let values: Vec<f64> = weighted
                .iter()
                .map(|l| l.clone().into_scalar().elem::<f64>())
                .collect();

            let total = weighted
                .into_iter()
                .reduce(|a, b| a + b)
                .ok_or(RunError::StageCountMismatch { expected: stages, got: 0 })?;

            let grads = GradientsParams::from_grads(total.backward(), &model);
            model = optim.step(self.config.lr, model, grads);
            steps += 1;

            for (stage, (value, &w)) in values.iter().zip(weights).enumerate() {
                losses.update(stage, unweighted_loss(*value, w));
            }

            if should_log(batch_idx, self.config.print_freq) {
                tracing::info!(
                    "Epoch{} [{}/{}] {}",
                    epoch,
                    batch_idx,
                    num_batches,
                    losses.progress_line()
                );
            }
        }

        tracing::info!("Average train loss = {}", losses.summary_line());
        Ok((model, EpochReport { steps, losses }))
    }
}
