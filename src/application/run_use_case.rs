// ============================================================
// Layer 2 — RunUseCase
// ============================================================
// Sequences one complete run:
//
//   Step 1: Validate config, create output directories
//   Step 2: Log every config field (sorted) to the run log
//   Step 3: Build train / test datasets         (Layer 4 - data)
//   Step 4: Build model + Adam optimizer        (Layer 5 - ml)
//   Step 5: Resume from checkpoint              (Layer 6 - infra)
//   Step 6: Train epochs, saving after each     (Layer 5 + 6)
//   Step 7: Evaluate once on the test split     (Layer 5 - ml)
//   Step 8: Report total wall time
//
// Test-only runs demand an existing checkpoint in Step 1, skip Step 6, apply
// the test stride in Step 7 and render PNG panels to
// <save_path>/Testing.
//
// Reference: Burn Book §5 (Training)
//            Rust Book §10 (Generic Types and Traits)

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::{AutodiffModule, Module},
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use std::{
    fs,
    time::{Duration, Instant},
};

use crate::data::{batcher::StereoBatcher, load_splits};
use crate::domain::{config::RunConfig, error::ConfigurationError, traits::VisualizationSink};
use crate::infra::{
    checkpoint::{CheckpointManager, ResumeMode, ResumePoint},
    metrics::{MetricsLogger, Phase},
    visualizer::PngGridSink,
};
use crate::ml::{
    evaluator::EvaluationLoop,
    model::{AnytimeStereoConfig, AnytimeStereoNet},
    trainer::TrainingLoop,
};

const ADAM_BETA_1: f32 = 0.9;
const ADAM_BETA_2: f32 = 0.999;

// ─── RunSummary ───────────────────────────────────────────────────────────────
/// What a finished run reports back to the caller.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// First epoch index this process trained (the resume point)
    pub first_epoch:    usize,
    pub epochs_trained: usize,
    /// Per-stage average EPE of the final evaluation
    pub final_epe:      Vec<f64>,
    pub elapsed:        Duration,
}

// ─── RunUseCase ───────────────────────────────────────────────────────────────
pub struct RunUseCase {
    config: RunConfig,
}

impl RunUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Run training (unless test-only) and the final evaluation on `device`.
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<RunSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate and prepare directories ─────────────────────────
        cfg.validate()?;
        if let (true, Some(path)) = (cfg.test_only, cfg.resume_path()) {
            if !path.is_file() {
                return Err(ConfigurationError::MissingCheckpoint(path).into());
            }
        }
        fs::create_dir_all(&cfg.save_path)
            .with_context(|| format!("Cannot create '{}'", cfg.save_path.display()))?;
        if cfg.test_only {
            tracing::info!("=== Testing ===");
        }

        // ── Step 2: Configuration dump ───────────────────────────────────────
        for (key, value) in cfg.log_entries() {
            tracing::info!("{}: {}", key, value);
        }

        // ── Step 3: Datasets ─────────────────────────────────────────────────
        let (train_set, test_set) = load_splits(cfg)?;

        // ── Step 4: Model and optimizer ──────────────────────────────────────
        let model: AnytimeStereoNet<B> = model_config(cfg).init(&device);
        let optim = AdamConfig::new()
            .with_beta_1(ADAM_BETA_1)
            .with_beta_2(ADAM_BETA_2)
            .init::<B, AnytimeStereoNet<B>>();
        tracing::info!("Number of model parameters: {}", model.num_params());

        // ── Step 5: Resume ───────────────────────────────────────────────────
        let mode = if cfg.test_only { ResumeMode::Test } else { ResumeMode::Train };
        let checkpoints = CheckpointManager::new();
        let resume_path = cfg.resume_path();
        let (mut model, mut optim, point) =
            checkpoints.resume::<B, _, _>(resume_path.as_deref(), mode, model, optim, &device)?;

        let metrics = MetricsLogger::new(&cfg.save_path)?;
        let start   = Instant::now();

        let first_epoch = point.next_epoch();
        let mut last_epoch = match point {
            ResumePoint::Resumed { epoch } => epoch,
            ResumePoint::Scratch           => 0,
        };
        let mut epochs_trained = 0usize;

        // ── Step 6: Training epochs ──────────────────────────────────────────
        if !cfg.test_only {
            let loader = DataLoaderBuilder::new(StereoBatcher::<B>::new(device.clone()))
                .batch_size(cfg.train_batch_size)
                .shuffle(cfg.seed)
                .num_workers(cfg.num_workers.max(1))
                .build(train_set);
            let num_batches = loader.num_items().div_ceil(cfg.train_batch_size);
            let trainer = TrainingLoop::new(cfg);

            for epoch in first_epoch..cfg.epochs {
                tracing::info!("This is {}-th epoch", epoch);

                let (trained, report) =
                    trainer.run_epoch(loader.iter(), num_batches, model, &mut optim, epoch)?;
                model = trained;

                checkpoints.save::<B, _, _>(&cfg.checkpoint_path(), epoch, &model, &optim)?;
                metrics.log(epoch, Phase::Train, &report.losses)?;

                last_epoch = epoch;
                epochs_trained += 1;
            }
        }

        // ── Step 7: Evaluation (inner backend, no autodiff) ──────────────────
        let model_valid = model.valid();
        let test_loader = DataLoaderBuilder::new(StereoBatcher::<B::InnerBackend>::new(device))
            .batch_size(cfg.test_batch_size)
            .build(test_set);
        let num_test_batches = test_loader.num_items().div_ceil(cfg.test_batch_size);

        let mut sink = if cfg.test_only {
            Some(PngGridSink::new(cfg.testing_dir())?)
        } else {
            None
        };
        let report = EvaluationLoop::new(cfg).run(
            test_loader.iter(),
            num_test_batches,
            &model_valid,
            cfg.evaluation_stride(),
            sink.as_mut().map(|s| s as &mut dyn VisualizationSink),
        )?;
        metrics.log(last_epoch, Phase::Test, &report.epe)?;
        if let Some(sink) = &sink {
            tracing::info!("Wrote {} test renders to '{}'", sink.written(), cfg.testing_dir().display());
        }
        tracing::debug!("Metrics appended to '{}'", metrics.csv_path().display());

        // ── Step 8: Timing ───────────────────────────────────────────────────
        let elapsed = start.elapsed();
        tracing::info!("full training time = {:.2} Hours", elapsed.as_secs_f64() / 3600.0);

        Ok(RunSummary {
            first_epoch,
            epochs_trained,
            final_epe: report.epe.averages(),
            elapsed,
        })
    }
}

fn model_config(cfg: &RunConfig) -> AnytimeStereoConfig {
    AnytimeStereoConfig::new(cfg.max_disp_list.clone())
        .with_init_channels(cfg.init_channels)
        .with_nblocks(cfg.nblocks)
        .with_with_spn(cfg.with_spn)
        .with_spn_init_channels(cfg.spn_init_channels)
}
