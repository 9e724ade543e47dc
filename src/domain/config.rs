// ============================================================
// Layer 3 — Run Configuration
// ============================================================
// One immutable value describing a whole run. It is built once
// from the CLI arguments, validated, and then handed to each
// component by reference. Nothing mutates it afterwards.
//
// Stage count is derived, never stored:
//   3 stages                  → coarse + two refinements
//   3 stages + 1 (with_spn)   → plus the spatial-propagation stage
//
// Every loop in the ML layer iterates 0..stage_count() uniformly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigurationError;

/// Stages every model produces before optional refinement
pub const BASE_STAGES: usize = 3;

/// Checkpoint file name inside `save_path`
pub const CHECKPOINT_FILE: &str = "checkpoint.bin";

/// Evaluation images carry this many extra rows at the top; the
/// evaluation loop crops the same number of rows off each prediction.
pub const EVAL_BORDER_ROWS: usize = 4;

/// Sizes of the generated dataset used when no `datapath` is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub train_samples: usize,
    pub test_samples:  usize,
    pub height:        usize,
    pub width:         usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            train_samples: 48,
            test_samples:  16,
            height:        64,
            width:         128,
        }
    }
}

/// All scalars and lists that fix the behaviour of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Ground-truth disparities at or above this value are invalid
    pub max_disp:          f32,
    /// One weight per stage; extra trailing weights are ignored
    pub loss_weights:      Vec<f64>,
    /// Disparity candidates per resolution level of the reference model
    pub max_disp_list:     Vec<usize>,
    /// Dataset root; `None` selects the synthetic generator
    pub datapath:          Option<PathBuf>,
    pub synthetic:         SyntheticConfig,
    pub epochs:            usize,
    pub train_batch_size:  usize,
    pub test_batch_size:   usize,
    /// Directory holding the checkpoint, the logs and test renderings
    pub save_path:         PathBuf,
    /// Checkpoint name relative to `save_path`
    pub resume:            Option<String>,
    pub lr:                f64,
    pub with_spn:          bool,
    pub print_freq:        usize,
    pub init_channels:     usize,
    pub nblocks:           usize,
    pub spn_init_channels: usize,
    /// Evaluate a trained checkpoint only; requires `resume`
    pub test_only:         bool,
    pub test_stride:       usize,
    pub num_workers:       usize,
    pub seed:              u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_disp:          192.0,
            loss_weights:      vec![0.25, 0.5, 1.0, 1.0],
            max_disp_list:     vec![12, 3, 3],
            datapath:          None,
            synthetic:         SyntheticConfig::default(),
            epochs:            10,
            train_batch_size:  6,
            test_batch_size:   4,
            save_path:         PathBuf::from("results/pretrained_anynet"),
            resume:            None,
            lr:                5e-4,
            with_spn:          false,
            print_freq:        5,
            init_channels:     1,
            nblocks:           2,
            spn_init_channels: 8,
            test_only:         false,
            test_stride:       100,
            num_workers:       4,
            seed:              42,
        }
    }
}

impl RunConfig {
    /// Number of disparity predictions the model emits per forward pass.
    pub fn stage_count(&self) -> usize {
        BASE_STAGES + usize::from(self.with_spn)
    }

    /// Loss weights truncated to the active stages.
    pub fn stage_weights(&self) -> &[f64] {
        let n = self.stage_count().min(self.loss_weights.len());
        &self.loss_weights[..n]
    }

    /// Stride used by the final evaluation: the configured stride in
    /// test-only mode, every batch after training.
    pub fn evaluation_stride(&self) -> usize {
        if self.test_only { self.test_stride } else { 1 }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.save_path.join(CHECKPOINT_FILE)
    }

    pub fn resume_path(&self) -> Option<PathBuf> {
        self.resume.as_ref().map(|name| self.save_path.join(name))
    }

    pub fn testing_dir(&self) -> PathBuf {
        self.save_path.join("Testing")
    }

    pub fn log_file(&self) -> PathBuf {
        let name = if self.test_only { "testing.log" } else { "training.log" };
        self.save_path.join(name)
    }

    /// Reject configurations that would fail before any compute starts.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let stages = self.stage_count();

        if self.loss_weights.len() < stages {
            return Err(ConfigurationError::MissingStageWeights {
                stages,
                weights: self.loss_weights.len(),
            });
        }
        if let Some(w) = self.stage_weights().iter().find(|w| !(**w >= 0.0)) {
            return Err(ConfigurationError::NegativeStageWeight(*w));
        }
        if self.max_disp_list.len() != BASE_STAGES {
            return Err(ConfigurationError::MaxDispList {
                expected: BASE_STAGES,
                got:      self.max_disp_list.len(),
            });
        }
        if !(self.max_disp > 0.0) {
            return Err(ConfigurationError::NonPositiveMaxDisp(self.max_disp));
        }
        if self.train_batch_size == 0 || self.test_batch_size == 0 {
            return Err(ConfigurationError::ZeroBatchSize);
        }
        if self.test_stride == 0 {
            return Err(ConfigurationError::ZeroStride);
        }
        let syn = &self.synthetic;
        if self.datapath.is_none() && (syn.height == 0 || syn.width == 0) {
            return Err(ConfigurationError::EmptySyntheticImage {
                height: syn.height,
                width:  syn.width,
            });
        }
        if self.test_only && self.resume.is_none() {
            return Err(ConfigurationError::ResumeRequired);
        }
        Ok(())
    }

    /// Every field as a `key: value` pair, sorted by key, for the
    /// start-of-run log dump.
    pub fn log_entries(&self) -> Vec<(String, String)> {
        let value = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return Vec::new(),
        };
        let mut entries: Vec<(String, String)> = value
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
