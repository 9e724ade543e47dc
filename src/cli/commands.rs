// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Two subcommands share one flattened argument group:
//
//   train  — train (or resume) and evaluate on the full test split
//   test   — load a checkpoint and evaluate every N-th test batch
//
// Flag names and defaults follow the usual AnyNet conventions
// (--maxdisp, --maxdisplist, --train-bsize, ...).
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::domain::config::{RunConfig, SyntheticConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the staged stereo network, then evaluate it
    Train(TrainArgs),

    /// Evaluate a saved checkpoint (requires --resume)
    Test(TestArgs),
}

/// Compute backend the run executes on
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// GPU through wgpu
    Wgpu,
    /// CPU through ndarray
    Ndarray,
}

/// Flags common to both subcommands.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Maximum disparity; pixels at or above it are ignored
    #[arg(long = "maxdisp", default_value_t = 192.0)]
    pub max_disp: f32,

    /// Per-stage loss weights (coarse → fine, then SPN)
    #[arg(long, num_args = 1.., default_values_t = [0.25, 0.5, 1.0, 1.0])]
    pub loss_weights: Vec<f64>,

    /// Disparity candidates per level
    #[arg(long = "maxdisplist", num_args = 1.., default_values_t = [12, 3, 3])]
    pub max_disp_list: Vec<usize>,

    /// Dataset root with training/ and testing/ sub-trees.
    /// Synthetic stereograms are used when omitted.
    #[arg(long)]
    pub datapath: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long = "train-bsize", default_value_t = 6)]
    pub train_bsize: usize,

    #[arg(long = "test-bsize", default_value_t = 4)]
    pub test_bsize: usize,

    /// Directory for checkpoints, logs, metrics and test renders
    #[arg(long, default_value = "results/pretrained_anynet")]
    pub save_path: PathBuf,

    /// Checkpoint file name inside --save-path
    #[arg(long)]
    pub resume: Option<String>,

    #[arg(long, default_value_t = 5e-4)]
    pub lr: f64,

    /// Add the spatial propagation refinement stage
    #[arg(long)]
    pub with_spn: bool,

    /// Log every batch whose index is not a multiple of this (0 = off)
    #[arg(long, default_value_t = 5)]
    pub print_freq: usize,

    /// Feature channels multiplier of the 2D extractor
    #[arg(long, default_value_t = 1)]
    pub init_channels: usize,

    /// Conv blocks in the feature extractor
    #[arg(long, default_value_t = 2)]
    pub nblocks: usize,

    #[arg(long, default_value_t = 8)]
    pub spn_init_channels: usize,

    /// Data-loader worker threads for training
    #[arg(long, default_value_t = 4)]
    pub num_workers: usize,

    /// Seed for shuffling and synthetic data
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,

    /// Synthetic training pairs (without --datapath)
    #[arg(long, default_value_t = 48)]
    pub synthetic_train: usize,

    /// Synthetic test pairs (without --datapath)
    #[arg(long, default_value_t = 16)]
    pub synthetic_test: usize,

    #[arg(long, default_value_t = 64)]
    pub synthetic_height: usize,

    #[arg(long, default_value_t = 128)]
    pub synthetic_width: usize,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub common: RunArgs,
}

#[derive(Args, Debug)]
pub struct TestArgs {
    #[command(flatten)]
    pub common: RunArgs,

    /// Evaluate only test batches whose index is a multiple of this
    #[arg(long, default_value_t = 100)]
    pub test_stride: usize,
}

impl RunArgs {
    fn into_config(self, test_only: bool, test_stride: usize) -> RunConfig {
        RunConfig {
            max_disp:          self.max_disp,
            loss_weights:      self.loss_weights,
            max_disp_list:     self.max_disp_list,
            datapath:          self.datapath,
            synthetic: SyntheticConfig {
                train_samples: self.synthetic_train,
                test_samples:  self.synthetic_test,
                height:        self.synthetic_height,
                width:         self.synthetic_width,
            },
            epochs:            self.epochs,
            train_batch_size:  self.train_bsize,
            test_batch_size:   self.test_bsize,
            save_path:         self.save_path,
            resume:            self.resume,
            lr:                self.lr,
            with_spn:          self.with_spn,
            print_freq:        self.print_freq,
            init_channels:     self.init_channels,
            nblocks:           self.nblocks,
            spn_init_channels: self.spn_init_channels,
            test_only,
            test_stride,
            num_workers:       self.num_workers,
            seed:              self.seed,
        }
    }
}

/// The application layer never sees clap types.
impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        a.common.into_config(false, RunConfig::default().test_stride)
    }
}

impl From<TestArgs> for RunConfig {
    fn from(a: TestArgs) -> Self {
        a.common.into_config(true, a.test_stride)
    }
}
