// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// ConfigurationError → fatal, raised before any compute starts
// CheckpointError    → persistence failures (missing, corrupt, I/O)
// RunError           → contract violations seen while a loop runs
//
// Empty validity masks are NOT errors: the loops record a zero
// metric for that stage and carry on.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("--resume must be set when running in test mode")]
    ResumeRequired,

    #[error("checkpoint '{}' does not exist", .0.display())]
    MissingCheckpoint(PathBuf),

    #[error("{stages} stages need {stages} loss weights, got {weights}")]
    MissingStageWeights { stages: usize, weights: usize },

    #[error("loss weights must be non-negative, got {0}")]
    NegativeStageWeight(f64),

    #[error("max disparity list needs {expected} entries, got {got}")]
    MaxDispList { expected: usize, got: usize },

    #[error("maximum disparity must be positive, got {0}")]
    NonPositiveMaxDisp(f32),

    #[error("batch sizes must be at least 1")]
    ZeroBatchSize,

    #[error("evaluation stride must be at least 1")]
    ZeroStride,

    #[error("synthetic images must be at least 1x1, got {height}x{width}")]
    EmptySyntheticImage { height: usize, width: usize },
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint found at '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("checkpoint I/O failed for '{}'", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint envelope could not be encoded or decoded")]
    Envelope(#[from] bincode::Error),

    #[error("checkpoint record rejected: {0}")]
    Recorder(String),

    #[error("checkpoint format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("model produced {got} stage outputs, configuration expects {expected}")]
    StageCountMismatch { expected: usize, got: usize },

    #[error("stage {stage} prediction has shape {prediction:?} but ground truth has {ground_truth:?}")]
    ShapeMismatch {
        stage:        usize,
        prediction:   Vec<usize>,
        ground_truth: Vec<usize>,
    },

    #[error("prediction height {height} is too small for a {crop}-row crop")]
    CropTooLarge { height: usize, crop: usize },

    #[error("visualization request for batch {batch} failed: {message}")]
    Visualization { batch: usize, message: String },
}
