// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between raw stereo pairs and device-resident batches.
//
//   PNG triples on disk         random-dot generator
//   (DirectoryLoader)           (SyntheticStereo)
//          │                           │
//          └────────────┬──────────────┘
//                       ▼
//   Preprocessor   → CHW floats, ImageNet-normalised, disparity decode
//                       │
//                       ▼
//   StereoDataset  → Burn Dataset (test split padded on top)
//                       │
//                       ▼
//   StereoBatcher  → stacks samples into tensors on the device
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads stereo triples from a directory tree
pub mod loader;

/// Image and disparity decoding
pub mod preprocessor;

/// Random-dot stereograms with known ground truth
pub mod synthetic;

/// Implements Burn's Dataset trait for stereo samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

use anyhow::Result;

use crate::domain::{
    config::{RunConfig, EVAL_BORDER_ROWS},
    error::ConfigurationError,
};
use dataset::{StereoDataset, StereoSample};
use loader::{DirectoryLoader, TEST_SPLIT, TRAIN_SPLIT};
use synthetic::SyntheticStereo;

/// Build the (train, test) datasets for a run.
///
/// Test samples get `EVAL_BORDER_ROWS` zero rows on top of both
/// images; the evaluator crops the same rows from its predictions.
pub fn load_splits(config: &RunConfig) -> Result<(StereoDataset, StereoDataset)> {
    let (train, test) = match &config.datapath {
        Some(root) => {
            let loader = DirectoryLoader::new(root);
            let train = if config.test_only {
                Vec::new()
            } else {
                loader.load_split(TRAIN_SPLIT)?
            };
            (train, loader.load_split(TEST_SPLIT)?)
        }
        None => {
            let syn = &config.synthetic;
            if syn.height == 0 || syn.width == 0 {
                return Err(ConfigurationError::EmptySyntheticImage {
                    height: syn.height,
                    width:  syn.width,
                }
                .into());
            }
            tracing::info!(
                "No datapath given — generating {}+{} synthetic {}x{} pairs",
                syn.train_samples,
                syn.test_samples,
                syn.height,
                syn.width
            );
            let generator = SyntheticStereo::new(syn.height, syn.width, config.max_disp);
            let train = if config.test_only {
                Vec::new()
            } else {
                generator.generate(syn.train_samples, config.seed)
            };
            let test_seed = config.seed.wrapping_add(syn.train_samples as u64);
            (train, generator.generate(syn.test_samples, test_seed))
        }
    };

    let test: Vec<StereoSample> = test
        .into_iter()
        .map(|s| s.pad_top(EVAL_BORDER_ROWS))
        .collect();

    Ok((StereoDataset::new(train), StereoDataset::new(test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;

    fn small_config() -> RunConfig {
        let mut config = RunConfig::default();
        config.synthetic.train_samples = 3;
        config.synthetic.test_samples  = 2;
        config.synthetic.height        = 8;
        config.synthetic.width         = 16;
        config
    }

    #[test]
    fn synthetic_splits_pad_test_images_only() {
        let (train, test) = load_splits(&small_config()).unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(test.len(), 2);

        let tr = train.get(0).unwrap();
        assert_eq!(tr.height, 8);

        let te = test.get(0).unwrap();
        assert_eq!(te.height, 8 + EVAL_BORDER_ROWS);
        assert_eq!(te.disp_height, 8);
        assert_eq!(te.left.len(), 3 * (8 + EVAL_BORDER_ROWS) * 16);
        assert_eq!(te.disparity.len(), 8 * 16);
    }

    #[test]
    fn test_only_skips_the_training_split() {
        let mut config = small_config();
        config.test_only = true;
        let (train, test) = load_splits(&config).unwrap();
        assert_eq!(train.len(), 0);
        assert_eq!(test.len(), 2);
    }

    #[test]
    fn zero_sized_synthetic_images_fail_instead_of_panicking() {
        let mut config = small_config();
        config.synthetic.height = 0;
        let err = load_splits(&config).err().expect("zero height must be rejected");
        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::EmptySyntheticImage { height: 0, .. })
        ));
    }
}
