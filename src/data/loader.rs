// ============================================================
// Layer 4 — Stereo Directory Loader
// ============================================================
// Loads rectified stereo pairs from disk.
//
// Expected layout (one sub-tree per split):
//
//   <root>/
//     training/            testing/
//       left/  <name>.png    left/  <name>.png
//       right/ <name>.png    right/ <name>.png
//       disp/  <name>.png    disp/  <name>.png   (16-bit grayscale)
//
// A sample is the triple sharing one file name. Files are visited
// in sorted order so runs are reproducible. A triple that fails
// to decode is skipped with a warning; a missing split directory
// is an error.
//
// Reference: image crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::{dataset::StereoSample, preprocessor::Preprocessor};

pub const TRAIN_SPLIT: &str = "training";
pub const TEST_SPLIT:  &str = "testing";

pub struct DirectoryLoader {
    root: PathBuf,
    prep: Preprocessor,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), prep: Preprocessor::new() }
    }

    /// Load every complete sample of one split.
    pub fn load_split(&self, split: &str) -> Result<Vec<StereoSample>> {
        let dir = self.root.join(split);
        let left_dir = dir.join("left");
        if !left_dir.is_dir() {
            bail!("Split directory '{}' does not exist", left_dir.display());
        }

        let mut names: Vec<PathBuf> = fs::read_dir(&left_dir)
            .with_context(|| format!("Cannot read directory '{}'", left_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
            .collect();
        names.sort();

        let mut samples = Vec::with_capacity(names.len());
        for left in names {
            let Some(name) = left.file_name() else { continue };
            let right = dir.join("right").join(name);
            let disp  = dir.join("disp").join(name);

            match self.load_triple(&left, &right, &disp) {
                Ok(sample) => samples.push(sample),
                Err(e)     => tracing::warn!("Skipping '{}': {:#}", left.display(), e),
            }
        }

        tracing::info!("Loaded {} samples from '{}'", samples.len(), dir.display());
        Ok(samples)
    }

    fn load_triple(&self, left: &Path, right: &Path, disp: &Path) -> Result<StereoSample> {
        let l = open(left)?.to_rgb8();
        let r = open(right)?.to_rgb8();
        let d = open(disp)?.to_luma16();

        if l.dimensions() != r.dimensions() || l.dimensions() != d.dimensions() {
            bail!(
                "dimension mismatch: left {:?}, right {:?}, disp {:?}",
                l.dimensions(),
                r.dimensions(),
                d.dimensions()
            );
        }

        let (w, h) = l.dimensions();
        Ok(StereoSample::new(
            self.prep.rgb(&l),
            self.prep.rgb(&r),
            self.prep.disparity(&d),
            3,
            h as usize,
            w as usize,
        ))
    }
}

fn open(path: &Path) -> Result<image::DynamicImage> {
    image::open(path).with_context(|| format!("Cannot decode '{}'", path.display()))
}
