// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Persists {epoch, model parameters, optimizer state} as ONE
// record in ONE file, and restores it at start-up.
//
// File layout (bincode envelope):
//   format_version : u32     ← currently 1
//   epoch          : usize   ← last completed epoch
//   model_state    : bytes   ← BinBytesRecorder<FullPrecision>
//   optimizer_state: bytes   ← BinBytesRecorder<FullPrecision>
//
// Full precision keeps the round trip bit-exact. The envelope
// is written to a temp file in the target directory and renamed
// over the destination, so readers see the old record or the
// new one, never a partial write.
//
// Resume policy:
//   train mode, no --resume        → start from scratch
//   train mode, missing / corrupt  → warn, start from scratch
//   test mode,  no --resume        → ConfigurationError
//   test mode,  missing file       → ConfigurationError
//   test mode installs the model only; optimizer state is unused.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use burn::{
    module::{AutodiffModule, Module},
    optim::Optimizer,
    record::{BinBytesRecorder, FullPrecisionSettings, Record, Recorder},
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::domain::error::{CheckpointError, ConfigurationError};

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

type StateRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// The on-disk record, with model and optimizer state still encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub format_version:  u32,
    pub epoch:           usize,
    pub model_state:     Vec<u8>,
    pub optimizer_state: Vec<u8>,
}

/// Whether a missing checkpoint is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Resume is optional; failures fall back to epoch 0
    Train,
    /// Resume is mandatory; failures are configuration errors
    Test,
}

/// Where the epoch loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    Scratch,
    Resumed { epoch: usize },
}

impl ResumePoint {
    /// First epoch still to be trained.
    pub fn next_epoch(self) -> usize {
        match self {
            ResumePoint::Scratch           => 0,
            ResumePoint::Resumed { epoch } => epoch + 1,
        }
    }
}

/// Saves and restores checkpoint records.
#[derive(Debug, Default)]
pub struct CheckpointManager {
    recorder: StateRecorder,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self { recorder: StateRecorder::new() }
    }

    /// Write `{epoch, model, optimizer}` to `path`, replacing any
    /// previous record there.
    pub fn save<B, M, O>(
        &self,
        path:  &Path,
        epoch: usize,
        model: &M,
        optim: &O,
    ) -> Result<(), CheckpointError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let model_state = Recorder::<B>::record(&self.recorder, model.clone().into_record(), ())
            .map_err(|e| CheckpointError::Recorder(format!("{e:?}")))?;
        let optimizer_state = Recorder::<B>::record(&self.recorder, optim.to_record(), ())
            .map_err(|e| CheckpointError::Recorder(format!("{e:?}")))?;

        let record = CheckpointRecord {
            format_version: CHECKPOINT_FORMAT_VERSION,
            epoch,
            model_state,
            optimizer_state,
        };
        write_atomically(path, &record)?;

        tracing::debug!("Saved checkpoint for epoch {} to '{}'", epoch, path.display());
        Ok(())
    }

    /// Read the record at `path` without installing anything.
    pub fn load(&self, path: &Path) -> Result<CheckpointRecord, CheckpointError> {
        if !path.is_file() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path).map_err(|source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let record: CheckpointRecord = bincode::deserialize(&bytes)?;

        if record.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found:    record.format_version,
                expected: CHECKPOINT_FORMAT_VERSION,
            });
        }
        Ok(record)
    }

    /// Decode the model state of `record` and install it into `model`.
    pub fn restore_model<B, M>(
        &self,
        record: &CheckpointRecord,
        model:  M,
        device: &B::Device,
    ) -> Result<M, CheckpointError>
    where
        B: Backend,
        M: Module<B>,
    {
        let state: M::Record = self.decode::<B, M::Record>(&record.model_state, device)?;
        Ok(model.load_record(state))
    }

    /// Restore from `path` according to `mode`.
    ///
    /// Both records are decoded before either is installed, so a
    /// failure leaves `model` and `optim` exactly as they were passed in.
    pub fn resume<B, M, O>(
        &self,
        path:   Option<&Path>,
        mode:   ResumeMode,
        model:  M,
        optim:  O,
        device: &B::Device,
    ) -> Result<(M, O, ResumePoint), CheckpointError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        match (mode, path) {
            (ResumeMode::Test, None) => Err(ConfigurationError::ResumeRequired.into()),

            (ResumeMode::Test, Some(path)) => {
                if !path.is_file() {
                    return Err(ConfigurationError::MissingCheckpoint(path.to_path_buf()).into());
                }
                tracing::info!("=> loading checkpoint '{}'", path.display());
                let record = self.load(path)?;
                let model  = self.restore_model::<B, M>(&record, model, device)?;
                Ok((model, optim, ResumePoint::Resumed { epoch: record.epoch }))
            }

            (ResumeMode::Train, None) => {
                tracing::info!("Not Resume");
                Ok((model, optim, ResumePoint::Scratch))
            }

            (ResumeMode::Train, Some(path)) => {
                tracing::info!("=> loading checkpoint '{}'", path.display());
                match self.decode_full::<B, M, O>(path, device) {
                    Ok((epoch, model_state, optim_state)) => {
                        let model = model.load_record(model_state);
                        let optim = optim.load_record(optim_state);
                        tracing::info!(
                            "=> loaded checkpoint '{}' (epoch {})",
                            path.display(),
                            epoch
                        );
                        Ok((model, optim, ResumePoint::Resumed { epoch }))
                    }
                    Err(CheckpointError::NotFound(_)) => {
                        tracing::warn!("=> no checkpoint found at '{}'", path.display());
                        tracing::warn!("=> Will start from scratch.");
                        Ok((model, optim, ResumePoint::Scratch))
                    }
                    Err(e) => {
                        tracing::warn!("=> could not load checkpoint '{}': {}", path.display(), e);
                        tracing::warn!("=> Will start from scratch.");
                        Ok((model, optim, ResumePoint::Scratch))
                    }
                }
            }
        }
    }

    fn decode_full<B, M, O>(
        &self,
        path:   &Path,
        device: &B::Device,
    ) -> Result<(usize, M::Record, O::Record), CheckpointError>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        O: Optimizer<M, B>,
    {
        let record = self.load(path)?;
        let model_state: M::Record = self.decode::<B, M::Record>(&record.model_state, device)?;
        let optim_state: O::Record = self.decode::<B, O::Record>(&record.optimizer_state, device)?;
        Ok((record.epoch, model_state, optim_state))
    }

    fn decode<B: Backend, R: Record<B>>(
        &self,
        bytes:  &[u8],
        device: &B::Device,
    ) -> Result<R, CheckpointError> {
        Recorder::<B>::load(&self.recorder, bytes.to_vec(), device)
            .map_err(|e| CheckpointError::Recorder(format!("{e:?}")))
    }
}

fn write_atomically(path: &Path, record: &CheckpointRecord) -> Result<(), CheckpointError> {
    let io_err = |p: &Path| {
        let p: PathBuf = p.to_path_buf();
        move |source| CheckpointError::Io { path: p, source }
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        bincode::serialize_into(&mut writer, record)?;
        writer.flush().map_err(io_err(path))?;
    }
    tmp.as_file().sync_all().map_err(io_err(path))?;
    tmp.persist(path).map_err(|e| CheckpointError::Io {
        path:   path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::{optim::GradientsParams, prelude::*};

    use crate::ml::{
        model::{AnytimeStereoConfig, AnytimeStereoNet, StageModel},
        test_support::{adam, TestBackend, TestDevice},
    };

    fn tiny_model(device: &TestDevice) -> AnytimeStereoNet<TestBackend> {
        AnytimeStereoConfig::new(vec![12, 3, 3])
            .with_nblocks(1)
            .init::<TestBackend>(device)
    }

    fn model_bytes(model: &AnytimeStereoNet<TestBackend>) -> Vec<u8> {
        Recorder::<TestBackend>::record(&StateRecorder::new(), model.clone().into_record(), ())
            .unwrap()
    }

    /// One optimizer step on a fixed input.
    fn step<O: Optimizer<AnytimeStereoNet<TestBackend>, TestBackend>>(
        model:  AnytimeStereoNet<TestBackend>,
        optim:  &mut O,
        device: &TestDevice,
    ) -> AnytimeStereoNet<TestBackend> {
        let left  = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], device);
        let right = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], device);
        let loss = model
            .forward(left, right)
            .into_iter()
            .map(|out| out.mean())
            .reduce(|a, b| a + b)
            .unwrap();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        optim.step(1e-3, model, grads)
    }

    #[test]
    fn round_trip_preserves_epoch_and_state() {
        let dir    = tempfile::tempdir().unwrap();
        let path   = dir.path().join("checkpoint.bin");
        let device = TestDevice::default();
        let ckpt   = CheckpointManager::new();

        let mut optim = adam();
        let model = step(tiny_model(&device), &mut optim, &device);
        ckpt.save::<TestBackend, _, _>(&path, 7, &model, &optim).unwrap();

        let record = ckpt.load(&path).unwrap();
        assert_eq!(record.epoch, 7);
        assert_eq!(record.format_version, CHECKPOINT_FORMAT_VERSION);

        let (restored, mut restored_optim, point) = ckpt
            .resume::<TestBackend, _, _>(Some(&path), ResumeMode::Train, tiny_model(&device), adam(), &device)
            .unwrap();
        assert_eq!(point, ResumePoint::Resumed { epoch: 7 });
        assert_eq!(point.next_epoch(), 8);
        assert_eq!(model_bytes(&restored), model_bytes(&model));

        // Identical optimizer state ⇒ identical next update.
        let a = step(model, &mut optim, &device);
        let b = step(restored, &mut restored_optim, &device);
        assert_eq!(model_bytes(&a), model_bytes(&b));
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = CheckpointManager::new()
            .load(&dir.path().join("nope.bin"))
            .unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.bin");
        let record = CheckpointRecord {
            format_version:  99,
            epoch:           1,
            model_state:     Vec::new(),
            optimizer_state: Vec::new(),
        };
        write_atomically(&path, &record).unwrap();

        let err = CheckpointManager::new().load(&path).unwrap_err();
        assert!(matches!(err, CheckpointError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn optional_resume_without_checkpoint_starts_from_scratch() {
        let dir    = tempfile::tempdir().unwrap();
        let device = TestDevice::default();
        let ckpt   = CheckpointManager::new();
        let missing = dir.path().join("checkpoint.bin");

        let (_, _, point) = ckpt
            .resume::<TestBackend, _, _>(Some(&missing), ResumeMode::Train, tiny_model(&device), adam(), &device)
            .unwrap();
        assert_eq!(point, ResumePoint::Scratch);
        assert_eq!(point.next_epoch(), 0);

        let (_, _, point) = ckpt
            .resume::<TestBackend, _, _>(None, ResumeMode::Train, tiny_model(&device), adam(), &device)
            .unwrap();
        assert_eq!(point, ResumePoint::Scratch);
    }

    #[test]
    fn optional_resume_with_corrupt_checkpoint_keeps_state() {
        let dir    = tempfile::tempdir().unwrap();
        let path   = dir.path().join("checkpoint.bin");
        let device = TestDevice::default();
        fs::write(&path, b"not a checkpoint").unwrap();

        let model  = tiny_model(&device);
        let before = model_bytes(&model);
        let (model, _, point) = CheckpointManager::new()
            .resume::<TestBackend, _, _>(Some(&path), ResumeMode::Train, model, adam(), &device)
            .unwrap();
        assert_eq!(point, ResumePoint::Scratch);
        assert_eq!(model_bytes(&model), before);
    }

    #[test]
    fn mandatory_resume_without_checkpoint_is_configuration_error() {
        let dir    = tempfile::tempdir().unwrap();
        let device = TestDevice::default();
        let ckpt   = CheckpointManager::new();

        let Err(err) = ckpt.resume::<TestBackend, _, _>(
            Some(&dir.path().join("checkpoint.bin")),
            ResumeMode::Test,
            tiny_model(&device),
            adam(),
            &device,
        ) else {
            panic!("test-mode resume without a checkpoint must fail");
        };
        assert!(matches!(
            err,
            CheckpointError::Configuration(ConfigurationError::MissingCheckpoint(_))
        ));

        let Err(err) =
            ckpt.resume::<TestBackend, _, _>(None, ResumeMode::Test, tiny_model(&device), adam(), &device)
        else {
            panic!("test-mode resume without --resume must fail");
        };
        assert!(matches!(
            err,
            CheckpointError::Configuration(ConfigurationError::ResumeRequired)
        ));
    }

    #[test]
    fn save_overwrites_previous_record() {
        let dir    = tempfile::tempdir().unwrap();
        let path   = dir.path().join("checkpoint.bin");
        let device = TestDevice::default();
        let ckpt   = CheckpointManager::new();
        let model  = tiny_model(&device);
        let optim  = adam();

        ckpt.save::<TestBackend, _, _>(&path, 0, &model, &optim).unwrap();
        ckpt.save::<TestBackend, _, _>(&path, 1, &model, &optim).unwrap();
        assert_eq!(ckpt.load(&path).unwrap().epoch, 1);

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
