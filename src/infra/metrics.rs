// ============================================================
// Layer 6 — Metrics
// ============================================================
// Two concerns live here:
//
//   AverageMeter / StageMeters — running current/average values
//     used for per-stage training losses and evaluation EPEs.
//     One meter per stage, created fresh for every epoch or
//     evaluation run and discarded when that loop ends.
//
//   MetricsLogger — appends per-stage averages to a CSV file
//     so learning curves can be plotted after the run.
//
// Example CSV output:
//   epoch,phase,stage,average
//   0,train,0,3.812400
//   0,train,1,2.990100
//   0,test,0,2.751000
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

// ─── AverageMeter ─────────────────────────────────────────────────────────────
/// Running tracker of the latest value and the weighted mean so far.
///
/// Invariant: `avg == sum / count` whenever `count > 0`;
/// every field is zero before the first update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AverageMeter {
    pub val:   f64,
    pub avg:   f64,
    pub sum:   f64,
    pub count: f64,
}

impl AverageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record one observation with weight 1.
    pub fn update(&mut self, value: f64) {
        self.update_weighted(value, 1.0);
    }

    /// Record `value` counted `weight` times. The weight is expected
    /// to be non-negative; it is not checked.
    pub fn update_weighted(&mut self, value: f64, weight: f64) {
        self.val    = value;
        self.sum   += value * weight;
        self.count += weight;
        self.avg    = self.sum / self.count;
    }
}

// ─── StageMeters ──────────────────────────────────────────────────────────────
/// One AverageMeter per model stage, plus the log formatting the
/// training and evaluation loops share.
#[derive(Debug, Clone, PartialEq)]
pub struct StageMeters {
    meters: Vec<AverageMeter>,
}

impl StageMeters {
    pub fn new(stages: usize) -> Self {
        Self { meters: vec![AverageMeter::new(); stages] }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.meters.len()
    }

    #[cfg(test)]
    pub fn stage(&self, stage: usize) -> &AverageMeter {
        &self.meters[stage]
    }

    pub fn update(&mut self, stage: usize, value: f64) {
        self.meters[stage].update(value);
    }

    pub fn averages(&self) -> Vec<f64> {
        self.meters.iter().map(|m| m.avg).collect()
    }

    /// `Stage 0 = 1.23(1.40)\tStage 1 = ...` — current value and running average.
    pub fn progress_line(&self) -> String {
        self.meters
            .iter()
            .enumerate()
            .map(|(i, m)| format!("Stage {} = {:.2}({:.2})", i, m.val, m.avg))
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// `Stage 0 = 1.40\tStage 1 = ...`
    pub fn summary_line(&self) -> String {
        self.meters
            .iter()
            .enumerate()
            .map(|(i, m)| format!("Stage {} = {:.2}", i, m.avg))
            .collect::<Vec<_>>()
            .join("\t")
    }

    /// `Stage 0=1.40, Stage 1=...`
    pub fn compact_summary_line(&self) -> String {
        self.meters
            .iter()
            .enumerate()
            .map(|(i, m)| format!("Stage {}={:.2}", i, m.avg))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ─── MetricsLogger ────────────────────────────────────────────────────────────
/// Which loop produced a CSV row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Test,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Test  => "test",
        }
    }
}

/// Appends per-stage averages to `<dir>/metrics.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory and write the CSV header if the file is new.
    /// Existing files are appended to, so resumed runs extend one log.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,phase,stage,average")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// One row per stage.
    pub fn log(&self, epoch: usize, phase: Phase, meters: &StageMeters) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        for (stage, avg) in meters.averages().into_iter().enumerate() {
            writeln!(f, "{},{},{},{:.6}", epoch, phase.as_str(), stage, avg)?;
        }
        Ok(())
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_meter_is_all_zero() {
        let m = AverageMeter::new();
        assert_eq!(m, AverageMeter { val: 0.0, avg: 0.0, sum: 0.0, count: 0.0 });
    }

    #[test]
    fn weighted_average_matches_definition() {
        let values  = [2.0, 4.0, 10.0];
        let weights = [1.0, 3.0, 0.5];

        let mut m = AverageMeter::new();
        for (v, w) in values.iter().zip(weights.iter()) {
            m.update_weighted(*v, *w);
        }

        let expected = values.iter().zip(weights.iter()).map(|(v, w)| v * w).sum::<f64>()
            / weights.iter().sum::<f64>();
        assert!((m.avg - expected).abs() < 1e-12);
        assert_eq!(m.val, 10.0);
        assert_eq!(m.count, 4.5);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut m = AverageMeter::new();
        m.update(3.0);
        m.update(5.0);
        assert_eq!(m.avg, 4.0);

        m.reset();
        assert_eq!(m, AverageMeter::default());
    }

    #[test]
    fn log_lines_cover_every_stage() {
        let mut meters = StageMeters::new(3);
        meters.update(0, 1.0);
        meters.update(1, 2.0);
        meters.update(2, 3.0);
        meters.update(2, 5.0);

        assert_eq!(
            meters.progress_line(),
            "Stage 0 = 1.00(1.00)\tStage 1 = 2.00(2.00)\tStage 2 = 5.00(4.00)"
        );
        assert_eq!(meters.summary_line(), "Stage 0 = 1.00\tStage 1 = 2.00\tStage 2 = 4.00");
        assert_eq!(meters.compact_summary_line(), "Stage 0=1.00, Stage 1=2.00, Stage 2=4.00");
    }

    #[test]
    fn csv_rows_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();

        let mut meters = StageMeters::new(2);
        meters.update(0, 0.5);
        meters.update(1, 0.25);
        logger.log(3, Phase::Train, &meters).unwrap();

        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "epoch,phase,stage,average");
        assert_eq!(lines[1], "3,train,0,0.500000");
        assert_eq!(lines[2], "3,train,1,0.250000");
    }
}
