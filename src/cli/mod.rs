// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap, installs logging, picks the
// backend and hands a RunConfig to Layer 2 (application).
//
//   stereo-anytime train --datapath data/ --epochs 10
//   stereo-anytime test  --resume checkpoint.bin --test-stride 10
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu};
use clap::Parser;
use commands::{BackendKind, Commands};

use crate::application::run_use_case::RunUseCase;
use crate::domain::config::RunConfig;
use crate::infra::logging;

#[derive(Parser, Debug)]
#[command(
    name = "stereo-anytime",
    version = "0.1.0",
    about = "Train and evaluate a staged (anytime) stereo disparity network."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to the run use case on the chosen backend.
    pub fn run(self) -> Result<()> {
        let (backend, config): (BackendKind, RunConfig) = match self.command {
            Commands::Train(args) => (args.common.backend, args.into()),
            Commands::Test(args)  => (args.common.backend, args.into()),
        };
        logging::init(&config.log_file())?;

        let test_only = config.test_only;
        let use_case  = RunUseCase::new(config);
        let summary = match backend {
            BackendKind::Wgpu    => use_case.execute::<Autodiff<Wgpu>>(WgpuDevice::default())?,
            BackendKind::Ndarray => use_case.execute::<Autodiff<NdArray>>(NdArrayDevice::default())?,
        };

        let epe = summary
            .final_epe
            .iter()
            .enumerate()
            .map(|(stage, v)| format!("stage {stage}: {v:.3}"))
            .collect::<Vec<_>>()
            .join(", ");
        if test_only {
            println!("\nTest EPE — {epe}");
        } else {
            println!(
                "\nTrained {} epoch(s) from epoch {}. Test EPE — {epe}",
                summary.epochs_trained, summary.first_epoch
            );
        }
        Ok(())
    }
}
