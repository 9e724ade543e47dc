// ============================================================
// Layer 6 — Logging Setup
// ============================================================
// One tracing subscriber, two sinks:
//
//   terminal   → coloured fmt layer
//   log file   → plain fmt layer appended to <save_path>/<name>.log
//
// Both share one EnvFilter. RUST_LOG overrides the default
// directive, e.g. RUST_LOG=stereo_anytime=debug.
//
// Reference: tracing-subscriber documentation (Registry, Layer)

use anyhow::{Context, Result};
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_DIRECTIVE: &str = "stereo_anytime=info";

/// Install the global subscriber, creating the log file's directory
/// if needed. Fails if a subscriber is already installed.
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(dir) = log_file.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Cannot open log file '{}'", log_file.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}
