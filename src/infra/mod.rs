// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   checkpoint.rs — atomic save / load / resume of the
//                   {epoch, model, optimizer} record
//
//   metrics.rs    — AverageMeter, per-stage meter groups and
//                   the metrics.csv writer
//
//   logging.rs    — tracing subscriber (terminal + log file)
//
//   visualizer.rs — PNG panels for evaluated test batches
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Records and Checkpointing)

/// Checkpoint record persistence and resume
pub mod checkpoint;

/// Running averages and the metrics CSV logger
pub mod metrics;

/// Global tracing subscriber setup
pub mod logging;

/// Renders evaluation batches to PNG grids
pub mod visualizer;
