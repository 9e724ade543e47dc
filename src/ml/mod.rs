// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that touches tensors during a run:
//
//   model.rs     — StageModel contract + reference multi-stage net
//   loss.rs      — validity mask, masked smooth-L1, masked EPE,
//                  crop helpers and the log cadence rule
//   trainer.rs   — one training epoch: forward, weighted loss sum,
//                  backward, Adam step, per-stage loss meters
//   evaluator.rs — strided inference pass with per-stage EPE and
//                  optional visualization requests
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// Model contract and reference multi-stage network
pub mod model;

/// Masked losses and metrics shared by both loops
pub mod loss;

/// Training Loop Controller
pub mod trainer;

/// Evaluation Loop Controller
pub mod evaluator;

#[cfg(test)]
pub mod test_support;
