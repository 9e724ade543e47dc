// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers into one run. No tensor math
// and no argument parsing here: the CLI builds a RunConfig,
// the use case sequences data, model, checkpoints and loops.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Train / resume / test workflow
pub mod run_use_case;
