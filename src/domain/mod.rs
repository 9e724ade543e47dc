// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe a stereo training run:
// the immutable run configuration, the error taxonomy and the
// seams other layers plug into.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Immutable run configuration shared by every component
pub mod config;

/// Configuration, checkpoint and run error types
pub mod error;

/// Core abstractions (traits) that other layers implement
pub mod traits;
