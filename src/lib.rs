//! Symphonic Bytecode Core - deterministic score-to-event compilation and playback.
//!
//! This crate compiles a symbolic musical score - already encoded as a flat
//! *builder bytecode* with absolute tick positions and transform-scope markers -
//! into compact *VM bytecode* with relative (gap-based) timing, then interprets
//! that bytecode with a stack-machine virtual machine that streams timed
//! MIDI-shaped events through a single-producer/single-consumer ring buffer.
//!
//! # Determinism
//!
//! Every stage in this crate is fully deterministic. Given the same builder
//! bytecode, PPQ, and seed, [`compiler::compile`] and
//! [`zero_alloc::compile_zero_alloc`] produce byte-identical VM bytecode. This
//! is achieved through:
//!
//! - A seeded, heap-free, 32-bit PRNG used only for humanization ([`prng`])
//! - Integer-only tick arithmetic - no floating point ever touches the VM
//! - A stable per-scope sort keyed on `(final_tick, insertion_order)`
//!
//! # Module Structure
//!
//! - [`duration`]: Duration-symbol to tick conversion
//! - [`prng`]: Deterministic, heap-free PRNG used for humanization
//! - [`builder_bc`]: Input IR (flat, absolute-tick, scope-bracketed records)
//! - [`compiler`]: Reference two-pass transform compiler
//! - [`zero_alloc`]: Preallocated, behavior-identical variant of the compiler
//! - [`vm_bc`]: Output IR (structured opcodes with relative timing)
//! - [`vm`]: The bytecode virtual machine
//! - [`shared`]: The shared memory layout backing the VM and its consumer
//! - [`consumer`]: Reader-side helper over the shared event ring
//! - [`event`]: The `VmEvent` type streamed out of the ring buffer

pub mod builder_bc;
pub mod compiler;
pub mod consumer;
pub mod duration;
pub mod error;
pub mod event;
pub mod prng;
pub mod shared;
pub mod vm;
pub mod vm_bc;
pub mod zero_alloc;

// Re-export the most commonly used types at the crate root.
pub use compiler::{compile, CompileError, CompileOutput};
pub use consumer::EventConsumer;
pub use duration::{ticks_for_duration, DurationError};
pub use error::ErrorCode;
pub use event::VmEvent;
pub use prng::Prng;
pub use shared::SharedBuffer;
pub use vm::{Vm, VmError, VmState};
pub use zero_alloc::{compile_zero_alloc, ZeroAllocCompiler};

/// Crate version, exposed for cache-key and diagnostic purposes.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pulses-per-quarter-note used when a score does not specify one.
pub const DEFAULT_PPQ: u32 = 96;

/// Beats-per-minute used when a score does not specify one.
pub const DEFAULT_BPM: u32 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(DEFAULT_PPQ, 96);
        assert_eq!(DEFAULT_BPM, 120);
    }
}
