//! Transform Compiler (reference) - the two-phase bytecode-to-bytecode
//! compiler described by the core pipeline: builder bytecode in, VM
//! bytecode out, applying Quantize -> Groove -> Humanize per event while
//! preserving structural nesting and a stable per-scope ordering.
//!
//! This is the oracle implementation: it allocates freely and favors
//! clarity. [`crate::zero_alloc`] must match its output bit-for-bit for
//! every legal input.

mod emit;
mod error;
mod extract;
mod model;
mod sort;
mod transform;
mod unroll;

#[cfg(test)]
mod tests;

pub use error::{CompileError, CompileWarning};

use crate::builder_bc::Word;
use crate::vm_bc;

/// Compiler configuration. `groove_templates` backs `NOTE_MOD_GROOVE`'s
/// registered-table lookup; `unroll` requests compile-time LOOP expansion.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub ppq: u32,
    pub seed: u32,
    pub groove_templates: Vec<Vec<i32>>,
    pub unroll: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            ppq: crate::DEFAULT_PPQ,
            seed: 0,
            groove_templates: Vec::new(),
            unroll: false,
        }
    }
}

/// The compiler's output: VM bytecode ready for [`crate::vm::Vm`], the
/// computed total tick extent, and any tolerated structural warnings.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub vm_bytecode: Vec<Word>,
    pub total_ticks: i64,
    pub warnings: Vec<CompileWarning>,
}

/// Compile a builder bytecode buffer into VM bytecode. Pure with respect to
/// its inputs and deterministic for a fixed seed (Testable Property 1).
pub fn compile(builder_buf: &[Word], options: &CompileOptions) -> Result<CompileOutput, CompileError> {
    let extract::ExtractOutput { mut state, warnings } = extract::extract(builder_buf);

    if options.unroll {
        unroll::unroll_scope(&mut state, state.root);
    }

    for event in &mut state.events {
        let effective_seed = options.seed.wrapping_add(event.extra_seed);
        transform::transform_event(event, options.ppq, effective_seed, &options.groove_templates)?;
    }

    sort::sort_all_scopes(&mut state);

    let mut instructions = Vec::new();
    emit::emit_scope(&state, state.root, &mut instructions);
    instructions.push(vm_bc::Instruction::Eof);

    let vm_bytecode = vm_bc::encode_program(&instructions);
    let total_ticks = emit::total_ticks(&state);

    Ok(CompileOutput {
        vm_bytecode,
        total_ticks,
        warnings,
    })
}
