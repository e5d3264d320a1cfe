//! Errors and non-fatal diagnostics for the reference transform compiler.

use thiserror::Error;

use crate::error::ErrorCode;

/// A hard failure of [`crate::compiler::compile`]. Partial output is never
/// returned alongside an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A preallocated capacity was exhausted. The reference compiler itself
    /// has no fixed caps, but it shares this variant with
    /// [`crate::zero_alloc`] so callers can treat both compilers uniformly.
    #[error("compiler overflow: {resource} exceeds capacity {cap} - split the clip")]
    Overflow { resource: &'static str, cap: usize },
    /// `NOTE_MOD_GROOVE` referenced a groove template index outside the
    /// registered table.
    #[error("note_mod_groove referenced template {index} but only {registered} are registered")]
    UnknownGrooveTemplate { index: i32, registered: usize },
}

impl ErrorCode for CompileError {
    fn code(&self) -> &'static str {
        match self {
            CompileError::Overflow { .. } => "BC_COMPILE_001",
            CompileError::UnknownGrooveTemplate { .. } => "BC_COMPILE_002",
        }
    }

    fn category(&self) -> &'static str {
        "compiler"
    }
}

/// A non-fatal diagnostic recorded while tolerating malformed structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileWarning {
    /// A `*_PUSH`/`*_START` record had no matching `*_POP`/`*_END` by the
    /// time the input ended; the open context/scope was closed implicitly.
    #[error("unclosed {what} at word offset {offset}")]
    UnclosedBracket { offset: usize, what: &'static str },
    /// A `NOTE_MOD_*` record appeared without a preceding `NOTE` to attach
    /// to and was dropped.
    #[error("note modifier at word offset {offset} attached to no note")]
    NoteModOnNonNote { offset: usize },
}
