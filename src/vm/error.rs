//! VM-level errors.

use thiserror::Error;

use crate::error::ErrorCode;
use crate::shared::LayoutError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// Magic or version mismatch on construction.
    #[error("invalid bytecode: {reason}")]
    InvalidBytecode { reason: String },
    /// A bounded auxiliary stack would exceed its compile-time cap.
    #[error("vm overflow: {resource} exceeds capacity {cap}")]
    Overflow { resource: &'static str, cap: usize },
    /// The bytecode region contains a malformed instruction (truncated
    /// argument or `pc` run off the end) - distinct from an *unknown*
    /// opcode, which the VM treats as a forward-compatible no-op.
    #[error("malformed bytecode at pc {pc}: {message}")]
    MalformedBytecode { pc: usize, message: String },
}

impl ErrorCode for VmError {
    fn code(&self) -> &'static str {
        match self {
            VmError::InvalidBytecode { .. } => "VM_001",
            VmError::Overflow { .. } => "VM_002",
            VmError::MalformedBytecode { .. } => "VM_003",
        }
    }

    fn category(&self) -> &'static str {
        "vm"
    }
}

impl From<LayoutError> for VmError {
    fn from(e: LayoutError) -> Self {
        VmError::InvalidBytecode { reason: e.to_string() }
    }
}
