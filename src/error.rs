//! Error types for the decompiler.
//!
//! A single `thiserror`-derived enum covers every error taxon the pipeline can
//! raise: decode failures, out-of-bounds memory reads, CLI usage mistakes,
//! unresolved `-f` arguments, and invariant violations in the interval set.

use thiserror::Error;

use crate::types::Address;

/// Primary error type for the decompiler.
#[derive(Debug, Error)]
pub enum DecompilerError {
    /// IO error while opening or reading the input binary.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An instruction form the classifier refuses to decode (BLX(1), or input
    /// that isn't ARMv5 at all). Aborts the run.
    #[error("fatal decode error at 0x{pc:08x}: {reason}")]
    FatalDecode { pc: Address, reason: String },

    /// A read landed outside every loaded, allocatable section.
    #[error("fatal memory error: read at invalid address 0x{addr:08x}")]
    FatalMemory { addr: Address },

    /// Missing or contradictory CLI arguments.
    #[error("usage error: {message}")]
    UsageError { message: String },

    /// The `-f` argument matched neither a symbol name nor a `0x…` address.
    #[error("unresolved symbol: {name}")]
    UnresolvedSymbol { name: String },

    /// The input file is not a 32-bit little-endian ARM ELF executable.
    #[error("not a valid ELF32 ARM executable: {message}")]
    ElfParseError { message: String },

    /// A data-model invariant was violated. This indicates a bug in the
    /// decompiler itself, not a property of the input.
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },
}

/// Result type alias for decompiler operations.
pub type Result<T> = std::result::Result<T, DecompilerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_decode_carries_pc_and_reason() {
        let err = DecompilerError::FatalDecode {
            pc: 0x8000,
            reason: "BLX(1) instruction (Thumb target) is unsupported".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("8000"));
        assert!(msg.contains("BLX(1)"));
    }

    #[test]
    fn unresolved_symbol_names_the_argument() {
        let err = DecompilerError::UnresolvedSymbol {
            name: "frobnicate".into(),
        };
        assert!(err.to_string().contains("frobnicate"));
    }
}
