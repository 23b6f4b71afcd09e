//! Core data model for the decompiler: addresses, statements, functions, and
//! the program model that ties them together.
//!
//! This mirrors the original project's `struct statement` / `struct
//! rebuilt_function` / `struct rebuilt_program` triad, swapping the tagged
//! `enum { ... }` fields for proper Rust sum types and the hand-rolled
//! length-prefixed arrays for `Vec`.

use serde::{Deserialize, Serialize};

use crate::interval::IntervalSet;

/// A 32-bit virtual address. All instructions are 4-byte aligned.
pub type Address = u32;

/// Maximum length (in bytes) of a function name, matching the original's
/// `NAMES_LENGTH - 1` (a 64-byte buffer including the NUL terminator).
pub const MAX_NAME_LEN: usize = 63;

/// Truncates a name to [`MAX_NAME_LEN`] bytes, matching `strncpy(..., NAMES_LENGTH - 1)`.
pub fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        name.to_string()
    } else {
        name.chars().take(MAX_NAME_LEN).collect()
    }
}

/// The kind of a classified statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Branch,
    Nop,
    Word,
    Syscall,
    Other,
}

/// Sub-classification of a BRANCH statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    Jump,
    Call,
    Return,
}

/// Whether a BRANCH statement executes unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Unconditional,
    Conditional,
}

/// Whether a BRANCH statement's target address could be computed at
/// decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Staticity {
    Static,
    Dynamic,
}

/// A classified observation made at some address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// The instruction's address (BRANCH, SYSCALL) or a referenced data
    /// word's address (WORD).
    pub addr: Address,
    pub kind: StatementKind,

    // BRANCH-only fields.
    pub br_kind: Option<BranchKind>,
    pub cond: Option<Condition>,
    pub staticity: Option<Staticity>,
    /// Target address for BRANCH (0 if unknown/dynamic).
    pub to_addr: Address,
    /// Back-filled during reconstruction: the function this branch targets.
    pub to_function: Option<usize>,

    /// Raw word for WORD; syscall number for SYSCALL (-1 if unrecoverable,
    /// stored as `i64` to admit the sentinel without overloading the high
    /// bit of a `u32`).
    pub value: i64,
}

impl Statement {
    /// Constructs a BRANCH statement with no target yet resolved (dynamic).
    pub fn branch(
        addr: Address,
        br_kind: BranchKind,
        cond: Condition,
        to_addr: Address,
    ) -> Self {
        let staticity = if to_addr != 0 {
            Staticity::Static
        } else {
            Staticity::Dynamic
        };
        Statement {
            addr,
            kind: StatementKind::Branch,
            br_kind: Some(br_kind),
            cond: Some(cond),
            staticity: Some(staticity),
            to_addr,
            to_function: None,
            value: 0,
        }
    }

    /// Constructs a WORD statement: a data word referenced by a PC-relative
    /// load/store, recorded at the address of the *data*, not the instruction.
    pub fn word(addr: Address, value: u32) -> Self {
        Statement {
            addr,
            kind: StatementKind::Word,
            br_kind: None,
            cond: None,
            staticity: None,
            to_addr: 0,
            to_function: None,
            value: value as i64,
        }
    }

    /// Constructs a SYSCALL statement. `value` is the syscall number, or -1
    /// if it could not be recovered from a preceding `mov r7, #imm`.
    pub fn syscall(addr: Address, value: i64) -> Self {
        Statement {
            addr,
            kind: StatementKind::Syscall,
            br_kind: None,
            cond: None,
            staticity: None,
            to_addr: 0,
            to_function: None,
            value,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.kind == StatementKind::Branch
    }
}

/// A reconstructed function: an address range, a name, and the statements
/// found within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: usize,
    /// Inclusive start of the function's address range.
    pub vaddr_start: Address,
    /// Exclusive end of the function's address range.
    pub vaddr_end: Address,
    /// Symbol name, or a synthesized `f<id>` fallback. At most
    /// [`MAX_NAME_LEN`] bytes.
    pub name: String,
    pub statements: Vec<Statement>,
    /// True if this function was reached only via the stdlib startup walk
    /// (see `stdlib.rs`).
    pub from_stdlib: bool,
}

impl Function {
    pub fn new(id: usize, vaddr_start: Address, name: String) -> Self {
        Function {
            id,
            vaddr_start,
            vaddr_end: vaddr_start,
            name: truncate_name(&name),
            statements: Vec::new(),
            from_stdlib: false,
        }
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.vaddr_start && addr < self.vaddr_end
    }
}

/// The reconstructed program: every statement discovered by the walker, the
/// functions the reconstructor grouped them into, and the explored address
/// ranges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramModel {
    /// Flat list of statements, sorted by `addr` once reconstruction starts.
    pub statements: Vec<Statement>,
    /// Functions in insertion order; a function's index in this vector is
    /// its id.
    pub functions: Vec<Function>,
    pub explored: IntervalSet,
    /// Index into `functions` of the function containing the program's
    /// entry point, if known.
    pub entry_function: Option<usize>,
}

impl ProgramModel {
    pub fn new() -> Self {
        ProgramModel::default()
    }

    pub fn function_by_vaddr(&self, vaddr: Address) -> Option<usize> {
        self.functions.iter().position(|f| f.vaddr_start == vaddr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_name_keeps_short_names() {
        assert_eq!(truncate_name("main"), "main");
    }

    #[test]
    fn truncate_name_clips_at_max_len() {
        let long = "x".repeat(200);
        assert_eq!(truncate_name(&long).len(), MAX_NAME_LEN);
    }

    #[test]
    fn branch_staticity_follows_to_addr() {
        let s = Statement::branch(0x8000, BranchKind::Jump, Condition::Unconditional, 0);
        assert_eq!(s.staticity, Some(Staticity::Dynamic));
        let s = Statement::branch(0x8000, BranchKind::Jump, Condition::Unconditional, 0x8010);
        assert_eq!(s.staticity, Some(Staticity::Static));
    }

    #[test]
    fn function_contains_is_half_open() {
        let f = Function::new(0, 0x8000, "f0".into());
        let mut f = f;
        f.vaddr_end = 0x8010;
        assert!(f.contains(0x8000));
        assert!(!f.contains(0x8010));
    }
}
