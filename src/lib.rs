//! ARM Decompiler - static reachability-based decompilation for 32-bit
//! ARMv5 ELF executables.
//!
//! This library reconstructs a higher-level program model from a raw ARM
//! binary: a reachability walk over the instruction stream, classified into
//! branches, PC-relative loads, syscalls, and everything else; a function
//! reconstructor that groups those statements into named, non-overlapping
//! functions; and a CFG builder that derives one function's control-flow
//! graph on demand.
//!
//! # Pipeline
//!
//! - **Instruction classifier** ([`classifier`]): pure functions decoding a
//!   single 32-bit ARM word.
//! - **Reachability walker** ([`walker`]): follows execution from a seed
//!   address, recursively exploring branch targets.
//! - **Function reconstructor** ([`reconstruct`]): groups statements into
//!   functions, resolves call targets, reconciles overlaps, attaches
//!   syscalls.
//! - **CFG builder** ([`cfg`]): derives one function's control-flow graph.
//!
//! [`decompile`] drives the whole pipeline end to end, matching the
//! original project's `decompile()` entry point: walk from the ELF entry
//! point, optionally detect and re-walk from `main()` through the stdlib
//! heuristic, reconstruct functions, and attach syscalls.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use arm_decompiler::{decompile, loader::elf::ElfImage};
//!
//! fn main() -> arm_decompiler::error::Result<()> {
//!     let image = ElfImage::open("path/to/binary")?;
//!     let program = decompile(&image)?;
//!     println!("{} functions found", program.functions.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]

pub mod cfg;
pub mod classifier;
pub mod error;
pub mod formatter;
pub mod interval;
pub mod loader;
pub mod reconstruct;
pub mod stdlib;
pub mod syscalls;
pub mod types;
pub mod walker;

use loader::ProgramImage;
use types::{Address, BranchKind, Condition, ProgramModel, Statement};

pub use error::{DecompilerError, Result};

/// Runs the full decompilation pipeline over `image`: walks from the entry
/// point, detects and re-walks through the stdlib startup shape if present,
/// reconstructs functions, and attaches syscalls.
///
/// Mirrors the original project's `decompile()`: the entry point is first
/// wrapped in an artificial seed BRANCH statement at address 0 (so the
/// reconstructor's "seed the first function from the first statement's
/// `to_addr`" step has something to read), then walked. If the resulting
/// statement list has the conventional `_start` → `__libc_start_main` →
/// `main` shape (see [`stdlib`]), every address reached so far is
/// remembered as "stdlib", the call-to-main statement's target is rewritten
/// to the real `main` address, and a second walk explores from there.
pub fn decompile(image: &dyn ProgramImage) -> Result<ProgramModel> {
    let mut model = ProgramModel::new();

    let entry = image.entry_point();
    model
        .statements
        .push(Statement::branch(0, BranchKind::Jump, Condition::Unconditional, entry));
    walker::walk(image, &mut model, entry)?;

    let config = stdlib::StdlibHeuristicConfig::default();
    if let Some(detection) = stdlib::detect(&model.statements, image, &config)? {
        let stdlib_addrs = detection.stdlib_addrs.clone();
        model.statements[detection.call_to_main_index].to_addr = detection.main_function;
        walker::walk(image, &mut model, detection.main_function)?;

        reconstruct::reconstruct(image, &mut model)?;
        reconstruct::mark_stdlib(&mut model, &stdlib_addrs);
    } else {
        reconstruct::reconstruct(image, &mut model)?;
    }

    Ok(model)
}

/// Resolves a CLI-style function reference: a `0x`-prefixed hex address, or
/// a symbol name looked up in `image`. Returns `None` if neither resolves.
pub fn resolve_function_reference(image: &dyn ProgramImage, reference: &str) -> Option<Address> {
    if let Some(hex) = reference.strip_prefix("0x").or_else(|| reference.strip_prefix("0X")) {
        if let Ok(addr) = Address::from_str_radix(hex, 16) {
            return Some(addr);
        }
    }
    image.symbol_address(reference)
}
