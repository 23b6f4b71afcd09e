//! Program loading: the external collaborator the decompilation core reads
//! through, kept behind a trait so the core never depends on a concrete file
//! format.
//!
//! Spec §6 describes this surface abstractly (`open`, `read_instruction`,
//! `entry_point`, `symbol_name`, `symbol_address`); [`elf`] supplies the only
//! concrete implementation this crate ships, an ELF32 ARM executable reader
//! grounded on `vm.c`/`vm.h` from the original project.

pub mod elf;

use crate::error::Result;
use crate::types::Address;

/// Everything the decompilation core needs from a loaded program image.
///
/// Implementations are expected to be read-only and immutable once
/// constructed (see spec §5: the program image is read-only after loading).
pub trait ProgramImage {
    /// Reads the 32-bit little-endian word at `addr`. Fails with
    /// `FatalMemory` if `addr` falls outside every loaded, allocatable
    /// section.
    fn read_instruction(&self, addr: Address) -> Result<u32>;

    /// The program's entry point address.
    fn entry_point(&self) -> Address;

    /// The symbol whose value equals `addr`, if one exists.
    fn symbol_name(&self, addr: Address) -> Option<&str>;

    /// The address of the symbol named `name`, if one exists.
    fn symbol_address(&self, name: &str) -> Option<Address>;
}
