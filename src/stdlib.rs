//! Stdlib/`_start` detection heuristic.
//!
//! Grounded on the exact two-needle shape in `decompiler.c: decompile()`:
//! among the BRANCH statements produced by the entry walk, the *second* one
//! (index `j == 1`) is checked for being an unconditional CALL at
//! `entry_branch.to_addr + 0x28` — the conventional offset from `_start` to
//! its call into `__libc_start_main` for one specific toolchain. If that
//! matches, `main`'s address is read from a fixed pipeline-relative literal,
//! and the scan continues (without resetting `j`) for a further
//! unconditional CALL at `libc_start_main + 0x1a8`, which is the statement
//! whose `to_addr` gets rewritten to point at `main` before a second walk.
//!
//! This is a fragile, single-toolchain heuristic by design (see spec §9's
//! open question) — it must degrade to "no stdlib shown" whenever the shape
//! doesn't match, which is exactly what returning `Ok(None)` does.

use std::collections::HashSet;

use crate::error::Result;
use crate::loader::ProgramImage;
use crate::types::{Address, BranchKind, Condition, Statement, StatementKind};

/// The hard-coded offsets this heuristic looks for, named instead of left as
/// magic numbers scattered through the walker.
#[derive(Debug, Clone, Copy)]
pub struct StdlibHeuristicConfig {
    /// Offset from `_start`'s first call target to its call into
    /// `__libc_start_main`.
    pub libc_start_main_offset: u32,
    /// Offset from `__libc_start_main` to its call into `main`.
    pub main_call_offset: u32,
    /// Fixed address of the literal word holding `main`'s address.
    pub main_pointer_addr: Address,
}

impl Default for StdlibHeuristicConfig {
    fn default() -> Self {
        StdlibHeuristicConfig {
            libc_start_main_offset: 0x28,
            main_call_offset: 0x1a8,
            main_pointer_addr: 0x8184,
        }
    }
}

/// Result of a successful stdlib-shape match.
pub struct StdlibDetection {
    /// The real `main()` address, read from the fixed literal.
    pub main_function: Address,
    /// Index into the statement list of the CALL whose `to_addr` should be
    /// rewritten to `main_function`.
    pub call_to_main_index: usize,
    /// Every branch target seen in the entry walk so far, to be remembered
    /// as "reached via startup" once functions exist.
    pub stdlib_addrs: HashSet<Address>,
}

/// Scans `statements` (as produced by the entry-point walk) for the
/// conventional `_start` → `__libc_start_main` → `main` shape. Returns
/// `Ok(None)` if the shape doesn't match — this is the common case for any
/// binary not built by the one toolchain the offsets were hard-coded for.
pub fn detect(
    statements: &[Statement],
    image: &dyn ProgramImage,
    config: &StdlibHeuristicConfig,
) -> Result<Option<StdlibDetection>> {
    let entry_to_addr = statements.first().map(|s| s.to_addr).unwrap_or(0);

    let mut j: u32 = 0;
    let mut libc_start_main: Option<Address> = None;
    let mut main_function: Address = 0;

    for (i, s) in statements.iter().enumerate() {
        if s.kind != StatementKind::Branch {
            continue;
        }

        if j == 1
            && s.br_kind == Some(BranchKind::Call)
            && s.cond == Some(Condition::Unconditional)
            && s.addr == entry_to_addr.wrapping_add(config.libc_start_main_offset)
        {
            libc_start_main = Some(s.to_addr);
            main_function = image.read_instruction(config.main_pointer_addr)?;
        } else if let Some(lsm) = libc_start_main {
            if s.br_kind == Some(BranchKind::Call)
                && s.cond == Some(Condition::Unconditional)
                && s.addr == lsm.wrapping_add(config.main_call_offset)
            {
                let stdlib_addrs = statements
                    .iter()
                    .filter(|st| st.to_addr != 0)
                    .map(|st| st.to_addr)
                    .collect();
                return Ok(Some(StdlibDetection {
                    main_function,
                    call_to_main_index: i,
                    stdlib_addrs,
                }));
            }
        }

        j += 1;
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BranchKind, Condition, Statement};
    use std::collections::HashMap;

    struct FakeImage {
        entry: Address,
        words: HashMap<Address, u32>,
    }

    impl ProgramImage for FakeImage {
        fn read_instruction(&self, addr: Address) -> Result<u32> {
            self.words
                .get(&addr)
                .copied()
                .ok_or(crate::error::DecompilerError::FatalMemory { addr })
        }
        fn entry_point(&self) -> Address {
            self.entry
        }
        fn symbol_name(&self, _addr: Address) -> Option<&str> {
            None
        }
        fn symbol_address(&self, _name: &str) -> Option<Address> {
            None
        }
    }

    #[test]
    fn detects_the_conventional_start_shape() {
        let entry_to_addr = 0x8000u32;
        let libc_start_main = 0x8200u32;
        let statements = vec![
            // Artificial seed branch prepended by the walker (j == 0).
            Statement::branch(0, BranchKind::Jump, Condition::Unconditional, entry_to_addr),
            // The second branch (j == 1): the call into __libc_start_main.
            Statement::branch(
                entry_to_addr + 0x28,
                BranchKind::Call,
                Condition::Unconditional,
                libc_start_main,
            ),
            // The call into main, further down.
            Statement::branch(
                libc_start_main + 0x1a8,
                BranchKind::Call,
                Condition::Unconditional,
                0xDEAD,
            ),
        ];
        let mut words = HashMap::new();
        words.insert(0x8184, 0x8050);
        let image = FakeImage {
            entry: entry_to_addr,
            words,
        };

        let detection = detect(&statements, &image, &StdlibHeuristicConfig::default())
            .unwrap()
            .expect("shape should match");
        assert_eq!(detection.main_function, 0x8050);
        assert_eq!(detection.call_to_main_index, 2);
        assert!(detection.stdlib_addrs.contains(&libc_start_main));
    }

    #[test]
    fn degrades_gracefully_when_shape_does_not_match() {
        let statements = vec![Statement::branch(
            0,
            BranchKind::Jump,
            Condition::Unconditional,
            0x8000,
        )];
        let image = FakeImage {
            entry: 0x8000,
            words: HashMap::new(),
        };
        let result = detect(&statements, &image, &StdlibHeuristicConfig::default()).unwrap();
        assert!(result.is_none());
    }
}
