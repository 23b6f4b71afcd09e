//! Instruction classifier: pure functions decoding a single 32-bit ARM word.
//!
//! Grounded on `arm_instructions.c` from the original project, restated as
//! stateless functions over `u32` rather than functions taking a `vm_program`
//! out-parameter. The bit-level dispatch in [`is_branch`] follows the
//! original's `threebits`/`opcode` switch exactly, including its dead
//! `rn == 3` sub-case (the original's own comment calls it "temporaire, juste
//! pour débuter" — a no-op path that never runs because nothing sets
//! `branch_to` there either): this crate simply never reaches it, since the
//! observable result (branch=true, target=0) doesn't depend on `rn`.

use crate::error::{DecompilerError, Result};
use crate::types::Address;

/// `mov r7, #imm` — the canonical syscall-number setup before an `svc`.
const MOV_R7_MASK: u32 = 0xFFFF_F000;
const MOV_R7_PATTERN: u32 = 0xE3A0_7000;

const RETURN_BX_LR: u32 = 0xE12F_FF1E;
const RETURN_LDMFD: u32 = 0xE8BD_8800;

const NOP: u32 = 0xE1A0_0000;

/// The hand-rolled call idiom: `mov lr, pc` immediately before a dynamic
/// branch. Checking only the single preceding instruction is deliberate —
/// see the spec's design note against generalizing this into a full
/// register-tracking pass.
pub const MOV_LR_PC: u32 = 0xE1A0_E00F;

/// bits[31:28] >= 0xE, i.e. condition field AL (always) or unpredictable 0xF.
pub fn is_unconditional(instr: u32) -> bool {
    (instr >> 28) & 0xF >= 0xE
}

pub fn is_nop(instr: u32) -> bool {
    instr == NOP
}

/// bits[27:24] == 0xF: SWI/SVC.
pub fn is_software_interrupt(instr: u32) -> bool {
    (instr >> 24) & 0xF == 0xF
}

/// Decodes `mov r7, #imm`'s rotated 8-bit immediate. Returns `None` if the
/// instruction isn't that exact form.
pub fn mov_r7_immediate_value(instr: u32) -> Option<u32> {
    if instr & MOV_R7_MASK != MOV_R7_PATTERN {
        return None;
    }
    let imm8 = instr & 0xFF;
    let rot = ((instr >> 8) & 0xF) * 2;
    Some(imm8.rotate_right(rot))
}

/// bits[27:20] == 0x59 and bits[19:16] == 15: a load/store at a PC-relative
/// immediate offset. Only the positive-offset form is recognised; negative
/// offsets are not resolved in this release (matching the original's
/// unfinished `TODO: What if negative offset?`).
pub fn is_pc_relative_load_store(instr: u32) -> bool {
    (instr >> 20) & 0xFF == 0x59 && (instr >> 16) & 0xF == 15
}

/// Target of a PC-relative load/store, accounting for ARM's `pc+8` pipeline
/// offset.
pub fn pc_relative_load_store_target(pc: Address, instr: u32) -> Address {
    pc.wrapping_add(instr & 0xFFF).wrapping_add(8)
}

/// Decodes whether `instr` writes to PC (R15), and if so, a statically
/// computable target address (0 when the target is dynamic).
///
/// Dispatches on bits[27:25] per the ARM instruction class table. Returns
/// `Err(FatalDecode)` for BLX(1), which targets Thumb code that cannot exist
/// in ARMv5-only input.
pub fn is_branch(pc: Address, instr: u32) -> Result<(bool, Address)> {
    let bits27_25 = (instr >> 25) & 0x7;
    let opcode = (instr >> 21) & 0xF;
    let rd = (instr >> 12) & 0xF;
    let l = (instr >> 20) & 0x1;

    match bits27_25 {
        // Data-processing register, or the BX/BXJ/BLX(2) dynamic-branch subcase.
        0 => {
            if (opcode >> 2) != 2 && rd == 15 {
                Ok((true, 0))
            } else if opcode == 9 && (instr >> 6) & 0x3 == 0 && (instr >> 4) & 0x3 > 0 {
                Ok((true, 0))
            } else {
                Ok((false, 0))
            }
        }
        // Data-processing immediate.
        1 => Ok(((opcode >> 2) != 2 && rd == 15, 0)),
        // Load/store immediate offset.
        2 => Ok((l == 1 && rd == 15, 0)),
        // Load/store register offset.
        3 => Ok((l == 1 && rd == 15, 0)),
        // Load/store multiple: branch iff loading and PC (bit 15) is in the register list.
        4 => Ok((l == 1 && (instr >> 15) & 1 == 1, 0)),
        // B / BL / BLX(1).
        5 => {
            if (instr >> 28) & 0xF == 0xF {
                return Err(DecompilerError::FatalDecode {
                    pc,
                    reason: "BLX(1) instruction (Thumb target) is unsupported".into(),
                });
            }
            let imm24 = instr & 0x00FF_FFFF;
            let signed = if imm24 & 0x0080_0000 != 0 {
                0xFE00_0000u32 | (imm24 << 2)
            } else {
                imm24 << 2
            };
            let target = pc.wrapping_add(8).wrapping_add(signed);
            Ok((true, target))
        }
        _ => unreachable!("3-bit field can only take values 0..=7"),
    }
}

/// Given that `instr` is already known to be a branch, tests if it's a
/// "branch and link" (sets the return address).
pub fn is_bl(instr: u32) -> bool {
    let bits27_25 = (instr >> 25) & 0x7;
    if bits27_25 == 5 {
        (instr >> 24) & 1 == 1
    } else if (instr >> 20) & 0xFF == 0x12 && (instr >> 6) & 0x3 == 0 && (instr >> 4) & 0x3 > 0 {
        (instr >> 4) & 0x3 == 3
    } else {
        false
    }
}

/// `bx lr` or `ldmfd sp!, {pc}`.
pub fn is_return(instr: u32) -> bool {
    instr == RETURN_BX_LR || instr == RETURN_LDMFD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconditional_b_to_self_plus_8() {
        let pc = 0x1000;
        let (branch, target) = is_branch(pc, 0xEA00_0000).unwrap();
        assert!(branch);
        assert_eq!(target, pc + 8);
    }

    #[test]
    fn branch_to_itself_with_negative_offset() {
        let pc = 0x1000;
        let (branch, target) = is_branch(pc, 0xEAFF_FFFE).unwrap();
        assert!(branch);
        assert_eq!(target, pc);
    }

    #[test]
    fn bx_lr_is_branch_with_dynamic_target_and_is_a_return() {
        let (branch, target) = is_branch(0x1000, RETURN_BX_LR).unwrap();
        assert!(branch);
        assert_eq!(target, 0);
        assert!(is_return(RETURN_BX_LR));
    }

    #[test]
    fn nop_recognition() {
        assert!(is_nop(0xE1A0_0000));
        assert!(!is_nop(0xE1A0_0001));
    }

    #[test]
    fn mov_r7_immediate_decoding() {
        assert_eq!(mov_r7_immediate_value(0xE3A0_7001), Some(1));
        assert_eq!(mov_r7_immediate_value(0xE3A0_7000), Some(0));
        assert_eq!(mov_r7_immediate_value(0xE1A0_0000), None);
    }

    #[test]
    fn pc_relative_load_store_recognition_and_target() {
        assert!(is_pc_relative_load_store(0xE59F_1008));
        assert_eq!(pc_relative_load_store_target(0x1000, 0xE59F_1008), 0x1010);
    }

    #[test]
    fn blx1_is_a_fatal_decode_error() {
        // threebits == 5, bits[31:28] == 0xF.
        let instr = 0xFA00_0000u32;
        let err = is_branch(0x1000, instr).unwrap_err();
        match err {
            DecompilerError::FatalDecode { pc, .. } => assert_eq!(pc, 0x1000),
            other => panic!("expected FatalDecode, got {other:?}"),
        }
    }

    #[test]
    fn bl_sets_link_bit_for_class_5() {
        // bl with positive offset: 0xEB000002 -> bits27:25=101, bit24=1.
        assert!(is_bl(0xEB00_0002));
        // plain b: bit24 clear.
        assert!(!is_bl(0xEA00_0000));
    }

    #[test]
    fn non_pc_writing_data_processing_is_not_a_branch() {
        // add r0, r1, r2 -- does not target r15.
        let (branch, _) = is_branch(0x1000, 0xE080_0001).unwrap();
        assert!(!branch);
    }
}
