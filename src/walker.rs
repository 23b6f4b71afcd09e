//! Reachability walker: follows sequential execution from a seed address,
//! recursively exploring discovered branch targets, depositing classified
//! statements into the program model.
//!
//! Grounded on `decompile_search_branches` in `decompiler.c`. The original's
//! `to_explore` length-prefixed array, appended to while being iterated by
//! index, is exactly a FIFO worklist — modeled here with a `VecDeque`.

use std::collections::VecDeque;

use crate::classifier;
use crate::error::Result;
use crate::loader::ProgramImage;
use crate::types::{Address, BranchKind, Condition, ProgramModel, Statement, StatementKind};

/// Walks from `seed`, and transitively from every statically-resolved branch
/// target reached along the way, appending statements to `model` and
/// updating its explored interval set.
pub fn walk(image: &dyn ProgramImage, model: &mut ProgramModel, seed: Address) -> Result<()> {
    let mut worklist: VecDeque<Address> = VecDeque::new();
    worklist.push_back(seed);

    while let Some(start) = worklist.pop_front() {
        walk_one(image, model, start, &mut worklist)?;
    }

    Ok(())
}

fn walk_one(
    image: &dyn ProgramImage,
    model: &mut ProgramModel,
    start: Address,
    worklist: &mut VecDeque<Address>,
) -> Result<()> {
    let mut pc = start;
    let mut instr_prev: Option<u32> = None;

    loop {
        if model.explored.contains(pc) {
            break;
        }
        model.explored.add(pc, pc + 4);

        let instr = image.read_instruction(pc)?;

        let (is_branch, target) = classifier::is_branch(pc, instr)?;

        if is_branch {
            let br_kind = if classifier::is_return(instr) {
                BranchKind::Return
            } else if classifier::is_bl(instr) || instr_prev == Some(classifier::MOV_LR_PC) {
                BranchKind::Call
            } else {
                BranchKind::Jump
            };
            let cond = if classifier::is_unconditional(instr) {
                Condition::Unconditional
            } else {
                Condition::Conditional
            };

            let statement = Statement::branch(pc, br_kind, cond, target);
            let stops_scan =
                br_kind == BranchKind::Return || (br_kind == BranchKind::Jump && cond == Condition::Unconditional);

            if target != 0 {
                worklist.push_back(target);
            }
            model.statements.push(statement);

            if stops_scan {
                break;
            }
        } else if classifier::is_pc_relative_load_store(instr) {
            let data_addr = classifier::pc_relative_load_store_target(pc, instr);
            let value = image.read_instruction(data_addr)?;
            let word = Statement::word(data_addr, value);
            if !model.statements.contains(&word) {
                model.statements.push(word);
            }
            // Marks the data as explored so the walker never tries to
            // disassemble it as code.
            model.explored.add(data_addr, data_addr + 4);
        }

        instr_prev = Some(instr);
        pc += 4;
    }

    Ok(())
}
