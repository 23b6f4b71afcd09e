//! Function reconstructor: groups the flat statement list into functions,
//! names them, resolves call/jump targets, reconciles overlapping bounds,
//! and attaches syscalls.
//!
//! Grounded on `decompile_search_functions`/`decompile_search_syscalls` in
//! `decompiler.c` and `rp_fix_overlapping_functions`/
//! `rp_check_overlapping_functions` in `rebuilt_program.c`.

use std::collections::HashSet;

use crate::classifier;
use crate::error::Result;
use crate::loader::ProgramImage;
use crate::types::{
    Address, BranchKind, Condition, Function, ProgramModel, Statement, StatementKind,
};

/// Runs the full reconstruction pipeline over `model.statements`: sort,
/// seed the first function from the entry branch, discover the rest,
/// reconcile overlaps, and attach syscalls.
pub fn reconstruct(image: &dyn ProgramImage, model: &mut ProgramModel) -> Result<()> {
    if model.statements.is_empty() {
        return Ok(());
    }

    model.statements.sort_by_key(|s| s.addr);

    let entry_vaddr = model.statements[0].to_addr;
    let f0 = add_function(model, entry_vaddr, image)?;
    model.statements[0].to_function = Some(f0);
    model.entry_function = Some(f0);

    let mut f_id = 0;
    while f_id < model.functions.len() {
        discover_function(model, f_id, image)?;
        f_id += 1;
    }

    reconcile_overlaps(model);
    search_syscalls(image, model)?;

    Ok(())
}

fn add_function(model: &mut ProgramModel, vaddr: Address, image: &dyn ProgramImage) -> Result<usize> {
    let id = model.functions.len();
    let name = name_function(image, vaddr, id);
    model.functions.push(Function::new(id, vaddr, name));
    Ok(id)
}

fn get_or_create_function(
    model: &mut ProgramModel,
    vaddr: Address,
    image: &dyn ProgramImage,
) -> Result<usize> {
    if let Some(idx) = model.function_by_vaddr(vaddr) {
        return Ok(idx);
    }
    add_function(model, vaddr, image)
}

/// Queries the symbol table at `vaddr`; falls back to `f<id>` (spec §4.4.1).
fn name_function(image: &dyn ProgramImage, vaddr: Address, id: usize) -> String {
    match image.symbol_name(vaddr) {
        Some(name) => name.to_string(),
        None => format!("f{id}"),
    }
}

fn append_statement(model: &mut ProgramModel, f_id: usize, stmt_idx: usize) {
    let s = model.statements[stmt_idx].clone();
    model.functions[f_id].statements.push(s);
}

/// Discovers the body of `model.functions[f_id]`: scans forward from its
/// first statement, tracking a running `f_end` lower bound on how far the
/// function may still extend, until a definitive terminator is found (or
/// statements run out).
fn discover_function(model: &mut ProgramModel, f_id: usize, image: &dyn ProgramImage) -> Result<()> {
    let vaddr_start = model.functions[f_id].vaddr_start;
    let start_idx = model.statements.partition_point(|s| s.addr < vaddr_start);

    let mut f_end: Address = 0;
    let mut i = start_idx;

    while i < model.statements.len() {
        let addr = model.statements[i].addr;
        let kind = model.statements[i].kind;
        let br_kind = model.statements[i].br_kind;
        let cond = model.statements[i].cond;
        let to_addr = model.statements[i].to_addr;

        if kind == StatementKind::Nop || kind == StatementKind::Word {
            if f_end <= addr.wrapping_add(4) {
                model.functions[f_id].vaddr_end = addr;
                return Ok(());
            }
            i += 1;
            continue;
        }

        if kind == StatementKind::Branch && br_kind == Some(BranchKind::Return) {
            append_statement(model, f_id, i);
            if f_end <= addr.wrapping_add(4) {
                model.functions[f_id].vaddr_end = addr.wrapping_add(4);
                return Ok(());
            }
        } else if kind == StatementKind::Branch
            && br_kind == Some(BranchKind::Jump)
            && cond == Some(Condition::Unconditional)
        {
            append_statement(model, f_id, i);
            if f_end <= addr.wrapping_add(4) {
                model.functions[f_id].vaddr_end = addr.wrapping_add(4);
                if to_addr != 0 && (to_addr < vaddr_start || to_addr >= addr.wrapping_add(4)) {
                    let f2 = get_or_create_function(model, to_addr, image)?;
                    model.statements[i].to_function = Some(f2);
                }
                return Ok(());
            }
            f_end = f_end.max(to_addr.wrapping_add(4));
        } else if kind == StatementKind::Branch && br_kind == Some(BranchKind::Jump) && to_addr != 0 {
            // Conditional jump (or any jump not caught above) with a known target.
            f_end = f_end.max(to_addr.wrapping_add(4));
            append_statement(model, f_id, i);
        } else if kind == StatementKind::Branch && br_kind == Some(BranchKind::Call) && to_addr != 0 {
            let f2 = get_or_create_function(model, to_addr, image)?;
            model.statements[i].to_function = Some(f2);
            append_statement(model, f_id, i);
        } else {
            append_statement(model, f_id, i);
        }

        i += 1;
    }

    // Statement list exhausted without an explicit terminator; bound the
    // function at its last recorded statement.
    model.functions[f_id].vaddr_end = match model.functions[f_id].statements.last() {
        Some(last) => last.addr.wrapping_add(4),
        None => vaddr_start,
    };
    Ok(())
}

/// Truncates every overlapping pair `(f, g)` so their ranges no longer
/// intersect, favoring whichever function starts first.
pub fn reconcile_overlaps(model: &mut ProgramModel) {
    let n = model.functions.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (f_start, f_end) = (model.functions[i].vaddr_start, model.functions[i].vaddr_end);
            let (g_start, g_end) = (model.functions[j].vaddr_start, model.functions[j].vaddr_end);
            if f_end > g_start && f_start < g_end {
                if f_start < g_start {
                    model.functions[i].vaddr_end = g_start;
                } else {
                    model.functions[j].vaddr_end = f_start;
                }
            }
        }
    }
}

/// Diagnostic-only pass that lists every still-overlapping function pair.
/// Never wired into the default pipeline (matching the original, where
/// `rp_check_overlapping_functions` is present but commented out of
/// `decompile()` in favor of the fixup pass); useful from tests or a
/// `--debug-overlaps` flag.
pub fn report_overlaps(model: &ProgramModel) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let n = model.functions.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let f = &model.functions[i];
            let g = &model.functions[j];
            if f.vaddr_end > g.vaddr_start && f.vaddr_start < g.vaddr_end {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Scans every function's address range for software-interrupt instructions,
/// recovering the syscall number from a preceding `mov r7, #imm` at `pc-4`
/// (falling back to `pc-8`).
fn search_syscalls(image: &dyn ProgramImage, model: &mut ProgramModel) -> Result<()> {
    for f_id in 0..model.functions.len() {
        let (start, end) = (
            model.functions[f_id].vaddr_start,
            model.functions[f_id].vaddr_end,
        );
        let mut pc = start;
        while pc < end {
            let instr = image.read_instruction(pc)?;
            if classifier::is_software_interrupt(instr) {
                let prev4 = image.read_instruction(pc.wrapping_sub(4))?;
                let value = match classifier::mov_r7_immediate_value(prev4) {
                    Some(v) => v as i64,
                    None => {
                        let prev8 = image.read_instruction(pc.wrapping_sub(8))?;
                        match classifier::mov_r7_immediate_value(prev8) {
                            Some(v) => v as i64,
                            None => -1,
                        }
                    }
                };
                model.functions[f_id]
                    .statements
                    .push(Statement::syscall(pc, value));
            }
            pc = pc.wrapping_add(4);
        }
        model.functions[f_id].statements.sort_by_key(|s| s.addr);
    }
    Ok(())
}

/// Flags every function whose start address was reached only via the
/// startup/stdlib walk (see `stdlib.rs`) as `from_stdlib`.
pub fn mark_stdlib(model: &mut ProgramModel, stdlib_addrs: &HashSet<Address>) {
    for f in &mut model.functions {
        if stdlib_addrs.contains(&f.vaddr_start) {
            f.from_stdlib = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BranchKind, Condition, Statement};
    use std::collections::HashMap;

    struct FakeImage {
        entry: Address,
        words: HashMap<Address, u32>,
        symbols: HashMap<Address, &'static str>,
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
        fn symbol_name(&self, addr: Address) -> Option<&str> {
            self.symbols.get(&addr).copied()
        }
        fn symbol_address(&self, _name: &str) -> Option<Address> {
            None
        }
    }

    fn single_return_function_statements() -> Vec<Statement> {
        vec![
            Statement::branch(0, BranchKind::Jump, Condition::Unconditional, 0x8000),
            Statement::branch(0x8000, BranchKind::Return, Condition::Unconditional, 0),
        ]
    }

    #[test]
    fn single_function_ending_in_return() {
        let mut model = ProgramModel::new();
        model.statements = single_return_function_statements();
        let image = FakeImage {
            entry: 0x8000,
            words: HashMap::new(),
            symbols: HashMap::new(),
        };

        reconstruct(&image, &mut model).unwrap();

        assert_eq!(model.functions.len(), 1);
        assert_eq!(model.functions[0].vaddr_start, 0x8000);
        assert_eq!(model.functions[0].vaddr_end, 0x8004);
        assert_eq!(model.functions[0].name, "f0");
    }

    #[test]
    fn names_function_from_symbol_table_when_present() {
        let mut model = ProgramModel::new();
        model.statements = single_return_function_statements();
        let mut symbols = HashMap::new();
        symbols.insert(0x8000, "main");
        let image = FakeImage {
            entry: 0x8000,
            words: HashMap::new(),
            symbols,
        };

        reconstruct(&image, &mut model).unwrap();
        assert_eq!(model.functions[0].name, "main");
    }

    #[test]
    fn forward_call_produces_two_functions() {
        let mut model = ProgramModel::new();
        model.statements = vec![
            Statement::branch(0, BranchKind::Jump, Condition::Unconditional, 0x8000),
            Statement::branch(0x8000, BranchKind::Call, Condition::Unconditional, 0x8010),
            Statement::branch(0x8004, BranchKind::Return, Condition::Unconditional, 0),
            Statement::branch(0x8010, BranchKind::Return, Condition::Unconditional, 0),
        ];
        let image = FakeImage {
            entry: 0x8000,
            words: HashMap::new(),
            symbols: HashMap::new(),
        };

        reconstruct(&image, &mut model).unwrap();

        assert_eq!(model.functions.len(), 2);
        assert_eq!(model.functions[1].vaddr_start, 0x8010);
        let call_stmt = model.functions[0]
            .statements
            .iter()
            .find(|s| s.br_kind == Some(BranchKind::Call))
            .unwrap();
        assert_eq!(call_stmt.to_function, Some(1));
    }

    #[test]
    fn reconciliation_removes_all_overlaps() {
        let mut model = ProgramModel::new();
        model.functions.push(Function {
            vaddr_end: 0x8020,
            ..Function::new(0, 0x8000, "a".into())
        });
        model.functions.push(Function {
            vaddr_end: 0x8018,
            ..Function::new(1, 0x8010, "b".into())
        });

        reconcile_overlaps(&mut model);

        assert_eq!(model.functions[0].vaddr_end, 0x8010);
        assert_eq!(model.functions[1].vaddr_start, 0x8010);
        assert_eq!(model.functions[1].vaddr_end, 0x8018);
        assert!(report_overlaps(&model).is_empty());
    }

    #[test]
    fn syscall_discovery_reads_preceding_mov_r7() {
        let mut model = ProgramModel::new();
        model.statements = vec![
            Statement::branch(0, BranchKind::Jump, Condition::Unconditional, 0x8000),
            Statement::branch(0x8008, BranchKind::Return, Condition::Unconditional, 0),
        ];
        let mut words = HashMap::new();
        words.insert(0x8000, 0xE3A0_7001); // mov r7, #1
        words.insert(0x8004, 0xEF00_0000); // svc 0
        words.insert(0x8008, 0xE12F_FF1E); // bx lr
        let image = FakeImage {
            entry: 0x8000,
            words,
            symbols: HashMap::new(),
        };

        reconstruct(&image, &mut model).unwrap();

        let syscall = model.functions[0]
            .statements
            .iter()
            .find(|s| s.kind == StatementKind::Syscall)
            .expect("expected a SYSCALL statement");
        assert_eq!(syscall.addr, 0x8004);
        assert_eq!(syscall.value, 1);
    }
}
