//! CFG Builder: constructs the intra-function control-flow graph.
//!
//! Grounded on `rp_dump_cfg_for_function` in `rebuilt_program.c`. The
//! original builds an array of `cfg_node` with raw statement pointers and a
//! bubble-style fixed-point pruning pass; this keeps the same five-step
//! shape (seed nodes, sort+dedupe, attach statements, make edges, prune)
//! but nodes reference a function's statement by index rather than by
//! pointer, and edges are `Option<usize>` indices into the node vector
//! rather than `-1`-sentinel `int`s.

use crate::types::{BranchKind, Condition, Function, StatementKind};

/// The kind of a CFG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    /// A regular basic-block anchor: entry, exit, branch source/target.
    Node,
    /// A labelled box representing a call or jump-out target.
    Function,
    /// A labelled box representing a syscall target.
    SysFunction,
}

/// One node in a function's control-flow graph.
#[derive(Debug, Clone)]
pub struct CfgNode {
    pub addr: u32,
    pub kind: NodeKind,
    /// Index into the owning function's `statements`, if this node
    /// coincides with a classified statement.
    pub stmt_idx: Option<usize>,
    pub child1: Option<usize>,
    pub child2: Option<usize>,
    pub show: bool,
}

/// Builds the control-flow graph for `f`. Returns the full node list with
/// `show` already set by the pruning pass — callers that want only the
/// visible graph should filter on `show`.
pub fn build(f: &Function) -> Vec<CfgNode> {
    let mut nodes = seed_nodes(f);
    sort_and_dedupe(&mut nodes);
    attach_statements(&mut nodes, f);
    make_edges(&mut nodes, f);
    prune(&mut nodes, f);
    hide_unreachable_exit(&mut nodes, f);
    nodes
}

fn plain(addr: u32, kind: NodeKind) -> CfgNode {
    CfgNode {
        addr,
        kind,
        stmt_idx: None,
        child1: None,
        child2: None,
        show: true,
    }
}

fn seed_nodes(f: &Function) -> Vec<CfgNode> {
    let mut nodes = Vec::new();
    nodes.push(plain(f.vaddr_start, NodeKind::Node));

    for s in &f.statements {
        match s.kind {
            StatementKind::Branch if s.br_kind == Some(BranchKind::Jump) => {
                nodes.push(plain(s.addr, NodeKind::Node));
                let outside = s.to_addr == 0 || s.to_addr < f.vaddr_start || s.to_addr >= f.vaddr_end;
                if outside {
                    nodes.push(plain(s.addr, NodeKind::Function));
                } else {
                    nodes.push(plain(s.to_addr, NodeKind::Node));
                }
                if s.cond == Some(Condition::Conditional) {
                    nodes.push(plain(s.addr + 4, NodeKind::Node));
                }
            }
            StatementKind::Branch if s.br_kind == Some(BranchKind::Call) => {
                nodes.push(plain(s.addr, NodeKind::Node));
                nodes.push(plain(s.addr, NodeKind::Function));
                nodes.push(plain(s.addr + 4, NodeKind::Node));
            }
            StatementKind::Syscall => {
                nodes.push(plain(s.addr, NodeKind::Node));
                nodes.push(plain(s.addr, NodeKind::SysFunction));
                nodes.push(plain(s.addr + 4, NodeKind::Node));
            }
            StatementKind::Branch if s.br_kind == Some(BranchKind::Return) => {
                nodes.push(plain(s.addr, NodeKind::Node));
            }
            _ => {}
        }
    }

    nodes.push(plain(f.vaddr_end, NodeKind::Node));
    nodes
}

fn sort_and_dedupe(nodes: &mut Vec<CfgNode>) {
    nodes.sort_by(|a, b| a.addr.cmp(&b.addr).then(a.kind.cmp(&b.kind)));
    nodes.dedup_by(|a, b| a.addr == b.addr && a.kind == b.kind);
}

/// Attaches the statement at matching address to every node sharing that
/// address, mirroring the original's address-only merge (a NODE and its
/// co-located FUNCTION/SYSFUNCTION both receive the same statement).
fn attach_statements(nodes: &mut [CfgNode], f: &Function) {
    for (stmt_idx, s) in f.statements.iter().enumerate() {
        for n in nodes.iter_mut() {
            if n.addr == s.addr {
                n.stmt_idx = Some(stmt_idx);
            }
        }
    }
}

fn find_ge(nodes: &[CfgNode], from: usize, addr: u32) -> Option<usize> {
    (from..nodes.len()).find(|&j| nodes[j].addr >= addr)
}

fn find_node_at(nodes: &[CfgNode], addr: u32, kind: NodeKind) -> Option<usize> {
    nodes.iter().position(|n| n.addr == addr && n.kind == kind)
}

fn make_edges(nodes: &mut [CfgNode], f: &Function) {
    let len = nodes.len();
    for i in 0..len {
        let addr = nodes[i].addr;
        let kind = nodes[i].kind;
        let stmt_idx = nodes[i].stmt_idx;

        if kind == NodeKind::Node && addr == f.vaddr_end {
            continue;
        }

        let Some(stmt_idx) = stmt_idx else {
            nodes[i].child1 = find_ge(nodes, i + 1, addr + 4);
            continue;
        };
        let s = &f.statements[stmt_idx];

        let is_tail_jump_function =
            kind == NodeKind::Function && s.kind == StatementKind::Branch && s.br_kind == Some(BranchKind::Jump);
        if (s.cond == Some(Condition::Conditional)
            || kind == NodeKind::SysFunction
            || kind == NodeKind::Function)
            && !is_tail_jump_function
        {
            nodes[i].child1 = find_ge(nodes, i + 1, addr + 4);
        }

        if kind == NodeKind::Node {
            if s.br_kind == Some(BranchKind::Return) {
                nodes[i].child2 = find_node_at(nodes, f.vaddr_end, NodeKind::Node);
            } else if s.kind == StatementKind::Branch
                && s.br_kind == Some(BranchKind::Jump)
                && s.to_addr != 0
                && s.to_addr >= f.vaddr_start
                && s.to_addr < f.vaddr_end
            {
                nodes[i].child2 = find_node_at(nodes, s.to_addr, NodeKind::Node);
            } else if s.kind == StatementKind::Syscall
                || (s.kind == StatementKind::Branch
                    && matches!(s.br_kind, Some(BranchKind::Jump) | Some(BranchKind::Call)))
            {
                nodes[i].child2 = (i + 1..len).find(|&j| {
                    nodes[j].addr == addr
                        && matches!(nodes[j].kind, NodeKind::Function | NodeKind::SysFunction)
                });
            }
        }
    }
}

/// Iterates to a fixed point, hiding any NODE (not entry, not exit) with
/// exactly one parent and at most one child, where either the parent or the
/// child is also a NODE, rerouting the parent's pointer past it.
fn prune(nodes: &mut [CfgNode], f: &Function) {
    let mut changed = true;
    while changed {
        changed = false;
        let len = nodes.len();
        for i in 0..len {
            if !nodes[i].show {
                continue;
            }
            if nodes[i].kind != NodeKind::Node
                || nodes[i].addr == f.vaddr_start
                || nodes[i].addr == f.vaddr_end
            {
                continue;
            }

            let mut parents = 0usize;
            let mut single_parent = None;
            for j in 0..len {
                if nodes[j].child1 == Some(i) || nodes[j].child2 == Some(i) {
                    parents += 1;
                    single_parent = Some(j);
                }
            }

            let child_count =
                usize::from(nodes[i].child1.is_some()) + usize::from(nodes[i].child2.is_some());
            let single_child = if child_count == 1 {
                nodes[i].child1.or(nodes[i].child2)
            } else {
                None
            };

            let ok_neighbor = child_count == 0
                || single_parent.map(|p| nodes[p].kind == NodeKind::Node) == Some(true)
                || single_child.map(|c| nodes[c].kind == NodeKind::Node) == Some(true);

            if parents == 1 && child_count <= 1 && ok_neighbor {
                let parent = single_parent.expect("parents == 1");
                if nodes[parent].child1 == Some(i) {
                    nodes[parent].child1 = single_child;
                } else {
                    nodes[parent].child2 = single_child;
                }
                nodes[i].show = false;
                nodes[i].child1 = None;
                nodes[i].child2 = None;
                changed = true;
            }
        }
    }
}

/// Hides the exit node unless some visible node still points to it.
fn hide_unreachable_exit(nodes: &mut [CfgNode], f: &Function) {
    let Some(exit_idx) = find_node_at(nodes, f.vaddr_end, NodeKind::Node) else {
        return;
    };
    nodes[exit_idx].show = false;
    for i in 0..nodes.len() {
        if nodes[i].show && (nodes[i].child1 == Some(exit_idx) || nodes[i].child2 == Some(exit_idx)) {
            nodes[exit_idx].show = true;
            break;
        }
    }
}
