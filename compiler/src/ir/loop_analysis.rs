//! Loop Analysis for MIR
//!
//! This module provides loop analysis infrastructure including:
//! - Dominator tree computation (iterative dataflow algorithm)
//! - Natural loop detection via back-edge identification
//! - Loop nesting info and constant trip counts of simple counted loops
//!
//! Every table that is iterated is ordered by block position so results are
//! reproducible across runs.

use super::{
    BinaryOp, CompareOp, IrBlockId, IrControlFlowGraph, IrFunction, IrId, IrInstruction,
    IrTerminator, IrType,
};
use fxhash::{FxHashMap, FxHashSet};
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Dominator tree for a function's control flow graph.
///
/// A block D dominates block B if every path from the entry to B goes through D.
/// The immediate dominator (idom) of B is the closest strict dominator.
/// Blocks unreachable from the entry are not part of the tree.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Immediate dominator for each block (entry block has no idom)
    idom: FxHashMap<IrBlockId, IrBlockId>,

    /// Dominator tree depth for each reachable block (entry = 0)
    depth: FxHashMap<IrBlockId, usize>,

    /// Entry block of the function
    entry: IrBlockId,
}

impl DominatorTree {
    /// Compute the dominator tree for a function using iterative dataflow.
    ///
    /// This uses Cooper, Harvey, and Kennedy's simple iterative algorithm
    /// which is efficient for typical CFGs and easy to understand.
    pub fn compute(function: &IrFunction) -> Self {
        let cfg = &function.cfg;
        let entry = cfg.entry_block;

        // Get blocks in reverse postorder for efficient iteration
        let rpo = Self::reverse_postorder(cfg, entry);
        let rpo_index: FxHashMap<IrBlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        // Initialize idom: entry dominates itself, others undefined
        let mut idom: FxHashMap<IrBlockId, Option<IrBlockId>> = FxHashMap::default();
        for &block in &rpo {
            idom.insert(block, None);
        }
        idom.insert(entry, Some(entry));

        // Iterative dataflow until fixed point
        let mut changed = true;
        while changed {
            changed = false;

            for &block in &rpo {
                if block == entry {
                    continue;
                }

                let predecessors: &[IrBlockId] = cfg
                    .get_block(block)
                    .map(|b| b.predecessors.as_slice())
                    .unwrap_or(&[]);

                let mut new_idom: Option<IrBlockId> = None;
                for &pred in predecessors {
                    // Only predecessors that already have a dominator participate
                    if idom.get(&pred).copied().flatten().is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(current, pred, &idom, &rpo_index),
                    });
                }

                if idom.get(&block).copied().flatten() != new_idom {
                    idom.insert(block, new_idom);
                    changed = true;
                }
            }
        }

        // Drop the entry's self-domination
        let mut final_idom: FxHashMap<IrBlockId, IrBlockId> = FxHashMap::default();
        for &block in &rpo {
            if block == entry {
                continue;
            }
            if let Some(Some(dom)) = idom.get(&block) {
                final_idom.insert(block, *dom);
            }
        }

        // Build children map in RPO so child lists are deterministic
        let mut children: FxHashMap<IrBlockId, Vec<IrBlockId>> = FxHashMap::default();
        for &block in &rpo {
            if let Some(&dom) = final_idom.get(&block) {
                children.entry(dom).or_default().push(block);
            }
        }

        // Compute depths via BFS from entry
        let mut depth: FxHashMap<IrBlockId, usize> = FxHashMap::default();
        if cfg.blocks.contains_key(&entry) {
            depth.insert(entry, 0);
            let mut queue: VecDeque<IrBlockId> = VecDeque::new();
            queue.push_back(entry);

            while let Some(block) = queue.pop_front() {
                let d = depth[&block];
                for &child in children.get(&block).map(|c| c.as_slice()).unwrap_or(&[]) {
                    depth.insert(child, d + 1);
                    queue.push_back(child);
                }
            }
        }

        Self {
            idom: final_idom,
            depth,
            entry,
        }
    }

    /// Compute reverse postorder of blocks (good for dataflow iteration).
    fn reverse_postorder(cfg: &IrControlFlowGraph, entry: IrBlockId) -> Vec<IrBlockId> {
        let mut visited = FxHashSet::default();
        let mut postorder = Vec::new();

        if !cfg.blocks.contains_key(&entry) {
            return postorder;
        }

        // Iterative DFS: (block, next successor index)
        let mut stack: Vec<(IrBlockId, usize)> = vec![(entry, 0)];
        visited.insert(entry);

        while let Some((block, next)) = stack.pop() {
            let succs = cfg
                .get_block(block)
                .map(|b| b.successors())
                .unwrap_or_default();

            if let Some(&succ) = succs.get(next) {
                stack.push((block, next + 1));
                if cfg.blocks.contains_key(&succ) && visited.insert(succ) {
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }

        postorder.reverse();
        postorder
    }

    /// Find intersection of two dominators in the dominator tree.
    /// Uses the standard algorithm from Cooper, Harvey, and Kennedy.
    fn intersect(
        mut b1: IrBlockId,
        mut b2: IrBlockId,
        idom: &FxHashMap<IrBlockId, Option<IrBlockId>>,
        rpo_index: &FxHashMap<IrBlockId, usize>,
    ) -> IrBlockId {
        while b1 != b2 {
            let mut idx1 = rpo_index.get(&b1).copied().unwrap_or(usize::MAX);
            let mut idx2 = rpo_index.get(&b2).copied().unwrap_or(usize::MAX);

            while idx1 > idx2 {
                match idom.get(&b1) {
                    Some(Some(dom)) => {
                        b1 = *dom;
                        idx1 = rpo_index.get(&b1).copied().unwrap_or(usize::MAX);
                    }
                    _ => return b1,
                }
            }

            while idx2 > idx1 {
                match idom.get(&b2) {
                    Some(Some(dom)) => {
                        b2 = *dom;
                        idx2 = rpo_index.get(&b2).copied().unwrap_or(usize::MAX);
                    }
                    _ => return b2,
                }
            }
        }
        b1
    }

    /// Whether the block is reachable from the entry (and thus in the tree).
    pub fn contains(&self, block: IrBlockId) -> bool {
        self.depth.contains_key(&block)
    }

    /// Get the immediate dominator of a block.
    pub fn idom(&self, block: IrBlockId) -> Option<IrBlockId> {
        self.idom.get(&block).copied()
    }

    /// Get the depth of a block in the dominator tree.
    pub fn depth(&self, block: IrBlockId) -> usize {
        self.depth.get(&block).copied().unwrap_or(0)
    }

    /// Check if block A dominates block B. Unreachable blocks dominate nothing
    /// and are dominated by nothing.
    pub fn dominates(&self, a: IrBlockId, b: IrBlockId) -> bool {
        if !self.contains(a) || !self.contains(b) {
            return false;
        }
        if a == b || a == self.entry {
            return true;
        }

        let mut current = b;
        while let Some(&dom) = self.idom.get(&current) {
            if dom == a {
                return true;
            }
            current = dom;
        }
        false
    }

    /// Check if block A strictly dominates block B (A dominates B and A != B).
    pub fn strictly_dominates(&self, a: IrBlockId, b: IrBlockId) -> bool {
        a != b && self.dominates(a, b)
    }
}

/// A natural loop in the control flow graph.
///
/// A natural loop is defined by its back edges (edges from B to H where H dominates B).
/// The loop header is H, and the loop body contains all blocks from which a back
/// edge source can be reached without going through H.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    /// Loop header block (entry point of the loop)
    pub header: IrBlockId,

    /// Sources of the back edges to the header, in block order
    pub back_edges: Vec<IrBlockId>,

    /// All blocks in the loop body (including header)
    pub blocks: FxHashSet<IrBlockId>,

    /// Trip count if determinable
    pub trip_count: Option<TripCount>,

    /// Nesting depth (0 = outermost)
    pub nesting_depth: usize,

    /// Parent loop header if this is a nested loop
    pub parent: Option<IrBlockId>,

    /// Child loop headers (directly nested loops)
    pub children: Vec<IrBlockId>,
}

/// Trip count information for loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripCount {
    /// Constant trip count known at compile time
    Constant(u64),
}

impl TripCount {
    /// Largest number of iterations this loop can run
    pub fn max_iterations(&self) -> u64 {
        match self {
            TripCount::Constant(n) => *n,
        }
    }
}

/// Loop nest information for a function.
#[derive(Debug, Clone)]
pub struct LoopNestInfo {
    /// All natural loops indexed by header block, in discovery order
    pub loops: IndexMap<IrBlockId, NaturalLoop>,
}

impl LoopNestInfo {
    /// Analyze loops in a function.
    pub fn analyze(function: &IrFunction, domtree: &DominatorTree) -> Self {
        let cfg = &function.cfg;
        let mut loops: IndexMap<IrBlockId, NaturalLoop> = IndexMap::new();

        // Find all back edges and create natural loops
        for (&block_id, block) in &cfg.blocks {
            let mut seen = FxHashSet::default();
            for succ in block.successors() {
                // A back edge is an edge to a dominator
                if !seen.insert(succ) || !domtree.dominates(succ, block_id) {
                    continue;
                }

                let loop_blocks = Self::find_loop_blocks(cfg, succ, block_id);
                if let Some(existing) = loops.get_mut(&succ) {
                    // Loops sharing a header are merged
                    existing.blocks.extend(loop_blocks);
                    existing.back_edges.push(block_id);
                } else {
                    loops.insert(
                        succ,
                        NaturalLoop {
                            header: succ,
                            back_edges: vec![block_id],
                            blocks: loop_blocks,
                            trip_count: None,
                            nesting_depth: 0, // Computed after all loops found
                            parent: None,
                            children: Vec::new(),
                        },
                    );
                }
            }
        }

        for natural_loop in loops.values_mut() {
            natural_loop
                .back_edges
                .sort_by_key(|b| cfg.block_position(*b).unwrap_or(usize::MAX));
        }

        // Innermost containing loop = smallest other loop whose body contains the header
        let loop_headers: Vec<IrBlockId> = loops.keys().copied().collect();
        let mut parents: FxHashMap<IrBlockId, IrBlockId> = FxHashMap::default();
        for &header in &loop_headers {
            let mut best: Option<(usize, IrBlockId)> = None;
            for &other in &loop_headers {
                if other == header {
                    continue;
                }
                let other_loop = &loops[&other];
                if other_loop.blocks.contains(&header)
                    && !loops[&header].blocks.contains(&other)
                    && best.map_or(true, |(size, _)| other_loop.blocks.len() < size)
                {
                    best = Some((other_loop.blocks.len(), other));
                }
            }
            if let Some((_, parent)) = best {
                parents.insert(header, parent);
            }
        }

        for &header in &loop_headers {
            if let Some(&parent) = parents.get(&header) {
                if let Some(l) = loops.get_mut(&header) {
                    l.parent = Some(parent);
                }
                if let Some(p) = loops.get_mut(&parent) {
                    p.children.push(header);
                }
            }
        }

        // Compute nesting depths
        let top_level_loops: Vec<IrBlockId> = loop_headers
            .iter()
            .filter(|h| !parents.contains_key(h))
            .copied()
            .collect();

        let mut stack: Vec<(IrBlockId, usize)> =
            top_level_loops.iter().map(|&h| (h, 0)).collect();
        while let Some((header, depth)) = stack.pop() {
            if let Some(l) = loops.get_mut(&header) {
                l.nesting_depth = depth;
                stack.extend(l.children.iter().map(|&c| (c, depth + 1)));
            }
        }

        let trip_counts: Vec<(IrBlockId, Option<TripCount>)> = loops
            .values()
            .map(|l| (l.header, detect_trip_count(function, l)))
            .collect();
        for (header, trip_count) in trip_counts {
            if let Some(l) = loops.get_mut(&header) {
                l.trip_count = trip_count;
            }
        }

        Self {
            loops,
        }
    }

    /// Find all blocks in a natural loop given header and back edge source.
    fn find_loop_blocks(
        cfg: &IrControlFlowGraph,
        header: IrBlockId,
        back_edge_source: IrBlockId,
    ) -> FxHashSet<IrBlockId> {
        let mut loop_blocks = FxHashSet::default();
        loop_blocks.insert(header);

        if header == back_edge_source {
            return loop_blocks;
        }

        // Work backwards from back_edge_source to find all blocks that can reach header
        let mut worklist = vec![back_edge_source];
        loop_blocks.insert(back_edge_source);

        while let Some(block) = worklist.pop() {
            if let Some(b) = cfg.get_block(block) {
                for &pred in &b.predecessors {
                    if loop_blocks.insert(pred) {
                        worklist.push(pred);
                    }
                }
            }
        }

        loop_blocks
    }

    /// All loops, outermost first. Ties keep discovery order.
    pub fn loops_by_depth(&self) -> Vec<&NaturalLoop> {
        let mut loops: Vec<&NaturalLoop> = self.loops.values().collect();
        loops.sort_by_key(|l| l.nesting_depth);
        loops
    }
}

/// Recognize `for (i = start; i < limit; i += step)` shaped loops:
/// the header tests a phi against a constant and the single latch
/// increments the phi by a positive constant.
fn detect_trip_count(function: &IrFunction, natural_loop: &NaturalLoop) -> Option<TripCount> {
    let cfg = &function.cfg;
    let [latch] = natural_loop.back_edges.as_slice() else {
        return None;
    };
    let header = cfg.get_block(natural_loop.header)?;

    let IrTerminator::CondBranch {
        condition,
        true_target,
        false_target,
    } = &header.terminator
    else {
        return None;
    };
    // Only "continue while the condition holds" loops
    if !natural_loop.blocks.contains(true_target) || natural_loop.blocks.contains(false_target) {
        return None;
    }

    let constants: FxHashMap<IrId, i64> = cfg
        .blocks
        .values()
        .flat_map(|b| b.instructions.iter())
        .filter_map(|inst| match inst {
            IrInstruction::Const { dest, value } => value.as_i64().map(|v| (*dest, v)),
            _ => None,
        })
        .collect();

    let (op, iv, limit) = header.instructions.iter().find_map(|inst| match inst {
        IrInstruction::Cmp {
            dest,
            op,
            left,
            right,
        } if dest == condition => Some((*op, *left, *right)),
        _ => None,
    })?;
    let limit = *constants.get(&limit)?;

    let phi = header.phi_nodes.iter().find(|p| p.dest == iv)?;
    if phi.incoming.len() != 2 {
        return None;
    }
    let (min, max) = signed_range(&phi.ty)?;
    let start = phi
        .incoming
        .iter()
        .find(|(pred, _)| !natural_loop.blocks.contains(pred))
        .and_then(|(_, value)| constants.get(value).copied())?;
    let next = phi
        .incoming
        .iter()
        .find(|(pred, _)| pred == latch)
        .map(|(_, value)| *value)?;

    let step = natural_loop
        .blocks
        .iter()
        .filter_map(|b| cfg.get_block(*b))
        .flat_map(|b| b.instructions.iter())
        .find_map(|inst| match inst {
            IrInstruction::BinOp {
                dest,
                op: BinaryOp::Add,
                left,
                right,
            } if *dest == next => {
                if *left == iv {
                    constants.get(right).copied()
                } else if *right == iv {
                    constants.get(left).copied()
                } else {
                    None
                }
            }
            _ => None,
        })?;
    if step <= 0 {
        return None;
    }

    let (start, limit, step) = (start as i128, limit as i128, step as i128);
    if !(min..=max).contains(&start) || !(min..=max).contains(&limit) || step > max {
        return None;
    }

    let distance = limit - start;
    let count = match op {
        CompareOp::Lt => {
            if distance <= 0 {
                0
            } else {
                (distance + step - 1) / step
            }
        }
        CompareOp::Le => {
            if distance < 0 {
                0
            } else {
                distance / step + 1
            }
        }
        CompareOp::Ne if distance >= 0 && distance % step == 0 => distance / step,
        _ => return None,
    };

    // The increment that leaves the loop must not wrap, or the loop may never exit
    if count > 0 && start + count * step > max {
        return None;
    }

    u64::try_from(count).ok().map(TripCount::Constant)
}

/// Value range of a signed integer type
fn signed_range(ty: &IrType) -> Option<(i128, i128)> {
    let bits = match ty {
        IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64 => ty.bit_width()?,
        _ => return None,
    };
    let max = (1i128 << (bits - 1)) - 1;
    Some((-max - 1, max))
}
