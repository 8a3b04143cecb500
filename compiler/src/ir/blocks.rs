//! MIR Basic Blocks
//!
//! This module defines basic blocks for the MIR, which are sequences of instructions
//! with a single entry point and a single terminator. Basic blocks form the nodes
//! of the control flow graph.

use super::{CallAttributes, Callee, IrFunctionId, IrId, IrInstruction, IrSourceLocation};
use fxhash::FxHashSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Successor list of a terminator; nearly every terminator has at most two.
pub type Successors = SmallVec<[IrBlockId; 2]>;

/// A basic block in the MIR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrBasicBlock {
    /// Unique identifier for this block
    pub id: IrBlockId,

    /// Human-readable label (for debugging)
    pub label: Option<String>,

    /// Instructions in this block (executed sequentially)
    pub instructions: Vec<IrInstruction>,

    /// Terminator instruction (branch, return, invoke, etc.)
    pub terminator: IrTerminator,

    /// Phi nodes at the beginning of this block
    pub phi_nodes: Vec<IrPhiNode>,

    /// Source location for debugging
    pub source_location: IrSourceLocation,

    /// Predecessors in the CFG
    pub predecessors: Vec<IrBlockId>,

    /// Metadata for analysis hints
    pub metadata: BlockMetadata,
}

/// Unique identifier for basic blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrBlockId(pub u32);

impl IrBlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn entry() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for IrBlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Phi node for merging values from different control flow paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrPhiNode {
    /// Destination register for the phi result
    pub dest: IrId,

    /// Incoming values from predecessor blocks
    pub incoming: Vec<(IrBlockId, IrId)>,

    /// Type of the phi node
    pub ty: super::IrType,
}

/// Terminator instructions that end a basic block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrTerminator {
    /// Unconditional branch to another block
    Branch { target: IrBlockId },

    /// Conditional branch based on a boolean value
    CondBranch {
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    },

    /// Switch/jump table
    Switch {
        value: IrId,
        cases: Vec<(i64, IrBlockId)>,
        default: IrBlockId,
    },

    /// Call with an exceptional successor. Control continues at `normal`
    /// when the callee returns and at `unwind` when it throws.
    Invoke {
        dest: Option<IrId>,
        func_id: IrFunctionId,
        args: Vec<IrId>,
        attrs: CallAttributes,
        normal: IrBlockId,
        unwind: IrBlockId,
    },

    /// Jump to a computed block address. Its edges cannot be split because
    /// the address operand names the destination block itself.
    IndirectBranch {
        address: IrId,
        destinations: Vec<IrBlockId>,
    },

    /// Return from function
    Return { value: Option<IrId> },

    /// Continue propagating an in-flight exception
    Resume { exception: IrId },

    /// Unreachable code
    Unreachable,
}

/// Why a terminator edge could not be redirected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectError {
    /// The terminator has no edge to the requested block
    NoSuchEdge,
    /// The edge exists but this terminator shape cannot be retargeted
    Unsplittable(&'static str),
}

impl IrTerminator {
    /// Get all successor blocks (duplicates preserved, in operand order)
    pub fn successors(&self) -> Successors {
        match self {
            IrTerminator::Branch { target } => smallvec::smallvec![*target],
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => smallvec::smallvec![*true_target, *false_target],
            IrTerminator::Switch { cases, default, .. } => {
                let mut succs: Successors = cases.iter().map(|(_, target)| *target).collect();
                succs.push(*default);
                succs
            }
            IrTerminator::Invoke { normal, unwind, .. } => smallvec::smallvec![*normal, *unwind],
            IrTerminator::IndirectBranch { destinations, .. } => {
                destinations.iter().copied().collect()
            }
            IrTerminator::Return { .. } | IrTerminator::Resume { .. } | IrTerminator::Unreachable => {
                Successors::new()
            }
        }
    }

    /// Call target and attributes if this terminator is a call
    pub fn call_site(&self) -> Option<(Callee, CallAttributes)> {
        match self {
            IrTerminator::Invoke { func_id, attrs, .. } => Some((Callee::Direct(*func_id), *attrs)),
            _ => None,
        }
    }

    /// Retarget every edge to `from` so that it points at `to`.
    ///
    /// Returns the number of operands rewritten. Either every edge to `from`
    /// is rewritten or none is.
    pub fn redirect(&mut self, from: IrBlockId, to: IrBlockId) -> Result<usize, RedirectError> {
        fn swap(slot: &mut IrBlockId, from: IrBlockId, to: IrBlockId) -> usize {
            if *slot == from {
                *slot = to;
                1
            } else {
                0
            }
        }

        let rewritten = match self {
            IrTerminator::Branch { target } => swap(target, from, to),
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => swap(true_target, from, to) + swap(false_target, from, to),
            IrTerminator::Switch { cases, default, .. } => {
                let mut count = swap(default, from, to);
                for (_, target) in cases.iter_mut() {
                    count += swap(target, from, to);
                }
                count
            }
            IrTerminator::Invoke { normal, unwind, .. } => {
                // The unwind destination must stay the landing block
                if *unwind == from {
                    return Err(RedirectError::Unsplittable("invoke unwind edge"));
                }
                swap(normal, from, to)
            }
            IrTerminator::IndirectBranch { destinations, .. } => {
                if destinations.contains(&from) {
                    return Err(RedirectError::Unsplittable("indirectbr"));
                }
                0
            }
            IrTerminator::Return { .. } | IrTerminator::Resume { .. } | IrTerminator::Unreachable => 0,
        };

        if rewritten == 0 {
            Err(RedirectError::NoSuchEdge)
        } else {
            Ok(rewritten)
        }
    }
}

/// Metadata for optimization and analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    /// Whether this block is a landing pad for an invoke's unwind edge
    pub is_landing_pad: bool,

    /// Whether this block was created to hold a safepoint poll
    pub is_poll_block: bool,
}

impl IrBasicBlock {
    /// Create a new basic block
    pub fn new(id: IrBlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            terminator: IrTerminator::Unreachable,
            phi_nodes: Vec::new(),
            source_location: IrSourceLocation::unknown(),
            predecessors: Vec::new(),
            metadata: BlockMetadata::default(),
        }
    }

    /// Add an instruction to this block
    pub fn add_instruction(&mut self, inst: IrInstruction) {
        self.instructions.push(inst);
    }

    /// Add a phi node to this block
    pub fn add_phi(&mut self, phi: IrPhiNode) {
        self.phi_nodes.push(phi);
    }

    /// Set the terminator for this block
    pub fn set_terminator(&mut self, term: IrTerminator) {
        self.terminator = term;
    }

    /// Get all successor blocks based on the terminator
    pub fn successors(&self) -> Successors {
        self.terminator.successors()
    }
}

/// Control flow graph of a function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrControlFlowGraph {
    /// All basic blocks in the function, in creation order
    pub blocks: IndexMap<IrBlockId, IrBasicBlock>,

    /// Entry block ID
    pub entry_block: IrBlockId,

    /// Next available block ID (pub for the builder)
    pub next_block_id: u32,
}

impl Default for IrControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl IrControlFlowGraph {
    /// Create a new CFG with an entry block
    pub fn new() -> Self {
        let mut blocks = IndexMap::new();
        let entry_block = IrBlockId::entry();
        blocks.insert(entry_block, IrBasicBlock::new(entry_block));

        Self {
            blocks,
            entry_block,
            next_block_id: 1,
        }
    }

    /// Create a CFG with no blocks at all (a body-less declaration)
    pub fn empty() -> Self {
        Self {
            blocks: IndexMap::new(),
            entry_block: IrBlockId::entry(),
            next_block_id: 0,
        }
    }

    /// Create a new basic block
    pub fn create_block(&mut self) -> IrBlockId {
        let id = IrBlockId::new(self.next_block_id);
        self.next_block_id += 1;
        self.blocks.insert(id, IrBasicBlock::new(id));
        id
    }

    /// Get a block by ID
    pub fn get_block(&self, id: IrBlockId) -> Option<&IrBasicBlock> {
        self.blocks.get(&id)
    }

    /// Get a mutable block by ID
    pub fn get_block_mut(&mut self, id: IrBlockId) -> Option<&mut IrBasicBlock> {
        self.blocks.get_mut(&id)
    }

    /// Position of a block in block-list order
    pub fn block_position(&self, id: IrBlockId) -> Option<usize> {
        self.blocks.get_index_of(&id)
    }

    /// Connect two blocks (update predecessors)
    pub fn connect_blocks(&mut self, from: IrBlockId, to: IrBlockId) {
        if let Some(to_block) = self.blocks.get_mut(&to) {
            if !to_block.predecessors.contains(&from) {
                to_block.predecessors.push(from);
            }
        }
    }

    /// Rebuild every predecessor list from the terminators, in block order.
    pub fn recompute_predecessors(&mut self) {
        let edges: Vec<(IrBlockId, IrBlockId)> = self
            .blocks
            .values()
            .flat_map(|block| block.successors().into_iter().map(move |succ| (block.id, succ)))
            .collect();

        for block in self.blocks.values_mut() {
            block.predecessors.clear();
        }
        for (from, to) in edges {
            self.connect_blocks(from, to);
        }
    }

    /// Split every edge `from -> to` through a new block appended to the CFG.
    ///
    /// The new block branches to `to` and takes `from`'s place in `to`'s
    /// predecessor list and phi nodes; its only predecessor is `from`.
    /// On error the CFG is unchanged.
    pub fn split_edge(&mut self, from: IrBlockId, to: IrBlockId) -> Result<IrBlockId, RedirectError> {
        if !self.blocks.contains_key(&to) {
            return Err(RedirectError::NoSuchEdge);
        }
        let source = self.blocks.get(&from).ok_or(RedirectError::NoSuchEdge)?;

        let new_id = IrBlockId::new(self.next_block_id);
        let mut terminator = source.terminator.clone();
        terminator.redirect(to, new_id)?;

        let created = self.create_block();
        debug_assert_eq!(created, new_id);
        if let Some(block) = self.blocks.get_mut(&new_id) {
            block.terminator = IrTerminator::Branch { target: to };
            block.predecessors = vec![from];
        }
        if let Some(source) = self.blocks.get_mut(&from) {
            source.terminator = terminator;
        }
        if let Some(target) = self.blocks.get_mut(&to) {
            let mut replaced = false;
            for pred in target.predecessors.iter_mut().filter(|p| **p == from) {
                *pred = new_id;
                replaced = true;
            }
            if !replaced {
                target.predecessors.push(new_id);
            }
            for phi in target.phi_nodes.iter_mut() {
                for (block, _) in phi.incoming.iter_mut().filter(|(b, _)| *b == from) {
                    *block = new_id;
                }
            }
        }

        Ok(new_id)
    }

    /// Blocks reachable from the entry block
    pub fn reachable_blocks(&self) -> FxHashSet<IrBlockId> {
        let mut visited = FxHashSet::default();
        if !self.blocks.contains_key(&self.entry_block) {
            return visited;
        }

        let mut worklist = vec![self.entry_block];
        while let Some(block) = worklist.pop() {
            if !visited.insert(block) {
                continue;
            }
            if let Some(b) = self.get_block(block) {
                worklist.extend(b.successors());
            }
        }
        visited
    }

    /// Verify CFG integrity
    pub fn verify(&self) -> Result<(), String> {
        // Check entry block exists
        if !self.blocks.contains_key(&self.entry_block) {
            return Err("Entry block not found".to_string());
        }

        for (id, block) in &self.blocks {
            if block.id != *id {
                return Err(format!("Block {} is stored under key {}", block.id, id));
            }

            // Verify successor blocks exist and list us as a predecessor
            for succ in block.successors() {
                match self.blocks.get(&succ) {
                    None => {
                        return Err(format!(
                            "Block {} references non-existent successor {}",
                            id, succ
                        ))
                    }
                    Some(succ_block) if !succ_block.predecessors.contains(id) => {
                        return Err(format!(
                            "Block {} is missing predecessor {}",
                            succ, id
                        ))
                    }
                    Some(_) => {}
                }
            }

            // Every recorded predecessor must actually branch here
            for pred in &block.predecessors {
                let branches_here = self
                    .blocks
                    .get(pred)
                    .map(|p| p.successors().contains(id))
                    .unwrap_or(false);
                if !branches_here {
                    return Err(format!(
                        "Block {} lists {} as predecessor but no such edge exists",
                        id, pred
                    ));
                }
            }

            // Verify phi node consistency
            for phi in &block.phi_nodes {
                for (pred_block, _) in &phi.incoming {
                    if !block.predecessors.contains(pred_block) {
                        return Err(format!(
                            "Phi node in block {} references non-predecessor block {}",
                            id, pred_block
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_block_creation() {
        let mut block = IrBasicBlock::new(IrBlockId::new(1));
        assert_eq!(block.id.0, 1);
        assert!(block.instructions.is_empty());
        assert!(block.successors().is_empty());

        block.set_terminator(IrTerminator::Branch {
            target: IrBlockId::new(2),
        });
        assert_eq!(block.successors().as_slice(), &[IrBlockId::new(2)]);
    }

    #[test]
    fn test_cfg_creation() {
        let mut cfg = IrControlFlowGraph::new();
        assert!(cfg.get_block(IrBlockId::entry()).is_some());

        let bb1 = cfg.create_block();
        let bb2 = cfg.create_block();

        cfg.connect_blocks(IrBlockId::entry(), bb1);
        cfg.connect_blocks(bb1, bb2);

        assert_eq!(
            cfg.get_block(bb1).unwrap().predecessors,
            vec![IrBlockId::entry()]
        );
        assert_eq!(cfg.get_block(bb2).unwrap().predecessors, vec![bb1]);
        assert_eq!(cfg.block_position(bb2), Some(2));
    }

    #[test]
    fn test_redirect_switch_rewrites_all_matching_edges() {
        let header = IrBlockId::new(1);
        let exit = IrBlockId::new(2);
        let poll = IrBlockId::new(3);
        let mut term = IrTerminator::Switch {
            value: IrId::new(0),
            cases: vec![(0, header), (1, exit), (2, header)],
            default: header,
        };

        assert_eq!(term.redirect(header, poll), Ok(3));
        assert_eq!(term.successors().as_slice(), &[poll, exit, poll, poll]);
        assert_eq!(term.redirect(header, poll), Err(RedirectError::NoSuchEdge));
    }

    #[test]
    fn test_redirect_rejects_unsplittable_edges() {
        let header = IrBlockId::new(1);
        let mut indirect = IrTerminator::IndirectBranch {
            address: IrId::new(0),
            destinations: vec![header, IrBlockId::new(2)],
        };
        assert_eq!(
            indirect.redirect(header, IrBlockId::new(5)),
            Err(RedirectError::Unsplittable("indirectbr"))
        );

        let mut invoke = IrTerminator::Invoke {
            dest: None,
            func_id: IrFunctionId(1),
            args: vec![],
            attrs: CallAttributes::default(),
            normal: IrBlockId::new(2),
            unwind: header,
        };
        assert!(matches!(
            invoke.redirect(header, IrBlockId::new(5)),
            Err(RedirectError::Unsplittable(_))
        ));
        assert_eq!(invoke.redirect(IrBlockId::new(2), IrBlockId::new(5)), Ok(1));
    }

    #[test]
    fn test_split_edge_repairs_phis_and_predecessors() {
        // entry -> header; header -> header | exit (self loop)
        let mut cfg = IrControlFlowGraph::new();
        let header = cfg.create_block();
        let exit = cfg.create_block();
        let entry = IrBlockId::entry();
        cfg.get_block_mut(entry)
            .unwrap()
            .set_terminator(IrTerminator::Branch { target: header });
        {
            let h = cfg.get_block_mut(header).unwrap();
            h.set_terminator(IrTerminator::CondBranch {
                condition: IrId::new(0),
                true_target: header,
                false_target: exit,
            });
            h.add_phi(IrPhiNode {
                dest: IrId::new(1),
                incoming: vec![(entry, IrId::new(2)), (header, IrId::new(3))],
                ty: super::super::IrType::I64,
            });
        }
        cfg.get_block_mut(exit)
            .unwrap()
            .set_terminator(IrTerminator::Return { value: None });
        cfg.recompute_predecessors();

        let split = cfg.split_edge(header, header).unwrap();
        assert!(cfg.verify().is_ok());

        let h = cfg.get_block(header).unwrap();
        assert_eq!(h.predecessors, vec![entry, split]);
        assert_eq!(h.phi_nodes[0].incoming[1], (split, IrId::new(3)));
        assert_eq!(h.successors().as_slice(), &[split, exit]);
        assert_eq!(cfg.get_block(split).unwrap().predecessors, vec![header]);
        assert_eq!(cfg.block_position(split), Some(3));
    }

    #[test]
    fn test_split_edge_failure_leaves_cfg_unchanged() {
        let mut cfg = IrControlFlowGraph::new();
        let target = cfg.create_block();
        cfg.get_block_mut(IrBlockId::entry())
            .unwrap()
            .set_terminator(IrTerminator::IndirectBranch {
                address: IrId::new(0),
                destinations: vec![target],
            });
        cfg.recompute_predecessors();
        let before = cfg.clone();

        assert_eq!(
            cfg.split_edge(IrBlockId::entry(), target),
            Err(RedirectError::Unsplittable("indirectbr"))
        );
        assert_eq!(cfg.split_edge(target, IrBlockId::entry()), Err(RedirectError::NoSuchEdge));
        assert_eq!(cfg, before);
    }

    #[test]
    fn test_verify_detects_stale_predecessor() {
        let mut cfg = IrControlFlowGraph::new();
        let bb1 = cfg.create_block();
        cfg.get_block_mut(IrBlockId::entry())
            .unwrap()
            .set_terminator(IrTerminator::Branch { target: bb1 });
        cfg.get_block_mut(bb1)
            .unwrap()
            .set_terminator(IrTerminator::Return { value: None });
        cfg.recompute_predecessors();
        assert!(cfg.verify().is_ok());

        cfg.get_block_mut(bb1).unwrap().predecessors.push(bb1);
        assert!(cfg.verify().is_err());
    }

    #[test]
    fn test_reachable_blocks_skips_orphans() {
        let mut cfg = IrControlFlowGraph::new();
        let bb1 = cfg.create_block();
        let orphan = cfg.create_block();
        cfg.get_block_mut(IrBlockId::entry())
            .unwrap()
            .set_terminator(IrTerminator::Branch { target: bb1 });
        cfg.get_block_mut(orphan)
            .unwrap()
            .set_terminator(IrTerminator::Branch { target: bb1 });

        let reachable = cfg.reachable_blocks();
        assert!(reachable.contains(&bb1));
        assert!(!reachable.contains(&orphan));
    }
}
