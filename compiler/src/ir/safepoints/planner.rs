//! Loop backedge planning.
//!
//! A backedge S -> H is satisfied when some block B holding a safepoint lies
//! between the header and the latch in the dominator tree:
//! `dominates(H, B) && dominates(B, S)`. Every loop iteration that takes the
//! edge then passes a safepoint. Unsatisfied backedges are planned for a poll.
//! Planning only reads the function.

use super::{DominanceOracle, LoopOracle, SafepointConfig, SafepointError};
use crate::ir::{IrBlockId, IrFunction};
use fxhash::FxHashSet;
use tracing::{debug, trace};

/// A backedge that needs a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBackedge {
    /// Latch block
    pub source: IrBlockId,
    /// Loop header
    pub header: IrBlockId,
    /// Nesting depth of the loop
    pub depth: usize,
}

/// Output of the planner, in deterministic order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackedgePlan {
    /// Backedges to instrument, outer loops first
    pub edges: Vec<PlannedBackedge>,
    /// Backedges already dominated by a safepoint
    pub satisfied: usize,
    /// Loops skipped because their trip count is bounded
    pub bounded_loops: usize,
}

fn unavailable(function: &IrFunction, what: String) -> SafepointError {
    SafepointError::AnalysisUnavailable(format!("{}: {}", function.name, what))
}

fn ask(
    dom: &dyn DominanceOracle,
    function: &IrFunction,
    a: IrBlockId,
    b: IrBlockId,
) -> Result<bool, SafepointError> {
    dom.dominates(a, b)
        .ok_or_else(|| unavailable(function, format!("no dominance answer for {} / {}", a, b)))
}

/// Plan backedge polls for `function`.
///
/// `safepoint_blocks` are the blocks holding a classified safepoint.
pub fn plan_backedges(
    function: &IrFunction,
    safepoint_blocks: &[IrBlockId],
    dom: &dyn DominanceOracle,
    loops: &dyn LoopOracle,
    config: &SafepointConfig,
) -> Result<BackedgePlan, SafepointError> {
    let mut plan = BackedgePlan::default();
    if !config.backedge_polls {
        return Ok(plan);
    }

    let cfg = &function.cfg;
    let reachable = cfg.reachable_blocks();

    // Every reachable block must be known to the dominance oracle
    for block in cfg.blocks.keys().filter(|b| reachable.contains(b)) {
        ask(dom, function, cfg.entry_block, *block)?;
    }

    let loops = loops
        .loops_of(function)
        .ok_or_else(|| unavailable(function, "loop analysis unavailable".to_string()))?;

    let candidates: Vec<IrBlockId> = safepoint_blocks
        .iter()
        .copied()
        .filter(|b| reachable.contains(b))
        .collect();
    let mut planned: FxHashSet<(IrBlockId, IrBlockId)> = FxHashSet::default();

    for descriptor in &loops {
        let header = descriptor.header;
        if cfg.get_block(header).is_none() {
            return Err(unavailable(function, format!("loop header {} not in CFG", header)));
        }

        if !config.all_backedges {
            if let Some(trip_count) = descriptor.trip_count {
                if config.is_bounded_trip_count(trip_count.max_iterations()) {
                    trace!("{}: loop {} is bounded ({:?})", function.name, header, trip_count);
                    plan.bounded_loops += 1;
                    continue;
                }
            }
        }

        let mut sources = descriptor.backedges.clone();
        sources.sort_by_key(|s| cfg.block_position(*s).unwrap_or(usize::MAX));
        sources.dedup();

        for source in sources {
            let branches_to_header = cfg
                .get_block(source)
                .map(|b| b.successors().contains(&header))
                .unwrap_or(false);
            if !branches_to_header {
                return Err(unavailable(
                    function,
                    format!("backedge {} -> {} not in CFG", source, header),
                ));
            }
            if !reachable.contains(&source) {
                trace!("{}: backedge {} -> {} is dead", function.name, source, header);
                continue;
            }
            if !planned.insert((source, header)) {
                continue;
            }

            let satisfied = if config.all_backedges {
                false
            } else {
                is_satisfied(function, header, source, &candidates, dom)?
            };

            if satisfied {
                plan.satisfied += 1;
            } else {
                plan.edges.push(PlannedBackedge {
                    source,
                    header,
                    depth: descriptor.depth,
                });
            }
        }
    }

    debug!(
        "{}: {} backedges need polls, {} satisfied, {} bounded loops",
        function.name,
        plan.edges.len(),
        plan.satisfied,
        plan.bounded_loops
    );
    Ok(plan)
}

fn is_satisfied(
    function: &IrFunction,
    header: IrBlockId,
    source: IrBlockId,
    candidates: &[IrBlockId],
    dom: &dyn DominanceOracle,
) -> Result<bool, SafepointError> {
    for &block in candidates {
        if ask(dom, function, header, block)? && ask(dom, function, block, source)? {
            trace!(
                "{}: backedge {} -> {} covered by safepoint in {}",
                function.name,
                source,
                header,
                block
            );
            return Ok(true);
        }
    }
    Ok(false)
}
