//! Poll insertion.
//!
//! Materializes poll calls at the function entry and on planned backedges.
//! Pre-existing instructions are never removed or reordered; polls are only
//! added, either on a new block splitting the backedge or right before the
//! latch's terminator.

use super::{
    BackedgePlan, SafepointError, SafepointLocation, SafepointOrigin, SafepointRecord,
    UnsupportedBackedge,
};
use crate::ir::{
    CallAttributes, IrBlockId, IrFunction, IrFunctionId, IrInstruction, RedirectError,
};
use fxhash::FxHashSet;
use tracing::{trace, warn};

/// What backedge insertion did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertionReport {
    /// One record per inserted poll, in plan order
    pub records: Vec<SafepointRecord>,
    /// Backedges that could not be instrumented
    pub unsupported: Vec<UnsupportedBackedge>,
    /// Number of blocks created
    pub blocks_inserted: usize,
}

fn poll_call(poll: IrFunctionId) -> IrInstruction {
    IrInstruction::CallDirect {
        dest: None,
        func_id: poll,
        args: Vec::new(),
        attrs: CallAttributes::default(),
    }
}

/// Index of the entry poll: after the leading stack-slot allocations
pub fn entry_poll_index(function: &IrFunction) -> Option<usize> {
    let entry = function.cfg.get_block(function.entry_block())?;
    Some(
        entry
            .instructions
            .iter()
            .take_while(|inst| matches!(inst, IrInstruction::Alloca { .. }))
            .count(),
    )
}

/// Insert a poll in the entry block unless one already sits at that spot.
///
/// Records already pointing into the entry block at or after the insertion
/// index are shifted so they keep naming the same calls.
pub fn insert_entry_poll(
    function: &mut IrFunction,
    poll: IrFunctionId,
    existing: &mut [SafepointRecord],
) -> Option<SafepointRecord> {
    let index = entry_poll_index(function)?;
    let entry_id = function.entry_block();
    let entry = function.cfg.get_block_mut(entry_id)?;

    if entry
        .instructions
        .get(index)
        .map_or(false, |inst| inst.calls(poll))
    {
        trace!("{}: entry poll already present", function.name);
        return None;
    }

    entry.instructions.insert(index, poll_call(poll));
    for record in existing.iter_mut().filter(|r| r.block == entry_id) {
        if let SafepointLocation::Instruction(i) = &mut record.location {
            if *i >= index {
                *i += 1;
            }
        }
    }

    Some(SafepointRecord {
        block: entry_id,
        location: SafepointLocation::Instruction(index),
        origin: SafepointOrigin::EntryPoll,
    })
}

/// Insert a poll for every planned backedge.
///
/// An edge whose source terminator cannot be split is reported in
/// `unsupported` and the remaining edges are still processed. An edge that is
/// not in the CFG means the plan came from a stale analysis and is an error;
/// the caller is responsible for rolling back.
pub fn insert_backedge_polls(
    function: &mut IrFunction,
    plan: &BackedgePlan,
    poll: IrFunctionId,
    split_backedges: bool,
) -> Result<InsertionReport, SafepointError> {
    let mut report = InsertionReport::default();
    let mut polled_latches: FxHashSet<IrBlockId> = FxHashSet::default();

    for edge in &plan.edges {
        if !split_backedges {
            if !polled_latches.insert(edge.source) {
                continue;
            }
            let latch = function.cfg.get_block_mut(edge.source).ok_or_else(|| {
                SafepointError::AnalysisUnavailable(format!(
                    "{}: latch {} not in CFG",
                    function.name, edge.source
                ))
            })?;
            latch.instructions.push(poll_call(poll));
            report.records.push(SafepointRecord {
                block: edge.source,
                location: SafepointLocation::Instruction(latch.instructions.len() - 1),
                origin: SafepointOrigin::BackedgePoll,
            });
            continue;
        }

        match function.cfg.split_edge(edge.source, edge.header) {
            Ok(poll_block) => {
                if let Some(block) = function.cfg.get_block_mut(poll_block) {
                    block.label = Some(format!("safepoint.poll.{}", edge.source));
                    block.metadata.is_poll_block = true;
                    block.source_location = function.source_location;
                    block.instructions.push(poll_call(poll));
                }
                trace!(
                    "{}: poll block {} on backedge {} -> {}",
                    function.name,
                    poll_block,
                    edge.source,
                    edge.header
                );
                report.blocks_inserted += 1;
                report.records.push(SafepointRecord {
                    block: poll_block,
                    location: SafepointLocation::Instruction(0),
                    origin: SafepointOrigin::BackedgePoll,
                });
            }
            Err(RedirectError::Unsplittable(reason)) => {
                let diag = UnsupportedBackedge {
                    source: edge.source,
                    header: edge.header,
                    reason,
                };
                warn!("{}: {}", function.name, diag);
                report.unsupported.push(diag);
            }
            Err(RedirectError::NoSuchEdge) => {
                return Err(SafepointError::AnalysisUnavailable(format!(
                    "{}: planned backedge {} -> {} not in CFG",
                    function.name, edge.source, edge.header
                )));
            }
        }
    }

    Ok(report)
}
