//! Call-site classification.
//!
//! Every call-like instruction is visited once, in block order (body
//! instructions first, then the terminator), and is either recorded as an
//! implicit safepoint or marked exempt. The function is not modified.

use super::{
    AttributeOracle, CallSite, SafepointConfig, SafepointLocation, SafepointOrigin,
    SafepointRecord,
};
use crate::ir::{CallAttributes, Callee, IrBlockId, IrFunction};
use fxhash::FxHashSet;
use tracing::trace;

/// Result of scanning a function's calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Calls that are safepoints, in block order
    pub records: Vec<SafepointRecord>,
    /// Calls proven not to trigger a collection
    pub exempt: usize,
    /// Calls not considered because only polls count in backedge-only mode
    pub ignored: usize,
}

impl Classification {
    /// Blocks holding at least one safepoint, in first-seen order
    pub fn safepoint_blocks(&self) -> Vec<IrBlockId> {
        let mut seen: FxHashSet<IrBlockId> = FxHashSet::default();
        self.records
            .iter()
            .map(|r| r.block)
            .filter(|b| seen.insert(*b))
            .collect()
    }
}

/// Classify every call-like instruction of `function`.
///
/// In backedge-only mode ordinary calls are not safepoints, but calls to the
/// poll function still are, so polls from an earlier run keep satisfying
/// their backedges.
pub fn classify_calls(
    function: &IrFunction,
    attrs: &dyn AttributeOracle,
    config: &SafepointConfig,
) -> Classification {
    let mut result = Classification::default();

    for block in function.cfg.blocks.values() {
        let body = block
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(i, inst)| {
                inst.call_site()
                    .map(|(callee, attrs)| (SafepointLocation::Instruction(i), callee, attrs))
            });
        let terminator = block
            .terminator
            .call_site()
            .map(|(callee, attrs)| (SafepointLocation::Terminator, callee, attrs));

        for (location, callee, call_attrs) in body.chain(terminator) {
            classify_one(
                function,
                block.id,
                location,
                callee,
                call_attrs,
                attrs,
                config,
                &mut result,
            );
        }
    }

    result
}

#[allow(clippy::too_many_arguments)]
fn classify_one(
    function: &IrFunction,
    block: IrBlockId,
    location: SafepointLocation,
    callee: Callee,
    call_attrs: CallAttributes,
    attrs: &dyn AttributeOracle,
    config: &SafepointConfig,
    result: &mut Classification,
) {
    let is_poll = matches!(callee, Callee::Direct(id) if attrs.is_poll_function(id));
    if config.backedge_only && !is_poll {
        result.ignored += 1;
        return;
    }

    let site = CallSite {
        caller: function,
        block,
        location,
        callee,
        attrs: call_attrs,
    };
    if attrs.is_exempt(&site) {
        trace!("{}: call at {}:{} is exempt", function.name, block, location);
        result.exempt += 1;
        return;
    }

    result.records.push(SafepointRecord {
        block,
        location,
        origin: SafepointOrigin::Call,
    });
}
