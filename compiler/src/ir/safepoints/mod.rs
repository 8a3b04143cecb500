//! GC Safepoint Placement
//!
//! Decides where a thread running a function can be stopped for a garbage
//! collection and inserts poll calls where no safepoint naturally occurs.
//! Each function goes through four stages:
//!
//! 1. Eligibility: skip declarations, functions without a supported GC
//!    strategy, the poll function itself, GC-leaf functions and funclet
//!    personalities.
//! 2. Classification: every call not proven GC-free is an implicit safepoint.
//! 3. Planning: loop backedges not dominated by a safepoint need a poll.
//! 4. Insertion: polls are placed on the planned backedges (and optionally at
//!    function entry), repairing predecessor lists and phi nodes.
//!
//! The ordered [`SafepointRecord`] list produced for each function is what a
//! downstream statepoint rewriter consumes. Liveness and relocation are not
//! handled here.
//!
//! Dominance, loop structure and callee attributes come from oracles
//! ([`DominanceOracle`], [`LoopOracle`], [`AttributeOracle`]). The module
//! driver uses [`DominatorTree`], [`LoopNestInfo`] and [`ModuleAttributes`].

pub mod classifier;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod insertion;
pub mod oracle;
pub mod planner;


pub use classifier::{classify_calls, Classification};
pub use config::{EntryPollPolicy, SafepointConfig};
pub use eligibility::{check_eligibility, SkipReason};
pub use error::{SafepointError, UnsupportedBackedge};
pub use insertion::{insert_backedge_polls, insert_entry_poll, InsertionReport};
pub use oracle::{
    AttributeOracle, CallSite, DominanceOracle, ExemptionRule, LoopDescriptor, LoopOracle,
    ModuleAttributes, NamedCalleeRule,
};
pub use planner::{plan_backedges, BackedgePlan, PlannedBackedge};

use super::dump::dump_function;
use super::loop_analysis::{DominatorTree, LoopNestInfo};
use super::optimization::{OptimizationPass, OptimizationResult};
use super::{IrBlockId, IrFunction, IrFunctionId, IrModule};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// Position of a call-like instruction inside its block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafepointLocation {
    /// Index into the block's instruction list
    Instruction(usize),
    /// The block's terminator (an invoke)
    Terminator,
}

impl std::fmt::Display for SafepointLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instruction(i) => write!(f, "{}", i),
            Self::Terminator => write!(f, "term"),
        }
    }
}

/// Why a call is a safepoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafepointOrigin {
    /// A call that was already in the function
    Call,
    /// Poll inserted at function entry
    EntryPoll,
    /// Poll inserted on a loop backedge
    BackedgePoll,
}

/// One safepoint of a processed function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SafepointRecord {
    pub block: IrBlockId,
    pub location: SafepointLocation,
    pub origin: SafepointOrigin,
}

/// Progress of one function through placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementPhase {
    NotStarted,
    Filtered,
    Skipped,
    Classified,
    Planned,
    Inserted,
    Done,
}

impl PlacementPhase {
    /// Whether `next` directly follows this phase
    pub fn can_advance_to(self, next: PlacementPhase) -> bool {
        use PlacementPhase::*;
        matches!(
            (self, next),
            (NotStarted, Filtered)
                | (Filtered, Skipped)
                | (Filtered, Classified)
                | (Classified, Planned)
                | (Planned, Inserted)
                | (Inserted, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PlacementPhase::Done | PlacementPhase::Skipped)
    }

    fn advance(&mut self, next: PlacementPhase) {
        debug_assert!(
            self.can_advance_to(next),
            "invalid placement transition {:?} -> {:?}",
            self,
            next
        );
        *self = next;
    }
}

/// Per-function result of placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// The function does not take part
    Skipped(SkipReason),
    /// Every backedge is covered by a safepoint
    Done,
    /// Some backedges could not be instrumented; the latency bound does not
    /// hold for this function
    PartiallyInstrumented(Vec<UnsupportedBackedge>),
    /// Analysis failed; the function was restored and has no records
    Failed(SafepointError),
}

/// Everything placement produced for one function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPlacement {
    pub function: IrFunctionId,
    pub name: String,
    pub outcome: PlacementOutcome,
    /// Safepoints in order: classified calls, entry poll, backedge polls
    pub records: Vec<SafepointRecord>,
    pub polls_inserted: usize,
    pub blocks_inserted: usize,
    pub exempt_calls: usize,
    /// Last phase reached
    pub phase: PlacementPhase,
}

impl FunctionPlacement {
    fn new(function: &IrFunction, outcome: PlacementOutcome, phase: PlacementPhase) -> Self {
        Self {
            function: function.id,
            name: function.name.clone(),
            outcome,
            records: Vec::new(),
            polls_inserted: 0,
            blocks_inserted: 0,
            exempt_calls: 0,
            phase,
        }
    }

    /// Safepoints that were calls before placement ran
    pub fn call_safepoints(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.origin == SafepointOrigin::Call)
            .count()
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, PlacementOutcome::Skipped(_))
    }
}

/// Oracles and settings for placing safepoints in one function
pub struct PlacementContext<'a> {
    pub dominance: &'a dyn DominanceOracle,
    pub loops: &'a dyn LoopOracle,
    pub attributes: &'a dyn AttributeOracle,
    /// Function called at inserted polls
    pub poll_function: IrFunctionId,
    pub config: &'a SafepointConfig,
}

/// Place safepoints in one function.
///
/// Planning finishes before the function is touched. If insertion finds that
/// the plan does not match the CFG, the function is restored and the outcome
/// is `Failed` with no records.
pub fn place_safepoints(function: &mut IrFunction, ctx: &PlacementContext<'_>) -> FunctionPlacement {
    let mut phase = PlacementPhase::NotStarted;
    phase.advance(PlacementPhase::Filtered);

    if let Err(reason) = check_eligibility(function, ctx.attributes, ctx.config) {
        debug!("skipping {}: {}", function.name, reason);
        phase.advance(PlacementPhase::Skipped);
        return FunctionPlacement::new(function, PlacementOutcome::Skipped(reason), phase);
    }
    trace!("placing safepoints in:\n{}", dump_function(function));

    let classification = classify_calls(function, ctx.attributes, ctx.config);
    phase.advance(PlacementPhase::Classified);

    let plan = match plan_backedges(
        function,
        &classification.safepoint_blocks(),
        ctx.dominance,
        ctx.loops,
        ctx.config,
    ) {
        Ok(plan) => plan,
        Err(e) => {
            error!("safepoint placement failed for {}: {}", function.name, e);
            return FunctionPlacement::new(function, PlacementOutcome::Failed(e), phase);
        }
    };
    phase.advance(PlacementPhase::Planned);

    let snapshot = function.cfg.clone();
    let mut records = classification.records;

    let entry_record = match ctx.config.entry_poll {
        EntryPollPolicy::AtEntry => insert_entry_poll(function, ctx.poll_function, &mut records),
        EntryPollPolicy::None => None,
    };

    let report = match insert_backedge_polls(
        function,
        &plan,
        ctx.poll_function,
        ctx.config.split_backedges,
    ) {
        Ok(report) => report,
        Err(e) => {
            function.cfg = snapshot;
            error!("safepoint placement failed for {}: {}", function.name, e);
            return FunctionPlacement::new(function, PlacementOutcome::Failed(e), phase);
        }
    };
    phase.advance(PlacementPhase::Inserted);

    let polls_inserted = usize::from(entry_record.is_some()) + report.records.len();
    records.extend(entry_record);
    records.extend(report.records);

    let outcome = if report.unsupported.is_empty() {
        PlacementOutcome::Done
    } else {
        warn!(
            "{} is partially instrumented: {} backedges without polls",
            function.name,
            report.unsupported.len()
        );
        PlacementOutcome::PartiallyInstrumented(report.unsupported)
    };
    phase.advance(PlacementPhase::Done);

    debug!(
        "{}: {} safepoints ({} polls inserted)",
        function.name,
        records.len(),
        polls_inserted
    );
    if polls_inserted > 0 {
        trace!("after safepoint placement:\n{}", dump_function(function));
    }

    FunctionPlacement {
        function: function.id,
        name: function.name.clone(),
        outcome,
        records,
        polls_inserted,
        blocks_inserted: report.blocks_inserted,
        exempt_calls: classification.exempt,
        phase,
    }
}

/// Placement results for a module, in module function order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModulePlacement {
    pub functions: Vec<FunctionPlacement>,
}

impl ModulePlacement {
    /// Look up a function's placement by name
    pub fn get(&self, name: &str) -> Option<&FunctionPlacement> {
        self.functions.iter().find(|p| p.name == name)
    }

    pub fn total_records(&self) -> usize {
        self.functions.iter().map(|p| p.records.len()).sum()
    }

    pub fn polls_inserted(&self) -> usize {
        self.functions.iter().map(|p| p.polls_inserted).sum()
    }

    /// Number of functions whose outcome matches `pred`
    pub fn count(&self, pred: impl Fn(&PlacementOutcome) -> bool) -> usize {
        self.functions.iter().filter(|p| pred(&p.outcome)).count()
    }

    /// Summarize as pass statistics
    pub fn to_result(&self) -> OptimizationResult {
        let mut result = if self.polls_inserted() > 0 {
            OptimizationResult::changed()
        } else {
            OptimizationResult::unchanged()
        };
        result.instructions_inserted = self.polls_inserted();
        result.blocks_inserted = self.functions.iter().map(|p| p.blocks_inserted).sum();
        result.add_stat(
            "call_safepoints",
            self.functions.iter().map(|p| p.call_safepoints()).sum(),
        );
        result.add_stat("polls_inserted", self.polls_inserted());
        result.add_stat(
            "partially_instrumented",
            self.count(|o| matches!(o, PlacementOutcome::PartiallyInstrumented(_))),
        );
        result.add_stat("failed", self.count(|o| matches!(o, PlacementOutcome::Failed(_))));
        result.add_stat("skipped", self.count(|o| matches!(o, PlacementOutcome::Skipped(_))));
        result
    }
}

/// Module-level driver using the crate's own analyses
#[derive(Clone, Default)]
pub struct PlaceSafepoints {
    config: SafepointConfig,
    rules: Vec<Arc<dyn ExemptionRule>>,
}

impl PlaceSafepoints {
    pub fn new(config: SafepointConfig) -> Self {
        Self {
            config,
            rules: Vec::new(),
        }
    }

    /// Add an exemption rule applied to every function
    pub fn with_rule(mut self, rule: Arc<dyn ExemptionRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn config(&self) -> &SafepointConfig {
        &self.config
    }

    /// Validate the configuration and snapshot the module's attributes
    pub fn module_attributes(&self, module: &IrModule) -> Result<ModuleAttributes, SafepointError> {
        self.config.validate()?;
        let attrs = ModuleAttributes::from_module(module, &self.config)?;
        Ok(self
            .rules
            .iter()
            .fold(attrs, |attrs, rule| attrs.with_rule(Arc::clone(rule))))
    }

    /// Place safepoints in one function using its dominator tree and loop nest
    pub fn run_on_function(
        &self,
        function: &mut IrFunction,
        attrs: &ModuleAttributes,
    ) -> FunctionPlacement {
        let domtree = DominatorTree::compute(function);
        let loops = LoopNestInfo::analyze(function, &domtree);
        let ctx = PlacementContext {
            dominance: &domtree,
            loops: &loops,
            attributes: attrs,
            poll_function: attrs.poll_function(),
            config: &self.config,
        };
        place_safepoints(function, &ctx)
    }

    /// Place safepoints in every function of `module`, in parallel.
    ///
    /// Configuration errors are reported before any function is touched.
    pub fn run_on_module(&self, module: &mut IrModule) -> Result<ModulePlacement, SafepointError> {
        let attrs = self.module_attributes(module).map_err(|e| {
            error!("safepoint placement not run on {}: {}", module.name, e);
            e
        })?;

        let functions: Vec<FunctionPlacement> = module
            .functions
            .par_values_mut()
            .map(|function| self.run_on_function(function, &attrs))
            .collect();

        Ok(ModulePlacement { functions })
    }
}

/// Safepoint placement as a module pass
pub struct PlaceSafepointsPass {
    driver: PlaceSafepoints,
    last_run: Option<ModulePlacement>,
}

impl PlaceSafepointsPass {
    pub fn new(config: SafepointConfig) -> Self {
        Self {
            driver: PlaceSafepoints::new(config),
            last_run: None,
        }
    }

    pub fn with_rule(mut self, rule: Arc<dyn ExemptionRule>) -> Self {
        self.driver = self.driver.with_rule(rule);
        self
    }

    /// Placement results of the most recent run
    pub fn last_run(&self) -> Option<&ModulePlacement> {
        self.last_run.as_ref()
    }

    pub fn take_last_run(&mut self) -> Option<ModulePlacement> {
        self.last_run.take()
    }
}

impl OptimizationPass for PlaceSafepointsPass {
    fn name(&self) -> &'static str {
        "place-safepoints"
    }

    fn run_on_module(&mut self, module: &mut IrModule) -> OptimizationResult {
        match self.driver.run_on_module(module) {
            Ok(placement) => {
                let result = placement.to_result();
                self.last_run = Some(placement);
                result
            }
            Err(_) => {
                self.last_run = None;
                let mut result = OptimizationResult::unchanged();
                result.add_stat("configuration_errors", 1);
                result
            }
        }
    }
}
