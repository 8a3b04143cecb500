//! Read-only analysis capabilities consumed by safepoint placement.
//!
//! Placement never computes dominance, loops, or callee attributes itself; it
//! asks these oracles. The crate's own analyses implement them, and tests can
//! substitute synthetic answers.

use super::{SafepointConfig, SafepointError, SafepointLocation};
use crate::ir::loop_analysis::{DominatorTree, LoopNestInfo, TripCount};
use crate::ir::{CallAttributes, Callee, FunctionKind, IrBlockId, IrFunction, IrFunctionId, IrModule};
use fxhash::FxHashSet;
use std::sync::Arc;

/// Dominance queries. `None` means the oracle has no answer for the pair.
pub trait DominanceOracle {
    fn dominates(&self, a: IrBlockId, b: IrBlockId) -> Option<bool>;
}

impl DominanceOracle for DominatorTree {
    fn dominates(&self, a: IrBlockId, b: IrBlockId) -> Option<bool> {
        if !self.contains(a) || !self.contains(b) {
            return None;
        }
        Some(DominatorTree::dominates(self, a, b))
    }
}

/// One natural loop as seen by placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDescriptor {
    /// Loop header
    pub header: IrBlockId,
    /// Sources of the edges back to the header
    pub backedges: Vec<IrBlockId>,
    /// Nesting depth (0 = outermost)
    pub depth: usize,
    /// Known trip count, if any
    pub trip_count: Option<TripCount>,
}

/// Loop structure queries. `None` means loop analysis is unavailable.
pub trait LoopOracle {
    /// Loops of `function`, outer loops before inner ones
    fn loops_of(&self, function: &IrFunction) -> Option<Vec<LoopDescriptor>>;
}

impl LoopOracle for LoopNestInfo {
    fn loops_of(&self, function: &IrFunction) -> Option<Vec<LoopDescriptor>> {
        let mut loops = Vec::with_capacity(self.loops.len());
        for natural_loop in self.loops_by_depth() {
            // Stale analysis for a different body
            let position = function.cfg.block_position(natural_loop.header)?;
            loops.push((
                natural_loop.nesting_depth,
                position,
                LoopDescriptor {
                    header: natural_loop.header,
                    backedges: natural_loop.back_edges.clone(),
                    depth: natural_loop.nesting_depth,
                    trip_count: natural_loop.trip_count,
                },
            ));
        }
        loops.sort_by_key(|(depth, position, _)| (*depth, *position));
        Some(loops.into_iter().map(|(_, _, l)| l).collect())
    }
}

/// A call-like instruction presented to exemption checks
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    /// Function containing the call
    pub caller: &'a IrFunction,
    /// Block containing the call
    pub block: IrBlockId,
    /// Position of the call in its block
    pub location: SafepointLocation,
    /// Call target
    pub callee: Callee,
    /// Attributes attached to the call
    pub attrs: CallAttributes,
}

impl CallSite<'_> {
    /// Direct callee, if known
    pub fn direct_callee(&self) -> Option<IrFunctionId> {
        match self.callee {
            Callee::Direct(id) => Some(id),
            Callee::Indirect(_) => None,
        }
    }
}

/// Boolean attribute queries about functions and call sites
pub trait AttributeOracle: Sync {
    /// The function never triggers a collection
    fn is_gc_leaf(&self, func: IrFunctionId) -> bool;

    /// The call cannot trigger a collection and is not a safepoint
    fn is_exempt(&self, site: &CallSite<'_>) -> bool;

    /// The function is the configured safepoint poll
    fn is_poll_function(&self, func: IrFunctionId) -> bool;
}

/// Extra rule marking call sites as non-safepoints
pub trait ExemptionRule: Send + Sync {
    /// Name used in trace output
    fn name(&self) -> &'static str;

    fn exempts(&self, site: &CallSite<'_>) -> bool;
}

/// Exempts direct calls to the listed symbols
#[derive(Debug, Clone)]
pub struct NamedCalleeRule {
    names: Vec<String>,
    resolved: FxHashSet<IrFunctionId>,
}

impl NamedCalleeRule {
    /// Resolve `names` against the module; unknown names never match
    pub fn new(module: &IrModule, names: &[&str]) -> Self {
        let resolved = names
            .iter()
            .filter_map(|name| module.find_function(name))
            .map(|f| f.id)
            .collect();
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            resolved,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl ExemptionRule for NamedCalleeRule {
    fn name(&self) -> &'static str {
        "named-callee"
    }

    fn exempts(&self, site: &CallSite<'_>) -> bool {
        site.direct_callee()
            .map_or(false, |id| self.resolved.contains(&id))
    }
}

/// Attribute oracle backed by a snapshot of the module's function attributes.
///
/// The snapshot is taken before any function is mutated, so it can be shared
/// by workers that each own one function.
#[derive(Clone)]
pub struct ModuleAttributes {
    gc_leaf: FxHashSet<IrFunctionId>,
    intrinsics: FxHashSet<IrFunctionId>,
    poll_function: IrFunctionId,
    rules: Vec<Arc<dyn ExemptionRule>>,
}

impl ModuleAttributes {
    /// Snapshot `module` and resolve the configured poll function
    pub fn from_module(module: &IrModule, config: &SafepointConfig) -> Result<Self, SafepointError> {
        let poll_function = module
            .find_function(&config.poll_function)
            .map(|f| f.id)
            .ok_or_else(|| SafepointError::UnresolvedPollFunction(config.poll_function.clone()))?;

        let gc_leaf = module
            .functions
            .values()
            .filter(|f| f.attributes.gc_leaf)
            .map(|f| f.id)
            .collect();
        let intrinsics = module
            .functions
            .values()
            .filter(|f| f.kind == FunctionKind::Intrinsic)
            .map(|f| f.id)
            .collect();

        Ok(Self {
            gc_leaf,
            intrinsics,
            poll_function,
            rules: Vec::new(),
        })
    }

    /// Register an extra exemption rule
    pub fn with_rule(mut self, rule: Arc<dyn ExemptionRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Resolved poll function
    pub fn poll_function(&self) -> IrFunctionId {
        self.poll_function
    }

    /// Whether the callee is a compiler intrinsic
    pub fn is_intrinsic(&self, func: IrFunctionId) -> bool {
        self.intrinsics.contains(&func)
    }
}

impl std::fmt::Debug for ModuleAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleAttributes")
            .field("gc_leaf", &self.gc_leaf.len())
            .field("intrinsics", &self.intrinsics.len())
            .field("poll_function", &self.poll_function)
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl AttributeOracle for ModuleAttributes {
    fn is_gc_leaf(&self, func: IrFunctionId) -> bool {
        self.gc_leaf.contains(&func)
    }

    fn is_exempt(&self, site: &CallSite<'_>) -> bool {
        if site.attrs.gc_leaf {
            return true;
        }
        if let Some(callee) = site.direct_callee() {
            if self.is_gc_leaf(callee) || self.is_intrinsic(callee) {
                return true;
            }
        }
        self.rules.iter().any(|rule| rule.exempts(site))
    }

    fn is_poll_function(&self, func: IrFunctionId) -> bool {
        func == self.poll_function
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionSignatureBuilder, IrBuilder, IrType};

    fn module_with_callees() -> (IrModule, IrFunctionId, IrFunctionId, IrFunctionId) {
        let mut builder = IrBuilder::new("test".to_string(), "test.mir".to_string());
        let sig = FunctionSignatureBuilder::new().build();
        let poll = builder.declare_function(
            "gc.safepoint_poll".to_string(),
            sig.clone(),
            FunctionKind::ExternC,
        );
        let intrinsic =
            builder.declare_function("llvm.memcpy".to_string(), sig.clone(), FunctionKind::Intrinsic);
        let leaf = builder.declare_function("leaf".to_string(), sig, FunctionKind::ExternC);
        if let Some(f) = builder.module.functions.get_mut(&leaf) {
            f.attributes.gc_leaf = true;
        }
        (builder.module, poll, intrinsic, leaf)
    }

    #[test]
    fn test_unresolved_poll_function() {
        let module = IrModule::new("empty".to_string(), "empty.mir".to_string());
        let err = ModuleAttributes::from_module(&module, &SafepointConfig::default()).unwrap_err();
        assert_eq!(
            err,
            SafepointError::UnresolvedPollFunction("gc.safepoint_poll".to_string())
        );
    }

    #[test]
    fn test_exemptions() {
        let (module, poll, intrinsic, leaf) = module_with_callees();
        let attrs = ModuleAttributes::from_module(&module, &SafepointConfig::default()).unwrap();
        assert!(attrs.is_poll_function(poll));
        assert!(attrs.is_gc_leaf(leaf));
        assert!(!attrs.is_gc_leaf(intrinsic));

        let caller = IrFunction::new(
            IrFunctionId(99),
            "caller".to_string(),
            FunctionSignatureBuilder::new().returns(IrType::Void).build(),
        );
        let site = |callee: Callee, attrs: CallAttributes| CallSite {
            caller: &caller,
            block: IrBlockId::entry(),
            location: SafepointLocation::Instruction(0),
            callee,
            attrs,
        };

        assert!(attrs.is_exempt(&site(Callee::Direct(leaf), CallAttributes::default())));
        assert!(attrs.is_exempt(&site(Callee::Direct(intrinsic), CallAttributes::default())));
        assert!(attrs.is_exempt(&site(Callee::Direct(poll), CallAttributes::gc_leaf())));
        assert!(!attrs.is_exempt(&site(Callee::Direct(poll), CallAttributes::default())));
        assert!(!attrs.is_exempt(&site(
            Callee::Indirect(crate::ir::IrId::new(0)),
            CallAttributes::default()
        )));
    }

    #[test]
    fn test_named_callee_rule() {
        let (mut module, _, _, _) = module_with_callees();
        let sig = FunctionSignatureBuilder::new().build();
        let id = module.alloc_function_id();
        module.add_function(IrFunction::declaration(id, "rt_fast_path".to_string(), sig));

        let rule = NamedCalleeRule::new(&module, &["rt_fast_path", "not_here"]);
        assert_eq!(rule.names().len(), 2);

        let attrs = ModuleAttributes::from_module(&module, &SafepointConfig::default())
            .unwrap()
            .with_rule(Arc::new(rule));
        let caller = IrFunction::new(
            IrFunctionId(99),
            "caller".to_string(),
            FunctionSignatureBuilder::new().build(),
        );
        let site = CallSite {
            caller: &caller,
            block: IrBlockId::entry(),
            location: SafepointLocation::Terminator,
            callee: Callee::Direct(id),
            attrs: CallAttributes::default(),
        };
        assert!(attrs.is_exempt(&site));
        assert!(format!("{:?}", attrs).contains("named-callee"));
    }
}
