//! MIR Pass Framework
//!
//! Passes over the MIR implement [`OptimizationPass`] and are sequenced by a
//! [`PassManager`]. Each pass reports what it changed through an
//! [`OptimizationResult`], whose free-form `stats` table carries
//! pass-specific counters.

use super::safepoints::{PlaceSafepointsPass, SafepointConfig};
use super::IrModule;
use std::collections::HashMap;
use tracing::{debug, error};

/// Optimization pass trait
pub trait OptimizationPass {
    /// Get the name of this pass
    fn name(&self) -> &'static str;

    /// Run the pass on a module
    fn run_on_module(&mut self, module: &mut IrModule) -> OptimizationResult;
}

/// Result of running a pass
#[derive(Debug, Clone, Default)]
pub struct OptimizationResult {
    /// Whether the IR was modified
    pub modified: bool,

    /// Number of instructions added by the pass
    pub instructions_inserted: usize,

    /// Number of blocks added by the pass
    pub blocks_inserted: usize,

    /// Other statistics
    pub stats: HashMap<String, usize>,
}

impl OptimizationResult {
    /// Create a result indicating no changes
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Create a result indicating changes
    pub fn changed() -> Self {
        Self {
            modified: true,
            ..Self::default()
        }
    }

    /// Bump a named counter
    pub fn add_stat(&mut self, key: &str, value: usize) {
        *self.stats.entry(key.to_string()).or_insert(0) += value;
    }

    /// Read a named counter (0 when absent)
    pub fn stat(&self, key: &str) -> usize {
        self.stats.get(key).copied().unwrap_or(0)
    }

    /// Combine results
    pub fn combine(mut self, other: OptimizationResult) -> Self {
        self.modified |= other.modified;
        self.instructions_inserted += other.instructions_inserted;
        self.blocks_inserted += other.blocks_inserted;

        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }

        self
    }
}

/// Pass manager. Runs every registered pass once, in registration order.
pub struct PassManager {
    passes: Vec<Box<dyn OptimizationPass>>,
    verify_after_each: bool,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Create a new pass manager
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            verify_after_each: false,
        }
    }

    /// Add a pass to the manager
    pub fn add_pass<P: OptimizationPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    /// Verify the module after every pass
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_after_each = enabled;
        self
    }

    /// Pipeline that places GC safepoints with the given configuration
    pub fn safepoint_pipeline(config: SafepointConfig) -> Self {
        let mut manager = Self::new().with_verification(true);
        manager.add_pass(PlaceSafepointsPass::new(config));
        manager
    }

    /// Names of the registered passes, in run order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run all passes on a module
    pub fn run(&mut self, module: &mut IrModule) -> OptimizationResult {
        let mut total_result = OptimizationResult::unchanged();

        for pass in &mut self.passes {
            let result = pass.run_on_module(module);
            debug!(
                "pass {} finished (modified: {}, stats: {:?})",
                pass.name(),
                result.modified,
                result.stats
            );
            total_result = total_result.combine(result);

            if self.verify_after_each {
                if let Err(e) = module.verify() {
                    error!("module {} invalid after {}: {}", module.name, pass.name(), e);
                    total_result.add_stat("verification_failures", 1);
                }
            }
        }

        total_result
    }
}
