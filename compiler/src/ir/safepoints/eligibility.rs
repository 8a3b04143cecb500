//! Decides whether a function takes part in safepoint placement.

use super::{AttributeOracle, SafepointConfig};
use crate::ir::{ExceptionModel, IrFunction};

/// Why a function was left untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// External declaration or empty body
    Declaration,
    /// Not compiled for any garbage collector
    NoGcStrategy,
    /// Compiled for a collector that does not use polls
    UnsupportedGcStrategy(String),
    /// The function is the poll itself
    PollFunction,
    /// The function never triggers a collection
    GcLeaf,
    /// Funclet-based exception handling is not supported
    FuncletPersonality,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declaration => write!(f, "no body"),
            Self::NoGcStrategy => write!(f, "no gc strategy"),
            Self::UnsupportedGcStrategy(name) => write!(f, "gc strategy '{}' not configured", name),
            Self::PollFunction => write!(f, "is the poll function"),
            Self::GcLeaf => write!(f, "gc-leaf"),
            Self::FuncletPersonality => write!(f, "funclet exception model"),
        }
    }
}

/// Check every exclusion in order; the first that applies is reported.
pub fn check_eligibility(
    function: &IrFunction,
    attrs: &dyn AttributeOracle,
    config: &SafepointConfig,
) -> Result<(), SkipReason> {
    if function.is_declaration() {
        return Err(SkipReason::Declaration);
    }

    match function.attributes.gc.as_deref() {
        None => return Err(SkipReason::NoGcStrategy),
        Some(strategy) if !config.supports_gc_strategy(strategy) => {
            return Err(SkipReason::UnsupportedGcStrategy(strategy.to_string()))
        }
        Some(_) => {}
    }

    if attrs.is_poll_function(function.id) {
        return Err(SkipReason::PollFunction);
    }

    if function.attributes.gc_leaf || attrs.is_gc_leaf(function.id) {
        return Err(SkipReason::GcLeaf);
    }

    if function.attributes.exception_model == ExceptionModel::Funclet {
        return Err(SkipReason::FuncletPersonality);
    }

    Ok(())
}
