//! Errors and diagnostics raised while placing safepoints.

use crate::ir::IrBlockId;

/// Errors that stop safepoint placement for a module or for one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafepointError {
    /// The configured poll function is not defined or declared in the module.
    /// Reported once, before any function is processed.
    UnresolvedPollFunction(String),

    /// A configuration value is out of range or could not be parsed
    InvalidConfig(String),

    /// An analysis oracle had no answer for a reachable block, or described
    /// an edge that is not in the CFG. Fatal for the function being processed.
    AnalysisUnavailable(String),
}

impl SafepointError {
    /// Whether this error stops the whole module rather than one function
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedPollFunction(_) | Self::InvalidConfig(_)
        )
    }
}

impl std::fmt::Display for SafepointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnresolvedPollFunction(name) => {
                write!(f, "Poll function '{}' is not present in the module", name)
            }
            Self::InvalidConfig(msg) => write!(f, "Invalid safepoint configuration: {}", msg),
            Self::AnalysisUnavailable(msg) => write!(f, "Analysis unavailable: {}", msg),
        }
    }
}

impl std::error::Error for SafepointError {}

/// A loop backedge that could not receive a poll because its source
/// terminator cannot be split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedBackedge {
    /// Source of the backedge (the latch)
    pub source: IrBlockId,
    /// Loop header the backedge targets
    pub header: IrBlockId,
    /// Terminator shape that prevented the split
    pub reason: &'static str,
}

impl std::fmt::Display for UnsupportedBackedge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "backedge {} -> {} cannot be split ({})",
            self.source, self.header, self.reason
        )
    }
}
