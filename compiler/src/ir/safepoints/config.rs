//! Safepoint placement configuration.
//!
//! Configuration is read from the `[safepoints]` table of a TOML document.
//! Every key is optional:
//!
//! ```toml
//! [safepoints]
//! poll-function = "gc.safepoint_poll"
//! backedge-only = false
//! entry-poll = "none"          # or "at-entry"
//! backedge-polls = true
//! all-backedges = false
//! split-backedges = true
//! counted-loop-trip-width = 32 # absent = never exempt counted loops
//! gc-strategies = ["statepoint-example", "coreclr"]
//! ```

use super::SafepointError;
use serde::{Deserialize, Serialize};

/// Default symbol called at inserted safepoints
pub const DEFAULT_POLL_FUNCTION: &str = "gc.safepoint_poll";

/// GC strategies that use safepoint polls unless configured otherwise
pub const DEFAULT_GC_STRATEGIES: &[&str] = &["statepoint-example", "coreclr"];

/// Whether a poll is unconditionally placed at function entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryPollPolicy {
    /// Only loops get polls
    #[default]
    None,
    /// Every eligible function gets a poll in its entry block
    AtEntry,
}

/// Options controlling where safepoints are placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SafepointConfig {
    /// Symbol called at every inserted safepoint
    pub poll_function: String,

    /// Calls are not safepoints; only backedge (and entry) polls are
    pub backedge_only: bool,

    /// Entry poll policy
    pub entry_poll: EntryPollPolicy,

    /// Plan polls on loop backedges at all
    pub backedge_polls: bool,

    /// Poll every backedge, even ones already dominated by a safepoint
    pub all_backedges: bool,

    /// Put backedge polls on a new block splitting the edge; when false the
    /// poll goes right before the latch's terminator
    pub split_backedges: bool,

    /// Loops whose maximum trip count fits in this many bits need no poll
    pub counted_loop_trip_width: Option<u32>,

    /// GC strategy names whose functions are instrumented
    pub gc_strategies: Vec<String>,
}

impl Default for SafepointConfig {
    fn default() -> Self {
        Self {
            poll_function: DEFAULT_POLL_FUNCTION.to_string(),
            backedge_only: false,
            entry_poll: EntryPollPolicy::None,
            backedge_polls: true,
            all_backedges: false,
            split_backedges: true,
            counted_loop_trip_width: None,
            gc_strategies: DEFAULT_GC_STRATEGIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The raw TOML document; other tables are ignored.
#[derive(Debug, Deserialize)]
struct RawConfigFile {
    #[serde(default)]
    safepoints: SafepointConfig,
}

impl SafepointConfig {
    /// Parse the `[safepoints]` table of a TOML document and validate it.
    /// A document without the table yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, SafepointError> {
        let raw: RawConfigFile = toml::from_str(content).map_err(|e| {
            SafepointError::InvalidConfig(format!("failed to parse safepoint config: {}", e))
        })?;
        raw.safepoints.validate()?;
        Ok(raw.safepoints)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), SafepointError> {
        if self.poll_function.trim().is_empty() {
            return Err(SafepointError::InvalidConfig(
                "poll-function must name a symbol".to_string(),
            ));
        }

        if let Some(width) = self.counted_loop_trip_width {
            if !(1..=64).contains(&width) {
                return Err(SafepointError::InvalidConfig(format!(
                    "counted-loop-trip-width must be between 1 and 64, got {}",
                    width
                )));
            }
        }

        Ok(())
    }

    /// Whether functions compiled for `strategy` participate
    pub fn supports_gc_strategy(&self, strategy: &str) -> bool {
        self.gc_strategies.iter().any(|s| s == strategy)
    }

    /// Whether a loop running at most `max_iterations` times is bounded enough
    /// to go without a backedge poll
    pub fn is_bounded_trip_count(&self, max_iterations: u64) -> bool {
        match self.counted_loop_trip_width {
            Some(width) => u64::BITS - max_iterations.leading_zeros() <= width,
            None => false,
        }
    }
}
