//! GC safepoint placement for a CFG-based mid-level IR.
//!
//! [`ir`] holds the IR, its analyses, and the [`ir::safepoints`] pass;
//! [`logging`] sets up `env_logger` output for the pass's `tracing` events.

pub mod ir;
pub mod logging;
