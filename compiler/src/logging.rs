//! Logging configuration for safepoint placement
//!
//! Pass code emits events through `tracing`; the `log` feature of `tracing`
//! forwards them to the `log` facade, which `env_logger` prints.
//!
//! # Usage
//!
//! ```rust,ignore
//! use safepoint_compiler::logging;
//!
//! // Initialize with default level (Warn)
//! logging::init();
//!
//! // Or initialize from RUST_LOG environment variable
//! logging::init_from_env();
//!
//! // Or initialize with a specific level
//! logging::init_with_level(log::LevelFilter::Debug);
//! ```
//!
//! # Log Levels
//!
//! - `error!` - a function could not be analyzed and was left unchanged
//! - `warn!` - backedges that could not receive a poll
//! - `debug!` - per-function plans, skip reasons and totals
//! - `trace!` - exempt calls, covered backedges and IR dumps before/after
//!
//! # Environment Variable
//!
//! ```bash
//! RUST_LOG=safepoint_compiler::ir::safepoints=debug cargo test
//! RUST_LOG=safepoint_compiler::ir::safepoints::planner=trace cargo test
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

fn format_record(buf: &mut env_logger::fmt::Formatter, record: &log::Record<'_>) -> std::io::Result<()> {
    writeln!(
        buf,
        "[{:5}] {}:{} - {}",
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.args()
    )
}

/// Initialize logging with sensible defaults (Warn level).
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level.
///
/// This only initializes once; subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new().filter_level(level).format(format_record).init();
    });
}

/// Initialize logging with an `env_logger` filter string such as
/// `"warn,safepoint_compiler::ir::safepoints=trace"`.
pub fn init_with_filter(filter: &str) {
    INIT.call_once(|| {
        Builder::new().parse_filters(filter).format(format_record).init();
    });
}

/// Initialize logging from the RUST_LOG environment variable.
///
/// If RUST_LOG is not set, defaults to Warn level.
pub fn init_from_env() {
    INIT.call_once(|| {
        Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format(format_record)
            .init();
    });
}

/// Initialize logging for tests.
///
/// Output is captured by the test harness; RUST_LOG still applies.
pub fn init_test() {
    // try_init() doesn't panic if already initialized
    let _ = Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Whether one of the `init*` functions (other than `init_test`) ran.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
