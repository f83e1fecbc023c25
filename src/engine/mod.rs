//! Engine module housing the runtime loops.
//!
//! `core` holds the `Supervisor` that owns the lifecycle; `monitor` runs one
//! estimator → evaluator → controller cycle; `watchdog` is the liveness
//! thread; `run_state` is the shared shutdown flag.

pub mod core;
pub mod monitor;
pub mod run_state;
pub mod watchdog;

pub use self::core::{RunSummary, Supervisor};
pub use monitor::{CycleOutcome, Monitor, MonitorCounters};
pub use run_state::RunState;
pub use watchdog::Watchdog;
