// Lifecycle error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Lifecycle error code constants
///
/// Error code range: 3001-3005
pub struct LifecycleErrorCodes {}

impl LifecycleErrorCodes {
    /// A collaborator failed to initialize
    pub const INIT_FAILED: i32 = 3001;

    /// Configuration value out of range
    pub const INVALID_CONFIG: i32 = 3002;

    /// Supervisor is already running
    pub const ALREADY_RUNNING: i32 = 3003;

    /// Watchdog thread could not be spawned or joined
    pub const WATCHDOG_FAILED: i32 = 3004;

    /// A monitoring cycle panicked and was abandoned
    pub const CYCLE_PANICKED: i32 = 3005;
}

/// Log a lifecycle error with structured context
pub fn log_lifecycle_error(err: &LifecycleError, context: &str) {
    error!(
        "Lifecycle error in {}: code={}, component=Supervisor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Startup and shutdown errors
///
/// Unlike [`crate::error::AudioError`], these are fatal: they abort startup
/// before the monitoring loop is entered. `CyclePanicked` is the exception;
/// it is reported from inside the loop, which then carries on.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleError {
    /// A collaborator (clip store, source, sink) failed to initialize
    InitFailed { component: String, reason: String },

    /// Configuration rejected by validation
    InvalidConfig { field: String, reason: String },

    /// `Supervisor::run` called twice
    AlreadyRunning,

    /// Watchdog thread failure
    WatchdogFailed { reason: String },

    /// A panic escaped one monitoring cycle
    CyclePanicked { cycle: u64, reason: String },
}

impl ErrorCode for LifecycleError {
    fn code(&self) -> i32 {
        match self {
            LifecycleError::InitFailed { .. } => LifecycleErrorCodes::INIT_FAILED,
            LifecycleError::InvalidConfig { .. } => LifecycleErrorCodes::INVALID_CONFIG,
            LifecycleError::AlreadyRunning => LifecycleErrorCodes::ALREADY_RUNNING,
            LifecycleError::WatchdogFailed { .. } => LifecycleErrorCodes::WATCHDOG_FAILED,
            LifecycleError::CyclePanicked { .. } => LifecycleErrorCodes::CYCLE_PANICKED,
        }
    }

    fn message(&self) -> String {
        match self {
            LifecycleError::InitFailed { component, reason } => {
                format!("{} initialization failed: {}", component, reason)
            }
            LifecycleError::InvalidConfig { field, reason } => {
                format!("Invalid configuration for {}: {}", field, reason)
            }
            LifecycleError::AlreadyRunning => "Supervisor already running".to_string(),
            LifecycleError::WatchdogFailed { reason } => format!("Watchdog failed: {}", reason),
            LifecycleError::CyclePanicked { cycle, reason } => {
                format!("Monitoring cycle {} panicked: {}", cycle, reason)
            }
        }
    }
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LifecycleError (code {}): {}",
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for LifecycleError {}
