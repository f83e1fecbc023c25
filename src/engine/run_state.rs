use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide "keep running" flag shared by every loop
///
/// Starts out running. Clearing it is one-way; each loop re-checks it on
/// every iteration and winds down on its own.
#[derive(Debug, Clone)]
pub struct RunState {
    running: Arc<AtomicBool>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("[RunState] Shutdown requested");
        }
    }

    /// Underlying flag, for handing to signal handlers
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
