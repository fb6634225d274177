//! Build Observation
//!
//! Progress, warnings and cooperative cancellation of a tiling run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Receives build events and decides whether the build goes on
///
/// Cancellation is checked once at the start of every tile.
pub trait BuildObserver {
    /// `fraction` is in `[0, 1]`
    fn on_progress(&self, fraction: f64, message: &str);

    /// A tile was emitted below the requested quality
    fn on_warning(&self, message: &str);

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shared cancellation switch
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Observer forwarding everything to the `log` facade
#[derive(Debug, Clone, Default)]
pub struct LogObserver {
    cancel: CancelFlag,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer that stops the build once `cancel` is raised
    pub fn with_cancel_flag(cancel: CancelFlag) -> Self {
        Self { cancel }
    }
}

impl BuildObserver for LogObserver {
    fn on_progress(&self, fraction: f64, message: &str) {
        log::info!("[{:>5.1}%] {}", fraction * 100.0, message);
    }

    fn on_warning(&self, message: &str) {
        log::warn!("{}", message);
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Observer keeping every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    progress: Mutex<Vec<(f64, String)>>,
    warnings: Mutex<Vec<String>>,
    cancel: CancelFlag,
    cancel_after: Option<usize>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report cancellation once `count` progress events were received
    pub fn cancel_after(count: usize) -> Self {
        Self {
            cancel_after: Some(count),
            ..Self::default()
        }
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn progress(&self) -> Vec<(f64, String)> {
        self.progress.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl BuildObserver for RecordingObserver {
    fn on_progress(&self, fraction: f64, message: &str) {
        let mut progress = self.progress.lock();
        progress.push((fraction, message.to_string()));
        if self.cancel_after.is_some_and(|count| progress.len() >= count) {
            self.cancel.cancel();
        }
    }

    fn on_warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
