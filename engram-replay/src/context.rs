use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation + progress for a running consolidation.
///
/// The engine observes the cancel flag at its safe points (between
/// episodes and between annealing steps) and reports coarse progress.
pub struct ReplayContext {
    cancel: Arc<AtomicBool>,
    progress: Option<Box<dyn Fn(u8) + Send + Sync>>,
}

impl ReplayContext {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self {
            cancel,
            progress: None,
        }
    }

    /// A context that can never be cancelled and reports nowhere.
    pub fn detached() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)))
    }

    pub fn with_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn report_progress(&self, percent: u8) {
        if let Some(ref f) = self.progress {
            f(percent.min(100));
        }
    }
}
