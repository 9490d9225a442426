use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::Sender,
    Arc,
};

/// Receives `(completed, total)` updates from long running operations.
///
/// Updates may arrive from any worker thread and in any order.
pub trait Progress: Sync {
    fn update(&self, completed: usize, total: usize);
}

impl<F> Progress for F
where
    F: Fn(usize, usize) + Sync,
{
    fn update(&self, completed: usize, total: usize) {
        self(completed, total);
    }
}

impl Progress for Sender<(usize, usize)> {
    fn update(&self, completed: usize, total: usize) {
        // A receiver that hung up no longer cares.
        let _ = self.send((completed, total));
    }
}

/// Cooperative cancellation flag shared between a caller and the
/// workers of an operation.
///
/// Work already started is allowed to finish. Workers check the flag
/// before starting a new unit of work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
