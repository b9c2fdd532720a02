use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MotionError, Result};

/// Shared flag polled by long-running stages. Clones observe the same flag,
/// so a host can hand one clone to a worker and keep another to cancel.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MotionError::Cancelled)
        } else {
            Ok(())
        }
    }
}
