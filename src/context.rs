//! Cancellation context
//!
//! A cheap, cloneable handle shared between a caller and the batcher/sender
//! it drives. Cancellation is observed between ingestion attempts, never in
//! the middle of a single store request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{BulkError, Result};

/// Cancellation handle
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// Create a fresh, uncancelled context
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel every holder of this context
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the context has been cancelled
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(BulkError::Cancelled);
        }
        Ok(())
    }
}
