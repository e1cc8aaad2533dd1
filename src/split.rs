//! Split/Scatter Coordinator
//!
//! Fire-and-forget split requests. The batcher enqueues a key; a background
//! worker asks the store to split and scatter there. Failures are logged and
//! counted, never returned to the flush that asked.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;

use crossbeam::channel::{self, Sender};

use crate::error::{BulkError, Result};
use crate::store::IngestStore;

/// A queued split request
struct SplitRequest {
    key: Vec<u8>,
    expiration: SystemTime,
}

/// Counters shared with the worker
#[derive(Debug, Default)]
struct SplitCounters {
    requested: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Issues split/scatter requests on a background worker
pub struct SplitScatterCoordinator {
    /// `None` once shut down
    tx: Option<Sender<SplitRequest>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<SplitCounters>,
}

impl SplitScatterCoordinator {
    /// Start a worker issuing requests against `store`
    pub fn start(store: Arc<dyn IngestStore>) -> Result<Self> {
        let (tx, rx) = channel::unbounded::<SplitRequest>();
        let counters = Arc::new(SplitCounters::default());
        let worker_counters = Arc::clone(&counters);

        let worker = std::thread::Builder::new()
            .name("sst-split-scatter".to_string())
            .spawn(move || {
                for request in rx {
                    match store.split_and_scatter(&request.key, request.expiration) {
                        Ok(()) => {
                            worker_counters.succeeded.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!("split and scattered at {}", request.key.escape_ascii());
                        }
                        Err(e) => {
                            worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                "failed to split and scatter at {}: {}",
                                request.key.escape_ascii(),
                                e
                            );
                        }
                    }
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            counters,
        })
    }

    /// Queue a split at `key`; returns as soon as the request is queued
    pub fn request_split_and_scatter(&self, key: &[u8], expiration: SystemTime) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| BulkError::SplitScatter("coordinator is shut down".to_string()))?;

        tx.send(SplitRequest {
            key: key.to_vec(),
            expiration,
        })
        .map_err(|_| BulkError::SplitScatter("split worker has exited".to_string()))?;

        self.counters.requested.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Finish queued requests and stop the worker. Idempotent.
    pub fn shutdown(&mut self) {
        // Dropping the sender ends the worker's receive loop
        self.tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("split/scatter worker panicked");
            }
        }
    }

    /// Requests queued so far
    pub fn requested(&self) -> u64 {
        self.counters.requested.load(Ordering::Relaxed)
    }

    /// Requests the store accepted
    pub fn succeeded(&self) -> u64 {
        self.counters.succeeded.load(Ordering::Relaxed)
    }

    /// Requests the store rejected
    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}

impl Drop for SplitScatterCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
