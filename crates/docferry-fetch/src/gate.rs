//! Bound on simultaneous transfers.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting semaphore capping how many transfers are in flight at once,
/// from probe through final disk write. Admission is FIFO-ish; transfers
/// are independent, so strict ordering is not required.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Waits for a slot; the permit releases it on drop.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        self.inner
            .clone()
            .acquire_owned()
            .await
            .expect("gate semaphore is never closed")
    }
}
