//! Per-backend admission control.
//!
//! Each backend gets a counting semaphore sized to the configured cap. A
//! forward holds an [`AdmissionPermit`] for its whole lifetime; dropping the
//! permit, on any exit path, gives the slot back.

use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug)]
pub struct AdmissionController {
    cap: usize,
    limiters: Vec<Option<Arc<Semaphore>>>,
}

impl AdmissionController {
    /// One limiter per backend. A cap of 0 admits everything immediately.
    pub fn new(backends: usize, cap: usize) -> Self {
        let limiters = (0..backends)
            .map(|_| (cap > 0).then(|| Arc::new(Semaphore::new(cap))))
            .collect();
        Self { cap, limiters }
    }

    pub fn is_enabled(&self) -> bool {
        self.cap > 0
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Waits until backend `index` has a free slot. No timeout.
    pub async fn acquire(&self, index: usize) -> Result<AdmissionPermit, AcquireError> {
        let Some(limiter) = self.limiter(index) else {
            return Ok(AdmissionPermit { _permit: None });
        };
        let permit = Arc::clone(limiter).acquire_owned().await?;
        Ok(AdmissionPermit {
            _permit: Some(permit),
        })
    }

    /// Free slots on backend `index`; `None` when unlimited.
    pub fn available(&self, index: usize) -> Option<usize> {
        self.limiter(index).map(|limiter| limiter.available_permits())
    }

    fn limiter(&self, index: usize) -> Option<&Arc<Semaphore>> {
        self.limiters.get(index).and_then(Option::as_ref)
    }
}

/// An admitted forward. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: Option<OwnedSemaphorePermit>,
}
