use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

struct Inner {
    permits: Arc<Semaphore>,
    capacity: usize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Counting gate bounding how many accepted connections may be waiting to
/// enter the job queue at once. It holds no connection data.
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<Inner>,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(capacity)),
                capacity,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
        }
    }

    /// Waits until a slot is free. Only the calling task is suspended.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AcquireError> {
        let permit = Arc::clone(&self.inner.permits).acquire_owned().await?;

        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);

        Ok(AdmissionPermit {
            _permit: permit,
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots acquired and not yet released.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest `in_flight` ever observed.
    #[cfg(test)]
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

/// One acquired slot, released on drop.
pub struct AdmissionPermit {
    // `drop` runs before the fields are dropped, so the counter falls before
    // the semaphore slot is handed back and `in_flight` never reads above capacity
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
