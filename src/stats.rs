use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    accept_errors: AtomicU64,
    served: AtomicU64,
    failed: AtomicU64,
    processing: AtomicUsize,
    peak_processing: AtomicUsize,
}

/// Process-wide counters shared by the acceptor, the workers and the handler.
#[derive(Clone, Default)]
pub struct Stats {
    counters: Arc<Counters>,
}

impl Stats {
    pub fn processing(&self) -> usize {
        self.counters.processing.load(Ordering::SeqCst)
    }

    pub fn inc_accepted(&self) -> u64 {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_accept_errors(&self) {
        self.counters.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_served(&self) {
        self.counters.served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks one connection as being processed until the guard is dropped.
    pub fn start_processing(&self) -> ProcessingGuard {
        let now = self.counters.processing.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_processing.fetch_max(now, Ordering::SeqCst);

        ProcessingGuard {
            counters: Arc::clone(&self.counters),
        }
    }
}

#[cfg(test)]
impl Stats {
    pub fn accepted(&self) -> u64 {
        self.counters.accepted.load(Ordering::Relaxed)
    }

    pub fn accept_errors(&self) -> u64 {
        self.counters.accept_errors.load(Ordering::Relaxed)
    }

    pub fn served(&self) -> u64 {
        self.counters.served.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn peak_processing(&self) -> usize {
        self.counters.peak_processing.load(Ordering::SeqCst)
    }
}

pub struct ProcessingGuard {
    counters: Arc<Counters>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.counters.processing.fetch_sub(1, Ordering::SeqCst);
    }
}
