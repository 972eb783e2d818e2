use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct QueueDepthSnapshot {
    pub current: usize,
    pub peak: usize,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PipelineQueueSnapshot {
    pub batch: QueueDepthSnapshot,
    pub result: QueueDepthSnapshot,
}

#[derive(Debug, Default)]
pub struct QueueDepthTracker {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl QueueDepthTracker {
    pub fn increment(&self) -> usize {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.update_peak(current);
        current
    }

    pub fn decrement(&self) -> usize {
        let mut observed = self.current.load(Ordering::Relaxed);
        loop {
            if observed == 0 {
                return 0;
            }
            match self.current.compare_exchange_weak(
                observed,
                observed - 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return observed - 1,
                Err(next) => observed = next,
            }
        }
    }

    pub fn snapshot(&self) -> QueueDepthSnapshot {
        QueueDepthSnapshot {
            current: self.current.load(Ordering::Relaxed),
            peak: self.peak.load(Ordering::Relaxed),
        }
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.peak.load(Ordering::Relaxed);
        while current > peak {
            match self.peak.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(next) => peak = next,
            }
        }
    }
}

/// Queue depth and merge timing counters shared across pipeline threads.
/// Merge timing feeds the adaptive batch sizing on the reader side.
#[derive(Debug, Default)]
pub struct PipelineQueueMetrics {
    pub batch: QueueDepthTracker,
    pub result: QueueDepthTracker,
    merge_nanos: AtomicU64,
    merged_batches: AtomicU64,
}

impl PipelineQueueMetrics {
    pub fn snapshot(&self) -> PipelineQueueSnapshot {
        PipelineQueueSnapshot {
            batch: self.batch.snapshot(),
            result: self.result.snapshot(),
        }
    }

    pub fn record_merge(&self, elapsed: Duration) {
        self.merge_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.merged_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Total merge wall time and batch count accumulated so far.
    pub fn merge_totals(&self) -> (Duration, u64) {
        (
            Duration::from_nanos(self.merge_nanos.load(Ordering::Relaxed)),
            self.merged_batches.load(Ordering::Relaxed),
        )
    }
}
