//! Time-windowed batch accumulation.

use std::time::{Duration, Instant};

use crate::normalize::NormalizedRecord;

/// Records accumulated for one collection since the last flush.
pub type Batch = Vec<NormalizedRecord>;

/// Buffers normalized records between flushes.
///
/// Exclusively owned by one collection watcher, so no locking. The window
/// restarts on every take; flush decisions are purely time-based.
#[derive(Debug)]
pub struct BatchAccumulator {
    records: Batch,
    window_start: Instant,
    flush_interval: Duration,
}

impl BatchAccumulator {
    pub fn new(flush_interval: Duration, now: Instant) -> Self {
        Self {
            records: Vec::new(),
            window_start: now,
            flush_interval,
        }
    }

    /// Add a record to the open batch.
    pub fn append(&mut self, record: NormalizedRecord) {
        self.records.push(record);
    }

    /// True once the window has been open at least the flush interval.
    pub fn should_flush(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.flush_interval
    }

    /// Take the accumulated batch and open a new window at `now`.
    pub fn take_and_reset(&mut self, now: Instant) -> Batch {
        self.window_start = now;
        std::mem::take(&mut self.records)
    }

    /// Restart the window without touching buffered records.
    pub fn restart_window(&mut self, now: Instant) {
        self.window_start = now;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_at_interval_boundary() {
        let start = Instant::now();
        let acc = BatchAccumulator::new(Duration::from_secs(300), start);

        assert!(!acc.should_flush(start));
        assert!(!acc.should_flush(start + Duration::from_secs(299)));
        assert!(acc.should_flush(start + Duration::from_secs(300)));
        assert!(acc.should_flush(start + Duration::from_secs(301)));
    }

    #[test]
    fn test_take_and_reset_clears_batch_and_restarts_window() {
        let start = Instant::now();
        let mut acc = BatchAccumulator::new(Duration::from_secs(300), start);

        acc.append(NormalizedRecord::default());
        acc.append(NormalizedRecord::default());
        assert_eq!(acc.len(), 2);

        let later = start + Duration::from_secs(400);
        assert!(acc.should_flush(later));

        let batch = acc.take_and_reset(later);
        assert_eq!(batch.len(), 2);
        assert!(acc.is_empty());

        // The new window counts from the flush, not from the beginning.
        assert!(!acc.should_flush(later + Duration::from_secs(299)));
        assert!(acc.should_flush(later + Duration::from_secs(300)));
    }

    #[test]
    fn test_restart_window_keeps_records() {
        let start = Instant::now();
        let mut acc = BatchAccumulator::new(Duration::from_secs(10), start);
        acc.append(NormalizedRecord::default());

        acc.restart_window(start + Duration::from_secs(5));
        assert_eq!(acc.len(), 1);
        assert!(!acc.should_flush(start + Duration::from_secs(10)));
        assert!(acc.should_flush(start + Duration::from_secs(15)));
    }
}
