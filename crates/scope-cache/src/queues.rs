//! Height work queues fed by the ingestion loop.
//!
//! - error heights: gaps detected between polls, retried most-recent-first
//! - unverified heights: imported but not yet confirmed, FIFO
//! - persistent errors: heights whose import failed, kept for inspection

use std::collections::VecDeque;

use scope_core::error::CacheError;

#[derive(Debug, Default)]
pub struct HeightQueues {
    errors: VecDeque<u64>,
    unverified: VecDeque<u64>,
    persistent: Vec<u64>,
}

impl HeightQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every height strictly between `start` and `end`. Returns the
    /// number of heights queued; `start + 1 >= end` queues nothing.
    ///
    /// Each height goes to the head of the queue, so the highest missing
    /// height is popped first.
    pub fn push_error_range(&mut self, start: u64, end: u64) -> u64 {
        let first = start.saturating_add(1);
        if first >= end {
            return 0;
        }
        for height in first..end {
            self.errors.push_front(height);
        }
        end - first
    }

    /// Queue a single height for retry ahead of anything already queued.
    pub fn push_error_height(&mut self, height: u64) {
        self.errors.push_front(height);
    }

    pub fn pop_error_height(&mut self) -> Result<u64, CacheError> {
        self.errors.pop_front().ok_or(CacheError::Empty("error heights"))
    }

    pub fn error_len(&self) -> usize {
        self.errors.len()
    }

    /// Queued error heights in pop order.
    pub fn error_heights(&self) -> Vec<u64> {
        self.errors.iter().copied().collect()
    }

    pub fn push_unverified(&mut self, height: u64) {
        self.unverified.push_back(height);
    }

    pub fn pop_unverified(&mut self) -> Result<u64, CacheError> {
        self.unverified
            .pop_front()
            .ok_or(CacheError::Empty("unverified heights"))
    }

    pub fn unverified_len(&self) -> usize {
        self.unverified.len()
    }

    pub fn push_persistent_error(&mut self, height: u64) {
        self.persistent.push(height);
    }

    /// Snapshot of the persistent error list in insertion order.
    pub fn persistent_errors(&self) -> Vec<u64> {
        self.persistent.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_error_height_jumps_the_queue() {
        let mut queues = HeightQueues::new();
        queues.push_error_range(1, 4);
        queues.push_error_height(9);
        assert_eq!(queues.error_heights(), vec![9, 3, 2]);
    }

    #[test]
    fn error_range_is_exclusive_and_highest_first() {
        let mut queues = HeightQueues::new();
        assert_eq!(queues.push_error_range(5, 9), 3);

        assert_eq!(queues.pop_error_height().unwrap(), 8);
        assert_eq!(queues.pop_error_height().unwrap(), 7);
        assert_eq!(queues.pop_error_height().unwrap(), 6);
        assert!(matches!(queues.pop_error_height(), Err(CacheError::Empty(_))));
    }

    #[test]
    fn degenerate_ranges_push_nothing() {
        let mut queues = HeightQueues::new();
        assert_eq!(queues.push_error_range(5, 6), 0);
        assert_eq!(queues.push_error_range(9, 5), 0);
        assert_eq!(queues.push_error_range(u64::MAX, u64::MAX), 0);
        assert_eq!(queues.error_len(), 0);
    }

    #[test]
    fn later_ranges_pop_before_earlier_ones() {
        let mut queues = HeightQueues::new();
        queues.push_error_range(1, 3);
        queues.push_error_range(10, 12);
        assert_eq!(queues.error_heights(), vec![11, 2]);
    }

    #[test]
    fn unverified_is_fifo() {
        let mut queues = HeightQueues::new();
        queues.push_unverified(3);
        queues.push_unverified(4);
        assert_eq!(queues.pop_unverified().unwrap(), 3);
        assert_eq!(queues.pop_unverified().unwrap(), 4);
        assert!(queues.pop_unverified().is_err());
    }

    #[test]
    fn persistent_errors_keep_order() {
        let mut queues = HeightQueues::new();
        for h in [5, 4, 3, 2, 1] {
            queues.push_persistent_error(h);
        }
        assert_eq!(queues.persistent_errors(), vec![5, 4, 3, 2, 1]);
    }
}
