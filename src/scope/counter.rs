//! Per-scope error occurrence bookkeeping.

use std::sync::atomic::{AtomicU32, Ordering};

/// Counts errors observed by one fault scope.
///
/// Pure bookkeeping. The check-and-increment is atomic, so even with error
/// deliveries racing on a multi-threaded runtime exactly one caller ever
/// observes occurrence 1.
#[derive(Debug, Default)]
pub struct ErrorCounter(AtomicU32);

impl ErrorCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence and return its 1-based number.
    pub fn record(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of errors recorded so far.
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn record_returns_occurrence_numbers() {
        let counter = ErrorCounter::new();
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.record(), 1);
        assert_eq!(counter.record(), 2);
        assert_eq!(counter.record(), 3);
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn first_occurrence_is_observed_exactly_once_across_threads() {
        let counter = Arc::new(ErrorCounter::new());
        let firsts: usize = std::thread::scope(|s| {
            (0..8)
                .map(|_| {
                    let counter = counter.clone();
                    s.spawn(move || (counter.record() == 1) as usize)
                })
                .collect::<Vec<_>>()
                .into_iter()
                .map(|h| h.join().unwrap())
                .sum()
        });
        assert_eq!(firsts, 1);
        assert_eq!(counter.count(), 8);
    }
}
