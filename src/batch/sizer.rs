//! Adaptive batch size.

use tracing::warn;

/// How a completed envelope went, as far as batch sizing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFeedback {
    /// The remote rejected the envelope itself for its size or shape (413, batch-level 400).
    PayloadRejected,
    /// Anything else: a batch response, throttling, network trouble.
    Other,
}

/// Holds the `max_batch_size` used when re-batching surviving units.
///
/// Two consecutive payload rejections halve the size, down to 1.
#[derive(Debug, Clone)]
pub struct BatchSizer {
    current: usize,
    consecutive_rejections: u32,
    reductions: u32,
}

const REJECTIONS_BEFORE_SHRINK: u32 = 2;

impl BatchSizer {
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            current: max_batch_size.max(1),
            consecutive_rejections: 0,
            reductions: 0,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn reductions(&self) -> u32 {
        self.reductions
    }

    /// Feed the result of one envelope submission. Returns `true` if the size shrank.
    pub fn observe(&mut self, feedback: EnvelopeFeedback) -> bool {
        match feedback {
            EnvelopeFeedback::Other => {
                self.consecutive_rejections = 0;
                false
            }
            EnvelopeFeedback::PayloadRejected => {
                self.consecutive_rejections += 1;
                if self.consecutive_rejections < REJECTIONS_BEFORE_SHRINK {
                    return false;
                }
                self.consecutive_rejections = 0;
                if self.current == 1 {
                    return false;
                }
                let previous = self.current;
                self.current = (self.current / 2).max(1);
                self.reductions += 1;
                warn!(
                    previous,
                    current = self.current,
                    "batch payload rejected twice in a row, halving max batch size"
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_rejection_does_not_shrink() {
        let mut sizer = BatchSizer::new(20);
        assert!(!sizer.observe(EnvelopeFeedback::PayloadRejected));
        assert_eq!(sizer.current(), 20);
    }

    #[test]
    fn test_two_consecutive_rejections_halve() {
        let mut sizer = BatchSizer::new(20);
        sizer.observe(EnvelopeFeedback::PayloadRejected);
        assert!(sizer.observe(EnvelopeFeedback::PayloadRejected));
        assert_eq!(sizer.current(), 10);
        assert_eq!(sizer.reductions(), 1);
    }

    #[test]
    fn test_interleaved_success_resets_counter() {
        let mut sizer = BatchSizer::new(8);
        sizer.observe(EnvelopeFeedback::PayloadRejected);
        sizer.observe(EnvelopeFeedback::Other);
        assert!(!sizer.observe(EnvelopeFeedback::PayloadRejected));
        assert_eq!(sizer.current(), 8);
    }

    #[test]
    fn test_floor_of_one() {
        let mut sizer = BatchSizer::new(3);
        for _ in 0..10 {
            sizer.observe(EnvelopeFeedback::PayloadRejected);
        }
        assert_eq!(sizer.current(), 1);
        assert_eq!(sizer.reductions(), 1);
    }
}
