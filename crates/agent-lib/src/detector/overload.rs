//! Consecutive-threshold overload detection
//!
//! A host is overloaded when every one of the most recent N samples has at
//! least one resource strictly above the threshold. A single recovered
//! sample inside the window is enough to reset eligibility.

use crate::models::Sample;
use std::collections::VecDeque;

/// Default utilization threshold in percent
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 75.0;

/// Default number of consecutive high samples before migrating
pub const DEFAULT_CONSECUTIVE_CHECKS: usize = 5;

/// Ordered FIFO of the most recent samples
#[derive(Debug, Clone)]
pub struct UsageHistory {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl UsageHistory {
    /// Create an empty history retaining at most `capacity` samples
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest entries past capacity
    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// The `n` most recent samples, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Sample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    /// All retained samples, oldest first
    pub fn iter(&self) -> std::collections::vec_deque::Iter<'_, Sample> {
        self.samples.iter()
    }
}

/// Decides whether sustained overload has occurred
#[derive(Debug, Clone)]
pub struct OverloadDetector {
    /// Percentage a resource must strictly exceed
    threshold: f64,
    /// Number of most recent samples that must all breach
    consecutive_checks: usize,
    history: UsageHistory,
}

impl OverloadDetector {
    /// Create a detector; history retention is `2 * consecutive_checks`
    pub fn new(threshold: f64, consecutive_checks: usize) -> Self {
        let consecutive_checks = consecutive_checks.max(1);
        Self {
            threshold,
            consecutive_checks,
            history: UsageHistory::with_capacity(consecutive_checks * 2),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn consecutive_checks(&self) -> usize {
        self.consecutive_checks
    }

    pub fn history(&self) -> &UsageHistory {
        &self.history
    }

    /// Record a sample in the order it was taken
    pub fn record(&mut self, sample: Sample) {
        self.history.push(sample);
    }

    /// True iff the last `consecutive_checks` samples all breach the threshold
    pub fn should_migrate(&self) -> bool {
        if self.history.len() < self.consecutive_checks {
            return false;
        }

        self.history
            .recent(self.consecutive_checks)
            .all(|sample| sample.exceeds(self.threshold))
    }

    /// Number of breaching samples at the tail of the history
    pub fn trailing_breaches(&self) -> usize {
        self.history
            .iter()
            .rev()
            .take_while(|sample| sample.exceeds(self.threshold))
            .count()
    }

    /// Drop all history, e.g. after a failed migration attempt
    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for OverloadDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_PERCENT, DEFAULT_CONSECUTIVE_CHECKS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: f64, mem: f64, disk: f64) -> Sample {
        Sample::at(0, cpu, mem, disk)
    }

    fn detector_with(
        samples: &[(f64, f64, f64)],
        threshold: f64,
        checks: usize,
    ) -> OverloadDetector {
        let mut detector = OverloadDetector::new(threshold, checks);
        for (cpu, mem, disk) in samples {
            detector.record(sample(*cpu, *mem, *disk));
        }
        detector
    }

    #[test]
    fn test_insufficient_samples() {
        let detector = detector_with(&[(99.0, 99.0, 99.0); 4], 75.0, 5);
        assert!(!detector.should_migrate());

        let empty = OverloadDetector::default();
        assert!(!empty.should_migrate());
    }

    #[test]
    fn test_exact_window_all_breaching() {
        let detector = detector_with(
            &[(80.0, 10.0, 10.0), (10.0, 90.0, 10.0), (10.0, 10.0, 76.0)],
            75.0,
            3,
        );
        assert!(detector.should_migrate());
    }

    #[test]
    fn test_cpu_breach_in_every_sample() {
        let detector = detector_with(
            &[(80.0, 50.0, 50.0), (90.0, 60.0, 40.0), (76.0, 20.0, 20.0)],
            75.0,
            3,
        );
        assert!(detector.should_migrate());
    }

    #[test]
    fn test_recovered_sample_blocks_migration() {
        let detector = detector_with(
            &[(80.0, 50.0, 50.0), (90.0, 60.0, 40.0), (50.0, 20.0, 20.0)],
            75.0,
            3,
        );
        assert!(!detector.should_migrate());
    }

    #[test]
    fn test_old_history_does_not_matter() {
        // Three high samples followed by a recovery inside the window
        let detector = detector_with(
            &[
                (99.0, 99.0, 99.0),
                (99.0, 99.0, 99.0),
                (99.0, 99.0, 99.0),
                (99.0, 10.0, 10.0),
                (10.0, 10.0, 10.0),
                (99.0, 10.0, 10.0),
            ],
            75.0,
            3,
        );
        assert!(!detector.should_migrate());

        // Old recovery outside the window is ignored
        let detector = detector_with(
            &[(10.0, 10.0, 10.0), (80.0, 0.0, 0.0), (80.0, 0.0, 0.0), (80.0, 0.0, 0.0)],
            75.0,
            3,
        );
        assert!(detector.should_migrate());
    }

    #[test]
    fn test_threshold_is_strict() {
        let detector = detector_with(&[(75.0, 75.0, 75.0); 3], 75.0, 3);
        assert!(!detector.should_migrate());
    }

    #[test]
    fn test_retention_is_bounded_and_fifo() {
        let mut detector = OverloadDetector::new(75.0, 3);
        for i in 0..20 {
            detector.record(Sample::at(i, 10.0, 10.0, 10.0));
            assert!(detector.len() <= 6);
        }

        let timestamps: Vec<i64> = detector.history().iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![14, 15, 16, 17, 18, 19]);
        assert_eq!(detector.history().latest().map(|s| s.timestamp), Some(19));
    }

    #[test]
    fn test_reset_clears_eligibility() {
        let mut detector = detector_with(&[(90.0, 0.0, 0.0); 3], 75.0, 3);
        assert!(detector.should_migrate());

        detector.reset();
        assert!(detector.is_empty());
        assert!(!detector.should_migrate());

        detector.record(sample(90.0, 0.0, 0.0));
        assert!(!detector.should_migrate());
    }

    #[test]
    fn test_trailing_breaches() {
        let detector = detector_with(
            &[(90.0, 0.0, 0.0), (10.0, 0.0, 0.0), (90.0, 0.0, 0.0), (0.0, 0.0, 91.0)],
            75.0,
            5,
        );
        assert_eq!(detector.trailing_breaches(), 2);
    }

    #[test]
    fn test_zero_checks_is_clamped() {
        let detector = OverloadDetector::new(75.0, 0);
        assert_eq!(detector.consecutive_checks(), 1);
        assert_eq!(detector.history().capacity(), 2);
    }
}
