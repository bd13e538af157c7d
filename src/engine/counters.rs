//! Performance counters
//!
//! Author: Moroya Sakamoto

use serde::{Deserialize, Serialize};

/// Diagnostic counters; never affect results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfCounters {
    /// Clock ticks (engine) or dispatched instructions (emulator)
    pub cycles: u64,
    /// Conditional branches resolved as predicted
    pub branch_hits: u64,
    /// Conditional branches that caused a flush
    pub branch_misses: u64,
    /// Instructions whose condition held
    pub instructions_executed: u64,
    /// Bubbles and instructions whose condition failed
    pub instructions_abandoned: u64,
}

impl PerfCounters {
    /// Fraction of branches predicted correctly, `None` when none resolved
    pub fn branch_hit_rate(&self) -> Option<f32> {
        let total = self.branch_hits + self.branch_misses;
        (total > 0).then(|| self.branch_hits as f32 / total as f32)
    }

    /// Add another set of counters into this one
    pub fn accumulate(&mut self, other: &PerfCounters) {
        self.cycles += other.cycles;
        self.branch_hits += other.branch_hits;
        self.branch_misses += other.branch_misses;
        self.instructions_executed += other.instructions_executed;
        self.instructions_abandoned += other.instructions_abandoned;
    }
}

impl std::ops::AddAssign for PerfCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.accumulate(&rhs);
    }
}

impl std::iter::Sum for PerfCounters {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, c| {
            acc += c;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut c = PerfCounters::default();
        assert_eq!(c.branch_hit_rate(), None);
        c.branch_hits = 3;
        c.branch_misses = 1;
        assert_eq!(c.branch_hit_rate(), Some(0.75));
    }

    #[test]
    fn test_sum() {
        let one = PerfCounters {
            cycles: 10,
            branch_hits: 1,
            ..Default::default()
        };
        let total: PerfCounters = [one, one, one].into_iter().sum();
        assert_eq!(total.cycles, 30);
        assert_eq!(total.branch_hits, 3);
    }
}
