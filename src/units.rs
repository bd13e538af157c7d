//! Clocked functional units
//!
//! Every unit is a [`DelayPipeline`]: the input register moves through `D`
//! delay registers, one per tick, and the terminal operation is applied as
//! the value leaves the last one. A value written to the input during tick
//! `t` is therefore visible on the output after tick `t + D + 1`, which a
//! consumer reading the previous snapshot observes `D + 1` stages later.
//!
//! | Unit | Delay registers | Latency |
//! |------|-----------------|---------|
//! | [`ReciprocalUnit`] | 3 | 4 |
//! | [`SqrtUnit`] | 3 | 4 |
//! | [`MemoryReadUnit`] | 1 | 2 |
//!
//! Author: Moroya Sakamoto

use crate::fixed::{fixed_rcp, fixed_sqrt};

/// Generic fixed-latency, single-issue pipeline
///
/// `D` must be at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPipeline<I, O, const D: usize> {
    input: I,
    delay: [I; D],
    output: O,
}

impl<I: Copy + Default, O: Copy + Default, const D: usize> Default for DelayPipeline<I, O, D> {
    fn default() -> Self {
        Self {
            input: I::default(),
            delay: [I::default(); D],
            output: O::default(),
        }
    }
}

impl<I: Copy + Default, O: Copy + Default, const D: usize> DelayPipeline<I, O, D> {
    /// Ticks between writing the input and reading the result
    pub const LATENCY: usize = D + 1;

    /// Drive the input register for the next tick
    #[inline]
    pub fn set_input(&mut self, value: I) {
        self.input = value;
    }

    /// Current input register
    #[inline]
    pub fn input(&self) -> I {
        self.input
    }

    /// Current output register
    #[inline]
    pub fn output(&self) -> O {
        self.output
    }

    /// Advance one clock, applying `terminal` to the value leaving the last delay register
    #[inline]
    pub fn tick(&self, terminal: impl FnOnce(I) -> O) -> Self {
        let mut delay = [I::default(); D];
        delay[0] = self.input;
        delay[1..].copy_from_slice(&self.delay[..D - 1]);
        Self {
            input: self.input,
            delay,
            output: terminal(self.delay[D - 1]),
        }
    }
}

// ============================================================================
// Arithmetic units
// ============================================================================

/// Four-cycle fixed-point reciprocal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReciprocalUnit(DelayPipeline<i32, i32, 3>);

impl ReciprocalUnit {
    /// Unit latency in ticks
    pub const LATENCY: usize = DelayPipeline::<i32, i32, 3>::LATENCY;

    /// Drive the operand
    #[inline]
    pub fn set_input(&mut self, value: i32) {
        self.0.set_input(value);
    }

    /// Reciprocal of the operand issued `LATENCY` ticks ago
    #[inline]
    pub fn result(&self) -> i32 {
        self.0.output()
    }

    /// Advance one clock
    #[inline]
    pub fn tick(&self) -> Self {
        Self(self.0.tick(fixed_rcp))
    }
}

/// Four-cycle fixed-point square root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqrtUnit(DelayPipeline<i32, i32, 3>);

impl SqrtUnit {
    /// Unit latency in ticks
    pub const LATENCY: usize = DelayPipeline::<i32, i32, 3>::LATENCY;

    /// Drive the operand
    #[inline]
    pub fn set_input(&mut self, value: i32) {
        self.0.set_input(value);
    }

    /// Square root of the operand issued `LATENCY` ticks ago
    #[inline]
    pub fn result(&self) -> i32 {
        self.0.output()
    }

    /// Advance one clock
    #[inline]
    pub fn tick(&self) -> Self {
        Self(self.0.tick(fixed_sqrt))
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Data returned by a [`MemoryReadUnit`], tagged with the address it came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryRead<T> {
    /// Address the read was issued for
    pub address: u32,
    /// `None` when the address was past the end of memory
    pub data: Option<T>,
}

/// Two-cycle synchronous memory read port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReadUnit<T: Copy + Default>(DelayPipeline<u32, MemoryRead<T>, 1>);

impl<T: Copy + Default> Default for MemoryReadUnit<T> {
    fn default() -> Self {
        Self(DelayPipeline::default())
    }
}

impl<T: Copy + Default> MemoryReadUnit<T> {
    /// Unit latency in ticks
    pub const LATENCY: usize = DelayPipeline::<u32, MemoryRead<T>, 1>::LATENCY;

    /// Drive the read address
    #[inline]
    pub fn set_address(&mut self, address: u32) {
        self.0.set_input(address);
    }

    /// Data for the address issued `LATENCY` ticks ago
    #[inline]
    pub fn read(&self) -> MemoryRead<T> {
        self.0.output()
    }

    /// Advance one clock against `memory`
    #[inline]
    pub fn tick(&self, memory: &[T]) -> Self {
        Self(self.0.tick(|address| MemoryRead {
            address,
            data: memory.get(address as usize).copied(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::to_fixed;

    #[test]
    fn test_latency_constants() {
        assert_eq!(ReciprocalUnit::LATENCY, 4);
        assert_eq!(SqrtUnit::LATENCY, 4);
        assert_eq!(MemoryReadUnit::<u64>::LATENCY, 2);
    }

    #[test]
    fn test_sqrt_unit_latency() {
        let mut unit = SqrtUnit::default();
        unit.set_input(to_fixed(16.0));
        let mut seen_at = None;
        for tick in 1..=6 {
            unit = unit.tick();
            // Switch the operand so only the first issue can produce 4.0
            unit.set_input(0);
            if seen_at.is_none() && unit.result() != 0 {
                seen_at = Some(tick);
            }
        }
        assert_eq!(seen_at, Some(SqrtUnit::LATENCY));
    }

    #[test]
    fn test_rcp_unit_streams() {
        let mut unit = ReciprocalUnit::default();
        let inputs = [to_fixed(1.0), to_fixed(2.0), to_fixed(4.0), to_fixed(8.0)];
        let mut outputs = Vec::new();
        for i in 0..8 {
            if let Some(&v) = inputs.get(i) {
                unit.set_input(v);
            }
            unit = unit.tick();
            outputs.push(unit.result());
        }
        // One result per tick, in issue order
        for (k, &v) in inputs.iter().enumerate() {
            assert_eq!(outputs[k + ReciprocalUnit::LATENCY - 1], fixed_rcp(v));
        }
    }

    #[test]
    fn test_memory_unit_tags_address() {
        let memory = [10u64, 11, 12];
        let mut unit = MemoryReadUnit::<u64>::default();
        unit.set_address(2);
        unit = unit.tick(&memory);
        unit.set_address(7);
        unit = unit.tick(&memory);
        assert_eq!(unit.read(), MemoryRead { address: 2, data: Some(12) });
        unit = unit.tick(&memory);
        assert_eq!(unit.read(), MemoryRead { address: 7, data: None });
    }
}
