//! Error taxonomy
//!
//! Normal control flow (hit/no-hit, shadow early exit, branch mispredictions)
//! never produces an error. What remains:
//!
//! - [`EncodingError`]: a value that does not fit its packed sub-format.
//!   Produced while building programs, never at trace time.
//! - [`MathsError`]: only raised by the strict arithmetic policy.
//! - [`EngineError`]: pipeline-modelling faults and malformed programs.
//! - [`ProgramError`]: program assembly and JSON persistence.
//!
//! Author: Moroya Sakamoto

use thiserror::Error;

use crate::fixed::SubFormat;

/// A fixed-point value could not be packed into an instruction field
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingError {
    /// Value is wider than the destination sub-format
    #[error("value {value:#x} does not fit in {format} format")]
    OutOfRange {
        /// Raw 18.14 fixed-point value
        value: i32,
        /// Destination format
        format: SubFormat,
    },

    /// Jump targets are 16 bits wide
    #[error("jump target {0} exceeds the 16-bit program counter")]
    JumpTargetOutOfRange(usize),
}

/// Raised by the strict arithmetic policy where the default policy returns a sentinel
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathsError {
    /// 16x16 multiply operand does not fit in 16 bits
    #[error("16x16 multiply operand out of range: {0} * {1}")]
    MulOperandRange(i32, i32),

    /// Reciprocal of zero
    #[error("reciprocal of zero")]
    DivideByZero,

    /// Square root of a negative value
    #[error("square root of negative value {0}")]
    NegativeSqrt(i32),
}

/// Faults raised while tracing a ray
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Memory unit returned data for a different address than fetch expected
    #[error("memory unit returned address {actual}, fetch expected {expected}")]
    AddressMismatch {
        /// PC the fetch stage was waiting for
        expected: u32,
        /// Address the memory unit actually read
        actual: u32,
    },

    /// Program counter ran past the end of the program
    #[error("program counter {pc} out of range (program length {len})")]
    PcOutOfRange {
        /// Offending program counter
        pc: u32,
        /// Program length in words
        len: usize,
    },

    /// Cycle-accurate run did not finish inside its budget
    #[error("engine exceeded cycle budget of {0}")]
    CycleBudgetExceeded(u64),

    /// Emulator run did not finish inside its budget
    #[error("emulator exceeded instruction budget of {0}")]
    InstructionBudgetExceeded(u64),
}

/// Program assembly and persistence errors
#[derive(Error, Debug)]
pub enum ProgramError {
    /// Instruction field encoding failed
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// Index outside the program buffer
    #[error("instruction index {index} out of range (program length {len})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Program length in words
        len: usize,
    },

    /// Unresolved forward jump label
    #[error("jump at {0} was never bound to a target")]
    UnboundLabel(usize),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
