//! Instruction set
//!
//! Instruction words are 64 bits: a 6-bit opcode, a 2-bit condition and an
//! opcode-specific payload of packed fixed-point operands.
//!
//! Author: Moroya Sakamoto

mod instruction;
mod opcode;
mod program;

pub use instruction::{AabbShape, CsgOp, Instruction, Op, PlaneShape, Shape, SphereShape};
pub use opcode::{Condition, Opcode};
pub use program::{Label, Program, ProgramBuilder, MAX_PROGRAM_LEN};
