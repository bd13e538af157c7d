//! Program buffers
//!
//! A [`Program`] is the flat instruction-word array the engine fetches from.
//! It is reference counted so that many worker threads can trace against the
//! same buffer, and patchable in place for animated edit points.
//!
//! Author: Moroya Sakamoto

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::instruction::{Instruction, Op};
use super::opcode::Condition;
use crate::error::{EncodingError, ProgramError};

/// Largest addressable program
pub const MAX_PROGRAM_LEN: usize = 1 << 16;

/// Immutable, shareable sequence of instruction words
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<u64>", into = "Vec<u64>")]
pub struct Program {
    words: Arc<Vec<u64>>,
}

impl From<Vec<u64>> for Program {
    fn from(words: Vec<u64>) -> Self {
        Self {
            words: Arc::new(words),
        }
    }
}

impl From<Program> for Vec<u64> {
    fn from(program: Program) -> Self {
        Arc::try_unwrap(program.words).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl Program {
    /// Wrap raw instruction words
    pub fn new(words: Vec<u64>) -> Self {
        Self::from(words)
    }

    /// Encode a list of instructions
    pub fn from_instructions(instructions: &[Instruction]) -> Result<Self, EncodingError> {
        let words = instructions
            .iter()
            .map(Instruction::encode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(words))
    }

    /// Number of instruction words
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// True for an empty buffer
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Raw words
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Word at `pc`
    #[inline]
    pub fn word(&self, pc: u32) -> Option<u64> {
        self.words.get(pc as usize).copied()
    }

    /// Decoded instruction at `pc`
    #[inline]
    pub fn instruction(&self, pc: u32) -> Option<Instruction> {
        self.word(pc).map(Instruction::decode)
    }

    /// Decode every word
    pub fn decode_all(&self) -> Vec<Instruction> {
        self.words.iter().map(|&w| Instruction::decode(w)).collect()
    }

    /// Replace one instruction (edit-point animation)
    ///
    /// Copies the buffer first if other handles still share it.
    pub fn patch(&mut self, index: usize, instruction: Instruction) -> Result<(), ProgramError> {
        let len = self.len();
        let word = instruction.encode()?;
        let slot = Arc::make_mut(&mut self.words)
            .get_mut(index)
            .ok_or(ProgramError::IndexOutOfRange { index, len })?;
        *slot = word;
        Ok(())
    }

    /// Serialize as a JSON array of words
    pub fn to_json(&self) -> Result<String, ProgramError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON array of words
    pub fn from_json(json: &str) -> Result<Self, ProgramError> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Forward reference to a jump whose target is bound later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a label must be bound before the program is built"]
pub struct Label(usize);

/// Assembles programs, resolving forward jump targets
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    unbound: Vec<usize>,
}

impl ProgramBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the next instruction will occupy
    #[inline]
    pub fn here(&self) -> usize {
        self.instructions.len()
    }

    /// Append an instruction
    pub fn push(&mut self, instruction: Instruction) -> &mut Self {
        self.instructions.push(instruction);
        self
    }

    /// Append a jump whose target is bound later with [`bind`](Self::bind)
    pub fn jump_forward(&mut self, condition: Condition, reset_hit_state: bool) -> Label {
        let at = self.here();
        self.instructions.push(Instruction::new(
            Op::Jump {
                target: 0,
                reset_hit_state,
            },
            condition,
        ));
        self.unbound.push(at);
        Label(at)
    }

    /// Point `label` at the next instruction to be pushed
    pub fn bind(&mut self, label: Label) -> Result<(), EncodingError> {
        let target = self.here();
        let target16 =
            u16::try_from(target).map_err(|_| EncodingError::JumpTargetOutOfRange(target))?;
        if let Some(Instruction {
            op: Op::Jump { target, .. },
            ..
        }) = self.instructions.get_mut(label.0)
        {
            *target = target16;
        }
        self.unbound.retain(|&at| at != label.0);
        Ok(())
    }

    /// Encode the program
    pub fn build(&self) -> Result<Program, ProgramError> {
        if let Some(&at) = self.unbound.first() {
            return Err(ProgramError::UnboundLabel(at));
        }
        if self.instructions.len() > MAX_PROGRAM_LEN {
            return Err(EncodingError::JumpTargetOutOfRange(self.instructions.len()).into());
        }
        Ok(Program::from_instructions(&self.instructions)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{CsgOp, Opcode};
    use crate::types::Material;
    use glam::Vec3;

    #[test]
    fn test_builder_binds_forward_jump() {
        let mut b = ProgramBuilder::new();
        b.push(Instruction::start());
        let skip = b.jump_forward(Condition::NoHit, false);
        b.push(Instruction::sphere(CsgOp::Add, Vec3::Z * 5.0, 1.0));
        b.bind(skip).unwrap();
        b.push(Instruction::end());
        let program = b.build().unwrap();

        assert_eq!(program.len(), 4);
        let jump = program.instruction(1).unwrap();
        assert_eq!(jump.opcode(), Some(Opcode::Jump));
        assert_eq!(
            jump.op,
            Op::Jump {
                target: 3,
                reset_hit_state: false
            }
        );
    }

    #[test]
    fn test_unbound_label_fails() {
        let mut b = ProgramBuilder::new();
        let _label = b.jump_forward(Condition::Always, false);
        assert!(matches!(b.build(), Err(ProgramError::UnboundLabel(0))));
    }

    #[test]
    fn test_patch_copies_on_write() {
        let before = Program::from_instructions(&[
            Instruction::start(),
            Instruction::register_hit(Material::WHITE),
            Instruction::end(),
        ])
        .unwrap();
        let mut edited = before.clone();
        let red = Material::from_rgb(255, 0, 0, 0);
        edited.patch(1, Instruction::register_hit(red)).unwrap();

        assert_ne!(before, edited);
        assert_eq!(
            edited.instruction(1).unwrap().op,
            Op::RegisterHit {
                material: red,
                reset: true
            }
        );
        assert!(matches!(
            edited.patch(9, Instruction::end()),
            Err(ProgramError::IndexOutOfRange { index: 9, len: 3 })
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let program = Program::new(vec![17, 18]);
        let json = program.to_json().unwrap();
        assert_eq!(json, "[17,18]");
        assert_eq!(Program::from_json(&json).unwrap(), program);
    }
}
