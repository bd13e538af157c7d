//! Branch prediction table
//!
//! One byte per pair of instruction addresses. Each ray kind owns one bit of
//! the byte (see [`RayKind::prediction_mask`]); the stored bit is the
//! prediction for the even address and its inverse applies to the odd one,
//! since adjacent conditional branches are nearly always complements.
//!
//! Author: Moroya Sakamoto

use serde::{Deserialize, Serialize};

use crate::types::RayKind;

/// Last-outcome predictor shared by every ray traced with one program
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPredictor {
    table: Vec<u8>,
}

impl BranchPredictor {
    /// Table sized for a program of `program_len` words
    pub fn for_program_len(program_len: usize) -> Self {
        Self {
            table: vec![0; table_len(program_len)],
        }
    }

    /// Resize for `program_len`, clearing the table only if the size changes
    ///
    /// Returns true when the table was reallocated.
    pub fn prepare(&mut self, program_len: usize) -> bool {
        let len = table_len(program_len);
        if self.table.len() == len {
            return false;
        }
        self.table = vec![0; len];
        true
    }

    /// Forget everything learned
    pub fn reset(&mut self) {
        self.table.fill(0);
    }

    /// Raw table, one byte per address pair
    #[inline]
    pub fn table(&self) -> &[u8] {
        &self.table
    }

    /// Table byte covering `pc`
    #[inline]
    pub fn entry(&self, pc: u32) -> u8 {
        self.table.get((pc >> 1) as usize).copied().unwrap_or(0)
    }

    /// Decode a prediction from a table byte
    #[inline]
    pub fn predicts_taken(entry: u8, mask: u8, pc: u32) -> bool {
        (entry & mask != 0) != (pc & 1 != 0)
    }

    /// Current prediction for a branch at `pc` on a ray of `kind`
    #[inline]
    pub fn predict(&self, pc: u32, kind: RayKind) -> bool {
        Self::predicts_taken(self.entry(pc), kind.prediction_mask(), pc)
    }

    /// Record a misprediction by flipping the bit the prediction was read from
    ///
    /// `observed` is the byte fetch used, so a second write to the same pair
    /// while the first is still in flight overwrites rather than compounds.
    pub(crate) fn flip(&mut self, pc: u32, observed: u8, mask: u8) {
        if let Some(slot) = self.table.get_mut((pc >> 1) as usize) {
            *slot = observed ^ mask;
        }
    }
}

#[inline]
fn table_len(program_len: usize) -> usize {
    (program_len + 1) >> 1
}
