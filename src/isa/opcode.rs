//! Opcodes and condition codes
//!
//! Author: Moroya Sakamoto

use serde::{Deserialize, Serialize};

/// Six-bit operation code held in bits 0..6 of an instruction word
///
/// Sphere and plane variants alternate so that bit 0 distinguishes them
/// inside the `Sphere..=PlaneAnd` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    /// No operation
    Nop = 0,
    /// Add sphere interval
    Sphere = 1,
    /// Add half-space interval
    Plane = 2,
    /// Subtract sphere interval
    SphereSub = 3,
    /// Subtract half-space interval
    PlaneSub = 4,
    /// Intersect with sphere interval
    SphereAnd = 5,
    /// Intersect with half-space interval
    PlaneAnd = 6,
    /// Add box interval
    Aabb = 7,
    /// Subtract box interval
    AabbSub = 8,
    /// Intersect with box interval
    AabbAnd = 9,
    /// Z-test and register the accumulated hit, then clear it
    RegisterHit = 10,
    /// Z-test and register the accumulated hit, keeping it
    RegisterHitNoReset = 11,
    /// Overwrite the registered material on odd tiles
    Checkerboard = 12,
    /// Clear the hit accumulator
    ResetHitState = 13,
    /// Branch
    Jump = 14,
    /// Clear the hit accumulator and branch
    ResetHitStateAndJump = 15,
    /// Load the origin register
    Origin = 16,
    /// Begin a ray
    Start = 17,
    /// Finish the ray
    End = 18,
}

impl Opcode {
    /// Number of defined opcodes
    pub const COUNT: usize = 19;

    /// Decode the low six bits of an instruction word
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        use Opcode::*;
        const TABLE: [Opcode; Opcode::COUNT] = [
            Nop,
            Sphere,
            Plane,
            SphereSub,
            PlaneSub,
            SphereAnd,
            PlaneAnd,
            Aabb,
            AabbSub,
            AabbAnd,
            RegisterHit,
            RegisterHitNoReset,
            Checkerboard,
            ResetHitState,
            Jump,
            ResetHitStateAndJump,
            Origin,
            Start,
            End,
        ];
        TABLE.get(value as usize).copied()
    }

    /// Sphere, plane and box families
    #[inline]
    pub fn is_geometry(self) -> bool {
        (self as u8) >= Opcode::Sphere as u8 && (self as u8) <= Opcode::AabbAnd as u8
    }

    /// Branch instructions
    #[inline]
    pub fn is_jump(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::ResetHitStateAndJump)
    }

    /// Mnemonic used in traces
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Sphere => "Sphere",
            Opcode::Plane => "Plane",
            Opcode::SphereSub => "SphereSub",
            Opcode::PlaneSub => "PlaneSub",
            Opcode::SphereAnd => "SphereAnd",
            Opcode::PlaneAnd => "PlaneAnd",
            Opcode::Aabb => "AABB",
            Opcode::AabbSub => "AABBSub",
            Opcode::AabbAnd => "AABBAnd",
            Opcode::RegisterHit => "RegisterHit",
            Opcode::RegisterHitNoReset => "RegisterHitNoReset",
            Opcode::Checkerboard => "Checkerboard",
            Opcode::ResetHitState => "ResetHitState",
            Opcode::Jump => "Jump",
            Opcode::ResetHitStateAndJump => "ResetHitStateAndJump",
            Opcode::Origin => "Origin",
            Opcode::Start => "Start",
            Opcode::End => "End",
        }
    }
}

/// Two-bit execution condition held in bits 6..8
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Condition {
    /// Always
    #[default]
    Always = 0,
    /// The hit accumulator holds a hit
    OnHit = 1,
    /// The hit accumulator is empty
    NoHit = 2,
    /// The last `RegisterHit` registered something
    OnRegisteredHit = 3,
}

impl Condition {
    /// Decode two bits
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Condition::Always,
            1 => Condition::OnHit,
            2 => Condition::NoHit,
            _ => Condition::OnRegisteredHit,
        }
    }

    /// Short suffix used in traces
    pub fn suffix(self) -> &'static str {
        match self {
            Condition::Always => "AL",
            Condition::OnHit => "OH",
            Condition::NoHit => "NH",
            Condition::OnRegisteredHit => "ORH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table_matches_discriminants() {
        for v in 0..Opcode::COUNT as u8 {
            assert_eq!(Opcode::from_u8(v).map(|o| o as u8), Some(v));
        }
        assert_eq!(Opcode::from_u8(19), None);
        assert_eq!(Opcode::from_u8(63), None);
    }

    #[test]
    fn test_sphere_plane_parity() {
        for op in [Opcode::Sphere, Opcode::SphereSub, Opcode::SphereAnd] {
            assert_eq!(op as u8 & 1, 1);
        }
        for op in [Opcode::Plane, Opcode::PlaneSub, Opcode::PlaneAnd] {
            assert_eq!(op as u8 & 1, 0);
        }
    }

    #[test]
    fn test_condition_bits() {
        for c in [
            Condition::Always,
            Condition::OnHit,
            Condition::NoHit,
            Condition::OnRegisteredHit,
        ] {
            assert_eq!(Condition::from_bits(c as u8), c);
        }
        assert!(Opcode::Aabb.is_geometry());
        assert!(!Opcode::RegisterHit.is_geometry());
        assert!(Opcode::ResetHitStateAndJump.is_jump());
    }
}
