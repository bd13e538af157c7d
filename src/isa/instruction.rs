//! Decoded instructions
//!
//! An instruction word is decoded once, at fetch, into an [`Instruction`]:
//! a condition plus a typed [`Op`] payload. Encoding goes the other way and is
//! where operand range checking happens.
//!
//! Author: Moroya Sakamoto

use std::fmt;

use glam::{I16Vec3, IVec3, Vec3};
use serde::{Deserialize, Serialize};

use super::opcode::{Condition, Opcode};
use crate::error::EncodingError;
use crate::fixed::{from_fixed, to_fixed, to_fixed_vec, SubFormat};
use crate::types::Material;

// ============================================================================
// Operands
// ============================================================================

/// How a primitive's interval combines with the hit accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CsgOp {
    /// Union
    #[default]
    Add,
    /// Difference
    Sub,
    /// Intersection
    And,
}

/// Sphere operands (18.14, already sign-extended)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SphereShape {
    /// Centre relative to the origin register
    pub centre: IVec3,
    /// Radius
    pub radius: i32,
}

/// Half-space operands; the solid side is opposite the normal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneShape {
    /// Unit normal
    pub normal: I16Vec3,
    /// Distance of the plane from the origin register along the normal
    pub distance: i32,
}

/// Box operands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AabbShape {
    /// Minimum corner relative to the origin register
    pub min: IVec3,
    /// Maximum corner relative to the origin register
    pub max: IVec3,
}

/// Primitive volume tested by a geometry instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// Sphere
    Sphere(SphereShape),
    /// Half-space
    Plane(PlaneShape),
    /// Axis-aligned box
    Aabb(AabbShape),
}

/// Operation payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// No operation
    #[default]
    Nop,
    /// Intersect a primitive and merge it into the hit accumulator
    Geometry {
        /// Merge rule
        merge: CsgOp,
        /// Primitive
        shape: Shape,
    },
    /// Z-test the accumulator against the registered hit
    RegisterHit {
        /// Material to register on a win
        material: Material,
        /// Clear the accumulator afterwards
        reset: bool,
    },
    /// Rewrite the registered material on odd tiles
    Checkerboard(Material),
    /// Clear the accumulator
    ResetHitState,
    /// Branch
    Jump {
        /// Destination PC
        target: u16,
        /// Clear the accumulator whether or not the branch is taken
        reset_hit_state: bool,
    },
    /// Load the origin register
    Origin(IVec3),
    /// Begin a ray
    Start,
    /// Finish the ray
    End,
    /// Undefined opcode; executes as a no-op
    Reserved(u8),
}

// ============================================================================
// Field layout
// ============================================================================

const SPHERE_FIELDS: [u32; 3] = [8, 23, 38];
const SPHERE_RADIUS: u32 = 53;
const PLANE_FIELDS: [u32; 3] = [8, 20, 32];
const PLANE_DISTANCE: u32 = 44;
const AABB_MIN: [u32; 3] = [8, 17, 26];
const AABB_MAX: [u32; 3] = [35, 44, 53];
const ORIGIN_FIELDS: [u32; 3] = [8, 23, 38];
const MATERIAL_REFLECTIVENESS: u32 = 8;
const MATERIAL_ALBEDO: u32 = 16;
const JUMP_TARGET: u32 = 8;

fn extract_vec(word: u64, format: SubFormat, shifts: [u32; 3]) -> IVec3 {
    IVec3::new(
        format.extract(word, shifts[0]),
        format.extract(word, shifts[1]),
        format.extract(word, shifts[2]),
    )
}

fn insert_vec(v: IVec3, format: SubFormat, shifts: [u32; 3]) -> Result<u64, EncodingError> {
    Ok(format.insert(v.x, shifts[0])?
        | format.insert(v.y, shifts[1])?
        | format.insert(v.z, shifts[2])?)
}

fn extract_material(word: u64) -> Material {
    Material {
        albedo: (word >> MATERIAL_ALBEDO) as u16,
        reflectiveness: (word >> MATERIAL_REFLECTIVENESS) as u8,
    }
}

fn insert_material(m: Material) -> u64 {
    ((m.albedo as u64) << MATERIAL_ALBEDO) | ((m.reflectiveness as u64) << MATERIAL_REFLECTIVENESS)
}

// ============================================================================
// Instruction
// ============================================================================

/// A decoded instruction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Operation and operands
    pub op: Op,
    /// Execution condition
    pub condition: Condition,
}

impl Instruction {
    /// The no-op that fills pipeline bubbles
    pub const NOP: Self = Self {
        op: Op::Nop,
        condition: Condition::Always,
    };

    /// Pair an operation with a condition
    #[inline]
    pub const fn new(op: Op, condition: Condition) -> Self {
        Self { op, condition }
    }

    /// Replace the condition
    #[inline]
    pub const fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    // --- Builders ----------------------------------------------------------

    /// Sphere; subtract and intersect forms default to `OnHit`
    pub fn sphere(merge: CsgOp, centre: Vec3, radius: f32) -> Self {
        Self::geometry(
            merge,
            Shape::Sphere(SphereShape {
                centre: to_fixed_vec(centre),
                radius: to_fixed(radius),
            }),
        )
    }

    /// Half-space with outward `normal` at `distance` along it
    pub fn plane(merge: CsgOp, normal: Vec3, distance: f32) -> Self {
        let n = normal.normalize_or_zero();
        Self::geometry(
            merge,
            Shape::Plane(PlaneShape {
                normal: I16Vec3::new(
                    to_fixed(n.x) as i16,
                    to_fixed(n.y) as i16,
                    to_fixed(n.z) as i16,
                ),
                distance: to_fixed(distance),
            }),
        )
    }

    /// Axis-aligned box
    pub fn aabb(merge: CsgOp, min: Vec3, max: Vec3) -> Self {
        Self::geometry(
            merge,
            Shape::Aabb(AabbShape {
                min: to_fixed_vec(min),
                max: to_fixed_vec(max),
            }),
        )
    }

    /// Geometry instruction with the conventional condition for its merge rule
    pub fn geometry(merge: CsgOp, shape: Shape) -> Self {
        let condition = match merge {
            CsgOp::Add => Condition::Always,
            CsgOp::Sub | CsgOp::And => Condition::OnHit,
        };
        Self::new(Op::Geometry { merge, shape }, condition)
    }

    /// Register the accumulated hit and clear the accumulator
    pub fn register_hit(material: Material) -> Self {
        Self::new(
            Op::RegisterHit {
                material,
                reset: true,
            },
            Condition::Always,
        )
    }

    /// Register the accumulated hit, keeping the accumulator
    pub fn register_hit_no_reset(material: Material) -> Self {
        Self::new(
            Op::RegisterHit {
                material,
                reset: false,
            },
            Condition::Always,
        )
    }

    /// Alternate material, applied only if the preceding `RegisterHit` registered
    pub fn checkerboard(material: Material) -> Self {
        Self::new(Op::Checkerboard(material), Condition::OnRegisteredHit)
    }

    /// Clear the accumulator
    pub fn reset_hit_state() -> Self {
        Self::new(Op::ResetHitState, Condition::Always)
    }

    /// Branch to `target` when `condition` holds
    pub fn jump(target: u16, condition: Condition) -> Self {
        Self::new(
            Op::Jump {
                target,
                reset_hit_state: false,
            },
            condition,
        )
    }

    /// Clear the accumulator and branch to `target` when `condition` holds
    pub fn reset_and_jump(target: u16, condition: Condition) -> Self {
        Self::new(
            Op::Jump {
                target,
                reset_hit_state: true,
            },
            condition,
        )
    }

    /// Load the origin register
    pub fn origin(offset: Vec3) -> Self {
        Self::new(Op::Origin(to_fixed_vec(offset)), Condition::Always)
    }

    /// Begin a ray
    pub fn start() -> Self {
        Self::new(Op::Start, Condition::Always)
    }

    /// Finish the ray
    pub fn end() -> Self {
        Self::new(Op::End, Condition::Always)
    }

    // --- Queries -----------------------------------------------------------

    /// Opcode, or `None` for reserved encodings
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self.op {
            Op::Nop => Opcode::Nop,
            Op::Geometry { merge, shape } => match (shape, merge) {
                (Shape::Sphere(_), CsgOp::Add) => Opcode::Sphere,
                (Shape::Sphere(_), CsgOp::Sub) => Opcode::SphereSub,
                (Shape::Sphere(_), CsgOp::And) => Opcode::SphereAnd,
                (Shape::Plane(_), CsgOp::Add) => Opcode::Plane,
                (Shape::Plane(_), CsgOp::Sub) => Opcode::PlaneSub,
                (Shape::Plane(_), CsgOp::And) => Opcode::PlaneAnd,
                (Shape::Aabb(_), CsgOp::Add) => Opcode::Aabb,
                (Shape::Aabb(_), CsgOp::Sub) => Opcode::AabbSub,
                (Shape::Aabb(_), CsgOp::And) => Opcode::AabbAnd,
            },
            Op::RegisterHit { reset: true, .. } => Opcode::RegisterHit,
            Op::RegisterHit { reset: false, .. } => Opcode::RegisterHitNoReset,
            Op::Checkerboard(_) => Opcode::Checkerboard,
            Op::ResetHitState => Opcode::ResetHitState,
            Op::Jump {
                reset_hit_state: false,
                ..
            } => Opcode::Jump,
            Op::Jump {
                reset_hit_state: true,
                ..
            } => Opcode::ResetHitStateAndJump,
            Op::Origin(_) => Opcode::Origin,
            Op::Start => Opcode::Start,
            Op::End => Opcode::End,
            Op::Reserved(_) => return None,
        })
    }

    /// True for bubbles; reserved opcodes are not bubbles
    #[inline]
    pub fn is_nop(&self) -> bool {
        matches!(self.op, Op::Nop)
    }

    // --- Encoding ----------------------------------------------------------

    /// Decode a 64-bit instruction word
    pub fn decode(word: u64) -> Self {
        let raw_opcode = (word & 0x3F) as u8;
        let condition = Condition::from_bits((word >> 6) as u8);
        let Some(opcode) = Opcode::from_u8(raw_opcode) else {
            return Self::new(Op::Reserved(raw_opcode), condition);
        };

        let sphere = || {
            Shape::Sphere(SphereShape {
                centre: extract_vec(word, SubFormat::Q8_7, SPHERE_FIELDS),
                radius: SubFormat::Q4_7.extract(word, SPHERE_RADIUS),
            })
        };
        let plane = || {
            let n = extract_vec(word, SubFormat::Q2_10, PLANE_FIELDS);
            Shape::Plane(PlaneShape {
                normal: I16Vec3::new(n.x as i16, n.y as i16, n.z as i16),
                distance: SubFormat::Q8_12.extract(word, PLANE_DISTANCE),
            })
        };
        let aabb = || {
            Shape::Aabb(AabbShape {
                min: extract_vec(word, SubFormat::Q8_1, AABB_MIN),
                max: extract_vec(word, SubFormat::Q8_1, AABB_MAX),
            })
        };
        let geometry = |merge, shape| Op::Geometry { merge, shape };

        let op = match opcode {
            Opcode::Nop => Op::Nop,
            Opcode::Sphere => geometry(CsgOp::Add, sphere()),
            Opcode::SphereSub => geometry(CsgOp::Sub, sphere()),
            Opcode::SphereAnd => geometry(CsgOp::And, sphere()),
            Opcode::Plane => geometry(CsgOp::Add, plane()),
            Opcode::PlaneSub => geometry(CsgOp::Sub, plane()),
            Opcode::PlaneAnd => geometry(CsgOp::And, plane()),
            Opcode::Aabb => geometry(CsgOp::Add, aabb()),
            Opcode::AabbSub => geometry(CsgOp::Sub, aabb()),
            Opcode::AabbAnd => geometry(CsgOp::And, aabb()),
            Opcode::RegisterHit => Op::RegisterHit {
                material: extract_material(word),
                reset: true,
            },
            Opcode::RegisterHitNoReset => Op::RegisterHit {
                material: extract_material(word),
                reset: false,
            },
            Opcode::Checkerboard => Op::Checkerboard(extract_material(word)),
            Opcode::ResetHitState => Op::ResetHitState,
            Opcode::Jump | Opcode::ResetHitStateAndJump => Op::Jump {
                target: (word >> JUMP_TARGET) as u16,
                reset_hit_state: opcode == Opcode::ResetHitStateAndJump,
            },
            Opcode::Origin => Op::Origin(extract_vec(word, SubFormat::Q8_7, ORIGIN_FIELDS)),
            Opcode::Start => Op::Start,
            Opcode::End => Op::End,
        };
        Self::new(op, condition)
    }

    /// Encode to a 64-bit instruction word, range-checking every packed operand
    pub fn encode(&self) -> Result<u64, EncodingError> {
        let opcode = match self.opcode() {
            Some(op) => op as u64,
            None => match self.op {
                Op::Reserved(raw) => (raw & 0x3F) as u64,
                _ => 0,
            },
        };
        let header = opcode | ((self.condition as u64) << 6);

        let payload = match self.op {
            Op::Geometry { shape, .. } => match shape {
                Shape::Sphere(s) => {
                    insert_vec(s.centre, SubFormat::Q8_7, SPHERE_FIELDS)?
                        | SubFormat::Q4_7.insert(s.radius, SPHERE_RADIUS)?
                }
                Shape::Plane(p) => {
                    let n = IVec3::new(p.normal.x as i32, p.normal.y as i32, p.normal.z as i32);
                    insert_vec(n, SubFormat::Q2_10, PLANE_FIELDS)?
                        | SubFormat::Q8_12.insert(p.distance, PLANE_DISTANCE)?
                }
                Shape::Aabb(b) => {
                    insert_vec(b.min, SubFormat::Q8_1, AABB_MIN)?
                        | insert_vec(b.max, SubFormat::Q8_1, AABB_MAX)?
                }
            },
            Op::RegisterHit { material, .. } | Op::Checkerboard(material) => {
                insert_material(material)
            }
            Op::Jump { target, .. } => (target as u64) << JUMP_TARGET,
            Op::Origin(offset) => insert_vec(offset, SubFormat::Q8_7, ORIGIN_FIELDS)?,
            Op::Nop | Op::ResetHitState | Op::Start | Op::End | Op::Reserved(_) => 0,
        };
        Ok(header | payload)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.opcode() {
            Some(op) => write!(f, "{}.{}", op.mnemonic(), self.condition.suffix())?,
            None => write!(f, "Reserved({})", match self.op {
                Op::Reserved(raw) => raw,
                _ => 0,
            })?,
        }
        match self.op {
            Op::Geometry {
                shape: Shape::Sphere(s),
                ..
            } => write!(
                f,
                " ({:.3}, {:.3}, {:.3}) r={:.3}",
                from_fixed(s.centre.x),
                from_fixed(s.centre.y),
                from_fixed(s.centre.z),
                from_fixed(s.radius)
            ),
            Op::Geometry {
                shape: Shape::Plane(p),
                ..
            } => write!(
                f,
                " n=({:.3}, {:.3}, {:.3}) d={:.3}",
                from_fixed(p.normal.x as i32),
                from_fixed(p.normal.y as i32),
                from_fixed(p.normal.z as i32),
                from_fixed(p.distance)
            ),
            Op::Geometry {
                shape: Shape::Aabb(b),
                ..
            } => write!(
                f,
                " ({:.1}, {:.1}, {:.1})-({:.1}, {:.1}, {:.1})",
                from_fixed(b.min.x),
                from_fixed(b.min.y),
                from_fixed(b.min.z),
                from_fixed(b.max.x),
                from_fixed(b.max.y),
                from_fixed(b.max.z)
            ),
            Op::RegisterHit { material, .. } | Op::Checkerboard(material) => write!(
                f,
                " albedo={:#06x} refl={}",
                material.albedo, material.reflectiveness
            ),
            Op::Jump { target, .. } => write!(f, " -> {target}"),
            Op::Origin(o) => write!(
                f,
                " ({:.3}, {:.3}, {:.3})",
                from_fixed(o.x),
                from_fixed(o.y),
                from_fixed(o.z)
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encode_sphere() {
        let inst = Instruction::sphere(CsgOp::Add, Vec3::new(1.5, -2.0, 5.0), 1.0);
        let word = inst.encode().unwrap();
        assert_eq!(word & 0x3F, Opcode::Sphere as u64);
        assert_eq!(Instruction::decode(word), inst);
    }

    #[test]
    fn test_sub_defaults_to_on_hit() {
        let inst = Instruction::sphere(CsgOp::Sub, Vec3::ZERO, 1.0);
        assert_eq!(inst.condition, Condition::OnHit);
        let word = inst.encode().unwrap();
        assert_eq!((word >> 6) & 3, Condition::OnHit as u64);
        assert_eq!(inst.opcode(), Some(Opcode::SphereSub));
    }

    #[test]
    fn test_plane_fields() {
        let inst = Instruction::plane(CsgOp::Add, Vec3::Y, -1.0);
        let decoded = Instruction::decode(inst.encode().unwrap());
        match decoded.op {
            Op::Geometry {
                shape: Shape::Plane(p),
                merge: CsgOp::Add,
            } => {
                assert_eq!(p.normal, I16Vec3::new(0, 16384, 0));
                assert_eq!(p.distance, to_fixed(-1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_aabb_quantises_to_half_units() {
        let inst = Instruction::aabb(CsgOp::And, Vec3::splat(-1.25), Vec3::splat(2.0));
        let decoded = Instruction::decode(inst.encode().unwrap());
        match decoded.op {
            Op::Geometry {
                shape: Shape::Aabb(b),
                ..
            } => {
                assert_eq!(b.min, IVec3::splat(to_fixed(-1.5)));
                assert_eq!(b.max, IVec3::splat(to_fixed(2.0)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_material_layout() {
        let m = Material::from_rgb(255, 0, 0, 200);
        let word = Instruction::register_hit(m).encode().unwrap();
        assert_eq!((word >> 16) & 0xFFFF, 0x1F);
        assert_eq!((word >> 8) & 0xFF, 200);
        assert_eq!(Instruction::decode(word).op, Op::RegisterHit { material: m, reset: true });
    }

    #[test]
    fn test_jump_target() {
        let word = Instruction::reset_and_jump(0x1234, Condition::NoHit)
            .encode()
            .unwrap();
        assert_eq!(word, 15 | (2 << 6) | (0x1234 << 8));
        let decoded = Instruction::decode(word);
        assert_eq!(decoded.opcode(), Some(Opcode::ResetHitStateAndJump));
    }

    #[test]
    fn test_reserved_opcode() {
        let decoded = Instruction::decode(40);
        assert_eq!(decoded.op, Op::Reserved(40));
        assert_eq!(decoded.opcode(), None);
        assert_eq!(decoded.encode().unwrap(), 40);
    }

    #[test]
    fn test_encode_rejects_large_radius() {
        let inst = Instruction::sphere(CsgOp::Add, Vec3::ZERO, 9.0);
        assert!(matches!(inst.encode(), Err(EncodingError::OutOfRange { .. })));
    }

    #[test]
    fn test_display() {
        let text = Instruction::jump(3, Condition::OnHit).to_string();
        assert_eq!(text, "Jump.OH -> 3");
    }
}
