//! Intersection lanes
//!
//! A lane is the register file one intersection pipeline keeps alongside the
//! instruction slots: entry `n` holds the value computed for whatever
//! instruction sits at stage `n`. Operands are read at stage 3 together with
//! the origin register. The sphere/plane lane shares one square-root unit
//! (issued at stage 4, read at stage 9) and one reciprocal unit (issued at
//! stage 8, read at stage 13) between both primitives.
//!
//! Author: Moroya Sakamoto

use glam::IVec3;

use super::STAGES;
use crate::intersect::{
    AabbBounds, AabbOffsets, AabbSlabs, Interval, PlaneFacing, PlaneOffset, PlaneProbe, PlaneSide,
    SphereChord, SphereProbe, SphereSpan, SphereSurface,
};
use crate::isa::Shape;
use crate::types::Ray;
use crate::units::{ReciprocalUnit, SqrtUnit};

/// Stage that reads geometry operands
pub const OPERAND_STAGE: usize = 3;
const SQRT_ISSUE: usize = 4;
const SQRT_READ: usize = SQRT_ISSUE + SqrtUnit::LATENCY + 1;
const RCP_ISSUE: usize = 8;
const RCP_READ: usize = RCP_ISSUE + ReciprocalUnit::LATENCY + 1;

/// AABB lane register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AabbLane {
    /// No box in flight at this stage
    #[default]
    Idle,
    /// Slab offsets
    Offsets(AabbOffsets),
    /// Slab depths
    Slabs(AabbSlabs),
    /// Per-axis bounds
    Bounds(AabbBounds),
    /// Final interval
    Resolved(Interval),
}

impl AabbLane {
    #[inline]
    fn advance(self, ray: &Ray) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Offsets(o) => Self::Slabs(o.slabs(ray)),
            Self::Slabs(s) => Self::Bounds(s.bounds()),
            Self::Bounds(b) => Self::Resolved(b.resolve(ray)),
            Self::Resolved(i) => Self::Resolved(i),
        }
    }
}

/// Shared sphere/plane lane register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpherePlaneLane {
    /// No sphere or plane in flight at this stage
    #[default]
    Idle,
    /// Sphere, closest approach
    SphereProbe(SphereProbe),
    /// Sphere, waiting on the square root
    SphereChord(SphereChord),
    /// Sphere, entry and exit depths
    SphereSpan(SphereSpan),
    /// Sphere, waiting on `1 / radius`
    SphereSurface(SphereSurface),
    /// Plane, point on the plane
    PlaneProbe(PlaneProbe),
    /// Plane, start offset
    PlaneOffset(PlaneOffset),
    /// Plane, signed distance
    PlaneSide(PlaneSide),
    /// Plane, oriented and waiting on the reciprocal
    PlaneFacing(PlaneFacing),
    /// Final interval
    Resolved(Interval),
}

/// Units driven by the sphere/plane lane this tick
struct SharedUnits<'a> {
    current_sqrt: &'a SqrtUnit,
    current_rcp: &'a ReciprocalUnit,
    next_sqrt: &'a mut SqrtUnit,
    next_rcp: &'a mut ReciprocalUnit,
}

impl SpherePlaneLane {
    /// Work done by the instruction at `stage`
    fn advance(self, stage: usize, ray: &Ray, units: &mut SharedUnits<'_>) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Resolved(i) => Self::Resolved(i),

            Self::SphereProbe(p) => {
                let chord = p.chord();
                units.next_sqrt.set_input(chord.sqrt_input());
                Self::SphereChord(chord)
            }
            Self::SphereChord(c) => {
                if stage == RCP_ISSUE {
                    units.next_rcp.set_input(c.radius);
                }
                if stage == SQRT_READ {
                    Self::SphereSpan(c.span(units.current_sqrt.result()))
                } else {
                    Self::SphereChord(c)
                }
            }
            Self::SphereSpan(s) => Self::SphereSurface(s.surface(ray)),
            Self::SphereSurface(s) => {
                if stage == RCP_READ {
                    Self::Resolved(s.resolve(units.current_rcp.result(), ray))
                } else {
                    Self::SphereSurface(s)
                }
            }

            Self::PlaneProbe(p) => Self::PlaneOffset(p.offset(ray)),
            Self::PlaneOffset(o) => Self::PlaneSide(o.side()),
            Self::PlaneSide(s) => Self::PlaneFacing(s.orient()),
            Self::PlaneFacing(f) => {
                if stage == RCP_ISSUE {
                    units.next_rcp.set_input(f.rcp_input(ray));
                }
                if stage == RCP_READ {
                    Self::Resolved(f.resolve(units.current_rcp.result(), ray))
                } else {
                    Self::PlaneFacing(f)
                }
            }
        }
    }
}

/// Both lanes plus the shared arithmetic units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lanes {
    aabb: [AabbLane; STAGES + 1],
    sphere_plane: [SpherePlaneLane; STAGES + 1],
    sqrt: SqrtUnit,
    rcp: ReciprocalUnit,
}

impl Lanes {
    /// Advance every lane one stage
    ///
    /// `operands` is the geometry instruction at the operand stage, if any,
    /// and `origin` the origin register as that stage sees it.
    pub fn tick(&self, operands: Option<&Shape>, origin: IVec3, ray: &Ray) -> Self {
        let mut next = Self {
            sqrt: self.sqrt.tick(),
            rcp: self.rcp.tick(),
            ..Self::default()
        };

        let entry = OPERAND_STAGE + 1;
        match operands {
            Some(Shape::Aabb(b)) => {
                next.aabb[entry] = AabbLane::Offsets(AabbOffsets::new(b, origin, ray));
            }
            Some(Shape::Sphere(s)) => {
                next.sphere_plane[entry] = SpherePlaneLane::SphereProbe(SphereProbe::new(s, origin, ray));
            }
            Some(Shape::Plane(p)) => {
                next.sphere_plane[entry] = SpherePlaneLane::PlaneProbe(PlaneProbe::new(p, origin));
            }
            None => {}
        }

        let mut units = SharedUnits {
            current_sqrt: &self.sqrt,
            current_rcp: &self.rcp,
            next_sqrt: &mut next.sqrt,
            next_rcp: &mut next.rcp,
        };
        for stage in entry..STAGES {
            next.aabb[stage + 1] = self.aabb[stage].advance(ray);
            next.sphere_plane[stage + 1] = self.sphere_plane[stage].advance(stage, ray, &mut units);
        }
        next
    }

    /// Box interval arriving at commit
    #[inline]
    pub fn aabb_result(&self) -> Interval {
        match self.aabb[STAGES] {
            AabbLane::Resolved(i) => i,
            _ => Interval::MISS,
        }
    }

    /// Sphere or plane interval arriving at commit
    #[inline]
    pub fn sphere_plane_result(&self) -> Interval {
        match self.sphere_plane[STAGES] {
            SpherePlaneLane::Resolved(i) => i,
            _ => Interval::MISS,
        }
    }

    /// Interval for `shape` arriving at commit
    #[inline]
    pub fn result_for(&self, shape: &Shape) -> Interval {
        match shape {
            Shape::Aabb(_) => self.aabb_result(),
            Shape::Sphere(_) | Shape::Plane(_) => self.sphere_plane_result(),
        }
    }

    /// AABB lane register at `stage`
    pub fn aabb_at(&self, stage: usize) -> AabbLane {
        self.aabb.get(stage).copied().unwrap_or_default()
    }

    /// Sphere/plane lane register at `stage`
    pub fn sphere_plane_at(&self, stage: usize) -> SpherePlaneLane {
        self.sphere_plane.get(stage).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::to_fixed;
    use crate::intersect::intersect;
    use crate::isa::{AabbShape, PlaneShape, SphereShape};
    use glam::I16Vec3;

    fn run_through(shape: Shape, ray: &Ray) -> Interval {
        let mut lanes = Lanes::default();
        lanes = lanes.tick(Some(&shape), IVec3::ZERO, ray);
        for _ in OPERAND_STAGE + 1..STAGES {
            lanes = lanes.tick(None, IVec3::ZERO, ray);
        }
        lanes.result_for(&shape)
    }

    #[test]
    fn test_read_stages() {
        assert_eq!(SQRT_READ, 9);
        assert_eq!(RCP_READ, 13);
    }

    #[test]
    fn test_clocked_sphere_matches_direct() {
        let ray = Ray::new(IVec3::ZERO, I16Vec3::new(0, 0, 16384));
        let shape = Shape::Sphere(SphereShape {
            centre: IVec3::new(0, 0, to_fixed(5.0)),
            radius: to_fixed(1.0),
        });
        let clocked = run_through(shape, &ray);
        assert!(clocked.is_hit());
        assert_eq!(clocked, intersect(&shape, IVec3::ZERO, &ray));
    }

    #[test]
    fn test_clocked_plane_matches_direct() {
        let ray = Ray::new(IVec3::ZERO, I16Vec3::new(0, -11585, 11585));
        let shape = Shape::Plane(PlaneShape {
            normal: I16Vec3::new(0, 16384, 0),
            distance: to_fixed(-1.0),
        });
        assert_eq!(run_through(shape, &ray), intersect(&shape, IVec3::ZERO, &ray));
    }

    #[test]
    fn test_clocked_aabb_matches_direct() {
        let ray = Ray::new(IVec3::new(0, 0, to_fixed(-5.0)), I16Vec3::new(0, 0, 16384));
        let shape = Shape::Aabb(AabbShape {
            min: IVec3::splat(to_fixed(-1.0)),
            max: IVec3::splat(to_fixed(1.0)),
        });
        assert_eq!(run_through(shape, &ray), intersect(&shape, IVec3::ZERO, &ray));
    }

    #[test]
    fn test_back_to_back_shapes_do_not_mix() {
        let ray = Ray::new(IVec3::ZERO, I16Vec3::new(0, 0, 16384));
        let near = Shape::Sphere(SphereShape {
            centre: IVec3::new(0, 0, to_fixed(5.0)),
            radius: to_fixed(1.0),
        });
        let far = Shape::Sphere(SphereShape {
            centre: IVec3::new(0, 0, to_fixed(10.0)),
            radius: to_fixed(2.0),
        });

        let mut lanes = Lanes::default().tick(Some(&near), IVec3::ZERO, &ray);
        lanes = lanes.tick(Some(&far), IVec3::ZERO, &ray);
        for _ in OPERAND_STAGE + 2..STAGES {
            lanes = lanes.tick(None, IVec3::ZERO, &ray);
        }
        assert_eq!(lanes.sphere_plane_result(), intersect(&near, IVec3::ZERO, &ray));
        lanes = lanes.tick(None, IVec3::ZERO, &ray);
        assert_eq!(lanes.sphere_plane_result(), intersect(&far, IVec3::ZERO, &ray));
    }
}
