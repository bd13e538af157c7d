//! Ray–half-space test
//!
//! The side of the plane the ray starts on decides which way the tested
//! normal faces. The reciprocal of the negated denominator comes from the
//! reciprocal unit shared with the sphere path, so a negative reciprocal means
//! the ray points away from the plane.
//!
//! Author: Moroya Sakamoto

use glam::{I16Vec3, IVec3};

use super::Interval;
use crate::fixed::{dot16, fixed_mul, fixed_rcp, negate16, scale_vec, widen};
use crate::isa::PlaneShape;
use crate::types::Ray;

/// Stage 3: a point on the plane, offset by the origin register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneProbe {
    /// Point on the plane
    pub point: IVec3,
    /// Plane normal
    pub normal: I16Vec3,
}

/// Stage 4: ray start relative to the plane point
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneOffset {
    /// `start - point`
    pub delta: IVec3,
    /// Plane normal
    pub normal: I16Vec3,
}

/// Stage 5: signed distance of the ray start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneSide {
    /// Negative inside the solid
    pub signed_distance: i32,
    /// Plane normal
    pub normal: I16Vec3,
}

/// Stages 6-7: normal and distance oriented towards the ray start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaneFacing {
    /// Normal facing the ray start's side
    pub normal: I16Vec3,
    /// Distance from that side, non-negative
    pub distance: i32,
    /// Ray starts inside the solid
    pub inside: bool,
}

impl PlaneProbe {
    /// Stage 3
    #[inline]
    pub fn new(shape: &PlaneShape, origin: IVec3) -> Self {
        Self {
            point: scale_vec(widen(shape.normal), shape.distance).wrapping_add(origin),
            normal: shape.normal,
        }
    }

    /// Stage 4
    #[inline]
    pub fn offset(&self, ray: &Ray) -> PlaneOffset {
        PlaneOffset {
            delta: ray.origin.wrapping_sub(self.point),
            normal: self.normal,
        }
    }
}

impl PlaneOffset {
    /// Stage 5
    #[inline]
    pub fn side(&self) -> PlaneSide {
        PlaneSide {
            signed_distance: crate::fixed::dot(self.delta, widen(self.normal)),
            normal: self.normal,
        }
    }
}

impl PlaneSide {
    /// Stages 6-7
    #[inline]
    pub fn orient(&self) -> PlaneFacing {
        let inside = self.signed_distance < 0;
        if inside {
            PlaneFacing {
                normal: negate16(self.normal),
                distance: self.signed_distance.wrapping_neg(),
                inside,
            }
        } else {
            PlaneFacing {
                normal: self.normal,
                distance: self.signed_distance,
                inside,
            }
        }
    }
}

impl PlaneFacing {
    /// Stage 8: operand for the shared reciprocal unit
    #[inline]
    pub fn rcp_input(&self, ray: &Ray) -> i32 {
        dot16(ray.direction, self.normal).wrapping_neg()
    }

    /// Stage 13, given `rcp(rcp_input)`
    pub fn resolve(&self, rcp: i32, ray: &Ray) -> Interval {
        if rcp < 0 {
            // Pointing away: either wholly inside or never reaching it
            return if self.inside {
                Interval {
                    entry: 0,
                    exit: Interval::FAR,
                    entry_normal: negate16(ray.direction),
                    exit_normal: I16Vec3::ZERO,
                }
            } else {
                Interval::MISS
            };
        }

        let t = fixed_mul(self.distance, rcp);
        if t < 0 {
            return Interval::MISS;
        }
        let (entry, exit) = if self.inside {
            (0, t)
        } else {
            (t, Interval::FAR)
        };
        Interval {
            entry,
            exit,
            entry_normal: self.normal,
            exit_normal: negate16(self.normal),
        }
    }
}

/// Full half-space test in one step
pub fn intersect_plane(shape: &PlaneShape, origin: IVec3, ray: &Ray) -> Interval {
    let facing = PlaneProbe::new(shape, origin).offset(ray).side().orient();
    facing.resolve(fixed_rcp(facing.rcp_input(ray)), ray)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::to_fixed;

    fn floor() -> PlaneShape {
        // y = -1, solid below
        PlaneShape {
            normal: I16Vec3::new(0, 16384, 0),
            distance: to_fixed(-1.0),
        }
    }

    #[test]
    fn test_ray_down_onto_floor() {
        let ray = Ray::new(IVec3::ZERO, I16Vec3::new(0, -16384, 0));
        let hit = intersect_plane(&floor(), IVec3::ZERO, &ray);
        assert!(hit.is_hit());
        assert!((hit.entry - to_fixed(1.0)).abs() < to_fixed(0.02));
        assert_eq!(hit.exit, Interval::FAR);
        assert_eq!(hit.entry_normal, I16Vec3::new(0, 16384, 0));
    }

    #[test]
    fn test_ray_up_from_above_misses() {
        let ray = Ray::new(IVec3::ZERO, I16Vec3::new(0, 16384, 0));
        assert!(!intersect_plane(&floor(), IVec3::ZERO, &ray).is_hit());
    }

    #[test]
    fn test_inside_pointing_away_is_all_inside() {
        let ray = Ray::new(IVec3::new(0, to_fixed(-3.0), 0), I16Vec3::new(0, -16384, 0));
        let hit = intersect_plane(&floor(), IVec3::ZERO, &ray);
        assert_eq!(hit.entry, 0);
        assert_eq!(hit.exit, Interval::FAR);
        assert_eq!(hit.entry_normal, I16Vec3::new(0, 16384, 0));
    }

    #[test]
    fn test_inside_pointing_out_exits_at_surface() {
        let ray = Ray::new(IVec3::new(0, to_fixed(-3.0), 0), I16Vec3::new(0, 16384, 0));
        let hit = intersect_plane(&floor(), IVec3::ZERO, &ray);
        assert_eq!(hit.entry, 0);
        assert!((hit.exit - to_fixed(2.0)).abs() < to_fixed(0.05));
        assert_eq!(hit.exit_normal, I16Vec3::new(0, 16384, 0));
    }
}
