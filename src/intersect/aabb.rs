//! Ray–AABB slab test
//!
//! Stages: offsets to both slabs (needs the origin register), slab depths via
//! the precomputed direction reciprocal, per-axis min/max, then resolution of
//! entry and exit. Exit ties resolve X, then Y, then Z; entry likewise.
//!
//! Author: Moroya Sakamoto

use glam::{I16Vec3, IVec3};

use super::Interval;
use crate::fixed::{fixed_mul48, FIXED_ONE};
use crate::isa::AabbShape;
use crate::types::Ray;

/// Slab offsets from the ray start: `t0pos = min - start`, `t1pos = max - start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AabbOffsets {
    /// Offset to the minimum corner
    pub near: IVec3,
    /// Offset to the maximum corner
    pub far: IVec3,
}

/// Slab depths plus the offsets needed by the degenerate-axis check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AabbSlabs {
    /// Offsets carried forward
    pub offsets: AabbOffsets,
    /// Depth to the minimum-corner planes
    pub t0: IVec3,
    /// Depth to the maximum-corner planes
    pub t1: IVec3,
}

/// Per-axis entry/exit bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AabbBounds {
    /// Offsets carried forward
    pub offsets: AabbOffsets,
    /// Per-axis nearer slab depth
    pub t_min: IVec3,
    /// Per-axis farther slab depth
    pub t_max: IVec3,
}

impl AabbOffsets {
    /// Stage 3
    #[inline]
    pub fn new(shape: &AabbShape, origin: IVec3, ray: &Ray) -> Self {
        Self {
            near: shape.min.wrapping_add(origin).wrapping_sub(ray.origin),
            far: shape.max.wrapping_add(origin).wrapping_sub(ray.origin),
        }
    }

    /// Stage 4
    #[inline]
    pub fn slabs(&self, ray: &Ray) -> AabbSlabs {
        let rcp = ray.direction_rcp;
        let mul = |pos: IVec3| {
            IVec3::new(
                fixed_mul48(pos.x, rcp.x),
                fixed_mul48(pos.y, rcp.y),
                fixed_mul48(pos.z, rcp.z),
            )
        };
        AabbSlabs {
            offsets: *self,
            t0: mul(self.near),
            t1: mul(self.far),
        }
    }
}

impl AabbSlabs {
    /// Stage 5
    #[inline]
    pub fn bounds(&self) -> AabbBounds {
        AabbBounds {
            offsets: self.offsets,
            t_min: self.t0.min(self.t1),
            t_max: self.t0.max(self.t1),
        }
    }
}

/// Direction component too small for its reciprocal to be trusted
#[inline(always)]
fn effectively_zero(d: i16) -> bool {
    let high = (d as u16) & 0xFF00;
    high == 0 || high == 0xFF00
}

#[inline(always)]
fn axis_normal(axis: usize, value: i16) -> I16Vec3 {
    let mut n = [0i16; 3];
    n[axis] = value;
    I16Vec3::from_array(n)
}

/// X unless beaten strictly, then Y unless beaten strictly by Z
#[inline(always)]
fn pick_axis(v: IVec3, better: impl Fn(i32, i32) -> bool) -> usize {
    if better(v.x, v.y) && better(v.x, v.z) {
        0
    } else if better(v.y, v.z) {
        1
    } else {
        2
    }
}

impl AabbBounds {
    /// Stage 6
    pub fn resolve(&self, ray: &Ray) -> Interval {
        let one = FIXED_ONE as i16;
        let dir = ray.direction.to_array();

        let exit_axis = pick_axis(self.t_max, |a, b| a < b);
        let exit = self.t_max.to_array()[exit_axis];
        let exit_normal = axis_normal(exit_axis, if dir[exit_axis] > 0 { one } else { -one });

        let near = self.offsets.near.to_array();
        let far = self.offsets.far.to_array();
        let outside_degenerate_slab =
            (0..3).any(|i| effectively_zero(dir[i]) && (near[i] >= 0 || far[i] < 0));

        if exit < 0 || outside_degenerate_slab {
            return Interval {
                exit_normal,
                ..Interval::MISS
            };
        }

        let entry_axis = pick_axis(self.t_min, |a, b| a > b);
        Interval {
            entry: self.t_min.to_array()[entry_axis].max(0),
            exit,
            entry_normal: axis_normal(entry_axis, if dir[entry_axis] < 0 { one } else { -one }),
            exit_normal,
        }
    }
}

/// Full slab test in one step
pub fn intersect_aabb(shape: &AabbShape, origin: IVec3, ray: &Ray) -> Interval {
    AabbOffsets::new(shape, origin, ray)
        .slabs(ray)
        .bounds()
        .resolve(ray)
}
