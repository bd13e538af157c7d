//! Ray–primitive intersection
//!
//! Each primitive is split into the same stages the hardware clocks it
//! through, as a chain of small typed values. The cycle-accurate engine holds
//! these values in its lane registers and feeds the shared reciprocal and
//! square-root units between them; [`intersect`] chains them directly with the
//! combinational kernel functions, which is what the emulator uses. Both paths
//! run the same arithmetic, so they agree bit for bit.
//!
//! Author: Moroya Sakamoto

mod aabb;
mod plane;
mod sphere;

pub use aabb::{intersect_aabb, AabbBounds, AabbOffsets, AabbSlabs};
pub use plane::{intersect_plane, PlaneFacing, PlaneOffset, PlaneProbe, PlaneSide};
pub use sphere::{intersect_sphere, SphereChord, SphereProbe, SphereSpan, SphereSurface};

use glam::{I16Vec3, IVec3};
use serde::{Deserialize, Serialize};

use crate::isa::Shape;
use crate::types::Ray;

/// Depth interval along a ray with the surface normals at each end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Depth where the ray enters the volume
    pub entry: i32,
    /// Depth where the ray leaves the volume
    pub exit: i32,
    /// Outward normal at the entry point
    pub entry_normal: I16Vec3,
    /// Outward normal at the exit point
    pub exit_normal: I16Vec3,
}

impl Default for Interval {
    fn default() -> Self {
        Self::MISS
    }
}

impl Interval {
    /// Depth used for "unbounded"
    pub const FAR: i32 = i32::MAX;

    /// Empty interval
    pub const MISS: Self = Self {
        entry: Self::FAR,
        exit: 0,
        entry_normal: I16Vec3::ZERO,
        exit_normal: I16Vec3::ZERO,
    };

    /// Non-empty interval
    #[inline]
    pub fn is_hit(&self) -> bool {
        self.entry < self.exit
    }
}

/// Intersect `shape`, positioned relative to `origin`, with `ray`
pub fn intersect(shape: &Shape, origin: IVec3, ray: &Ray) -> Interval {
    match shape {
        Shape::Sphere(s) => intersect_sphere(s, origin, ray),
        Shape::Plane(p) => intersect_plane(p, origin, ray),
        Shape::Aabb(b) => intersect_aabb(b, origin, ray),
    }
}
