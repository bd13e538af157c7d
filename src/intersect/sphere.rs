//! Ray–sphere test
//!
//! Geometric formulation around the point of closest approach. The chord
//! half-length goes through the square-root unit and the normal scale
//! `1 / radius` through the reciprocal unit, both shared with the plane path.
//!
//! Author: Moroya Sakamoto

use glam::IVec3;

use super::Interval;
use crate::fixed::{dot, fixed_mul, fixed_rcp, fixed_sqrt, narrow, negate16, scale_vec, widen};
use crate::isa::SphereShape;
use crate::types::Ray;

/// Stage 3: closest approach along the ray
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SphereProbe {
    /// World-space centre (shape centre plus origin register)
    pub centre: IVec3,
    /// Radius
    pub radius: i32,
    /// Depth of the closest point to the centre
    pub closest: i32,
    /// Squared distance from the ray start to the centre
    pub start_dist_sq: i32,
    /// Squared radius
    pub radius_sq: i32,
}

/// Stage 4: miss distance and start-inside test
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SphereChord {
    /// World-space centre
    pub centre: IVec3,
    /// Radius, the reciprocal unit operand
    pub radius: i32,
    /// Depth of the closest point to the centre
    pub closest: i32,
    /// Squared distance from the centre to the closest point
    pub closest_dist_sq: i32,
    /// Squared radius
    pub radius_sq: i32,
    /// Ray starts inside the sphere
    pub inside: bool,
}

/// Stage 9: entry and exit depths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SphereSpan {
    /// Chord data carried forward
    pub chord: SphereChord,
    /// Entry depth, 0 when starting inside
    pub entry: i32,
    /// Exit depth
    pub exit: i32,
}

/// Stage 10: surface points at both depths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SphereSurface {
    /// Span carried forward
    pub span: SphereSpan,
    /// Point at the entry depth
    pub entry_point: IVec3,
    /// Point at the exit depth
    pub exit_point: IVec3,
}

impl SphereProbe {
    /// Stage 3
    #[inline]
    pub fn new(shape: &SphereShape, origin: IVec3, ray: &Ray) -> Self {
        let centre = shape.centre.wrapping_add(origin);
        let oc = ray.origin.wrapping_sub(centre);
        Self {
            centre,
            radius: shape.radius,
            closest: dot(oc, widen(ray.direction)).wrapping_neg(),
            start_dist_sq: dot(oc, oc),
            radius_sq: fixed_mul(shape.radius, shape.radius),
        }
    }

    /// Stage 4
    #[inline]
    pub fn chord(&self) -> SphereChord {
        SphereChord {
            centre: self.centre,
            radius: self.radius,
            closest: self.closest,
            closest_dist_sq: self
                .start_dist_sq
                .wrapping_sub(fixed_mul(self.closest, self.closest)),
            radius_sq: self.radius_sq,
            inside: self.start_dist_sq < self.radius_sq,
        }
    }
}

impl SphereChord {
    /// Square-root unit operand
    #[inline]
    pub fn sqrt_input(&self) -> i32 {
        self.radius_sq.wrapping_sub(self.closest_dist_sq)
    }

    /// Stage 9, given `sqrt(sqrt_input)`
    #[inline]
    pub fn span(&self, half_chord: i32) -> SphereSpan {
        SphereSpan {
            chord: *self,
            entry: if self.inside {
                0
            } else {
                self.closest.wrapping_sub(half_chord)
            },
            exit: self.closest.wrapping_add(half_chord),
        }
    }
}

impl SphereSpan {
    /// Stage 10
    #[inline]
    pub fn surface(&self, ray: &Ray) -> SphereSurface {
        SphereSurface {
            span: *self,
            entry_point: ray.at(self.entry),
            exit_point: ray.at(self.exit),
        }
    }
}

impl SphereSurface {
    /// Stage 13, given `rcp(radius)`
    pub fn resolve(&self, inv_radius: i32, ray: &Ray) -> Interval {
        let chord = &self.span.chord;
        let normal_at = |p: IVec3| narrow(scale_vec(p.wrapping_sub(chord.centre), inv_radius));

        let entry_normal = if chord.inside {
            negate16(ray.direction)
        } else {
            normal_at(self.entry_point)
        };
        let exit_normal = normal_at(self.exit_point);

        let ahead = chord.closest >= 0 || chord.inside;
        let crosses = chord.closest_dist_sq < chord.radius_sq;
        let (entry, exit) = if ahead && crosses && self.span.entry >= 0 {
            (self.span.entry, self.span.exit)
        } else {
            (Interval::FAR, 0)
        };

        Interval {
            entry,
            exit,
            entry_normal,
            exit_normal,
        }
    }
}

/// Full sphere test in one step
pub fn intersect_sphere(shape: &SphereShape, origin: IVec3, ray: &Ray) -> Interval {
    let chord = SphereProbe::new(shape, origin, ray).chord();
    chord
        .span(fixed_sqrt(chord.sqrt_input()))
        .surface(ray)
        .resolve(fixed_rcp(chord.radius), ray)
}
