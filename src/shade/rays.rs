//! Secondary ray construction
//!
//! Shadow and reflection rays start a short bias away from the hit point so
//! they do not immediately re-hit the surface they leave. The bias is a
//! right shift of the offset vector (`>> 4`, about 1/16 of a unit).
//!
//! Author: Moroya Sakamoto

use glam::{I16Vec3, IVec3};

use crate::fixed::{dot16, fixed_mul_16x16, narrow, widen};
use crate::types::{Ray, RegisteredHit};

/// Shift applied to the light or normal when offsetting a secondary ray start
pub const SECONDARY_RAY_BIAS_SHIFT: i32 = 4;

/// Mirror `direction` about `normal`, keeping full 32-bit precision
///
/// `d - 2 (d . n) n`, evaluated with 16x16 multiplies.
#[inline]
pub fn reflect(direction: I16Vec3, normal: I16Vec3) -> IVec3 {
    let d_dot_n = dot16(direction, normal);
    let along = IVec3::new(
        fixed_mul_16x16(normal.x as i32, d_dot_n),
        fixed_mul_16x16(normal.y as i32, d_dot_n),
        fixed_mul_16x16(normal.z as i32, d_dot_n),
    );
    widen(direction) - (along << 1)
}

/// Occlusion ray from `hit` towards the light
pub fn shadow_ray(hit: &RegisteredHit, light: I16Vec3) -> Ray {
    let start = hit.position + (widen(light) >> SECONDARY_RAY_BIAS_SHIFT);
    Ray::new(start, light)
}

/// Mirror ray leaving `hit` for a primary ray travelling along `direction`
pub fn reflection_ray(hit: &RegisteredHit, direction: I16Vec3) -> Ray {
    let start = hit.position + (widen(hit.normal) >> SECONDARY_RAY_BIAS_SHIFT);
    Ray::new(start, narrow(reflect(direction, hit.normal)))
}

/// Whether every component of `origin` lies within `[-bound, bound]`
///
/// Rays starting far outside the scene overflow the intermediate products,
/// so orchestration refuses to trace them.
#[inline]
pub fn within_bounds(origin: IVec3, bound: i32) -> bool {
    origin.cmpge(IVec3::splat(-bound)).all() && origin.cmple(IVec3::splat(bound)).all()
}
