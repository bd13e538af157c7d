//! Colour calculators
//!
//! Integer-only shading: diffuse with a dim back-light, a cheap eighth-power
//! specular on unshadowed primary hits, a vertical sky gradient with a sun
//! flare, and a reflectiveness blend of primary and secondary colours.
//!
//! Author: Moroya Sakamoto

use glam::{I16Vec3, IVec3};

use super::rays::reflect;
use crate::engine::PerfCounters;
use crate::fixed::{dot, dot16, fixed_mul_16x16, widen, FIXED_ONE, FIXED_SHIFT};
use crate::types::{RegisteredHit, Rgb8};

/// Shift that takes a 2.14 intensity to the 0..=255 range
const TO_BYTE_SHIFT: u32 = FIXED_SHIFT - 8;

const SKY_BLUE: i32 = 190;
const SKY_GRADIENT: i32 = 128;

/// Dot product of a 32-bit vector with a 16-bit one using 16x16 multiplies
#[inline]
fn dot_16x16(a: IVec3, b: I16Vec3) -> i32 {
    fixed_mul_16x16(a.x, b.x as i32) + fixed_mul_16x16(a.y, b.y as i32) + fixed_mul_16x16(a.z, b.z as i32)
}

/// Specular highlight for a ray travelling along `direction`, in 0..=255
pub fn specular(direction: I16Vec3, normal: I16Vec3, light: I16Vec3) -> i32 {
    let mut s = dot_16x16(reflect(direction, normal), light).max(0);
    for _ in 0..3 {
        s = fixed_mul_16x16(s, s);
    }
    s >> TO_BYTE_SHIFT
}

/// Colour of a surface hit
///
/// `view` is the direction of the ray that produced the hit; pass it only
/// for primary hits, where the specular term is evaluated.
pub fn lit_colour(hit: &RegisteredHit, light: I16Vec3, shadowed: bool, view: Option<I16Vec3>) -> Rgb8 {
    let mut illumination = dot16(hit.normal, light);
    let mut highlight = 0;

    if illumination < 0 {
        // Facing away: a quarter-strength back-light
        illumination = -(illumination >> 2);
    } else if shadowed {
        illumination >>= 3;
    } else if let Some(direction) = view {
        highlight = specular(direction, hit.normal, light);
    }

    let [r, g, b] = hit.material.rgb();
    let channel = |c: i32| ((c * illumination) >> FIXED_SHIFT) + highlight;
    Rgb8::saturating(channel(r), channel(g), channel(b))
}

/// Colour of a ray that escapes the scene
pub fn sky_colour(direction: I16Vec3, light: I16Vec3) -> Rgb8 {
    let sun_dot = dot(widen(direction), widen(light)).max(0);
    let sun = fixed_mul_16x16(sun_dot, sun_dot);
    let sun = fixed_mul_16x16(sun, sun) >> TO_BYTE_SHIFT;

    let lerp = (FIXED_ONE + direction.y as i32).max(0);
    let gradient = (SKY_GRADIENT * lerp) >> FIXED_SHIFT;

    // Saturate so looking straight into the sun stays white instead of the
    // 8-bit sun term wrapping to black
    Rgb8::saturating(gradient + sun, gradient + sun, SKY_BLUE + sun)
}

/// Mix the reflected colour into the primary colour
pub fn blend(primary: Rgb8, secondary: Rgb8, reflectiveness: u8) -> Rgb8 {
    let keep = 255 - reflectiveness as i32;
    let take = reflectiveness as i32;
    let mix = |p: u8, s: u8| ((p as i32 * keep) >> 8) + ((s as i32 * take) >> 8);
    Rgb8::saturating(
        mix(primary.r, secondary.r),
        mix(primary.g, secondary.g),
        mix(primary.b, secondary.b),
    )
}

/// Debug colour: red for all mispredictions through green for all hits
///
/// Black when no branch was resolved.
pub fn branch_rate_colour(counters: &PerfCounters) -> Rgb8 {
    match counters.branch_hit_rate() {
        Some(rate) => Rgb8::new(((1.0 - rate) * 255.0) as u8, (rate * 255.0) as u8, 0),
        None => Rgb8::BLACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Material;

    const ONE: i16 = FIXED_ONE as i16;

    fn hit_with_normal(normal: I16Vec3) -> RegisteredHit {
        RegisteredHit {
            present: true,
            normal,
            material: Material::WHITE,
            ..RegisteredHit::default()
        }
    }

    #[test]
    fn test_fully_lit_white() {
        let light = I16Vec3::new(0, -ONE, 0);
        let hit = hit_with_normal(light);
        let c = lit_colour(&hit, light, false, None);
        assert_eq!(c, Rgb8::new(248, 248, 248));
    }

    #[test]
    fn test_shadow_divides_by_eight() {
        let light = I16Vec3::new(0, -ONE, 0);
        let hit = hit_with_normal(light);
        let c = lit_colour(&hit, light, true, None);
        assert_eq!(c, Rgb8::new(31, 31, 31));
    }

    #[test]
    fn test_back_light_quarter_strength() {
        let light = I16Vec3::new(0, -ONE, 0);
        let hit = hit_with_normal(I16Vec3::new(0, ONE, 0));
        let lit = lit_colour(&hit, light, false, None);
        let shadowed = lit_colour(&hit, light, true, None);
        assert_eq!(lit, Rgb8::new(62, 62, 62));
        assert_eq!(lit, shadowed);
    }

    #[test]
    fn test_specular_peaks_on_mirror_direction() {
        let light = I16Vec3::new(0, -ONE, 0);
        let normal = I16Vec3::new(0, -ONE, 0);
        // Looking straight down the normal reflects straight into the light
        assert_eq!(specular(I16Vec3::new(0, ONE, 0), normal, light), 256);
        // Grazing view gets nothing
        assert_eq!(specular(I16Vec3::new(0, 0, ONE), normal, light), 0);
    }

    #[test]
    fn test_specular_saturates_channels() {
        let light = I16Vec3::new(0, -ONE, 0);
        let hit = hit_with_normal(light);
        let c = lit_colour(&hit, light, false, Some(I16Vec3::new(0, ONE, 0)));
        assert_eq!(c, Rgb8::new(255, 255, 255));
    }

    #[test]
    fn test_sky_gradient() {
        let light = I16Vec3::new(0, ONE, 0);
        // Horizontal ray, sun behind
        assert_eq!(sky_colour(I16Vec3::new(0, 0, ONE), light), Rgb8::new(128, 128, 190));
        // Looking straight up (negative y) loses the gradient
        assert_eq!(sky_colour(I16Vec3::new(0, -ONE, 0), light), Rgb8::new(0, 0, 190));
        // Looking at the sun saturates
        assert_eq!(sky_colour(light, light), Rgb8::new(255, 255, 255));
    }

    #[test]
    fn test_blend_extremes() {
        let p = Rgb8::new(200, 100, 0);
        let s = Rgb8::new(0, 100, 200);
        assert_eq!(blend(p, s, 0), Rgb8::new(199, 99, 0));
        assert_eq!(blend(p, s, 255), Rgb8::new(0, 99, 199));
    }

    #[test]
    fn test_branch_rate_colour() {
        assert_eq!(branch_rate_colour(&PerfCounters::default()), Rgb8::BLACK);
        let all_hits = PerfCounters {
            branch_hits: 4,
            ..PerfCounters::default()
        };
        assert_eq!(branch_rate_colour(&all_hits), Rgb8::new(0, 255, 0));
        let all_misses = PerfCounters {
            branch_misses: 4,
            ..PerfCounters::default()
        };
        assert_eq!(branch_rate_colour(&all_misses), Rgb8::new(255, 0, 0));
    }
}
